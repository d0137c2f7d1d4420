use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageOutputFormat};

use super::resizer::{self, Resize};
use crate::error::ImageError;
use crate::formats::ImageFormat;
use crate::record::AverageColor;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// What a transform should produce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub format: ImageFormat,
    pub resize: Option<Resize>,
    pub jpeg_quality: u8,
}

/// An image processed for ingest.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Bytes,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub average_color: AverageColor,
}

/// Decodes the bytes, sniffing their container format.
pub fn decode(data: &[u8]) -> Result<(ImageFormat, DynamicImage), ImageError> {
    let detected = image::guess_format(data)
        .map_err(|_| ImageError::bad_request("the data is not a recognised image"))?;
    let format = ImageFormat::from_detected(detected)?;

    let img = image::load_from_memory_with_format(data, detected)
        .map_err(|e| ImageError::bad_request(format!("failed to decode image: {}", e)))?;

    Ok((format, img))
}

/// Encodes the image from scratch, which drops any embedded metadata.
pub fn encode_to(img: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> anyhow::Result<Bytes> {
    let mut buff = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_to(&mut buff, ImageOutputFormat::Jpeg(jpeg_quality))?;
        },
        ImageFormat::Png => {
            img.write_to(&mut buff, ImageOutputFormat::Png)?;
        },
        ImageFormat::Webp => {
            let rgba = img.to_rgba8();
            WebPEncoder::new_lossless(&mut buff).encode(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ColorType::Rgba8,
            )?;
        },
    }

    Ok(Bytes::from(buff.into_inner()))
}

/// Produces a derived variant of `data`.
///
/// This is a pure function of its inputs, the same bytes and spec always
/// give the same output.
pub fn transform(data: &[u8], spec: &TransformSpec) -> anyhow::Result<Bytes> {
    let (_, img) = decode(data).context("failed to decode the canonical image")?;

    let img = match spec.resize {
        Some(resize) => resizer::resize(resize, &img),
        None => img,
    };

    encode_to(&img, spec.format, spec.jpeg_quality)
}

/// Processes uploaded bytes into what gets stored.
///
/// With `raw` set the bytes are kept as uploaded and only inspected,
/// embedded metadata survives in that case.
pub fn process_upload(data: &[u8], spec: &TransformSpec, raw: bool) -> Result<ProcessedImage, ImageError> {
    let (detected, img) = decode(data)?;

    if raw {
        let (width, height) = img.dimensions();
        return Ok(ProcessedImage {
            data: Bytes::copy_from_slice(data),
            format: detected,
            width,
            height,
            average_color: resizer::average_color(&img),
        });
    }

    let img = match spec.resize {
        Some(resize) => resizer::resize(resize, &img),
        None => img,
    };

    let (width, height) = img.dimensions();
    let average_color = resizer::average_color(&img);
    let data = encode_to(&img, spec.format, spec.jpeg_quality)?;

    Ok(ProcessedImage {
        data,
        format: spec.format,
        width,
        height,
        average_color,
    })
}
