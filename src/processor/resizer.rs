use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use crate::formats::ImageFit;
use crate::record::AverageColor;

/// The filter used for every resize, downscaling only.
const FILTER: FilterType = FilterType::CatmullRom;

/// At most this many samples are taken per axis for the average color.
const COLOR_SAMPLES: u32 = 32;

/// A target box and the rule to map an image into it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
    pub fit: ImageFit,
}

impl Resize {
    pub fn new(width: u32, height: u32, fit: ImageFit) -> Self {
        Self { width, height, fit }
    }

    /// Whether the box is at least as large as `(width, height)` on both axes,
    /// in which case resizing would be pointless or an upscale.
    #[inline]
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }

    /// The real dimensions an image of `(width, height)` ends up with.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.covers(width, height) {
            return (width, height);
        }

        match self.fit {
            ImageFit::Cover => (self.width, self.height),
            ImageFit::Contain => contain_size(width, height, self.width, self.height),
        }
    }
}

/// The largest size fitting inside the box without upscaling.
///
/// Width is clamped first, then the (possibly already scaled) height.
pub fn contain_size(width: u32, height: u32, box_width: u32, box_height: u32) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);

    if w > box_width as f64 {
        h *= box_width as f64 / w;
        w = box_width as f64;
    }

    if h > box_height as f64 {
        w *= box_height as f64 / h;
        h = box_height as f64;
    }

    let w = (w.round() as u32).clamp(1, width.min(box_width).max(1));
    let h = (h.round() as u32).clamp(1, height.min(box_height).max(1));
    (w, h)
}

pub fn resize(resize: Resize, img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    if resize.covers(width, height) {
        return img.clone();
    }

    match resize.fit {
        ImageFit::Cover => img.resize_to_fill(resize.width, resize.height, FILTER),
        ImageFit::Contain => {
            let (w, h) = contain_size(width, height, resize.width, resize.height);
            img.resize_exact(w, h, FILTER)
        },
    }
}

/// The stride keeping an axis of `len` pixels within `COLOR_SAMPLES` samples.
#[inline]
fn sample_step(len: u32) -> u32 {
    len.div_ceil(COLOR_SAMPLES).max(1)
}

/// Approximates the average color by sampling a bounded grid of pixels.
pub fn average_color(img: &DynamicImage) -> AverageColor {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return AverageColor::default();
    }

    let step_x = sample_step(width);
    let step_y = sample_step(height);

    let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
    for y in (0..height).step_by(step_y as usize) {
        for x in (0..width).step_by(step_x as usize) {
            let px = img.get_pixel(x, y).0;
            r += px[0] as u64;
            g += px[1] as u64;
            b += px[2] as u64;
            n += 1;
        }
    }

    AverageColor {
        r: (r / n) as u8,
        g: (g / n) as u8,
        b: (b / n) as u8,
    }
}
