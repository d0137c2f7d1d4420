use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::ImageError;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    #[strum(to_string = "jpeg", serialize = "jpg")]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Jpeg
    }
}

impl ImageFormat {
    /// The file extension used for stored and cached files.
    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    #[inline]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// Parses an extension as it appears in a serving URL.
    pub fn from_extension(ext: &str) -> Result<Self, ImageError> {
        ext.parse()
            .map_err(|_| ImageError::bad_request(format!("unsupported format {:?}", ext)))
    }

    /// Maps a sniffed container format onto the formats we can store.
    pub fn from_detected(format: image::ImageFormat) -> Result<Self, ImageError> {
        match format {
            image::ImageFormat::Jpeg => Ok(Self::Jpeg),
            image::ImageFormat::Png => Ok(Self::Png),
            image::ImageFormat::WebP => Ok(Self::Webp),
            other => Err(ImageError::UnsupportedFormat(format!("{:?}", other))),
        }
    }
}

impl From<ImageFormat> for image::ImageFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

/// The rule used to map an image into a target box.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFit {
    /// Crop-resize to exactly fill the box.
    Cover,

    /// Fit entirely inside the box without cropping or upscaling.
    Contain,
}

impl Default for ImageFit {
    fn default() -> Self {
        Self::Contain
    }
}

impl ImageFit {
    pub fn from_token(token: &str) -> Result<Self, ImageError> {
        token
            .parse()
            .map_err(|_| ImageError::bad_request(format!("unsupported fit {:?}", token)))
    }
}
