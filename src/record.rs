use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::ImageFormat;
use crate::id::ImageId;

/// An approximate average color of an image.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AverageColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for AverageColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// The persisted metadata row describing one canonical image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,

    /// The name of the store holding the canonical blob.
    pub store_name: String,

    /// Free-form metadata owned by the store.
    pub store_metadata: Option<serde_json::Value>,

    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,

    /// The size of the stored (encoded) blob in bytes.
    pub size: u64,

    /// The size of the bytes as they were uploaded.
    pub upload_size: u64,

    pub average_color: AverageColor,
    pub alt_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
    pub fn new(id: ImageId, store_name: impl Into<String>, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            id,
            store_name: store_name.into(),
            store_metadata: None,
            format,
            width,
            height,
            size: 0,
            upload_size: 0,
            average_color: AverageColor::default(),
            alt_text: None,
            created_at: id.timestamp(),
            deleted_at: None,
        }
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
