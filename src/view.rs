use serde::Serialize;

use crate::formats::{ImageFit, ImageFormat};
use crate::id::ImageId;
use crate::processor::Resize;
use crate::record::ImageRecord;
use crate::signing::UrlSigner;

/// A derived copy of an [`Image`] embedded in API payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCopy {
    pub name: String,

    /// The box the copy was fit into.
    pub box_width: u32,
    pub box_height: u32,
    pub object_fit: ImageFit,
    pub format: ImageFormat,

    /// The real dimensions after fitting.
    pub width: u32,
    pub height: u32,

    pub url: String,
}

/// The outbound view of an image record, carrying signed URLs.
///
/// Views are rebuilt on every read and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: ImageId,
    pub format: ImageFormat,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub average_color: String,
    pub alt_text: Option<String>,
    pub url: String,
    pub copies: Vec<ImageCopy>,
}

impl Image {
    pub fn from_record(record: &ImageRecord, signer: &UrlSigner) -> Self {
        Self {
            id: record.id,
            format: record.format,
            mime_type: record.format.mime_type(),
            width: record.width,
            height: record.height,
            size: record.size,
            average_color: record.average_color.to_string(),
            alt_text: record.alt_text.clone(),
            url: signer.url_for(record.id, None, record.format),
            copies: Vec::new(),
        }
    }

    /// Appends a signed descriptor of a derived copy.
    pub fn append_copy(
        &mut self,
        signer: &UrlSigner,
        name: impl Into<String>,
        box_width: u32,
        box_height: u32,
        fit: ImageFit,
        format: ImageFormat,
    ) -> &mut Self {
        let resize = Resize::new(box_width, box_height, fit);
        let (width, height) = resize.output_size(self.width, self.height);

        self.copies.push(ImageCopy {
            name: name.into(),
            box_width,
            box_height,
            object_fit: fit,
            format,
            width,
            height,
            url: signer.url_for(self.id, Some(resize), format),
        });
        self
    }
}
