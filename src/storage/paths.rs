//! Deterministic, sharded file layout.
//!
//! Every image lives at `{hh}/{h}/{stem}.{ext}` where `hhh` are the first
//! three hex characters of the SHA-1 of the raw identifier bytes and `stem`
//! is the remaining 37. Derived variants share the folder and the stem, so
//! locating (or purging) every file belonging to an image never needs a
//! lookup of any kind.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::formats::{ImageFit, ImageFormat};
use crate::id::ImageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardedPath {
    /// The two level folder, e.g. `"3f/a"`.
    pub folder: String,

    /// The filename stem shared by the canonical file and its variants.
    pub stem: String,
}

impl ShardedPath {
    pub fn for_id(id: &ImageId) -> Self {
        let digest = Sha1::digest(id.as_bytes());
        let hex = hex::encode(digest);

        Self {
            folder: format!("{}/{}", &hex[..2], &hex[2..3]),
            stem: hex[3..].to_string(),
        }
    }

    /// The canonical filename, e.g. `"<stem>.jpeg"`.
    pub fn canonical_filename(&self, format: ImageFormat) -> String {
        format!("{}.{}", self.stem, format.extension())
    }

    /// The filename of a derived variant.
    ///
    /// When `resize` is `None` the name collapses onto `<stem>.<ext>`.
    pub fn variant_filename(&self, resize: Option<(u32, u32, ImageFit)>, format: ImageFormat) -> String {
        match resize {
            None => self.canonical_filename(format),
            Some((width, height, fit)) => format!(
                "{}_{}_{}.{}",
                self.stem,
                size_token(width, height),
                fit,
                format.extension(),
            ),
        }
    }

    /// The folder joined onto a storage root.
    pub fn dir_in(&self, root: &Path) -> PathBuf {
        self.folder.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }

    /// Whether a filename in this folder belongs to this image, i.e. it is
    /// the stem followed directly by a `_` or a `.`.
    pub fn owns(&self, filename: &str) -> bool {
        filename
            .strip_prefix(self.stem.as_str())
            .and_then(|rest| rest.chars().next())
            .map(|c| c == '_' || c == '.')
            .unwrap_or(false)
    }
}

/// Renders a box as `W` when square and `WxH` otherwise.
pub fn size_token(width: u32, height: u32) -> String {
    if width == height {
        width.to_string()
    } else {
        format!("{}x{}", width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_id_layout_is_stable() {
        let id = ImageId::from_bytes([0u8; 12]);
        let path = ShardedPath::for_id(&id);
        let full = hex::encode(Sha1::digest([0u8; 12]));

        assert_eq!(path.folder, format!("{}/{}", &full[..2], &full[2..3]));
        assert_eq!(path.stem, full[3..]);
        assert_eq!(path.stem.len(), 37);
        assert_eq!(path, ShardedPath::for_id(&id));
    }

    #[test]
    fn square_boxes_collapse_into_a_single_token() {
        let path = ShardedPath::for_id(&ImageId::from_bytes([0u8; 12]));
        let name = path.variant_filename(Some((300, 300, ImageFit::Contain)), ImageFormat::Jpeg);
        assert_eq!(name, format!("{}_300_contain.jpeg", path.stem));

        let name = path.variant_filename(Some((300, 200, ImageFit::Cover)), ImageFormat::Webp);
        assert_eq!(name, format!("{}_300x200_cover.webp", path.stem));

        assert_eq!(path.variant_filename(None, ImageFormat::Png), format!("{}.png", path.stem));
    }

    #[test]
    fn distinct_ids_get_distinct_paths() {
        let a = ShardedPath::for_id(&ImageId::from_bytes([0u8; 12]));
        let b = ShardedPath::for_id(&ImageId::from_bytes([1u8; 12]));
        assert_ne!((a.folder, a.stem), (b.folder, b.stem));
    }

    #[test]
    fn ownership_requires_a_separator() {
        let path = ShardedPath::for_id(&ImageId::from_bytes([0u8; 12]));
        assert!(path.owns(&format!("{}.jpeg", path.stem)));
        assert!(path.owns(&format!("{}_300_cover.jpeg", path.stem)));
        assert!(!path.owns(&format!("{}0.jpeg", path.stem)));
        assert!(!path.owns("unrelated.jpeg"));
    }
}
