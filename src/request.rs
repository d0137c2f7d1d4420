use serde::Deserialize;

use crate::error::{ImageError, Result};
use crate::formats::{ImageFit, ImageFormat};
use crate::id::ImageId;
use crate::processor::Resize;
use crate::storage::paths::{size_token, ShardedPath};

/// The raw query of a serving URL.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServeParams {
    pub size: Option<String>,
    pub fit: Option<String>,
    pub sig: Option<String>,
}

/// A parsed and validated description of the variant a client wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub id: ImageId,

    /// `None` asks for the original dimensions.
    pub resize: Option<Resize>,

    pub format: ImageFormat,
    pub signature: Vec<u8>,
}

impl ImageRequest {
    /// An unsigned request, mostly used to mint URLs.
    pub fn new(id: ImageId, resize: Option<Resize>, format: ImageFormat) -> Self {
        Self {
            id,
            resize,
            format,
            signature: Vec::new(),
        }
    }

    /// Parses the `{hex}.{ext}` path segment and the query of a serving URL.
    pub fn parse(file: &str, params: &ServeParams) -> Result<Self> {
        let (id, ext) = file
            .rsplit_once('.')
            .ok_or_else(|| ImageError::bad_request("missing format extension"))?;

        let id: ImageId = id.parse()?;
        let format = ImageFormat::from_extension(ext)?;

        let resize = match (params.size.as_deref(), params.fit.as_deref()) {
            (None, _) => None,
            (Some(_), None) => return Err(ImageError::bad_request("size given without a fit")),
            (Some(size), Some(fit)) => {
                let (width, height) = parse_size(size)?;
                Some(Resize::new(width, height, ImageFit::from_token(fit)?))
            },
        };

        let signature = match params.sig.as_deref() {
            None => Vec::new(),
            Some(sig) => base64::decode_config(sig.trim_end_matches('='), base64::URL_SAFE_NO_PAD)
                .map_err(|_| ImageError::bad_request("undecodable signature"))?,
        };

        Ok(Self {
            id,
            resize,
            format,
            signature,
        })
    }

    /// The string the signature is computed over.
    pub fn canonical_string(&self) -> String {
        let (size, fit) = match self.resize {
            Some(r) => (size_token(r.width, r.height), r.fit.to_string()),
            None => ("0".to_string(), String::new()),
        };

        format!("{}:{}:{}:{}", self.id.to_hex(), size, fit, self.format.extension())
    }

    /// Renders the path and the unsigned query parameters.
    pub fn unsigned_path(&self, prefix: &str) -> String {
        let mut path = format!("{}/{}.{}", prefix, self.id.to_hex(), self.format.extension());
        if let Some(r) = self.resize {
            path.push_str(&format!("?size={}&fit={}", size_token(r.width, r.height), r.fit));
        }
        path
    }

    /// The sharded folder and the cache filename of this variant.
    pub fn cache_location(&self) -> (ShardedPath, String) {
        let sharded = ShardedPath::for_id(&self.id);
        let filename = sharded.variant_filename(
            self.resize.map(|r| (r.width, r.height, r.fit)),
            self.format,
        );
        (sharded, filename)
    }

    /// Drops the resize if the box already covers the canonical image.
    pub fn normalise_for(&mut self, width: u32, height: u32) {
        if matches!(self.resize, Some(r) if r.covers(width, height)) {
            self.resize = None;
        }
    }
}

/// Parses `N` as a square box and `WxH` as a rectangle.
pub fn parse_size(token: &str) -> Result<(u32, u32)> {
    let bad = || ImageError::bad_request(format!("malformed size {:?}", token));

    let (width, height) = match token.split_once('x') {
        Some((w, h)) => (w.parse::<u32>().map_err(|_| bad())?, h.parse::<u32>().map_err(|_| bad())?),
        None => {
            let n = token.parse::<u32>().map_err(|_| bad())?;
            (n, n)
        },
    };

    if width == 0 || height == 0 {
        return Err(bad());
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: Option<&str>, fit: Option<&str>, sig: Option<&str>) -> ServeParams {
        ServeParams {
            size: size.map(String::from),
            fit: fit.map(String::from),
            sig: sig.map(String::from),
        }
    }

    const ZERO: &str = "000000000000000000000000";

    #[test]
    fn parses_a_canonical_request() {
        let req = ImageRequest::parse(&format!("{}.jpeg", ZERO), &params(None, None, None)).unwrap();
        assert_eq!(req.id, ImageId::from_bytes([0; 12]));
        assert_eq!(req.resize, None);
        assert_eq!(req.format, ImageFormat::Jpeg);
        assert!(req.signature.is_empty());
    }

    #[test]
    fn parses_sizes() {
        let file = format!("{}.webp", ZERO);
        let req = ImageRequest::parse(&file, &params(Some("300"), Some("cover"), None)).unwrap();
        assert_eq!(req.resize, Some(Resize::new(300, 300, ImageFit::Cover)));

        let req = ImageRequest::parse(&file, &params(Some("640x480"), Some("contain"), None)).unwrap();
        assert_eq!(req.resize, Some(Resize::new(640, 480, ImageFit::Contain)));
    }

    #[test]
    fn rejects_bad_requests() {
        let file = format!("{}.jpeg", ZERO);
        let cases = [
            ("nothex.jpeg".to_string(), params(None, None, None)),
            (ZERO.to_string(), params(None, None, None)),
            (format!("{}.gif", ZERO), params(None, None, None)),
            (file.clone(), params(Some("300"), None, None)),
            (file.clone(), params(Some("300"), Some("stretch"), None)),
            (file.clone(), params(Some("0x300"), Some("cover"), None)),
            (file.clone(), params(Some("big"), Some("cover"), None)),
            (file, params(None, None, Some("***"))),
        ];

        for (file, params) in cases.iter() {
            assert!(
                matches!(ImageRequest::parse(file, params), Err(ImageError::BadRequest(_))),
                "{} {:?} should be rejected",
                file,
                params,
            );
        }
    }

    #[test]
    fn cache_filename_for_the_zero_id() {
        let req = ImageRequest::new(
            ImageId::from_bytes([0; 12]),
            Some(Resize::new(300, 300, ImageFit::Contain)),
            ImageFormat::Jpeg,
        );
        let (sharded, filename) = req.cache_location();
        assert_eq!(filename, format!("{}_300_contain.jpeg", sharded.stem));
    }

    #[test]
    fn normalising_drops_pointless_resizes() {
        let mut req = ImageRequest::new(
            ImageId::from_bytes([0; 12]),
            Some(Resize::new(300, 300, ImageFit::Contain)),
            ImageFormat::Jpeg,
        );
        req.normalise_for(400, 200);
        assert!(req.resize.is_some());

        req.normalise_for(300, 120);
        assert!(req.resize.is_none());
    }

    #[test]
    fn canonical_string_is_stable() {
        let id = ImageId::from_bytes([0; 12]);
        let req = ImageRequest::new(id, None, ImageFormat::Png);
        assert_eq!(req.canonical_string(), format!("{}:0::png", ZERO));

        let req = ImageRequest::new(id, Some(Resize::new(10, 20, ImageFit::Cover)), ImageFormat::Png);
        assert_eq!(req.canonical_string(), format!("{}:10x20:cover:png", ZERO));
        assert_eq!(
            req.unsigned_path("/images"),
            format!("/images/{}.png?size=10x20&fit=cover", ZERO)
        );
    }
}
