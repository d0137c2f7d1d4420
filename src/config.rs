use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::converter::DEFAULT_WORKERS;
use crate::formats::{ImageFit, ImageFormat};
use crate::processor::{Resize, DEFAULT_JPEG_QUALITY};
use crate::storage::backends::{BackendConfigs, DISK_STORE_NAME};

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_host")]
    /// The address to bind the server to.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The absolute storage root, holding canonical images and cached variants.
    pub root: PathBuf,

    /// The secret signing every serving URL.
    pub secret: String,

    #[serde(default = "default_true")]
    /// Reject serving requests without a valid signature.
    ///
    /// Defaults to `true`.
    pub verify_signatures: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default = "default_workers")]
    /// The number of transforms allowed to run at once.
    pub workers: usize,

    #[serde(default = "default_record_cache_size")]
    /// The number of image records kept in memory.
    pub record_cache_size: u64,

    #[serde(default)]
    /// A base url prefixed onto every minted image url, e.g. a CDN.
    pub public_url: Option<String>,

    #[serde(default = "default_max_upload_size")]
    /// The largest accepted upload in bytes.
    pub max_upload_size: usize,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_store")]
    /// The store new images go to unless told otherwise.
    pub default_store: String,

    #[serde(default)]
    /// The set of stores to register.
    ///
    /// Defaults to a single filesystem store on `root`.
    pub backends: Vec<BackendConfigs>,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    /// Named copies listed on every image view, e.g. thumbnails.
    pub copies: Vec<CopyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    /// Defaults to `true`.
    pub enabled: bool,

    #[serde(default)]
    /// Defaults to the storage root.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    /// The format uploads are re-encoded to.
    pub format: ImageFormat,

    #[serde(default)]
    /// The box uploads are shrunk into.
    pub max_size: Option<ResizingConfig>,
}

#[derive(Debug, Copy, Clone, Deserialize)]
pub struct ResizingConfig {
    pub width: u32,
    pub height: u32,

    #[serde(default)]
    pub fit: ImageFit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopyConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,

    #[serde(default)]
    pub fit: ImageFit,

    #[serde(default)]
    pub format: ImageFormat,
}

impl From<ResizingConfig> for Resize {
    fn from(cfg: ResizingConfig) -> Self {
        Resize::new(cfg.width, cfg.height, cfg.fit)
    }
}

impl RuntimeConfig {
    pub fn from_file(file: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(file)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.is_absolute() {
            anyhow::bail!("the storage root {:?} must be an absolute path", self.root);
        }

        if self.secret.is_empty() {
            anyhow::bail!("a signing secret is required");
        }

        if self.workers == 0 {
            anyhow::bail!("at least one converter worker is required");
        }

        if let Some(size) = self.ingest.max_size {
            if size.width == 0 || size.height == 0 {
                anyhow::bail!("ingest max_size dimensions must be non-zero");
            }
        }

        for copy in self.copies.iter() {
            if copy.width == 0 || copy.height == 0 {
                anyhow::bail!("copy {:?} must have non-zero dimensions", copy.name);
            }
        }

        Ok(())
    }

    /// The configured backends, or the default filesystem store.
    pub fn backends(&self) -> Vec<BackendConfigs> {
        if self.backends.is_empty() {
            vec![BackendConfigs::FileSystem {
                name: DISK_STORE_NAME.to_string(),
                directory: None,
            }]
        } else {
            self.backends.clone()
        }
    }

    pub fn cache_directory(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(|| self.root.clone())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_true() -> bool {
    true
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

const fn default_record_cache_size() -> u64 {
    10_000
}

const fn default_max_upload_size() -> usize {
    20 * 1024 * 1024
}

const fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_store() -> String {
    DISK_STORE_NAME.to_string()
}
