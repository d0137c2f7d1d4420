use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;

use crate::cache::DiskCache;
use crate::config::{CopyConfig, RuntimeConfig};
use crate::converter::Converter;
use crate::error::{ImageError, Result};
use crate::formats::ImageFormat;
use crate::id::ImageId;
use crate::processor::{self, Resize, TransformSpec};
use crate::record::ImageRecord;
use crate::repository::ImageRepository;
use crate::request::{ImageRequest, ServeParams};
use crate::signing::UrlSigner;
use crate::storage::StoreRegistry;
use crate::view::Image;

/// How an upload is turned into a canonical image.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub format: ImageFormat,

    /// Shrinks the upload into this box before storing it.
    pub max_size: Option<Resize>,

    /// The store to use, the default store if `None`.
    pub store: Option<String>,

    pub alt_text: Option<String>,

    /// Store the uploaded bytes untouched, format sniffed.
    ///
    /// Embedded metadata (EXIF, GPS...) is kept as-is, so this must only
    /// ever be opted into.
    pub raw: bool,

    pub store_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub default_store: String,
    pub jpeg_quality: u8,
    pub max_upload_size: usize,
    pub record_cache_size: u64,

    /// Copies appended to every image view.
    pub copies: Vec<CopyConfig>,
}

/// The bytes of a served variant.
#[derive(Debug, Clone)]
pub struct Served {
    pub data: Bytes,
    pub format: ImageFormat,
}

pub struct ImageController {
    settings: ControllerSettings,
    repository: Arc<dyn ImageRepository>,
    stores: Arc<StoreRegistry>,
    converter: Arc<Converter>,
    cache: DiskCache,
    signer: UrlSigner,
    records: Cache<ImageId, Arc<ImageRecord>>,
}

impl ImageController {
    pub fn new(
        settings: ControllerSettings,
        repository: Arc<dyn ImageRepository>,
        stores: Arc<StoreRegistry>,
        converter: Arc<Converter>,
        cache: DiskCache,
        signer: UrlSigner,
    ) -> Result<Self> {
        if !stores.contains(&settings.default_store) {
            return Err(ImageError::StoreNotRegistered(settings.default_store));
        }

        Ok(Self {
            records: Cache::new(settings.record_cache_size),
            settings,
            repository,
            stores,
            converter,
            cache,
            signer,
        })
    }

    /// Wires up a controller from the runtime config.
    ///
    /// This must be called within a tokio runtime as it starts the converter.
    pub fn from_config(cfg: &RuntimeConfig, repository: Arc<dyn ImageRepository>) -> anyhow::Result<Self> {
        let mut stores = StoreRegistry::new();
        for backend in cfg.backends() {
            stores.register(backend.connect(&cfg.root)?)?;
        }

        let mut signer = UrlSigner::new(cfg.secret.as_bytes())?.with_verification(cfg.verify_signatures);
        if let Some(base) = cfg.public_url.as_ref() {
            signer = signer.with_public_url(base.clone());
        }

        let settings = ControllerSettings {
            default_store: cfg.default_store.clone(),
            jpeg_quality: cfg.jpeg_quality,
            max_upload_size: cfg.max_upload_size,
            record_cache_size: cfg.record_cache_size,
            copies: cfg.copies.clone(),
        };

        let controller = Self::new(
            settings,
            repository,
            Arc::new(stores),
            Arc::new(Converter::new(cfg.workers)),
            DiskCache::new(cfg.cache_directory(), cfg.cache.enabled),
            signer,
        )?;

        Ok(controller)
    }

    #[cfg(test)]
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    #[inline]
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    #[cfg(test)]
    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// The ingest options derived from the runtime config.
    pub fn default_save_options(cfg: &RuntimeConfig) -> SaveOptions {
        SaveOptions {
            format: cfg.ingest.format,
            max_size: cfg.ingest.max_size.map(Resize::from),
            ..Default::default()
        }
    }

    /// Looks up a live image record.
    pub async fn record(&self, id: ImageId) -> Result<Arc<ImageRecord>> {
        if let Some(record) = self.records.get(&id) {
            return Ok(record);
        }

        let record = self
            .repository
            .fetch(id)
            .await?
            .map(Arc::new)
            .ok_or(ImageError::NotFound)?;

        self.records.insert(id, record.clone());
        Ok(record)
    }

    /// Processes and stores an upload, creating its record.
    ///
    /// The row is inserted before the blob is written, if writing the blob
    /// fails the row is removed again.
    pub async fn save(&self, data: Bytes, options: SaveOptions) -> Result<ImageRecord> {
        if data.len() > self.settings.max_upload_size {
            return Err(ImageError::bad_request(format!(
                "upload of {} bytes exceeds the limit of {} bytes",
                data.len(),
                self.settings.max_upload_size,
            )));
        }

        let store_name = options
            .store
            .as_deref()
            .unwrap_or(&self.settings.default_store);
        let store = self.stores.get(store_name)?;

        let upload_size = data.len() as u64;
        let spec = TransformSpec {
            format: options.format,
            resize: options.max_size,
            jpeg_quality: self.settings.jpeg_quality,
        };
        let raw = options.raw;

        let instant = Instant::now();
        let processed = tokio::task::spawn_blocking(move || processor::process_upload(&data, &spec, raw))
            .await
            .map_err(anyhow::Error::from)??;

        let mut record = ImageRecord::new(
            ImageId::generate(),
            store.name(),
            processed.format,
            processed.width,
            processed.height,
        );
        record.size = processed.data.len() as u64;
        record.upload_size = upload_size;
        record.average_color = processed.average_color;
        record.alt_text = options.alt_text;
        record.store_metadata = options.store_metadata;

        self.repository.insert(&record).await?;

        if let Err(e) = store.save(&record, processed.data).await {
            error!(image_id = %record.id, store = %store.name(), error = %e, "Failed to store image");
            if let Err(e) = self.repository.remove(record.id).await {
                error!(image_id = %record.id, error = %e, "Failed to roll back image record");
            }
            return Err(e.into());
        }

        info!(
            image_id = %record.id,
            store = %record.store_name,
            format = %record.format,
            width = record.width,
            height = record.height,
            raw,
            processing_time = ?instant.elapsed(),
            "Saved image",
        );

        Ok(record)
    }

    /// Removes an image's blob, cached variants and record.
    ///
    /// A failure to remove the blob leaves the record in place so it never
    /// points at nothing. Failing to purge the cache only leaves garbage
    /// behind and is logged.
    pub async fn delete(&self, id: ImageId) -> Result<()> {
        let record = self.record(id).await?;
        let store = self.stores.get(&record.store_name)?;

        store.delete(&record).await?;
        self.records.invalidate(&id);

        match self.cache.purge(&record).await {
            Ok(removed) => debug!(image_id = %id, removed, "Purged cached variants"),
            Err(e) => warn!(image_id = %id, error = %e, "Failed to purge cached variants"),
        }

        self.repository.remove(id).await?;

        // A read racing the removal may have cached the row again.
        self.records.invalidate(&id);
        info!(image_id = %id, store = %record.store_name, "Deleted image");
        Ok(())
    }

    /// Parses a serving URL and checks its signature.
    pub fn parse_request(&self, file: &str, params: &ServeParams) -> Result<ImageRequest> {
        let req = ImageRequest::parse(file, params)?;
        self.signer.verify(&req)?;
        Ok(req)
    }

    /// Serves a validated request, from the cache when possible.
    pub async fn serve(&self, mut req: ImageRequest, cancel: &CancellationToken) -> Result<Served> {
        if let Some(data) = self.cache.get(&req).await {
            return Ok(Served { data, format: req.format });
        }

        let record = self.record(req.id).await?;
        let store = self.stores.get(&record.store_name)?;

        let requested = req.resize;
        req.normalise_for(record.width, record.height);

        if req.resize.is_none() && req.format == record.format {
            let data = store.get(&record).await?.ok_or(ImageError::NotFound)?;
            return Ok(Served { data, format: record.format });
        }

        if req.resize != requested {
            if let Some(data) = self.cache.get(&req).await {
                return Ok(Served { data, format: req.format });
            }
        }

        let original = store.get(&record).await?.ok_or(ImageError::NotFound)?;
        let spec = TransformSpec {
            format: req.format,
            resize: req.resize,
            jpeg_quality: self.settings.jpeg_quality,
        };

        let data = self.converter.convert(original, spec, cancel).await?;

        if let Err(e) = self.cache.set(&req, data.clone()).await {
            warn!(image_id = %req.id, error = %e, "Failed to cache image variant");
        }

        Ok(Served { data, format: req.format })
    }

    pub async fn image(&self, id: ImageId) -> Result<Image> {
        let record = self.record(id).await?;
        Ok(self.view(&record))
    }

    /// Builds views for every live image of `ids`, skipping missing ones.
    pub async fn images(&self, ids: &[ImageId]) -> Result<Vec<Image>> {
        let records = self.repository.fetch_many(ids).await?;
        Ok(records
            .iter()
            .map(|record| self.view(record))
            .collect())
    }

    fn view(&self, record: &ImageRecord) -> Image {
        let mut image = Image::from_record(record, &self.signer);
        for copy in self.settings.copies.iter() {
            image.append_copy(
                &self.signer,
                copy.name.as_str(),
                copy.width,
                copy.height,
                copy.fit,
                copy.format,
            );
        }
        image
    }

    pub async fn set_alt_text(&self, id: ImageId, alt_text: Option<String>) -> Result<()> {
        if !self.repository.set_alt_text(id, alt_text).await? {
            return Err(ImageError::NotFound);
        }

        self.records.invalidate(&id);
        Ok(())
    }

    /// Removes every resized variant from the cache.
    pub async fn sweep_cache(&self) -> Result<usize> {
        Ok(self.cache.sweep().await?)
    }

    pub async fn shutdown(&self) {
        self.converter.shutdown().await;
    }
}
