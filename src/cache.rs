use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use walkdir::WalkDir;

use crate::record::ImageRecord;
use crate::request::ImageRequest;
use crate::storage::paths::ShardedPath;

/// Derived variants on disk, laid out next to the canonical files.
///
/// Filenames are a pure function of the request, so there is no manifest:
/// finding a variant is a single read and invalidation is a listing of the
/// image's shard folder.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    enabled: bool,
}

impl DiskCache {
    pub fn new(root: PathBuf, enabled: bool) -> Self {
        Self { root, enabled }
    }

    pub fn path_for(&self, req: &ImageRequest) -> PathBuf {
        let (sharded, filename) = req.cache_location();
        sharded.dir_in(&self.root).join(filename)
    }

    /// Reads a cached variant, any failure counts as a miss.
    pub async fn get(&self, req: &ImageRequest) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let path = self.path_for(req);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                debug!(image_id = %req.id, "Cache hit @ {:?}", &path);
                Some(Bytes::from(data))
            },
            Err(ref e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(image_id = %req.id, error = %e, "Failed to read cached image @ {:?}", &path);
                None
            },
        }
    }

    /// Writes a variant as a whole, readers see either nothing or every byte.
    pub async fn set(&self, req: &ImageRequest, data: Bytes) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.path_for(req);
        debug!(image_id = %req.id, "Caching image @ {:?}", &path);

        tokio::task::spawn_blocking(move || write_atomic(&path, &data)).await??;
        Ok(())
    }

    /// Removes every cached variant of the record, returning how many went.
    ///
    /// The canonical file is left alone even when it shares the folder.
    pub async fn purge(&self, record: &ImageRecord) -> anyhow::Result<usize> {
        let sharded = ShardedPath::for_id(&record.id);
        let canonical = sharded.canonical_filename(record.format);
        let dir = sharded.dir_in(&self.root);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };

            if name == canonical || !sharded.owns(name) {
                continue;
            }

            debug!(image_id = %record.id, "Purging cached image @ {:?}", entry.path());
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(ref e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }

    /// Removes every resized variant anywhere under the root.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let root = self.root.clone();
        let removed = tokio::task::spawn_blocking(move || sweep_dir(&root)).await??;
        info!(removed, "Swept image cache");
        Ok(removed)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("cache path {:?} has no parent", path))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path)?;
    Ok(())
}

fn sweep_dir(root: &Path) -> anyhow::Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let is_variant = entry
            .file_name()
            .to_str()
            .map(|name| name.contains('_'))
            .unwrap_or(false);

        if is_variant {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ImageFit, ImageFormat};
    use crate::id::ImageId;
    use crate::processor::Resize;

    fn request(id: ImageId, size: u32) -> ImageRequest {
        ImageRequest::new(id, Some(Resize::new(size, size, ImageFit::Cover)), ImageFormat::Jpeg)
    }

    #[tokio::test]
    async fn round_trips_variants() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let cache = DiskCache::new(root.path().to_path_buf(), true);
        let req = request(ImageId::generate(), 100);

        assert!(cache.get(&req).await.is_none());
        cache.set(&req, Bytes::from_static(b"variant")).await?;
        assert_eq!(cache.get(&req).await.as_deref(), Some(&b"variant"[..]));

        // Overwrites are whole.
        cache.set(&req, Bytes::from_static(b"v2")).await?;
        assert_eq!(cache.get(&req).await.as_deref(), Some(&b"v2"[..]));
        Ok(())
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let cache = DiskCache::new(root.path().to_path_buf(), false);
        let req = request(ImageId::generate(), 100);

        cache.set(&req, Bytes::from_static(b"variant")).await?;
        assert!(!cache.path_for(&req).exists());
        assert!(cache.get(&req).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn purge_only_touches_the_record() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let cache = DiskCache::new(root.path().to_path_buf(), true);

        let id = ImageId::generate();
        let record = ImageRecord::new(id, "disk", ImageFormat::Jpeg, 500, 500);
        let other = request(ImageId::generate(), 100);

        cache.set(&request(id, 100), Bytes::from_static(b"a")).await?;
        cache.set(&request(id, 200), Bytes::from_static(b"b")).await?;
        cache
            .set(&ImageRequest::new(id, None, ImageFormat::Webp), Bytes::from_static(b"c"))
            .await?;
        cache.set(&other, Bytes::from_static(b"d")).await?;

        // The canonical file sits in the same folder when the disk store shares the root.
        let canonical = cache.path_for(&ImageRequest::new(id, None, ImageFormat::Jpeg));
        std::fs::write(&canonical, b"canonical")?;

        assert_eq!(cache.purge(&record).await?, 3);
        assert!(cache.get(&request(id, 100)).await.is_none());
        assert!(canonical.exists());
        assert!(cache.get(&other).await.is_some());

        // Nothing left to purge.
        assert_eq!(cache.purge(&record).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_clears_every_variant() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let cache = DiskCache::new(root.path().to_path_buf(), true);

        let a = ImageId::generate();
        let b = ImageId::generate();
        cache.set(&request(a, 100), Bytes::from_static(b"a")).await?;
        cache.set(&request(b, 100), Bytes::from_static(b"b")).await?;

        let canonical = cache.path_for(&ImageRequest::new(a, None, ImageFormat::Jpeg));
        std::fs::write(&canonical, b"canonical")?;

        assert_eq!(cache.sweep().await?, 2);
        assert!(canonical.exists());
        assert!(cache.get(&request(b, 100)).await.is_none());
        Ok(())
    }
}
