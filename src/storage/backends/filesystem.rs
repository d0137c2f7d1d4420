use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::record::ImageRecord;
use crate::storage::paths::ShardedPath;
use crate::storage::template::Store;

pub const DISK_STORE_NAME: &str = "disk";

/// The default store, canonical blobs live in the sharded layout
/// directly under `directory`.
pub struct DiskStore {
    name: String,
    directory: PathBuf,
}

impl DiskStore {
    pub fn with_name(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            directory: dir,
        }
    }

    #[inline]
    fn format_path(&self, record: &ImageRecord) -> (PathBuf, PathBuf) {
        let sharded = ShardedPath::for_id(&record.id);
        let store_in = sharded.dir_in(&self.directory);
        let path = store_in.join(sharded.canonical_filename(record.format));
        (store_in, path)
    }
}

#[async_trait]
impl Store for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, record: &ImageRecord) -> anyhow::Result<Option<Bytes>> {
        let (_, path) = self.format_path(record);

        debug!(image_id = %record.id, "Retrieving image @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn save(&self, record: &ImageRecord, data: Bytes) -> anyhow::Result<()> {
        let (store_in, path) = self.format_path(record);

        debug!(image_id = %record.id, "Storing image @ {:?}", &path);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(store_in).await?;
                tokio::fs::write(&path, data).await?;
                Ok(())
            },
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(&self, record: &ImageRecord) -> anyhow::Result<()> {
        let (_, path) = self.format_path(record);

        debug!(image_id = %record.id, "Purging image @ {:?}", &path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(other) => Err(other.into()),
        }
    }
}
