use async_trait::async_trait;
use bytes::Bytes;

use crate::record::ImageRecord;

/// A physical medium holding canonical image blobs.
///
/// Stores are registered once at startup under a process-wide unique
/// `name`, which is what image records persist to find their way back.
#[async_trait]
pub trait Store: Sync + Send + 'static {
    fn name(&self) -> &str;

    /// Fetches the canonical blob for the record, `None` if it is missing.
    async fn get(&self, record: &ImageRecord) -> anyhow::Result<Option<Bytes>>;

    async fn save(&self, record: &ImageRecord, data: Bytes) -> anyhow::Result<()>;

    /// Removes the canonical blob, a missing blob counts as removed.
    async fn delete(&self, record: &ImageRecord) -> anyhow::Result<()>;
}
