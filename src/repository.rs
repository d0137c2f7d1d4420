use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use crate::id::ImageId;
use crate::record::ImageRecord;

/// The relational side of image persistence.
///
/// Only rows live here, canonical bytes are the business of a
/// [`Store`](crate::storage::template::Store).
#[async_trait]
pub trait ImageRepository: Sync + Send + 'static {
    /// Inserts a new row, failing if the id already exists.
    async fn insert(&self, record: &ImageRecord) -> anyhow::Result<()>;

    /// Fetches a live (not soft-deleted) row.
    async fn fetch(&self, id: ImageId) -> anyhow::Result<Option<ImageRecord>>;

    /// Fetches every live row of `ids` which exists, in the order given.
    async fn fetch_many(&self, ids: &[ImageId]) -> anyhow::Result<Vec<ImageRecord>>;

    /// Removes a row, returning whether it existed.
    async fn remove(&self, id: ImageId) -> anyhow::Result<bool>;

    /// Updates the alt text of a live row, returning whether it existed.
    async fn set_alt_text(&self, id: ImageId, alt_text: Option<String>) -> anyhow::Result<bool>;
}

/// A process local repository.
#[derive(Default)]
pub struct MemoryRepository {
    rows: RwLock<HashMap<ImageId, ImageRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageRepository for MemoryRepository {
    async fn insert(&self, record: &ImageRecord) -> anyhow::Result<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.id) {
            anyhow::bail!("image {} already exists", record.id);
        }
        rows.insert(record.id, record.clone());
        Ok(())
    }

    async fn fetch(&self, id: ImageId) -> anyhow::Result<Option<ImageRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).filter(|r| !r.is_deleted()).cloned())
    }

    async fn fetch_many(&self, ids: &[ImageId]) -> anyhow::Result<Vec<ImageRecord>> {
        let rows = self.rows.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|r| !r.is_deleted())
            .cloned()
            .collect())
    }

    async fn remove(&self, id: ImageId) -> anyhow::Result<bool> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn set_alt_text(&self, id: ImageId, alt_text: Option<String>) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id).filter(|r| !r.is_deleted()) {
            Some(row) => {
                row.alt_text = alt_text;
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::formats::ImageFormat;

    #[tokio::test]
    async fn soft_deleted_rows_are_invisible() -> anyhow::Result<()> {
        let repo = MemoryRepository::new();
        let live = ImageRecord::new(ImageId::generate(), "disk", ImageFormat::Jpeg, 1, 1);
        let mut gone = ImageRecord::new(ImageId::generate(), "disk", ImageFormat::Jpeg, 1, 1);
        gone.deleted_at = Some(Utc::now());

        repo.insert(&live).await?;
        repo.insert(&gone).await?;
        assert!(repo.insert(&live).await.is_err());

        assert!(repo.fetch(live.id).await?.is_some());
        assert!(repo.fetch(gone.id).await?.is_none());

        let many = repo.fetch_many(&[gone.id, live.id]).await?;
        assert_eq!(many.len(), 1);
        assert_eq!(many[0].id, live.id);

        assert!(!repo.set_alt_text(gone.id, Some("hidden".into())).await?);
        assert!(repo.set_alt_text(live.id, Some("a cat".into())).await?);
        assert_eq!(repo.fetch(live.id).await?.unwrap().alt_text.as_deref(), Some("a cat"));

        assert!(repo.remove(live.id).await?);
        assert!(!repo.remove(live.id).await?);
        Ok(())
    }
}
