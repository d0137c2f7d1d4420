use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::{ImageError, Result};
use crate::storage::template::Store;

/// Every store known to the process, keyed by name.
///
/// The registry is filled while the process starts up and is only ever
/// shared behind an `Arc` afterwards, so lookups need no locking.
#[derive(Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store: Arc<dyn Store>) -> Result<()> {
        let name = store.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(ImageError::DuplicateStore(name));
        }

        info!(store = %name, "Registered image store");
        self.stores.insert(name, store);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Store>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| ImageError::StoreNotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }
}
