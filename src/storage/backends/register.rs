use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::filesystem::{DiskStore, DISK_STORE_NAME};
use crate::storage::template::Store;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum BackendConfigs {
    FileSystem {
        #[serde(default = "default_disk_name")]
        name: String,

        /// Defaults to the configured storage root.
        #[serde(default)]
        directory: Option<PathBuf>,
    },
}

impl BackendConfigs {
    pub fn connect(&self, root: &std::path::Path) -> anyhow::Result<Arc<dyn Store>> {
        match self {
            Self::FileSystem { name, directory } => {
                let directory = directory.clone().unwrap_or_else(|| root.to_path_buf());
                if !directory.is_absolute() {
                    anyhow::bail!("filesystem store {:?} requires an absolute directory", name);
                }
                Ok(Arc::new(DiskStore::with_name(name.clone(), directory)))
            },
        }
    }
}

fn default_disk_name() -> String {
    DISK_STORE_NAME.to_string()
}
