pub mod filesystem;
pub mod register;

pub use filesystem::{DiskStore, DISK_STORE_NAME};
pub use register::BackendConfigs;
