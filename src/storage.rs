pub mod backends;
pub mod paths;
pub mod registry;
pub mod template;

pub use paths::ShardedPath;
pub use registry::StoreRegistry;
