pub mod encoder;
pub mod resizer;

pub use encoder::{process_upload, transform, TransformSpec, DEFAULT_JPEG_QUALITY};
pub use resizer::Resize;
