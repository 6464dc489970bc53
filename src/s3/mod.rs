pub mod client;
pub mod download;
pub mod error;
pub mod memory;
pub mod multipart;
pub mod store;
pub mod upload;

pub use client::S3Client;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use multipart::{MULTIPART_THRESHOLD, upload_multipart};
pub use store::{ObjectPage, ObjectStore};
