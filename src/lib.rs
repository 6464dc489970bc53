pub mod config;
pub mod s3;
pub mod sync;

pub use config::Config;
pub use s3::{MemoryStore, ObjectStore, S3Client, StoreError};
pub use sync::{SyncEngine, SyncError, SyncOptions, SyncReport};
