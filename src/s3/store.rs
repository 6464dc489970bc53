//! The object store seam used by the sync engine.

use async_trait::async_trait;
use std::path::Path;

use super::StoreError;

/// One page of a ListObjectsV2 listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    pub is_truncated: bool,
    /// Opaque cursor for the next page; only meaningful when truncated.
    pub next_continuation_token: Option<String>,
}

/// Operations the sync engine and CLI need from an S3-compatible store.
///
/// Implementations own retries, signing and connection pooling.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    /// Upload the file at `local_path` as `key`. Returns the bytes sent.
    async fn put_object(&self, bucket: &str, key: &str, local_path: &Path)
    -> Result<u64, StoreError>;

    /// Download `key` into `local_path`. Returns the bytes written.
    ///
    /// The destination is either fully written or untouched.
    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path)
    -> Result<u64, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Fetch one listing page. An empty `prefix` lists the whole bucket.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage, StoreError>;
}
