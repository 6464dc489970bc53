//! In-memory `ObjectStore`, used by tests and for exercising the engine
//! without an endpoint.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{ObjectPage, ObjectStore, StoreError};

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    fail_put: HashSet<String>,
    fail_get: HashSet<String>,
    fail_delete: HashSet<String>,
}

/// Bucket contents kept in sorted maps, so listing order and continuation
/// behave like S3 (lexicographic, cursor = last key returned).
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, creating the bucket if needed
    pub async fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().await;
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.buckets.get(bucket)?.get(key).cloned()
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every `put_object` for `key` fail
    pub async fn fail_put(&self, key: &str) {
        self.state.lock().await.fail_put.insert(key.to_string());
    }

    /// Make every `get_object` for `key` fail
    pub async fn fail_get(&self, key: &str) {
        self.state.lock().await.fail_get.insert(key.to_string());
    }

    /// Make every `delete_object` for `key` fail
    pub async fn fail_delete(&self, key: &str) {
        self.state.lock().await.fail_delete.insert(key.to_string());
    }

    /// Number of `list_objects_page` calls served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }
}

fn injected(op: &str, key: &str) -> StoreError {
    StoreError::Network {
        message: format!("injected {} failure for {}", op, key),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.buckets.keys().cloned().collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        if self.state.lock().await.fail_put.contains(key) {
            return Err(injected("put", key));
        }

        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;
        let size = data.len() as u64;

        let mut state = self.state.lock().await;
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            })?;
        objects.insert(key.to_string(), data);
        Ok(size)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let data = {
            let state = self.state.lock().await;
            if state.fail_get.contains(key) {
                return Err(injected("get", key));
            }
            let objects = state
                .buckets
                .get(bucket)
                .ok_or_else(|| StoreError::NoSuchBucket {
                    bucket: bucket.to_string(),
                })?;
            objects
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
        };

        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;
        Ok(data.len() as u64)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_delete.contains(key) {
            return Err(injected("delete", key));
        }
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            })?;
        // S3 deletes are idempotent
        objects.remove(key);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let state = self.state.lock().await;
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            })?;

        let start = match &continuation_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_string()),
        };
        let limit = max_keys.max(1) as usize;

        let mut keys: Vec<String> = objects
            .range((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(limit + 1)
            .cloned()
            .collect();

        let is_truncated = keys.len() > limit;
        keys.truncate(limit);
        let next_continuation_token = if is_truncated { keys.last().cloned() } else { None };

        Ok(ObjectPage {
            keys,
            is_truncated,
            next_continuation_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_pages_follow_cursor() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.insert("b", &format!("dir/{}", i), "x").await;
        }
        store.insert("b", "other", "x").await;

        let first = store.list_objects_page("b", "dir/", None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["dir/0", "dir/1"]);
        assert!(first.is_truncated);

        let second = store
            .list_objects_page("b", "dir/", first.next_continuation_token, 2)
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["dir/2", "dir/3"]);

        let third = store
            .list_objects_page("b", "dir/", second.next_continuation_token, 2)
            .await
            .unwrap();
        assert_eq!(third.keys, vec!["dir/4"]);
        assert!(!third.is_truncated);
        assert_eq!(third.next_continuation_token, None);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryStore::new();
        let err = store.list_objects_page("nope", "", None, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn test_injected_delete_failure() {
        let store = MemoryStore::new();
        store.insert("b", "k", "x").await;
        store.fail_delete("k").await;
        assert!(store.delete_object("b", "k").await.is_err());
        assert_eq!(store.keys("b").await, vec!["k"]);
    }
}
