use std::sync::Arc;
use tracing::debug;

use super::SyncError;
use crate::s3::{ObjectStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walks a ListObjectsV2 listing page by page.
///
/// The continuation token stays inside the lister; callers only see keys.
/// Iteration ends exactly when the store reports a non-truncated page.
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    page_size: i32,
    cursor: Cursor,
    pages: usize,
}

impl ObjectLister {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str, page_size: i32) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            page_size,
            cursor: Cursor::Start,
            pages: 0,
        }
    }

    /// Number of pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch the next page of keys, or `None` once the listing is complete
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>, SyncError> {
        let token = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        let page = self
            .store
            .list_objects_page(&self.bucket, &self.prefix, token, self.page_size)
            .await
            .map_err(|source| self.listing_error(source))?;
        self.pages += 1;

        debug!(
            page = self.pages,
            keys = page.keys.len(),
            truncated = page.is_truncated,
            "listed s3://{}/{}",
            self.bucket,
            self.prefix
        );

        if page.is_truncated {
            match page.next_continuation_token {
                Some(token) => self.cursor = Cursor::Next(token),
                None => {
                    return Err(self.listing_error(StoreError::InvalidResponse(
                        "truncated listing without a continuation token".to_string(),
                    )));
                }
            }
        }

        Ok(Some(page.keys))
    }

    /// Drain the whole listing into memory
    pub async fn collect_all(mut self) -> Result<Vec<String>, SyncError> {
        let mut keys = Vec::new();
        while let Some(page) = self.next_page().await? {
            keys.extend(page);
        }
        Ok(keys)
    }

    fn listing_error(&self, source: StoreError) -> SyncError {
        SyncError::Listing {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            source,
        }
    }
}
