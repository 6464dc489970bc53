use futures::{StreamExt, stream};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::listing::ObjectLister;
use super::path_map::PathMapper;
use super::report::{ClearReport, RejectedItem, SyncReport, TransferTask};
use super::scheduler::TransferScheduler;
use super::walker::DirectoryWalker;
use super::SyncError;
use crate::config::{Config, DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE};
use crate::s3::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Parallel transfers (and parallel deletes when clearing)
    pub concurrency: usize,
    /// Keys requested per listing call
    pub page_size: i32,
    /// Tasks allowed to wait in the queue ahead of the workers
    pub queue_depth: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            queue_depth: DEFAULT_CONCURRENCY * 16,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            page_size: config.page_size,
            queue_depth: config.concurrency * 16,
        }
    }
}

/// Bulk transfers between a local directory tree and a key prefix.
///
/// Each call owns its own worker pool for its whole duration and always
/// drains it before returning, including on fatal errors.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    options: SyncOptions,
    progress: Option<ProgressBar>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            progress: None,
        }
    }

    /// Report per-item progress on `pb`; its length grows as work is found
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    fn scheduler(&self) -> TransferScheduler {
        TransferScheduler::new(
            Arc::clone(&self.store),
            self.options.concurrency,
            self.options.queue_depth,
            self.progress.clone(),
        )
    }

    /// Upload every file under `local_root` to `bucket`, keyed under `key_prefix`
    pub async fn upload_directory(
        &self,
        bucket: &str,
        local_root: &Path,
        key_prefix: &str,
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let files = DirectoryWalker::new(local_root).walk()?;
        let mapper = PathMapper::new(local_root, key_prefix);

        info!(
            "Uploading {} -> s3://{}/{}",
            local_root.display(),
            bucket,
            mapper.prefix()
        );

        let scheduler = self.scheduler();
        let mut rejected = Vec::new();
        let mut enumerated = Ok(());

        for file in files {
            let file = match file {
                Ok(file) => file,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    let item = match &e {
                        SyncError::LocalIo { path, .. } | SyncError::InvalidPath { path, .. } => {
                            path.display().to_string()
                        }
                        _ => local_root.display().to_string(),
                    };
                    rejected.push(reject(item, &e));
                    continue;
                }
            };

            let key = match mapper.object_key(&file.relative) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping {}: {}", file.relative.display(), e);
                    rejected.push(reject(file.relative.display().to_string(), &e));
                    continue;
                }
            };

            if let Err(e) = scheduler
                .enqueue(TransferTask::upload(bucket, key, file.absolute))
                .await
            {
                enumerated = Err(e);
                break;
            }
        }

        let results = scheduler.shutdown_and_wait().await;
        enumerated?;

        let report = finish(results, rejected, 0, start);
        info!(
            "Upload finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    /// Download every object under `key_prefix` into `local_root`
    ///
    /// Listing and transfers overlap: each page is handed to the workers as
    /// soon as it arrives, so only a bounded number of keys is ever held.
    ///
    /// Distinct keys can name the same local file (`d/x` and `d//x`, or `/x`
    /// and `x` without a prefix). The first key listed claims the path and
    /// later ones are rejected, so no file is written twice.
    pub async fn download_directory(
        &self,
        bucket: &str,
        key_prefix: &str,
        local_root: &Path,
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mapper = PathMapper::new(local_root, key_prefix);

        tokio::fs::create_dir_all(local_root)
            .await
            .map_err(|e| SyncError::local_io(local_root, e))?;

        info!(
            "Downloading s3://{}/{} -> {}",
            bucket,
            mapper.prefix(),
            local_root.display()
        );

        let mut lister = ObjectLister::new(
            Arc::clone(&self.store),
            bucket,
            mapper.prefix(),
            self.options.page_size,
        );
        let scheduler = self.scheduler();
        let mut rejected = Vec::new();
        let mut markers = 0;
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        let enumerated: Result<(), SyncError> = async {
            while let Some(keys) = lister.next_page().await? {
                info!("Processing page {} ({} keys)", lister.pages(), keys.len());
                for key in keys {
                    match mapper.local_path(&key) {
                        Ok(Some(path)) if !claimed.insert(path.clone()) => {
                            let e = SyncError::invalid_key(
                                &key,
                                format!("collides with another key at {}", path.display()),
                            );
                            warn!("Skipping {}: {}", key, e);
                            rejected.push(reject(key, &e));
                        }
                        Ok(Some(path)) => {
                            scheduler
                                .enqueue(TransferTask::download(bucket, key, path))
                                .await?;
                        }
                        Ok(None) => markers += 1,
                        Err(e) => {
                            warn!("Skipping {}: {}", key, e);
                            rejected.push(reject(key, &e));
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        let results = scheduler.shutdown_and_wait().await;
        if let Err(e) = enumerated {
            warn!(
                "Download aborted after {} transfers: {}",
                results.len(),
                e
            );
            return Err(e);
        }

        let report = finish(results, rejected, markers, start);
        info!(
            "Download finished: {} succeeded, {} failed, {} directory markers skipped",
            report.succeeded(),
            report.failed(),
            report.markers_skipped
        );
        Ok(report)
    }

    /// Delete every object in `bucket`
    ///
    /// Each page's keys are deleted concurrently before the next page is
    /// requested. Failed deletes are recorded and skipped.
    pub async fn clear_bucket(&self, bucket: &str) -> Result<ClearReport, SyncError> {
        let start = Instant::now();
        let mut lister =
            ObjectLister::new(Arc::clone(&self.store), bucket, "", self.options.page_size);
        let mut report = ClearReport::default();

        info!("Clearing bucket {}", bucket);

        while let Some(keys) = lister.next_page().await? {
            if let Some(pb) = &self.progress {
                pb.inc_length(keys.len() as u64);
            }

            let deletes = stream::iter(keys)
                .map(|key| {
                    let store = Arc::clone(&self.store);
                    async move {
                        let outcome = store.delete_object(bucket, &key).await;
                        (key, outcome)
                    }
                })
                .buffer_unordered(self.options.concurrency.max(1))
                .collect::<Vec<_>>()
                .await;

            for (key, outcome) in deletes {
                match outcome {
                    Ok(()) => {
                        info!("Deleted object: {}", key);
                        report.deleted += 1;
                    }
                    Err(e) => {
                        warn!("Failed to delete {}: {}", key, e);
                        report.failures.push(RejectedItem {
                            item: key.clone(),
                            reason: format!("{:#}", SyncError::from(e)),
                        });
                    }
                }
                if let Some(pb) = &self.progress {
                    pb.inc(1);
                    pb.set_message(key);
                }
            }
        }

        report.failures.sort_by(|a, b| a.item.cmp(&b.item));
        report.elapsed = start.elapsed();
        info!(
            "Bucket {}: {} objects deleted, {} failures",
            bucket,
            report.deleted,
            report.failures.len()
        );
        Ok(report)
    }
}

fn reject(item: String, error: &SyncError) -> RejectedItem {
    RejectedItem {
        item,
        reason: error.to_string(),
    }
}

fn finish(
    results: Vec<super::TransferResult>,
    rejected: Vec<RejectedItem>,
    markers_skipped: usize,
    start: Instant,
) -> SyncReport {
    let mut report = SyncReport {
        results,
        rejected,
        markers_skipped,
        elapsed: start.elapsed(),
    };
    report.sort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::{MemoryStore, ObjectPage, StoreError};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Delegates to a `MemoryStore` but fails the listing call numbered `fail_on`
    struct FlakyListing {
        inner: MemoryStore,
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl ObjectStore for FlakyListing {
        async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
            self.inner.create_bucket(bucket).await
        }

        async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_buckets().await
        }

        async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, StoreError> {
            self.inner.put_object(bucket, key, path).await
        }

        async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, StoreError> {
            self.inner.get_object(bucket, key, path).await
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
            self.inner.delete_object(bucket, key).await
        }

        async fn list_objects_page(
            &self,
            bucket: &str,
            prefix: &str,
            token: Option<String>,
            max_keys: i32,
        ) -> Result<ObjectPage, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(StoreError::Network {
                    message: "connection reset".into(),
                });
            }
            self.inner
                .list_objects_page(bucket, prefix, token, max_keys)
                .await
        }
    }

    fn engine(store: &Arc<MemoryStore>, page_size: i32) -> SyncEngine {
        SyncEngine::new(
            store.clone(),
            SyncOptions {
                concurrency: 4,
                page_size,
                queue_depth: 2,
            },
        )
    }

    /// A tree with a nested subdirectory and an empty file
    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("root.txt"), "root file").unwrap();
        fs::write(dir.path().join("a/one.csv"), "x,y\n1,2\n").unwrap();
        fs::write(dir.path().join("a/b/empty.bin"), "").unwrap();
        fs::write(dir.path().join("a/b/data.bin"), vec![7u8; 4096]).unwrap();
        dir
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upload_directory() {
        let tree = sample_tree();
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();

        let report = engine(&store, 1000)
            .upload_directory("b", tree.path(), "base")
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 4);
        assert!(report.is_success());
        assert_eq!(report.bytes_transferred(), 9 + 8 + 4096);
        assert_eq!(
            store.keys("b").await,
            vec!["base/a/b/data.bin", "base/a/b/empty.bin", "base/a/one.csv", "base/root.txt"]
        );
        assert_eq!(store.object("b", "base/a/b/empty.bin").await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_upload_missing_directory_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();

        let err = engine(&store, 1000)
            .upload_directory("b", Path::new("/definitely/not/here"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DirectoryNotFound { .. }));
        assert!(store.keys("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_twice_overwrites() {
        let tree = sample_tree();
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();
        let engine = engine(&store, 1000);

        engine.upload_directory("b", tree.path(), "p").await.unwrap();
        let first = store.keys("b").await;
        fs::write(tree.path().join("root.txt"), "changed").unwrap();
        engine.upload_directory("b", tree.path(), "p").await.unwrap();

        assert_eq!(store.keys("b").await, first);
        assert_eq!(store.object("b", "p/root.txt").await.unwrap(), b"changed");
    }

    #[tokio::test]
    async fn test_upload_single_failure_is_isolated() {
        let tree = sample_tree();
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();
        store.fail_put("p/a/one.csv").await;

        let report = engine(&store, 1000)
            .upload_directory("b", tree.path(), "p")
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures[0].0, "p/a/one.csv");
        assert!(failures[0].1.contains("injected put failure"));
    }

    #[tokio::test]
    async fn test_round_trip_reproduces_tree() {
        let tree = sample_tree();
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();
        let engine = engine(&store, 2);

        engine.upload_directory("b", tree.path(), "backup").await.unwrap();
        let report = engine
            .download_directory("b", "backup", out.path())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded(), 4);
        assert_eq!(snapshot(out.path()), snapshot(tree.path()));
    }

    #[tokio::test]
    async fn test_download_pagination_and_markers() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "pre/", "").await;
        store.insert("b", "pre/folder/", "").await;
        for i in 0..23 {
            store.insert("b", &format!("pre/f{:02}.txt", i), format!("{}", i)).await;
        }
        store.insert("b", "unrelated.txt", "nope").await;

        let report = engine(&store, 5)
            .download_directory("b", "pre", out.path())
            .await
            .unwrap();

        // 25 keys under the prefix, 5 per page
        assert_eq!(store.list_calls(), 5);
        assert_eq!(report.succeeded(), 23);
        assert_eq!(report.markers_skipped, 2);
        assert!(!out.path().join("folder").exists());
        assert!(!out.path().join("unrelated.txt").exists());
        assert_eq!(fs::read_to_string(out.path().join("f07.txt")).unwrap(), "7");
    }

    #[tokio::test]
    async fn test_download_single_failure_is_isolated() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        for i in 0..10 {
            store.insert("b", &format!("d/{}", i), "x").await;
        }
        store.fail_get("d/4").await;

        let report = engine(&store, 3)
            .download_directory("b", "d/", out.path())
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 9);
        assert_eq!(report.failed(), 1);
        assert!(!out.path().join("4").exists());
        assert!(out.path().join("9").exists());
    }

    #[tokio::test]
    async fn test_download_rejects_unsafe_keys() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "d/../escape", "x").await;
        store.insert("b", "d/fine", "x").await;

        let report = engine(&store, 10)
            .download_directory("b", "d", out.path())
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].item, "d/../escape");
    }

    #[tokio::test]
    async fn test_download_colliding_keys_write_once() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "d/x", "single").await;
        store.insert("b", "d//x", "double").await;
        store.insert("b", "d/y", "y").await;

        let report = engine(&store, 10)
            .download_directory("b", "d", out.path())
            .await
            .unwrap();

        // "d//x" sorts first and claims x
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].item, "d/x");
        assert!(report.rejected[0].reason.contains("collides"));
        assert_eq!(fs::read_to_string(out.path().join("x")).unwrap(), "double");
    }

    #[tokio::test]
    async fn test_download_collision_without_prefix() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "/a", "rooted").await;
        store.insert("b", "a", "plain").await;

        let report = engine(&store, 10)
            .download_directory("b", "", out.path())
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].item, "a");
        assert_eq!(fs::read_to_string(out.path().join("a")).unwrap(), "rooted");
    }

    #[tokio::test]
    async fn test_download_listing_failure_drains_first_page() {
        let out = TempDir::new().unwrap();
        let inner = MemoryStore::new();
        for i in 0..6 {
            inner.insert("b", &format!("d/{}", i), format!("{}", i)).await;
        }
        let store = Arc::new(FlakyListing {
            inner,
            calls: AtomicUsize::new(0),
            fail_on: 2,
        });
        let engine = SyncEngine::new(
            store,
            SyncOptions {
                concurrency: 2,
                page_size: 3,
                queue_depth: 1,
            },
        );

        let err = engine
            .download_directory("b", "d", out.path())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Listing { .. }));
        for i in 0..3 {
            let path = out.path().join(i.to_string());
            assert_eq!(fs::read_to_string(path).unwrap(), i.to_string());
        }
        assert!(!out.path().join("3").exists());
    }

    #[tokio::test]
    async fn test_download_missing_bucket_is_fatal() {
        let out = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let err = engine(&store, 10)
            .download_directory("nope", "", out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Listing { .. }));
    }

    #[tokio::test]
    async fn test_clear_bucket() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store.insert("b", &format!("k{:02}", i), "x").await;
        }

        let report = engine(&store, 5).clear_bucket("b").await.unwrap();

        assert_eq!(report.deleted, 12);
        assert!(report.is_success());
        assert!(store.keys("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_bucket_with_failure() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store.insert("b", &format!("k{:02}", i), "x").await;
        }
        store.fail_delete("k05").await;

        let report = engine(&store, 5).clear_bucket("b").await.unwrap();

        assert_eq!(report.deleted, 11);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, "k05");
        assert_eq!(store.keys("b").await, vec!["k05"]);
    }
}
