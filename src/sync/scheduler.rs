//! Bounded pool of transfer workers.
//!
//! Tasks go through a bounded FIFO channel shared by `concurrency` tokio
//! workers; an idle worker takes the next task. A second channel carries
//! results to a collector task. `submit` waits for queue space, which is the
//! backpressure that keeps enumeration from running far ahead of transfers.

use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::SyncError;
use super::report::{Direction, Outcome, TransferResult, TransferTask};
use crate::s3::ObjectStore;

type Job = (TransferTask, Option<oneshot::Sender<TransferResult>>);

/// Resolves to the result of one submitted task
pub struct TaskHandle(oneshot::Receiver<TransferResult>);

impl TaskHandle {
    /// Wait for the task to finish. `None` only if its worker died.
    pub async fn wait(self) -> Option<TransferResult> {
        self.0.await.ok()
    }
}

pub struct TransferScheduler {
    work_tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<Vec<TransferResult>>,
    progress: Option<ProgressBar>,
}

impl TransferScheduler {
    /// Spawn the workers. Must be called within a tokio runtime.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        concurrency: usize,
        queue_depth: usize,
        progress: Option<ProgressBar>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let (work_tx, work_rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let (result_tx, mut result_rx) = mpsc::channel::<TransferResult>(queue_depth.max(1));
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut workers = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            let work_rx = Arc::clone(&work_rx);
            let store = Arc::clone(&store);
            let result_tx = result_tx.clone();
            let progress = progress.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx_guard = work_rx.lock().await;
                        rx_guard.recv().await
                    };

                    let Some((task, reply)) = job else {
                        break; // Channel closed
                    };

                    debug!(worker = id, key = %task.key, "starting {:?}", task.direction);
                    let outcome = match execute(store.as_ref(), &task).await {
                        Ok(bytes) => Outcome::Success { bytes },
                        Err(e) => {
                            warn!("{:?} failed for {}: {:#}", task.direction, task.key, e);
                            Outcome::Failure {
                                reason: format!("{:#}", e),
                            }
                        }
                    };

                    if let Some(pb) = &progress {
                        pb.inc(1);
                        pb.set_message(task.key.clone());
                    }

                    let result = TransferResult { task, outcome };
                    if let Some(reply) = reply {
                        let _ = reply.send(result.clone());
                    }
                    let _ = result_tx.send(result).await;
                }
            }));
        }
        drop(result_tx); // Drop original sender

        let collector = tokio::spawn(async move {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        });

        Self {
            work_tx,
            workers,
            collector,
            progress,
        }
    }

    /// Queue a task, waiting while the queue is full
    pub async fn submit(&self, task: TransferTask) -> Result<TaskHandle, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if let Some(pb) = &self.progress {
            pb.inc_length(1);
        }
        self.work_tx
            .send((task, Some(reply_tx)))
            .await
            .map_err(|_| SyncError::SchedulerClosed)?;
        Ok(TaskHandle(reply_rx))
    }

    /// Queue a task whose result is only needed in the final aggregate
    pub async fn enqueue(&self, task: TransferTask) -> Result<(), SyncError> {
        if let Some(pb) = &self.progress {
            pb.inc_length(1);
        }
        self.work_tx
            .send((task, None))
            .await
            .map_err(|_| SyncError::SchedulerClosed)
    }

    /// Submit every task, then shut down and return all results
    pub async fn run_all(
        self,
        tasks: impl IntoIterator<Item = TransferTask>,
    ) -> Result<Vec<TransferResult>, SyncError> {
        let mut closed = false;
        for task in tasks {
            if self.enqueue(task).await.is_err() {
                closed = true;
                break;
            }
        }
        let results = self.shutdown_and_wait().await;
        if closed {
            return Err(SyncError::SchedulerClosed);
        }
        Ok(results)
    }

    /// Close the queue, wait for every queued and in-flight task, and return
    /// all results in completion order.
    pub async fn shutdown_and_wait(self) -> Vec<TransferResult> {
        drop(self.work_tx); // Close channel to signal workers to exit

        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Transfer worker panicked: {}", e);
            }
        }

        match self.collector.await {
            Ok(results) => results,
            Err(e) => {
                error!("Result collector failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Run one transfer against the store
async fn execute(store: &dyn ObjectStore, task: &TransferTask) -> Result<u64, SyncError> {
    match task.direction {
        Direction::Upload => Ok(store
            .put_object(&task.bucket, &task.key, &task.local_path)
            .await?),
        Direction::Download => {
            prepare_destination(&task.local_path).await?;
            Ok(store
                .get_object(&task.bucket, &task.key, &task.local_path)
                .await?)
        }
    }
}

/// Make sure the parent directory exists and no stale file is in the way
async fn prepare_destination(path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::local_io(parent, e))?;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed existing {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::local_io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::MemoryStore;
    use tempfile::TempDir;

    async fn store_with_files(dir: &TempDir, count: usize) -> (Arc<MemoryStore>, Vec<TransferTask>) {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b").await.unwrap();
        let tasks = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("f{}", i));
                std::fs::write(&path, format!("file {}", i)).unwrap();
                TransferTask::upload("b", format!("k{}", i), path)
            })
            .collect();
        (store, tasks)
    }

    #[tokio::test]
    async fn test_run_all_transfers_everything() {
        let dir = TempDir::new().unwrap();
        let (store, tasks) = store_with_files(&dir, 20).await;

        let scheduler = TransferScheduler::new(store.clone(), 4, 2, None);
        let results = scheduler.run_all(tasks).await.unwrap();

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(TransferResult::is_success));
        assert_eq!(store.keys("b").await.len(), 20);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let (store, tasks) = store_with_files(&dir, 10).await;
        store.fail_put("k3").await;

        let results = TransferScheduler::new(store.clone(), 3, 4, None)
            .run_all(tasks)
            .await
            .unwrap();

        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task.key, "k3");
        assert_eq!(results.len(), 10);
        assert_eq!(store.keys("b").await.len(), 9);
    }

    #[tokio::test]
    async fn test_submit_handle_resolves() {
        let dir = TempDir::new().unwrap();
        let (store, mut tasks) = store_with_files(&dir, 1).await;

        let scheduler = TransferScheduler::new(store, 1, 1, None);
        let handle = scheduler.submit(tasks.remove(0)).await.unwrap();
        let result = handle.wait().await.unwrap();
        assert_eq!(result.outcome, Outcome::Success { bytes: 6 });

        let all = scheduler.shutdown_and_wait().await;
        assert_eq!(all, vec![result]);
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "k", "new").await;

        let dest = dir.path().join("nested/deeper/k.txt");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "old and much longer content").unwrap();

        let results = TransferScheduler::new(store, 2, 2, None)
            .run_all([TransferTask::download("b", "k".into(), dest.clone())])
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_parent_creation_failure_is_per_item() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("b", "blocked/x", "1").await;
        store.insert("b", "ok", "2").await;

        // a regular file where a directory is needed
        std::fs::write(dir.path().join("blocked"), "").unwrap();

        let results = TransferScheduler::new(store, 2, 2, None)
            .run_all([
                TransferTask::download("b", "blocked/x".into(), dir.path().join("blocked/x")),
                TransferTask::download("b", "ok".into(), dir.path().join("ok")),
            ])
            .await
            .unwrap();

        let ok = results.iter().find(|r| r.task.key == "ok").unwrap();
        let blocked = results.iter().find(|r| r.task.key == "blocked/x").unwrap();
        assert!(ok.is_success());
        assert!(!blocked.is_success());
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let dir = TempDir::new().unwrap();
        let (store, tasks) = store_with_files(&dir, 3).await;
        let results = TransferScheduler::new(store, 0, 0, None)
            .run_all(tasks)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }
}
