use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// One object to move between the local filesystem and the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTask {
    pub direction: Direction,
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
}

impl TransferTask {
    pub fn upload(bucket: &str, key: String, local_path: PathBuf) -> Self {
        Self {
            direction: Direction::Upload,
            bucket: bucket.to_string(),
            key,
            local_path,
        }
    }

    pub fn download(bucket: &str, key: String, local_path: PathBuf) -> Self {
        Self {
            direction: Direction::Download,
            bucket: bucket.to_string(),
            key,
            local_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { bytes: u64 },
    Failure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub task: TransferTask,
    pub outcome: Outcome,
}

impl TransferResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }
}

/// A per-item failure that happened before any task could be built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedItem {
    /// Object key or local path, whichever was being enumerated
    pub item: String,
    pub reason: String,
}

/// Aggregated outcome of an upload or download run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<TransferResult>,
    pub rejected: Vec<RejectedItem>,
    /// Directory marker keys seen during a download and not materialized
    pub markers_skipped: usize,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded() + self.rejected.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                Outcome::Success { bytes } => bytes,
                Outcome::Failure { .. } => 0,
            })
            .sum()
    }

    /// Every failed item as `(key or path, reason)`, transfers first
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        let failed_tasks = self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Failure { reason } => Some((r.task.key.as_str(), reason.as_str())),
            Outcome::Success { .. } => None,
        });
        let rejected = self
            .rejected
            .iter()
            .map(|r| (r.item.as_str(), r.reason.as_str()));
        failed_tasks.chain(rejected)
    }

    pub fn sort(&mut self) {
        self.results.sort_by(|a, b| a.task.key.cmp(&b.task.key));
        self.rejected.sort_by(|a, b| a.item.cmp(&b.item));
    }
}

/// Outcome of emptying a bucket
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearReport {
    pub deleted: usize,
    pub failures: Vec<RejectedItem>,
    pub elapsed: Duration,
}

impl ClearReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Format a byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
