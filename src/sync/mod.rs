//! Concurrent directory synchronization against an [`ObjectStore`](crate::s3::ObjectStore).

pub mod engine;
pub mod error;
pub mod listing;
pub mod path_map;
pub mod report;
pub mod scheduler;
pub mod walker;

pub use engine::{SyncEngine, SyncOptions};
pub use error::SyncError;
pub use listing::ObjectLister;
pub use path_map::{PathMapper, normalize_prefix};
pub use report::{
    ClearReport, Direction, Outcome, RejectedItem, SyncReport, TransferResult, TransferTask,
    format_size,
};
pub use scheduler::{TaskHandle, TransferScheduler};
pub use walker::{DirectoryWalker, LocalFile};
