use std::path::PathBuf;
use thiserror::Error;

use crate::s3::StoreError;

/// Errors raised by the sync engine and its parts
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local root is missing or not a directory; fatal, nothing was submitted
    #[error("Directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    /// Listed key cannot be mapped under the requested prefix
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Local path cannot be turned into an object key
    #[error("Invalid local path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Parent directory creation, stale file removal or a walk failure
    #[error("Local IO error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single store request failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Listing could not start or continue; fatal
    #[error("Listing s3://{bucket}/{prefix} failed: {source}")]
    Listing {
        bucket: String,
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("Transfer scheduler is shut down")]
    SchedulerClosed,
}

impl SyncError {
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole operation rather than one item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DirectoryNotFound { .. } | Self::Listing { .. } | Self::SchedulerClosed
        )
    }

    /// The store failure underneath, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) | Self::Listing { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_unwraps_listing() {
        let err = SyncError::Listing {
            bucket: "photos".into(),
            prefix: "".into(),
            source: StoreError::NoSuchBucket {
                bucket: "photos".into(),
            },
        };
        let store = err.store_error().unwrap();
        assert!(store.user_message().contains("s3sync create-bucket photos"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_store_error_unwraps_transparent() {
        let err = SyncError::from(StoreError::Network {
            message: "refused".into(),
        });
        assert!(matches!(
            err.store_error(),
            Some(StoreError::Network { .. })
        ));
        assert!(SyncError::SchedulerClosed.store_error().is_none());
    }
}
