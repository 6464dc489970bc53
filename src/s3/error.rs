use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`](super::ObjectStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Bucket does not exist
    #[error("No such bucket: {bucket}")]
    NoSuchBucket { bucket: String },

    /// Object does not exist
    #[error("No such key: s3://{bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Credentials rejected or bucket not accessible
    #[error("S3 access denied for bucket '{bucket}': {message}")]
    AccessDenied { bucket: String, message: String },

    /// Endpoint unreachable or request timed out
    #[error("Network error: {message}")]
    Network { message: String },

    /// Local file could not be read or written
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store answered with something we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other SDK error
    #[error("S3 error: {0}")]
    Sdk(String),
}

impl StoreError {
    /// Classify an AWS SDK error by its error code and failure kind
    pub fn from_sdk_error<E, R>(bucket: &str, key: Option<&str>, error: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        if matches!(
            error,
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
        ) {
            return Self::Network {
                message: DisplayErrorContext(&error).to_string(),
            };
        }

        let message = DisplayErrorContext(&error).to_string();
        match error.code() {
            Some("NoSuchBucket") => Self::NoSuchBucket {
                bucket: bucket.to_string(),
            },
            Some("NoSuchKey") | Some("NotFound") if key.is_some() => Self::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.unwrap_or_default().to_string(),
            },
            Some("AccessDenied")
            | Some("Forbidden")
            | Some("InvalidAccessKeyId")
            | Some("SignatureDoesNotMatch") => Self::AccessDenied {
                bucket: bucket.to_string(),
                message,
            },
            _ => Self::Sdk(message),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSuchBucket { bucket } => {
                format!(
                    "Bucket '{}' does not exist\n\nPossible solutions:\n  \
                     1. Create it first: s3sync create-bucket {}\n  \
                     2. List available buckets: s3sync list-buckets",
                    bucket, bucket
                )
            }
            Self::AccessDenied { bucket, message } => {
                format!(
                    "Access denied for bucket '{}': {}\n\nPossible solutions:\n  \
                     1. Check AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY in .env\n  \
                     2. Verify the identity is allowed on this bucket in the S3 gateway config",
                    bucket, message
                )
            }
            Self::Network { message } => {
                format!(
                    "Network error: {}\n\nPossible solutions:\n  \
                     1. Check that S3_ENDPOINT is reachable\n  \
                     2. Keep S3_FORCE_PATH_STYLE=true for SeaweedFS and other non-AWS stores\n  \
                     3. Try again with --concurrency 1",
                    message
                )
            }
            _ => self.to_string(),
        }
    }
}
