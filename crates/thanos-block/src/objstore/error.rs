//! Error types for bucket operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for bucket operations.
pub type ObjStoreResult<T> = Result<T, ObjStoreError>;

/// Errors that can occur while talking to a bucket.
#[derive(Debug, Error)]
pub enum ObjStoreError {
    /// Object not found.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Invalid store specification (URL parsing failed).
    #[error("invalid store spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Refused to operate on a prefix that would cover the whole bucket.
    #[error("refusing to operate on bucket-wide prefix '{prefix}'")]
    InvalidPrefix { prefix: String },

    /// Local filesystem error while staging an upload or download.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stopped between objects because the caller cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Error from the underlying object store.
    #[error("object store error: {0}")]
    ObjectStore(#[source] object_store::Error),
}

impl ObjStoreError {
    /// Returns true if the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create from an object_store error with context about the key.
    pub fn from_object_store(err: object_store::Error, key: &str) -> Self {
        match err {
            object_store::Error::NotFound { .. } => ObjStoreError::NotFound {
                key: key.to_string(),
            },
            other => ObjStoreError::ObjectStore(other),
        }
    }
}
