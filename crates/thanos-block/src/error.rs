//! Error taxonomy for block metadata and transfer operations.
//!
//! Validation errors are returned before any remote effect. Transfer errors
//! carry the step and block id they failed on. When the compensating delete
//! after a failed upload also fails, [`BlockError::PartialUpload`] keeps both
//! causes so operators know a partial block may be left in the bucket.

use std::path::PathBuf;

use thiserror::Error;
use ulid::Ulid;

use crate::objstore::ObjStoreError;

/// Result type for local metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Result type for block operations.
pub type BlockResult<T> = Result<T, BlockError>;

/// Errors reading, writing or decoding a meta file.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The meta file does not exist.
    #[error("meta file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Filesystem error on the meta file or its directory.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The meta file is not valid JSON for the expected schema.
    #[error("decode meta: {0}")]
    Decode(#[source] serde_json::Error),

    /// The meta could not be serialized.
    #[error("encode meta: {0}")]
    Encode(#[source] serde_json::Error),

    /// The meta declares a format version this code cannot read.
    #[error("unexpected meta file version {version}")]
    UnsupportedVersion { version: u32 },
}

impl MetaError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true if the meta file is absent (as opposed to corrupt).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Upload step, used to say where a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    DebugMeta,
    Chunks,
    Index,
    Meta,
    Download,
    DownloadMeta,
    Delete,
    List,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Step::DebugMeta => "upload meta file to debug dir",
            Step::Chunks => "upload chunks",
            Step::Index => "upload index",
            Step::Meta => "upload meta file",
            Step::Download => "download block",
            Step::DownloadMeta => "download meta file",
            Step::Delete => "delete block",
            Step::List => "list blocks",
        };
        f.write_str(s)
    }
}

/// Errors from block-level operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The upload source is not a directory.
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// The directory name is not a block id.
    #[error("not a block dir: {name:?} is not a valid block id")]
    InvalidBlockId { name: String },

    /// Local filesystem error outside of the meta file.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blocks without external labels cannot be distributed.
    #[error("empty external labels are not allowed for block {id}")]
    EmptyLabels { id: Ulid },

    /// Reading local meta failed.
    #[error("read meta: {0}")]
    ReadMeta(#[source] MetaError),

    /// A local meta operation other than the pre-upload read failed.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Remote meta exists but could not be decoded.
    #[error("decode meta for block {id}: {source}")]
    DecodeMeta {
        id: Ulid,
        #[source]
        source: MetaError,
    },

    /// A bucket operation failed.
    #[error("{step} for block {id}: {source}")]
    Transfer {
        step: Step,
        id: Ulid,
        #[source]
        source: ObjStoreError,
    },

    /// The operation was cancelled by the caller.
    #[error("{step}: cancelled")]
    Cancelled { step: Step },

    /// Upload failed and the compensating delete failed too.
    #[error(
        "failed to clean block {id} after upload issue, partial block may remain in bucket \
         (cleanup error: {cleanup}): {source}"
    )]
    PartialUpload {
        id: Ulid,
        cleanup: String,
        #[source]
        source: Box<BlockError>,
    },

    /// A bucket listing failed.
    #[error("{step}: {source}")]
    Bucket {
        step: Step,
        #[source]
        source: ObjStoreError,
    },
}

impl BlockError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true if the block (or its meta file) does not exist.
    ///
    /// For remote blocks this means "not published yet", which callers
    /// handle differently from a corrupt block.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ReadMeta(e) | Self::Meta(e) => e.is_not_found(),
            Self::Transfer { source, .. } | Self::Bucket { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for precondition failures that had no remote effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotADirectory { .. }
                | Self::InvalidBlockId { .. }
                | Self::EmptyLabels { .. }
                | Self::ReadMeta(_)
        )
    }

    /// Returns true if a partial block may be left in the bucket.
    pub fn is_partial_upload(&self) -> bool {
        matches!(self, Self::PartialUpload { .. })
    }
}
