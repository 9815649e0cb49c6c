//! Crash-consistent transfer of immutable TSDB blocks between local disk and
//! object storage.
//!
//! A block is a directory named by its ULID holding `meta.json`, `index` and
//! `chunks/`. [`meta`] describes and finalizes blocks on local disk;
//! [`transfer`] uploads, downloads and deletes them so that a reader never
//! mistakes a half-uploaded block for a published one.

pub mod config;
pub mod error;
pub mod id;
pub mod layout;
pub mod meta;
pub mod objstore;
pub mod transfer;

// Convenience re-exports
pub use config::Config;
pub use error::{BlockError, BlockResult, MetaError, MetaResult, Step};
pub use id::{is_block_dir, parse_block_id};
pub use layout::{BlockLayout, LayoutError};
pub use meta::{
    finalize, read_meta_file, write_meta_file, BlockMeta, LocalMetaStore, Meta, ThanosMeta,
    META_VERSION_1,
};
pub use objstore::{Bucket, ByteStream, ObjStoreError, ObjectStoreBucket, StoreSpec};
pub use transfer::{BlockTransfer, RemoteBlock};

// Re-export for callers implementing `Bucket` or passing tokens.
pub use bytes::Bytes;
pub use tokio_util::sync::CancellationToken;
pub use ulid::Ulid;
