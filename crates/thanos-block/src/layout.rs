//! File names inside a block directory and the remote key schema.
//!
//! # Key Schema
//!
//! ```text
//! {block_id}/meta.json            # Written last; its presence publishes the block
//! {block_id}/index                # Series index
//! {block_id}/chunks/{segment}     # Compressed sample chunks
//! debug/metas/{block_id}.json     # Copy of every meta.json ever uploaded
//! ```
//!
//! A prefix that holds `index` or `chunks/` but no `meta.json` is an upload
//! in progress (or an abandoned one) and must not be read as a block.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Object key separator used by every supported bucket.
pub const DIR_DELIM: char = '/';

/// Names of the artifacts that make up a block, locally and remotely.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BlockLayout {
    /// JSON descriptor of the block. Default: `meta.json`.
    pub meta_filename: String,

    /// Series index file. Default: `index`.
    pub index_filename: String,

    /// Directory of chunk segment files. Default: `chunks`.
    pub chunks_dirname: String,

    /// Local-only record of deleted series, dropped on finalize.
    /// Default: `tombstones`.
    pub tombstones_filename: String,

    /// Remote directory that keeps a copy of each uploaded meta file.
    /// Default: `debug/metas`.
    pub debug_metas_dir: String,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            meta_filename: "meta.json".to_string(),
            index_filename: "index".to_string(),
            chunks_dirname: "chunks".to_string(),
            tombstones_filename: "tombstones".to_string(),
            debug_metas_dir: "debug/metas".to_string(),
        }
    }
}

/// A layout that would break the block key schema.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid layout: {field} {reason}")]
pub struct LayoutError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl BlockLayout {
    /// Check that every name addresses exactly one entry of the block.
    ///
    /// An empty chunks directory name, for example, would make the chunks
    /// step upload the whole block directory including `meta.json`.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let names = [
            ("meta_filename", &self.meta_filename),
            ("index_filename", &self.index_filename),
            ("chunks_dirname", &self.chunks_dirname),
            ("tombstones_filename", &self.tombstones_filename),
        ];
        for (i, &(field, name)) in names.iter().enumerate() {
            if name.is_empty() || name == "." || name == ".." {
                return Err(LayoutError {
                    field,
                    reason: "must be a plain file name",
                });
            }
            if name.contains(['/', '\\']) {
                return Err(LayoutError {
                    field,
                    reason: "must not contain a path separator",
                });
            }
            if names[..i].iter().any(|&(_, other)| other == name) {
                return Err(LayoutError {
                    field,
                    reason: "must differ from the other names",
                });
            }
        }

        let debug = self.debug_metas_dir.trim_matches(DIR_DELIM);
        let bad_segment = debug
            .split(DIR_DELIM)
            .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
        if bad_segment {
            return Err(LayoutError {
                field: "debug_metas_dir",
                reason: "must be a non-empty relative key prefix",
            });
        }
        Ok(())
    }

    /// Prefix that holds every object of the block.
    ///
    /// Returns: `{block_id}/`
    pub fn block_prefix(&self, id: &Ulid) -> String {
        format!("{}{}", id, DIR_DELIM)
    }

    /// Returns: `{block_id}/meta.json`
    pub fn meta_key(&self, id: &Ulid) -> String {
        join_key(&id.to_string(), &self.meta_filename)
    }

    /// Returns: `{block_id}/index`
    pub fn index_key(&self, id: &Ulid) -> String {
        join_key(&id.to_string(), &self.index_filename)
    }

    /// Returns: `{block_id}/chunks`
    pub fn chunks_prefix(&self, id: &Ulid) -> String {
        join_key(&id.to_string(), &self.chunks_dirname)
    }

    /// Returns: `debug/metas/{block_id}.json`
    pub fn debug_meta_key(&self, id: &Ulid) -> String {
        join_key(&self.debug_metas_dir, &format!("{}.json", id))
    }
}

/// Join two key fragments with exactly one separator between them.
pub fn join_key(base: &str, name: &str) -> String {
    let base = base.trim_end_matches(DIR_DELIM);
    let name = name.trim_start_matches(DIR_DELIM);
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", base, DIR_DELIM, name)
    }
}
