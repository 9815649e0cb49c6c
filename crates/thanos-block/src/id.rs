//! Block identifiers.
//!
//! Blocks are named by a ULID in its canonical 26-character Crockford base32
//! form. The same string names the local directory and the remote prefix.

use std::path::Path;

use ulid::Ulid;

/// Length of a rendered ULID.
pub const BLOCK_ID_LEN: usize = 26;

/// Parse a block directory name.
///
/// Only the canonical upper-case rendering is accepted, so every name maps
/// to exactly one identifier and back.
pub fn parse_block_id(name: &str) -> Option<Ulid> {
    if name.len() != BLOCK_ID_LEN {
        return None;
    }
    let id = Ulid::from_string(name).ok()?;
    (id.to_string() == name).then_some(id)
}

/// Returns the block id if the last component of `path` names a block.
///
/// Scanners walking local directories or remote listings use this to skip
/// entries that are not blocks.
pub fn is_block_dir(path: impl AsRef<Path>) -> Option<Ulid> {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_block_id)
}
