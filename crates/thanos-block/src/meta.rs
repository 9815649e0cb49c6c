//! Block meta file: types, atomic write, read and finalize.
//!
//! `meta.json` wraps the TSDB block description (time range, stats,
//! compaction lineage) and extends it with a `thanos` section holding the
//! external labels and downsampling resolution.
//!
//! Writes go to a temporary sibling that is synced and then renamed over the
//! canonical file, followed by a sync of the directory. Readers observe
//! either the old or the new content, never a truncated file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::error::{MetaError, MetaResult};
use crate::layout::BlockLayout;

/// The only meta format version this code reads or writes.
pub const META_VERSION_1: u32 = 1;

/// Raw, not downsampled data.
pub const RES_LEVEL_0: i64 = 0;
/// 5 minute resolution, in milliseconds.
pub const RES_LEVEL_1: i64 = 5 * 60 * 1000;
/// 1 hour resolution, in milliseconds.
pub const RES_LEVEL_2: i64 = 60 * 60 * 1000;

/// A block's meta: the TSDB description plus the Thanos extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub version: u32,

    #[serde(flatten)]
    pub block: BlockMeta,

    #[serde(default)]
    pub thanos: ThanosMeta,
}

/// Block description as written by the TSDB that produced the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    pub ulid: Ulid,
    pub min_time: i64,
    pub max_time: i64,

    #[serde(default, skip_serializing_if = "BlockStats::is_empty")]
    pub stats: BlockStats,

    #[serde(default)]
    pub compaction: BlockMetaCompaction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_samples: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_series: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_chunks: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_tombstones: u64,
}

impl BlockStats {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Compaction lineage of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetaCompaction {
    /// Number of compactions this block has gone through. Fresh blocks are 1.
    pub level: u32,

    /// Ids of all level-1 blocks that were merged into this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Ulid>,

    /// Direct parents of this block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<BlockDesc>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDesc {
    pub ulid: Ulid,
    pub min_time: i64,
    pub max_time: i64,
}

/// Thanos-specific meta section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThanosMeta {
    /// External labels of the producer. Sorted for stable output.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub downsample: Downsample,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downsample {
    /// Resolution in milliseconds; 0 for raw data.
    pub resolution: i64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

// Producers that never set labels write `"labels": null`.
fn null_as_empty<'de, D>(d: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(d)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

impl Meta {
    /// A version 1 meta with no labels, no stats and compaction level 1.
    pub fn new(ulid: Ulid, min_time: i64, max_time: i64) -> Self {
        Self {
            version: META_VERSION_1,
            block: BlockMeta {
                ulid,
                min_time,
                max_time,
                stats: BlockStats::default(),
                compaction: BlockMetaCompaction {
                    level: 1,
                    sources: vec![ulid],
                    ..Default::default()
                },
            },
            thanos: ThanosMeta::default(),
        }
    }

    /// Decode a meta file, rejecting unsupported versions.
    ///
    /// The version is checked before the full decode so a future format
    /// reports as a version mismatch rather than a schema error.
    pub fn from_slice(bytes: &[u8]) -> MetaResult<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes).map_err(MetaError::Decode)?;
        if probe.version != META_VERSION_1 {
            return Err(MetaError::UnsupportedVersion {
                version: probe.version,
            });
        }
        serde_json::from_slice(bytes).map_err(MetaError::Decode)
    }

    /// Tab-indented JSON with a trailing newline.
    pub fn to_vec_pretty(&self) -> MetaResult<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(MetaError::Encode)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// Reads and writes meta files inside local block directories.
#[derive(Debug, Clone, Default)]
pub struct LocalMetaStore {
    layout: BlockLayout,
}

impl LocalMetaStore {
    pub fn new(layout: BlockLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Path of the meta file inside `dir`.
    pub fn meta_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.layout.meta_filename)
    }

    /// Atomically write `meta` into `<dir>/meta.json`.
    pub fn write(&self, dir: &Path, meta: &Meta) -> MetaResult<()> {
        let path = self.meta_path(dir);
        let tmp = tmp_path(&path);
        let bytes = meta.to_vec_pretty()?;

        if let Err(e) = write_synced(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        if let Err(e) = rename_file(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        tracing::debug!(path = %path.display(), "wrote meta file");
        Ok(())
    }

    /// Read `<dir>/meta.json`.
    pub fn read(&self, dir: &Path) -> MetaResult<Meta> {
        let path = self.meta_path(dir);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MetaError::NotFound { path: path.clone() },
            _ => MetaError::io("read", &path, e),
        })?;
        Meta::from_slice(&bytes)
    }

    /// Attach external labels and resolution to a freshly written block.
    ///
    /// When the block was produced by downsampling `downsampled_from`, its
    /// compaction lineage is copied so the block does not look like a new
    /// level 1 block. The tombstones file is removed afterwards; a block
    /// without one is fine.
    ///
    /// Every producer must call this before uploading a block.
    pub fn finalize(
        &self,
        dir: &Path,
        labels: BTreeMap<String, String>,
        resolution: i64,
        downsampled_from: Option<&BlockMeta>,
    ) -> MetaResult<Meta> {
        let mut meta = self.read(dir)?;
        meta.thanos.labels = labels;
        meta.thanos.downsample.resolution = resolution;

        if let Some(src) = downsampled_from {
            meta.block.compaction = src.compaction.clone();
        }

        self.write(dir, &meta)?;

        let tombstones = dir.join(&self.layout.tombstones_filename);
        match fs::remove_file(&tombstones) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(MetaError::io("remove tombstones", tombstones, e)),
        }

        Ok(meta)
    }
}

/// Atomically write `meta` into `<dir>/meta.json` using default file names.
pub fn write_meta_file(dir: impl AsRef<Path>, meta: &Meta) -> MetaResult<()> {
    LocalMetaStore::default().write(dir.as_ref(), meta)
}

/// Read `<dir>/meta.json` using default file names.
pub fn read_meta_file(dir: impl AsRef<Path>) -> MetaResult<Meta> {
    LocalMetaStore::default().read(dir.as_ref())
}

/// [`LocalMetaStore::finalize`] with default file names.
pub fn finalize(
    dir: impl AsRef<Path>,
    labels: BTreeMap<String, String>,
    resolution: i64,
    downsampled_from: Option<&BlockMeta>,
) -> MetaResult<Meta> {
    LocalMetaStore::default().finalize(dir.as_ref(), labels, resolution, downsampled_from)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> MetaResult<()> {
    let mut file = File::create(path).map_err(|e| MetaError::io("create", path, e))?;
    file.write_all(bytes)
        .map_err(|e| MetaError::io("write", path, e))?;
    file.sync_all().map_err(|e| MetaError::io("sync", path, e))?;
    // Close before rename.
    drop(file);
    Ok(())
}

fn rename_file(from: &Path, to: &Path) -> MetaResult<()> {
    fs::rename(from, to).map_err(|e| MetaError::io("rename", from, e))?;

    // Persist the rename itself.
    match to.parent() {
        Some(dir) => sync_dir(dir),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> MetaResult<()> {
    // An empty parent means the current directory.
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let handle = File::open(dir).map_err(|e| MetaError::io("open dir", dir, e))?;
    handle
        .sync_all()
        .map_err(|e| MetaError::io("sync dir", dir, e))
}

// Directory handles cannot be synced on this platform; rename is durable
// once it returns.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> MetaResult<()> {
    Ok(())
}
