//! Bucket abstraction over S3-compatible object storage.
//!
//! The [`Bucket`] trait is the narrow surface block transfer needs: streaming
//! put and get, recursive list and delete of single objects. The free functions build the
//! directory-level operations (upload a local tree, download a prefix, delete
//! a prefix) on top of it, so every bucket implementation gets them for free
//! and tests can inject failures at the object level.

pub mod error;
pub mod object_store_backend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

pub use error::{ObjStoreError, ObjStoreResult};
pub use object_store_backend::ObjectStoreBucket;

use crate::layout::{join_key, DIR_DELIM};

/// Parsed store URL from CLI/config.
///
/// # Examples
///
/// ```text
/// s3://my-bucket/thanos?region=eu-west-1
/// file:///var/lib/thanos/bucket
/// memory://  (for testing)
/// ```
#[derive(Debug, Clone)]
pub struct StoreSpec {
    /// The scheme (s3, file, memory)
    pub scheme: String,
    /// Bucket name (empty for file://)
    pub bucket: Option<String>,
    /// Base prefix/path within the bucket
    pub prefix: String,
    /// Optional region (for S3)
    pub region: Option<String>,
}

impl StoreSpec {
    /// Parse a store URL like `s3://bucket/prefix` or `file:///path`.
    pub fn parse(url: &str) -> ObjStoreResult<Self> {
        let url = url::Url::parse(url).map_err(|e| ObjStoreError::InvalidSpec {
            spec: url.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme().to_string();
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|s| s.to_string());
        let prefix = url.path().trim_matches('/').to_string();

        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.to_string());

        Ok(Self {
            scheme,
            bucket,
            prefix,
            region,
        })
    }

    /// Check if this is a memory store (for testing).
    pub fn is_memory(&self) -> bool {
        self.scheme == "memory"
    }

    /// Check if this is a local file store.
    pub fn is_file(&self) -> bool {
        self.scheme == "file"
    }
}

/// Object contents as a stream of chunks.
pub type ByteStream = BoxStream<'static, ObjStoreResult<Bytes>>;

/// Chunk size used when streaming local files into a bucket.
const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Minimal object storage client.
///
/// Keys are `/`-separated. Implementations must treat `list` prefixes as
/// directories: listing `a/b` returns `a/b/c` but never `a/bc`.
///
/// Object bodies are streamed in both directions so block files never have
/// to fit in memory.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    /// Write an object from `data`, replacing any existing one.
    ///
    /// The object becomes visible only once the whole stream was written.
    async fn upload(&self, key: &str, data: ByteStream) -> ObjStoreResult<()>;

    /// Stream an object. Returns [`ObjStoreError::NotFound`] if absent.
    async fn get(&self, key: &str) -> ObjStoreResult<ByteStream>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> ObjStoreResult<bool>;

    /// All object keys under `prefix`, recursively, sorted.
    /// An empty prefix lists the whole bucket.
    async fn list(&self, prefix: &str) -> ObjStoreResult<Vec<String>>;

    /// Delete a single object.
    async fn delete(&self, key: &str) -> ObjStoreResult<()>;

    /// Write a small in-memory object.
    async fn upload_bytes(&self, key: &str, data: Bytes) -> ObjStoreResult<()> {
        self.upload(key, bytes_stream(data)).await
    }

    /// Read a whole object into memory. Only meant for small objects such as
    /// meta files.
    async fn get_bytes(&self, key: &str) -> ObjStoreResult<Bytes> {
        let chunks: Vec<Bytes> = self.get(key).await?.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

/// A single-chunk stream.
pub fn bytes_stream(data: Bytes) -> ByteStream {
    stream::iter(std::iter::once(Ok(data))).boxed()
}

/// Upload a local file to `dst`, streaming it in chunks.
pub async fn upload_file(bkt: &dyn Bucket, src: &Path, dst: &str) -> ObjStoreResult<()> {
    let file = tokio::fs::File::open(src)
        .await
        .map_err(|e| ObjStoreError::io("open file", src, e))?;

    let path = src.to_path_buf();
    let data = ReaderStream::with_capacity(file, READ_CHUNK_SIZE)
        .map_err(move |e| ObjStoreError::io("read file", path.clone(), e))
        .boxed();

    bkt.upload(dst, data).await?;
    tracing::debug!(bucket = bkt.name(), src = %src.display(), dst, "uploaded file");
    Ok(())
}

/// Upload every file below `src_dir` under the `dst` prefix, in sorted order.
///
/// `cancel` is checked before each file. An upload that already started is
/// always awaited, so once this returns no write of it is still in flight.
pub async fn upload_dir(
    bkt: &dyn Bucket,
    src_dir: &Path,
    dst: &str,
    cancel: &CancellationToken,
) -> ObjStoreResult<()> {
    let meta = tokio::fs::metadata(src_dir)
        .await
        .map_err(|e| ObjStoreError::io("stat dir", src_dir, e))?;
    if !meta.is_dir() {
        return Err(ObjStoreError::io(
            "upload dir",
            src_dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    for rel in walk_files(src_dir).await? {
        if cancel.is_cancelled() {
            return Err(ObjStoreError::Cancelled);
        }
        let key = join_key(dst, &rel_to_key(&rel));
        upload_file(bkt, &src_dir.join(&rel), &key).await?;
    }
    Ok(())
}

/// Download the object `src` into the directory `dst_dir`, keeping its base name.
///
/// The object is streamed to disk. A partially written file is removed on
/// failure.
pub async fn download_file(bkt: &dyn Bucket, src: &str, dst_dir: &Path) -> ObjStoreResult<()> {
    let name = src.rsplit(DIR_DELIM).next().unwrap_or(src);
    let dst = dst_dir.join(name);

    let data = bkt.get(src).await?;
    if let Err(e) = write_stream(&dst, data).await {
        let _ = tokio::fs::remove_file(&dst).await;
        return Err(e);
    }
    Ok(())
}

/// Download every object under the `src` prefix into `dst_dir`, recreating
/// the key hierarchy as directories. Returns the number of objects written.
///
/// `cancel` is checked before each object.
pub async fn download_dir(
    bkt: &dyn Bucket,
    src: &str,
    dst_dir: &Path,
    cancel: &CancellationToken,
) -> ObjStoreResult<usize> {
    tokio::fs::create_dir_all(dst_dir)
        .await
        .map_err(|e| ObjStoreError::io("create dir", dst_dir, e))?;

    let base = src.trim_end_matches(DIR_DELIM);
    let mut count = 0;
    for key in bkt.list(src).await? {
        if cancel.is_cancelled() {
            return Err(ObjStoreError::Cancelled);
        }
        let rel = match key.strip_prefix(base) {
            Some(rest) => rest.trim_start_matches(DIR_DELIM),
            None => continue,
        };
        let target_dir = match rel.rsplit_once(DIR_DELIM) {
            Some((dirs, _)) => key_to_path(dst_dir, dirs),
            None => dst_dir.to_path_buf(),
        };
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| ObjStoreError::io("create dir", &target_dir, e))?;
        download_file(bkt, &key, &target_dir).await?;
        count += 1;
    }
    Ok(count)
}

/// Delete every object under `prefix`.
///
/// Refuses an empty prefix, which would address the whole bucket.
pub async fn delete_dir(bkt: &dyn Bucket, prefix: &str) -> ObjStoreResult<()> {
    if prefix.trim_matches(DIR_DELIM).is_empty() {
        return Err(ObjStoreError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }

    for key in bkt.list(prefix).await? {
        match bkt.delete(&key).await {
            Ok(()) => {}
            // Someone else removed it first.
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn write_stream(dst: &Path, mut data: ByteStream) -> ObjStoreResult<()> {
    let mut file = tokio::fs::File::create(dst)
        .await
        .map_err(|e| ObjStoreError::io("create file", dst, e))?;
    while let Some(chunk) = data.try_next().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| ObjStoreError::io("write file", dst, e))?;
    }
    file.flush()
        .await
        .map_err(|e| ObjStoreError::io("write file", dst, e))
}

// Relative paths of all regular files below `root`, sorted.
async fn walk_files(root: &Path) -> ObjStoreResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(rel_dir) = pending.pop() {
        let dir = root.join(&rel_dir);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ObjStoreError::io("read dir", &dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ObjStoreError::io("read dir", &dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ObjStoreError::io("stat", entry.path(), e))?;
            let rel = rel_dir.join(entry.file_name());
            if file_type.is_dir() {
                pending.push(rel);
            } else {
                files.push(rel);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn rel_to_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn key_to_path(base: &Path, key: &str) -> PathBuf {
    key.split(DIR_DELIM)
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |p, s| p.join(s))
}
