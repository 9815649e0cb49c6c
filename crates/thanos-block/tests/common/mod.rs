//! Shared fixtures: a recording bucket with fault injection and block dirs.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thanos_block::objstore::{
    Bucket, ByteStream, ObjStoreError, ObjStoreResult, ObjectStoreBucket,
};
use thanos_block::{write_meta_file, Meta, Ulid};

pub const BLOCK_ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

pub fn block_id() -> Ulid {
    Ulid::from_string(BLOCK_ID).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Upload(String),
    Delete(String),
}

/// In-memory bucket that records every write and can fail or delay
/// selected operations.
#[derive(Default)]
pub struct TestBucket {
    inner: Inner,
    ops: Mutex<Vec<Op>>,
    snapshots: Mutex<Vec<Vec<String>>>,
    fail_uploads: Mutex<Vec<String>>,
    delayed_uploads: Mutex<Vec<(String, Duration)>>,
    fail_deletes: Mutex<bool>,
}

struct Inner(Arc<ObjectStoreBucket>);

impl Default for Inner {
    fn default() -> Self {
        Inner(Arc::new(ObjectStoreBucket::memory()))
    }
}

impl TestBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads of keys ending in `suffix` fail.
    pub fn fail_upload(&self, suffix: &str) {
        self.fail_uploads.lock().unwrap().push(suffix.to_string());
    }

    /// Uploads of keys ending in `suffix` take `delay`. The write runs on its
    /// own task, like a request already on the wire: it lands even if the
    /// caller stops polling.
    pub fn delay_upload(&self, suffix: &str, delay: Duration) {
        self.delayed_uploads
            .lock()
            .unwrap()
            .push((suffix.to_string(), delay));
    }

    pub fn clear_faults(&self) {
        self.fail_uploads.lock().unwrap().clear();
        self.delayed_uploads.lock().unwrap().clear();
        *self.fail_deletes.lock().unwrap() = false;
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    /// Successful uploads and deletes, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Upload(k) => Some(k),
                Op::Delete(_) => None,
            })
            .collect()
    }

    /// Full bucket listing taken right after each successful upload.
    pub fn snapshots(&self) -> Vec<Vec<String>> {
        self.snapshots.lock().unwrap().clone()
    }

    fn delay_for(&self, key: &str) -> Option<Duration> {
        self.delayed_uploads
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| key.ends_with(s.as_str()))
            .map(|(_, d)| *d)
    }

    fn matches(list: &Mutex<Vec<String>>, key: &str) -> bool {
        list.lock().unwrap().iter().any(|s| key.ends_with(s.as_str()))
    }
}

#[async_trait]
impl Bucket for TestBucket {
    fn name(&self) -> &str {
        "test"
    }

    async fn upload(&self, key: &str, data: ByteStream) -> ObjStoreResult<()> {
        if Self::matches(&self.fail_uploads, key) {
            return Err(ObjStoreError::Io {
                op: "upload",
                path: PathBuf::from(key),
                source: std::io::Error::other("injected upload failure"),
            });
        }
        match self.delay_for(key) {
            Some(delay) => {
                let inner = Arc::clone(&self.inner.0);
                let owned = key.to_string();
                let write = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.upload(&owned, data).await
                });
                write.await.map_err(|e| ObjStoreError::Io {
                    op: "upload",
                    path: PathBuf::from(key),
                    source: std::io::Error::other(e),
                })??;
            }
            None => self.inner.0.upload(key, data).await?,
        }
        self.ops.lock().unwrap().push(Op::Upload(key.to_string()));
        let snapshot = self.inner.0.list("").await?;
        self.snapshots.lock().unwrap().push(snapshot);
        Ok(())
    }

    async fn get(&self, key: &str) -> ObjStoreResult<ByteStream> {
        self.inner.0.get(key).await
    }

    async fn exists(&self, key: &str) -> ObjStoreResult<bool> {
        self.inner.0.exists(key).await
    }

    async fn list(&self, prefix: &str) -> ObjStoreResult<Vec<String>> {
        self.inner.0.list(prefix).await
    }

    async fn delete(&self, key: &str) -> ObjStoreResult<()> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(ObjStoreError::Io {
                op: "delete",
                path: PathBuf::from(key),
                source: std::io::Error::other("injected delete failure"),
            });
        }
        self.inner.0.delete(key).await?;
        self.ops.lock().unwrap().push(Op::Delete(key.to_string()));
        Ok(())
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Write a block directory `<root>/<BLOCK_ID>` with one chunk segment.
pub fn write_block(root: &Path, lset: &[(&str, &str)]) -> PathBuf {
    write_block_with_chunks(root, lset, &[("000001", b"chunk-data")])
}

pub fn write_block_with_chunks(
    root: &Path,
    lset: &[(&str, &str)],
    chunks: &[(&str, &[u8])],
) -> PathBuf {
    let bdir = root.join(BLOCK_ID);
    std::fs::create_dir_all(bdir.join("chunks")).unwrap();
    for (name, data) in chunks {
        std::fs::write(bdir.join("chunks").join(name), data).unwrap();
    }
    std::fs::write(bdir.join("index"), b"index-data").unwrap();

    let mut meta = Meta::new(block_id(), 1_000, 7_201_000);
    meta.block.stats.num_series = 1;
    meta.thanos.labels = labels(lset);
    write_meta_file(&bdir, &meta).unwrap();
    bdir
}
