//! Block upload, download and deletion against a [`Bucket`].
//!
//! # Upload ordering
//!
//! Objects are written in a fixed order: debug meta copy, chunks, index and
//! finally `meta.json`. A block is published the moment its `meta.json`
//! exists, so readers that find chunks or an index without a meta file treat
//! the prefix as an upload in progress. No lock is involved.
//!
//! If any step after the debug copy fails, everything under the block prefix
//! is deleted again. That cleanup runs on its own task and is not tied to the
//! caller's cancellation token.
//!
//! # Cancellation
//!
//! Uploads observe the token between objects only. A put that already started
//! is awaited to completion, so when the cleanup lists the prefix no write is
//! still in flight that could land after it.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::error::{BlockError, BlockResult, Step};
use crate::id::parse_block_id;
use crate::layout::{BlockLayout, DIR_DELIM};
use crate::meta::{LocalMetaStore, Meta};
use crate::objstore::{self, Bucket, ObjStoreError, ObjStoreResult};

/// A block prefix found in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlock {
    pub id: Ulid,
    /// Whether `meta.json` is present. Incomplete blocks are uploads in
    /// progress or leftovers of a failed upload.
    pub complete: bool,
}

/// Moves block directories between local disk and a bucket.
pub struct BlockTransfer {
    bucket: Arc<dyn Bucket>,
    metas: LocalMetaStore,
}

impl BlockTransfer {
    pub fn new(bucket: Arc<dyn Bucket>) -> Self {
        Self::with_layout(bucket, BlockLayout::default())
    }

    pub fn with_layout(bucket: Arc<dyn Bucket>, layout: BlockLayout) -> Self {
        Self {
            bucket,
            metas: LocalMetaStore::new(layout),
        }
    }

    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }

    pub fn layout(&self) -> &BlockLayout {
        self.metas.layout()
    }

    /// Download the published block `id` into `dst`.
    ///
    /// Stricter than a plain prefix copy: a prefix without `meta.json` is not
    /// a published block and yields a not-found error before any object is
    /// fetched. Use [`BlockTransfer::download_incomplete`] to inspect such
    /// leftovers. Empty blocks have no chunk objects, so the chunks directory
    /// is created if the download did not produce one. `dst` is left as is on
    /// failure.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        id: Ulid,
        dst: &Path,
    ) -> BlockResult<()> {
        let meta_key = self.layout().meta_key(&id);
        let published =
            cancellable(cancel, Step::Download, id, self.bucket.exists(&meta_key)).await?;
        if !published {
            return Err(BlockError::Transfer {
                step: Step::Download,
                id,
                source: ObjStoreError::NotFound { key: meta_key },
            });
        }

        self.fetch(cancel, id, dst).await?;
        tracing::info!(
            block = %id,
            bucket = self.bucket.name(),
            dst = %dst.display(),
            "downloaded block"
        );
        Ok(())
    }

    /// Download whatever exists under the prefix of block `id`, published or
    /// not. Meant for inspecting failed or in-progress uploads.
    ///
    /// Not found only if the prefix holds no object at all.
    pub async fn download_incomplete(
        &self,
        cancel: &CancellationToken,
        id: Ulid,
        dst: &Path,
    ) -> BlockResult<()> {
        if self.fetch(cancel, id, dst).await? == 0 {
            return Err(BlockError::Transfer {
                step: Step::Download,
                id,
                source: ObjStoreError::NotFound {
                    key: self.layout().block_prefix(&id),
                },
            });
        }
        tracing::info!(
            block = %id,
            bucket = self.bucket.name(),
            dst = %dst.display(),
            "downloaded block prefix"
        );
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken, id: Ulid, dst: &Path) -> BlockResult<usize> {
        let layout = self.layout();
        let prefix = layout.block_prefix(&id);
        let count = objstore::download_dir(&*self.bucket, &prefix, dst, cancel)
            .await
            .map_err(|source| step_error(Step::Download, id, source))?;

        let chunks_dir = dst.join(&layout.chunks_dirname);
        match tokio::fs::metadata(&chunks_dir).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir(&chunks_dir)
                    .await
                    .map_err(|e| BlockError::io("create dir", &chunks_dir, e))?;
            }
            Err(e) => return Err(BlockError::io("stat", &chunks_dir, e)),
        }
        Ok(count)
    }

    /// Upload the block in `bdir`, whose directory name must be the block id.
    ///
    /// The block must carry external labels, i.e. it must have been
    /// finalized. On failure after the debug meta copy the partial block is
    /// deleted; if that also fails a [`BlockError::PartialUpload`] is returned.
    pub async fn upload(&self, cancel: &CancellationToken, bdir: &Path) -> BlockResult<Ulid> {
        let df = tokio::fs::metadata(bdir)
            .await
            .map_err(|e| BlockError::io("stat", bdir, e))?;
        if !df.is_dir() {
            return Err(BlockError::NotADirectory {
                path: bdir.to_path_buf(),
            });
        }

        let name = bdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = parse_block_id(&name).ok_or(BlockError::InvalidBlockId { name })?;

        // No meta or broken meta file.
        let meta = self.metas.read(bdir).map_err(BlockError::ReadMeta)?;
        if meta.thanos.labels.is_empty() {
            return Err(BlockError::EmptyLabels { id });
        }

        let meta_path = self.metas.meta_path(bdir);
        let debug_key = self.layout().debug_meta_key(&id);
        self.upload_object(cancel, Step::DebugMeta, id, &meta_path, &debug_key)
            .await?;

        if let Err(err) = self.upload_contents(cancel, bdir, id).await {
            return Err(self.clean_up(id, err).await);
        }

        tracing::info!(block = %id, bucket = self.bucket.name(), "uploaded block");
        Ok(id)
    }

    async fn upload_contents(
        &self,
        cancel: &CancellationToken,
        bdir: &Path,
        id: Ulid,
    ) -> BlockResult<()> {
        let layout = self.layout();

        let chunks_dir = bdir.join(&layout.chunks_dirname);
        objstore::upload_dir(&*self.bucket, &chunks_dir, &layout.chunks_prefix(&id), cancel)
            .await
            .map_err(|source| step_error(Step::Chunks, id, source))?;

        let index = bdir.join(&layout.index_filename);
        self.upload_object(cancel, Step::Index, id, &index, &layout.index_key(&id))
            .await?;

        // Must stay last: its presence marks the block as complete.
        let meta_path = self.metas.meta_path(bdir);
        self.upload_object(cancel, Step::Meta, id, &meta_path, &layout.meta_key(&id))
            .await
    }

    // Cancellation is checked before the put starts, never during it.
    async fn upload_object(
        &self,
        cancel: &CancellationToken,
        step: Step,
        id: Ulid,
        src: &Path,
        dst: &str,
    ) -> BlockResult<()> {
        if cancel.is_cancelled() {
            return Err(BlockError::Cancelled { step });
        }
        objstore::upload_file(&*self.bucket, src, dst)
            .await
            .map_err(|source| step_error(step, id, source))
    }

    // Delete whatever part of the block made it into the bucket. Runs on a
    // spawned task so it finishes even if the caller drops this future.
    async fn clean_up(&self, id: Ulid, err: BlockError) -> BlockError {
        tracing::warn!(block = %id, error = %err, "upload failed, deleting partial block");

        let bucket = Arc::clone(&self.bucket);
        let prefix = self.layout().block_prefix(&id);
        let task = tokio::spawn(async move { objstore::delete_dir(&*bucket, &prefix).await });

        let cleanup = match task.await {
            Ok(res) => res.map_err(|e| e.to_string()),
            Err(join_err) => Err(format!("cleanup task failed: {}", join_err)),
        };

        match cleanup {
            Ok(()) => err,
            Err(cleanup) => {
                tracing::error!(
                    block = %id,
                    bucket = self.bucket.name(),
                    cleanup_error = %cleanup,
                    "failed to clean block after upload issue, partial block in bucket"
                );
                BlockError::PartialUpload {
                    id,
                    cleanup,
                    source: Box::new(err),
                }
            }
        }
    }

    /// Fetch and decode only the remote `meta.json` of block `id`.
    pub async fn download_meta(&self, cancel: &CancellationToken, id: Ulid) -> BlockResult<Meta> {
        let key = self.layout().meta_key(&id);
        let bytes =
            cancellable(cancel, Step::DownloadMeta, id, self.bucket.get_bytes(&key)).await?;
        Meta::from_slice(&bytes).map_err(|source| BlockError::DecodeMeta { id, source })
    }

    /// Delete every object of block `id`.
    ///
    /// Scoped to the block prefix; the debug meta copy is kept.
    pub async fn delete(&self, cancel: &CancellationToken, id: Ulid) -> BlockResult<()> {
        let prefix = self.layout().block_prefix(&id);
        let deleting = objstore::delete_dir(&*self.bucket, &prefix);
        cancellable(cancel, Step::Delete, id, deleting).await?;
        tracing::info!(block = %id, bucket = self.bucket.name(), "deleted block");
        Ok(())
    }

    /// All block prefixes in the bucket, sorted by id.
    ///
    /// Top-level entries whose name is not a block id (such as the debug
    /// directory) are skipped.
    pub async fn list_blocks(&self, cancel: &CancellationToken) -> BlockResult<Vec<RemoteBlock>> {
        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BlockError::Cancelled { step: Step::List }),
            res = self.bucket.list("") => {
                res.map_err(|source| BlockError::Bucket { step: Step::List, source })?
            }
        };

        let meta_filename = &self.layout().meta_filename;
        let mut blocks: BTreeMap<Ulid, bool> = BTreeMap::new();
        for key in &keys {
            let Some((dir, rest)) = key.split_once(DIR_DELIM) else {
                continue;
            };
            let Some(id) = parse_block_id(dir) else {
                continue;
            };
            let complete = blocks.entry(id).or_insert(false);
            *complete |= rest == meta_filename;
        }

        Ok(blocks
            .into_iter()
            .map(|(id, complete)| RemoteBlock { id, complete })
            .collect())
    }
}

fn step_error(step: Step, id: Ulid, source: ObjStoreError) -> BlockError {
    if source.is_cancelled() {
        BlockError::Cancelled { step }
    } else {
        BlockError::Transfer { step, id, source }
    }
}

// For reads and deletes only: dropping one of those mid-flight leaves nothing
// behind that a later step could trip over.
async fn cancellable<T, F>(
    cancel: &CancellationToken,
    step: Step,
    id: Ulid,
    fut: F,
) -> BlockResult<T>
where
    F: Future<Output = ObjStoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BlockError::Cancelled { step }),
        res = fut => res.map_err(|source| BlockError::Transfer { step, id, source }),
    }
}
