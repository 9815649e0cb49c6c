//! Object store implementation of [`Bucket`].
//!
//! Supports S3 (and S3-compatible stores), local filesystem and in-memory
//! storage via the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt};
use tokio::io::AsyncWriteExt;

use super::{Bucket, ByteStream, ObjStoreError, ObjStoreResult, StoreSpec};
use crate::layout::{join_key, DIR_DELIM};

/// Bucket backed by `object_store`.
///
/// All keys are resolved below an optional base prefix, so several
/// independent block stores can share one physical bucket.
pub struct ObjectStoreBucket {
    inner: Arc<dyn ObjectStore>,
    name: String,
    /// Base prefix (e.g., "thanos/blocks"), without surrounding slashes.
    base_prefix: String,
}

impl ObjectStoreBucket {
    /// Wrap an existing store.
    pub fn new(inner: Arc<dyn ObjectStore>, name: impl Into<String>, prefix: &str) -> Self {
        Self {
            inner,
            name: name.into(),
            base_prefix: prefix.trim_matches(DIR_DELIM).to_string(),
        }
    }

    /// Create a bucket from a parsed spec.
    pub fn from_spec(spec: &StoreSpec) -> ObjStoreResult<Self> {
        match spec.scheme.as_str() {
            "memory" => Ok(Self::new(
                Arc::new(object_store::memory::InMemory::new()),
                "memory",
                &spec.prefix,
            )),
            "file" => {
                let path = match &spec.bucket {
                    Some(host) => format!("/{}/{}", host, spec.prefix),
                    None => format!("/{}", spec.prefix),
                };
                // LocalFileSystem requires the root to exist.
                std::fs::create_dir_all(&path)
                    .map_err(|e| ObjStoreError::io("create store directory", &path, e))?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(&path)
                    .map_err(|e| ObjStoreError::InvalidSpec {
                        spec: format!("file://{}", path),
                        reason: e.to_string(),
                    })?;
                Ok(Self::new(Arc::new(store), format!("file://{}", path), ""))
            }
            "s3" => {
                let bucket = spec
                    .bucket
                    .as_ref()
                    .ok_or_else(|| ObjStoreError::InvalidSpec {
                        spec: format!("s3:///{}", spec.prefix),
                        reason: "S3 URL must include bucket name".to_string(),
                    })?;

                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(false);

                if let Some(region) = &spec.region {
                    builder = builder.with_region(region);
                }

                let store = builder.build().map_err(|e| ObjStoreError::InvalidSpec {
                    spec: format!("s3://{}/{}", bucket, spec.prefix),
                    reason: format!("failed to create S3 client: {}", e),
                })?;
                Ok(Self::new(Arc::new(store), format!("s3://{}", bucket), &spec.prefix))
            }
            scheme => Err(ObjStoreError::InvalidSpec {
                spec: spec.scheme.clone(),
                reason: format!("unsupported scheme: {}", scheme),
            }),
        }
    }

    /// Create a bucket from a URL string.
    pub fn from_url(url: &str) -> ObjStoreResult<Self> {
        let spec = StoreSpec::parse(url)?;
        Self::from_spec(&spec)
    }

    /// Create an in-memory bucket for testing.
    pub fn memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), "memory", "")
    }

    /// Create an in-memory bucket with a base prefix for testing.
    pub fn memory_with_prefix(prefix: &str) -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            "memory",
            prefix,
        )
    }

    fn full_path(&self, key: &str) -> Path {
        Path::from(join_key(&self.base_prefix, key))
    }

    fn strip_base<'a>(&self, location: &'a str) -> &'a str {
        if self.base_prefix.is_empty() {
            return location;
        }
        location
            .strip_prefix(self.base_prefix.as_str())
            .map(|rest| rest.trim_start_matches(DIR_DELIM))
            .unwrap_or(location)
    }
}

#[async_trait]
impl Bucket for ObjectStoreBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, key: &str, mut data: ByteStream) -> ObjStoreResult<()> {
        // Small objects go out as a single put, large ones as multipart.
        let mut writer = BufWriter::new(Arc::clone(&self.inner), self.full_path(key));
        match copy_to_writer(&mut writer, &mut data, key).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Drop any multipart parts already sent.
                let _ = writer.abort().await;
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> ObjStoreResult<ByteStream> {
        let result = self
            .inner
            .get(&self.full_path(key))
            .await
            .map_err(|e| ObjStoreError::from_object_store(e, key))?;

        let key = key.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| ObjStoreError::from_object_store(e, &key))
            .boxed())
    }

    async fn exists(&self, key: &str) -> ObjStoreResult<bool> {
        match self.inner.head(&self.full_path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ObjStoreError::from_object_store(e, key)),
        }
    }

    async fn list(&self, prefix: &str) -> ObjStoreResult<Vec<String>> {
        let full = join_key(&self.base_prefix, prefix);
        let full = full.trim_matches(DIR_DELIM);
        let prefix_path = (!full.is_empty()).then(|| Path::from(full));

        let entries: Vec<_> = self
            .inner
            .list(prefix_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| ObjStoreError::from_object_store(e, prefix))?;

        let mut keys: Vec<String> = entries
            .iter()
            .map(|entry| self.strip_base(entry.location.as_ref()).to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> ObjStoreResult<()> {
        self.inner
            .delete(&self.full_path(key))
            .await
            .map_err(|e| ObjStoreError::from_object_store(e, key))
    }
}

async fn copy_to_writer(
    writer: &mut BufWriter,
    data: &mut ByteStream,
    key: &str,
) -> ObjStoreResult<()> {
    while let Some(chunk) = data.try_next().await? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ObjStoreError::io("write object", key, e))?;
    }
    writer
        .shutdown()
        .await
        .map_err(|e| ObjStoreError::io("complete object", key, e))
}
