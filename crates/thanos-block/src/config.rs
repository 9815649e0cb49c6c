//! Configuration file for tools built on this crate.
//!
//! ```yaml
//! bucket: s3://metrics-blocks/thanos?region=eu-west-1
//! layout:
//!   debug_metas_dir: debug/metas
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::layout::BlockLayout;
use crate::objstore::{ObjStoreResult, ObjectStoreBucket};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Store URL, see [`crate::StoreSpec`].
    pub bucket: String,

    /// File and key names. Defaults match what Thanos components write.
    pub layout: BlockLayout,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Config {
    /// Parse and validate a YAML config.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.layout
            .validate()
            .map_err(<serde_yaml::Error as serde::de::Error>::custom)?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Open the configured bucket.
    pub fn open_bucket(&self) -> ObjStoreResult<ObjectStoreBucket> {
        ObjectStoreBucket::from_url(&self.bucket)
    }
}
