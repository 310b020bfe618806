//! TOML configuration for a [`FileSystemManager`](crate::FileSystemManager).
//!
//! ```toml
//! [cache]
//! policy = "lru"
//! capacity = 200
//! strategy = "on-call"
//!
//! [monitor]
//! delay_ms = 500
//!
//! [[mount]]
//! point = "/scratch"
//! target = "ram:///"
//! ```
//!
//! Every table is optional; missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::{CachePolicy, CacheStrategy, DEFAULT_LRU_CAPACITY};
use crate::error::{VfsError, VfsResult};
use crate::monitor::MonitorConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub cache: CacheConfig,
    pub monitor: MonitorConfig,
    /// Junctions installed in the virtual file system at startup.
    pub mount: Vec<MountConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub policy: CachePolicy,
    /// Per file system; only used by the `lru` policy.
    pub capacity: usize,
    pub strategy: CacheStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            capacity: DEFAULT_LRU_CAPACITY,
            strategy: CacheStrategy::default(),
        }
    }
}

/// One `[[mount]]` entry: graft `target` (any resolvable URI) at `point`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub point: String,
    pub target: String,
}

impl VfsConfig {
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        toml::from_str(text).map_err(|e| VfsError::Config(e.to_string()))
    }

    /// Read and parse a config file.
    pub async fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| VfsError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), mounts = config.mount.len(), "loaded vfs config");
        Ok(config)
    }
}
