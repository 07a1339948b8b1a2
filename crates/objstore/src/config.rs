//! Object storage connector configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the filesystem-backed object source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Root directory acting as the bucket
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Key prefix to scan under the root (empty scans everything)
    #[serde(default)]
    pub prefix: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("data/incoming")
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            prefix: String::new(),
        }
    }
}
