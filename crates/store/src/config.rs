//! Store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the local store engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for event segments, output tables, and job state
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("data/store")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}
