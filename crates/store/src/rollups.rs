//! Materialized session-rollup view, keyed by device.
//!
//! The rollup refresh job recomputes rollups for touched devices and
//! replaces them here; the merge writers read them. The whole view is
//! persisted as one document and swapped atomically, so readers see either
//! the previous refresh or the new one.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use pipeline_core::{Result, SessionRollup};

use crate::store::write_atomic;

const ROLLUPS_FILE: &str = "rollups.json";

/// Device -> [`SessionRollup`] view store.
pub struct RollupStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, SessionRollup>>,
}

impl RollupStore {
    pub fn open(root: &std::path::Path) -> Result<Self> {
        let path = root.join(ROLLUPS_FILE);
        let cache = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    pub fn get(&self, device: &str) -> Option<SessionRollup> {
        self.cache.read().get(device).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, SessionRollup> {
        self.cache.read().clone()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Replace the rollups for the given devices and persist the view.
    pub fn upsert_batch(&self, rollups: Vec<SessionRollup>) -> Result<usize> {
        if rollups.is_empty() {
            return Ok(0);
        }

        let mut cache = self.cache.write();
        let mut next = cache.clone();
        let count = rollups.len();
        for rollup in rollups {
            next.insert(rollup.device.clone(), rollup);
        }

        let bytes = serde_json::to_vec(&next)?;
        write_atomic(&self.path, &bytes)?;
        *cache = next;

        debug!(refreshed = count, "Persisted rollup view");
        Ok(count)
    }
}
