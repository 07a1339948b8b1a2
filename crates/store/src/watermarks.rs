//! Per-job watermark persistence.
//!
//! One JSON document per job under `state/`. Commits are monotonic: a
//! watermark can only move forward, which is what keeps resumed jobs from
//! double-applying committed work.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use pipeline_core::{Error, JobKind, Result, WatermarkState};

use crate::store::write_atomic;

const STATE_DIR: &str = "state";

/// Store for per-job watermark documents.
pub struct WatermarkStore {
    dir: PathBuf,
    cache: RwLock<HashMap<JobKind, WatermarkState>>,
}

impl WatermarkStore {
    pub fn open(root: &std::path::Path) -> Result<Self> {
        let dir = root.join(STATE_DIR);
        std::fs::create_dir_all(&dir)?;

        let mut cache = HashMap::new();
        for job in JobKind::all() {
            let path = dir.join(format!("{}.json", job.name()));
            if path.exists() {
                let bytes = std::fs::read(&path)?;
                let state: WatermarkState = serde_json::from_slice(&bytes)?;
                cache.insert(job, state);
            }
        }

        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    /// The job's persisted state; an initial (beginning-of-stream) state if
    /// it has never committed.
    pub fn load(&self, job: JobKind) -> WatermarkState {
        self.cache
            .read()
            .get(&job)
            .cloned()
            .unwrap_or_else(|| WatermarkState::initial(job, Utc::now()))
    }

    /// Commit a run's window end as the job's new watermark.
    pub fn commit(&self, job: JobKind, end: DateTime<Utc>) -> Result<WatermarkState> {
        let mut cache = self.cache.write();
        let prev = cache
            .get(&job)
            .cloned()
            .unwrap_or_else(|| WatermarkState::initial(job, Utc::now()));

        if let Some(existing) = prev.watermark {
            if end < existing {
                return Err(Error::merge_conflict(format!(
                    "watermark for {} would move backwards: {} -> {}",
                    job,
                    existing.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }

        let state = WatermarkState {
            job,
            watermark: Some(end),
            updated_at: Utc::now(),
            runs_committed: prev.runs_committed + 1,
        };

        let bytes = serde_json::to_vec_pretty(&state)?;
        write_atomic(&self.dir.join(format!("{}.json", job.name())), &bytes)?;
        cache.insert(job, state.clone());

        debug!(job = %job, watermark = %end.to_rfc3339(), "Committed watermark");
        Ok(state)
    }
}
