//! Windowed-run lifecycle shared by the periodic jobs.
//!
//! Each run moves through Idle -> Running(window) -> Committed -> Idle. The
//! window start comes from the job's persisted watermark (minus an optional
//! lookback); the end is the wall clock at begin. Runs of the same job are
//! serialized: a begin while another run is in flight is refused and the
//! tick is skipped.

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use event_store::WatermarkStore;
use pipeline_core::{JobKind, Result, RunState, RunWindow, StoredEvent, WatermarkState};

/// One granted run: its id (for log correlation) and commit-time window.
#[derive(Debug, Clone, Copy)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub window: RunWindow,
}

/// Per-job run state machine over the watermark store.
pub struct JobRunner {
    job: JobKind,
    watermarks: Arc<WatermarkStore>,
    /// Re-scan overlap applied to the window start (flatten job)
    lookback: Duration,
    state: Mutex<RunState>,
}

impl JobRunner {
    pub fn new(job: JobKind, watermarks: Arc<WatermarkStore>) -> Self {
        Self::with_lookback(job, watermarks, Duration::zero())
    }

    pub fn with_lookback(job: JobKind, watermarks: Arc<WatermarkStore>, lookback: Duration) -> Self {
        Self {
            job,
            watermarks,
            lookback,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn job(&self) -> JobKind {
        self.job
    }

    /// Begin a run. Returns `None` when another run of this job is still in
    /// flight (the caller skips the tick).
    pub fn begin(&self) -> Option<RunHandle> {
        let mut state = self.state.lock();
        if matches!(*state, RunState::Running(_)) {
            return None;
        }

        let watermark = self.watermarks.load(self.job).watermark;
        let start = watermark.map(|w| w - self.lookback);
        let window = RunWindow::new(start, Utc::now());

        *state = RunState::Running(window);
        let handle = RunHandle {
            run_id: Uuid::new_v4(),
            window,
        };
        debug!(job = %self.job, run_id = %handle.run_id, window = %window, "Run started");
        Some(handle)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Commit the run: persist the window end as the job watermark.
    pub fn commit(&self, handle: &RunHandle) -> Result<WatermarkState> {
        let mut state = self.state.lock();
        let committed = self.watermarks.commit(self.job, handle.window.end)?;
        *state = RunState::Committed(handle.window.end);
        Ok(committed)
    }

    /// Abandon the run without advancing the watermark; the next run
    /// re-scans the same window.
    pub fn abandon(&self, handle: &RunHandle) {
        let mut state = self.state.lock();
        debug!(job = %self.job, run_id = %handle.run_id, "Run abandoned");
        *state = RunState::Idle;
    }
}

/// Last-known `(att1, att2)` per device within a batch, by event timestamp.
pub(crate) fn last_known_attributes(events: &[StoredEvent]) -> BTreeMap<String, (String, String)> {
    let mut latest: BTreeMap<String, &StoredEvent> = BTreeMap::new();
    for event in events {
        latest
            .entry(event.device.clone())
            .and_modify(|current| {
                if event.dt_updated >= current.dt_updated {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    latest
        .into_iter()
        .map(|(device, e)| (device, (e.att1.clone(), e.att2.clone())))
        .collect()
}
