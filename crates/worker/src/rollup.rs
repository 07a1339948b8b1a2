//! Rollup refresh worker: event store -> materialized session view.
//!
//! Finds devices with events committed inside the run window and
//! recomputes each one's rollup from its full event history. Recomputation
//! is a pure function of the history, so a re-scanned window can only
//! rewrite a device's rollup to the same value.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use event_store::{EventStore, RollupStore};
use pipeline_core::{Result, RunWindow, SessionRollup};
use telemetry::metrics;

/// Counts from one rollup refresh run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub events_seen: u64,
    pub devices_refreshed: u64,
}

/// Worker maintaining the per-device session rollup view.
pub struct RollupWorker {
    store: Arc<EventStore>,
    rollups: Arc<RollupStore>,
    gap_seconds: i64,
}

impl RollupWorker {
    pub fn new(store: Arc<EventStore>, rollups: Arc<RollupStore>, gap_seconds: i64) -> Self {
        Self {
            store,
            rollups,
            gap_seconds,
        }
    }

    /// Refresh rollups for devices touched inside the window.
    pub async fn run_window(&self, window: RunWindow) -> Result<RollupSummary> {
        let fresh = self.store.scan_committed(&window)?;
        if fresh.is_empty() {
            debug!(window = %window, "No new events, rollup view unchanged");
            return Ok(RollupSummary::default());
        }

        let devices: BTreeSet<String> = fresh.iter().map(|e| e.device.clone()).collect();
        let histories = self.store.scan_devices(&devices)?;

        let mut batch = Vec::with_capacity(histories.len());
        for (device, events) in histories {
            let timestamps: Vec<_> = events.iter().map(|e| e.dt_updated).collect();
            if let Some(rollup) = SessionRollup::from_events(&device, &timestamps, self.gap_seconds)
            {
                batch.push(rollup);
            }
        }

        let refreshed = self.rollups.upsert_batch(batch)? as u64;
        metrics().devices_refreshed.inc_by(refreshed);
        metrics().devices_tracked.set(self.rollups.len() as u64);

        info!(
            window = %window,
            events = fresh.len(),
            devices = refreshed,
            "Rollup view refreshed"
        );
        Ok(RollupSummary {
            events_seen: fresh.len() as u64,
            devices_refreshed: refreshed,
        })
    }
}
