//! Uptime writer: rollup view -> keyed device-uptime table.
//!
//! For every device with events committed inside the run window, computes
//! the device's uptime row from its current rollup and applies the batch as
//! one atomic upsert: replace on device match, insert otherwise. The
//! watermark commits only after the batch lands, so a crash mid-run re-runs
//! the window and re-applies identical rows.

use std::sync::Arc;
use tracing::{debug, info};

use event_store::{EventStore, RollupStore, UptimeTable};
use pipeline_core::{DeviceUptimeRow, Result, RunWindow};
use telemetry::metrics;

use crate::run::last_known_attributes;

/// Counts from one uptime run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UptimeSummary {
    pub events_seen: u64,
    pub rows_inserted: u64,
    pub rows_replaced: u64,
    pub devices_pending_rollup: u64,
}

/// Worker maintaining the device-uptime table.
pub struct UptimeWorker {
    store: Arc<EventStore>,
    rollups: Arc<RollupStore>,
    table: Arc<UptimeTable>,
}

impl UptimeWorker {
    pub fn new(store: Arc<EventStore>, rollups: Arc<RollupStore>, table: Arc<UptimeTable>) -> Self {
        Self {
            store,
            rollups,
            table,
        }
    }

    pub async fn run_window(&self, window: RunWindow) -> Result<UptimeSummary> {
        let fresh = self.store.scan_committed(&window)?;
        if fresh.is_empty() {
            debug!(window = %window, "No new events for uptime");
            return Ok(UptimeSummary::default());
        }

        let mut summary = UptimeSummary {
            events_seen: fresh.len() as u64,
            ..Default::default()
        };

        let mut batch: Vec<DeviceUptimeRow> = Vec::new();
        for (device, (att1, att2)) in last_known_attributes(&fresh) {
            let Some(rollup) = self.rollups.get(&device) else {
                summary.devices_pending_rollup += 1;
                continue;
            };
            batch.push(DeviceUptimeRow::from_rollup(&rollup, att1, att2));
        }

        let outcome = self.table.upsert_batch(&batch)?;
        summary.rows_inserted = outcome.inserted;
        summary.rows_replaced = outcome.replaced;

        metrics().uptime_rows_inserted.inc_by(outcome.inserted);
        metrics().uptime_rows_replaced.inc_by(outcome.replaced);

        info!(
            window = %window,
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            pending_rollup = summary.devices_pending_rollup,
            "Uptime run complete"
        );
        Ok(summary)
    }
}
