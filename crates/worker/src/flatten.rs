//! Flatten writer: rollup view -> append-only session-row table.
//!
//! For every device with events committed inside the run window, emits one
//! row per session in the device's current rollup, carrying the device's
//! last-known attributes from the window. The run window overlaps the
//! previous one by the configured lookback; the table's dedup on
//! (device, start, end) absorbs the re-emitted rows.

use std::sync::Arc;
use tracing::{debug, info};

use event_store::{EventStore, RollupStore, SessionRowTable};
use pipeline_core::{Result, RunWindow, SessionRow};
use telemetry::metrics;

use crate::run::last_known_attributes;

/// Counts from one flatten run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    pub events_seen: u64,
    pub rows_written: u64,
    pub rows_deduplicated: u64,
    /// Devices whose rollup was not yet refreshed; the lookback re-scan
    /// picks them up next run
    pub devices_pending_rollup: u64,
}

/// Worker writing flattened session rows.
pub struct FlattenWorker {
    store: Arc<EventStore>,
    rollups: Arc<RollupStore>,
    table: Arc<SessionRowTable>,
}

impl FlattenWorker {
    pub fn new(
        store: Arc<EventStore>,
        rollups: Arc<RollupStore>,
        table: Arc<SessionRowTable>,
    ) -> Self {
        Self {
            store,
            rollups,
            table,
        }
    }

    pub async fn run_window(&self, window: RunWindow) -> Result<FlattenSummary> {
        let fresh = self.store.scan_committed(&window)?;
        if fresh.is_empty() {
            debug!(window = %window, "No new events for flatten");
            return Ok(FlattenSummary::default());
        }

        let mut summary = FlattenSummary {
            events_seen: fresh.len() as u64,
            ..Default::default()
        };

        let mut rows: Vec<SessionRow> = Vec::new();
        for (device, (att1, att2)) in last_known_attributes(&fresh) {
            let Some(rollup) = self.rollups.get(&device) else {
                summary.devices_pending_rollup += 1;
                continue;
            };

            for session in &rollup.sessions {
                rows.push(SessionRow::from_session(&device, *session, &att1, &att2));
            }
        }

        let outcome = self.table.append(&rows)?;
        summary.rows_written = outcome.written;
        summary.rows_deduplicated = outcome.deduplicated;

        metrics().session_rows_written.inc_by(outcome.written);
        metrics()
            .session_rows_deduplicated
            .inc_by(outcome.deduplicated);

        info!(
            window = %window,
            written = outcome.written,
            deduplicated = outcome.deduplicated,
            pending_rollup = summary.devices_pending_rollup,
            "Flatten run complete"
        );
        Ok(summary)
    }
}
