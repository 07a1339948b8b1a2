//! Read helpers over the stores (used in tests and admin tooling).

use pipeline_core::{DeviceUptimeRow, Result, RunWindow, SessionRow};

use crate::outputs::{SessionRowTable, UptimeTable};
use crate::store::EventStore;

/// Count all committed events.
pub fn count_events(store: &EventStore) -> u64 {
    store.event_count()
}

/// Count events committed inside a window.
pub fn count_committed(store: &EventStore, window: &RunWindow) -> Result<u64> {
    Ok(store.scan_committed(window)?.len() as u64)
}

/// Distinct devices with any committed events.
pub fn distinct_devices(store: &EventStore) -> Result<Vec<String>> {
    let all = store.scan_committed(&RunWindow::new(
        None,
        chrono::Utc::now() + chrono::Duration::seconds(1),
    ))?;

    let mut devices: Vec<String> = all.into_iter().map(|e| e.device).collect();
    devices.sort();
    devices.dedup();
    Ok(devices)
}

/// Session rows for one device, ordered by session start.
pub fn session_rows_for_device(table: &SessionRowTable, device: &str) -> Result<Vec<SessionRow>> {
    let mut rows: Vec<SessionRow> = table
        .rows()?
        .into_iter()
        .filter(|r| r.device == device)
        .collect();
    rows.sort_by_key(|r| r.session_start);
    Ok(rows)
}

/// The live uptime row for one device.
pub fn uptime_for_device(table: &UptimeTable, device: &str) -> Option<DeviceUptimeRow> {
    table.get(device)
}

/// All live uptime rows, ordered by device.
pub fn uptime_rows(table: &UptimeTable) -> Vec<DeviceUptimeRow> {
    table.all().into_values().collect()
}
