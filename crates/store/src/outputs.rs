//! Output tables written by the merge jobs.
//!
//! Two write disciplines, per the merge contract:
//! - [`SessionRowTable`]: append-only with dedup on (device, session start,
//!   session end), so re-processing an overlapping window cannot produce
//!   duplicate rows.
//! - [`UptimeTable`]: keyed upsert, exactly one live row per device,
//!   applied per batch as an atomic replace of the whole document.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

use pipeline_core::{DeviceUptimeRow, Result, SessionRow};

use crate::store::write_atomic;

const SESSION_ROWS_FILE: &str = "session_rows.ndjson";
const UPTIME_FILE: &str = "device_uptime.json";
const OUTPUTS_DIR: &str = "outputs";

/// Counts from one append batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub written: u64,
    /// Rows dropped because their dedup key already existed
    pub deduplicated: u64,
}

/// Append-only flattened session-row table.
pub struct SessionRowTable {
    path: PathBuf,
    /// Dedup keys of every row in the file
    keys: Mutex<HashSet<String>>,
}

impl SessionRowTable {
    pub fn open(root: &std::path::Path) -> Result<Self> {
        let dir = root.join(OUTPUTS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(SESSION_ROWS_FILE);

        let mut keys = HashSet::new();
        if path.exists() {
            for row in read_rows(&path)? {
                keys.insert(row.dedup_key());
            }
        }

        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    /// Append rows, dropping any whose (device, start, end) key is already
    /// present. At-least-once delivery upstream collapses here.
    pub fn append(&self, rows: &[SessionRow]) -> Result<AppendOutcome> {
        let mut keys = self.keys.lock();
        let mut outcome = AppendOutcome::default();

        let mut buf = Vec::new();
        let mut fresh = Vec::new();
        for row in rows {
            let key = row.dedup_key();
            if keys.contains(&key) || fresh.contains(&key) {
                outcome.deduplicated += 1;
                continue;
            }
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
            fresh.push(key);
            outcome.written += 1;
        }

        if !buf.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
            keys.extend(fresh);
        }

        debug!(
            written = outcome.written,
            deduplicated = outcome.deduplicated,
            "Appended session rows"
        );
        Ok(outcome)
    }

    /// All rows, in append order.
    pub fn rows(&self) -> Result<Vec<SessionRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_rows(&self.path)
    }

    pub fn row_count(&self) -> usize {
        self.keys.lock().len()
    }
}

fn read_rows(path: &std::path::Path) -> Result<Vec<SessionRow>> {
    let bytes = std::fs::read(path)?;
    let mut rows = Vec::new();
    for line in bytes.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        rows.push(serde_json::from_slice(line)?);
    }
    Ok(rows)
}

/// Counts from one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub replaced: u64,
}

/// Keyed device-uptime table: one live row per device.
pub struct UptimeTable {
    path: PathBuf,
    rows: RwLock<BTreeMap<String, DeviceUptimeRow>>,
}

impl UptimeTable {
    pub fn open(root: &std::path::Path) -> Result<Self> {
        let dir = root.join(OUTPUTS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(UPTIME_FILE);

        let rows = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    /// Apply a batch: replace on device match, insert otherwise. The batch
    /// lands atomically; a reader never observes part of it.
    pub fn upsert_batch(&self, batch: &[DeviceUptimeRow]) -> Result<UpsertOutcome> {
        if batch.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let mut rows = self.rows.write();
        let mut next = rows.clone();
        let mut outcome = UpsertOutcome::default();

        for row in batch {
            match next.insert(row.device.clone(), row.clone()) {
                Some(_) => outcome.replaced += 1,
                None => outcome.inserted += 1,
            }
        }

        let bytes = serde_json::to_vec(&next)?;
        write_atomic(&self.path, &bytes)?;
        *rows = next;

        debug!(
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            "Upserted uptime rows"
        );
        Ok(outcome)
    }

    pub fn get(&self, device: &str) -> Option<DeviceUptimeRow> {
        self.rows.read().get(device).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, DeviceUptimeRow> {
        self.rows.read().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}
