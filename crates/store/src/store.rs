//! The append-only event store.
//!
//! Layout under the store root:
//!
//! ```text
//! events/dt=<date>/<object_id>.ndjson   date-partitioned segments
//! ingested.json                          object manifest (the commit point)
//! ```
//!
//! An object's records are appended by writing one segment per event-date
//! partition (temp file + rename) and then recording the object in the
//! manifest. Scans read only segments reachable from the manifest, so a
//! crash between segment writes and the manifest update leaves nothing
//! visible; the retry overwrites the same segments. Dedupe is by source
//! object identity: a manifested key is never appended again.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use pipeline_core::{Error, Event, Result, RunWindow, StoredEvent};

use crate::config::StoreConfig;

const MANIFEST_FILE: &str = "ingested.json";
const EVENTS_DIR: &str = "events";

/// Manifest entry for one ingested object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Segment file stem derived from the object key
    pub object_id: String,
    /// Records appended from this object
    pub records: u64,
    /// Commit time shared by all of the object's rows
    pub commit_time: DateTime<Utc>,
    /// Event-date partitions the object wrote into
    pub partitions: Vec<NaiveDate>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    objects: BTreeMap<String, ObjectEntry>,
}

/// Receipt for one object append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub object: String,
    pub appended: u64,
    /// True when the object was already manifested and nothing was written
    pub duplicate: bool,
}

/// Durable, date-partitioned append-only event store.
pub struct EventStore {
    root: PathBuf,
    manifest: RwLock<Manifest>,
}

impl EventStore {
    /// Open (or create) a store under the configured root.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let root = config.root.clone();
        std::fs::create_dir_all(root.join(EVENTS_DIR))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let bytes = std::fs::read(&manifest_path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Manifest::default()
        };

        info!(
            root = %root.display(),
            objects = manifest.objects.len(),
            "Opened event store"
        );

        Ok(Self {
            root,
            manifest: RwLock::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether an object has already been committed.
    pub fn is_ingested(&self, key: &str) -> bool {
        self.manifest.read().objects.contains_key(key)
    }

    /// Number of committed objects.
    pub fn object_count(&self) -> usize {
        self.manifest.read().objects.len()
    }

    /// Append all events parsed from one source object.
    ///
    /// The whole object commits or none of it does: segments land first,
    /// the manifest entry second. Re-delivery of a committed key is a
    /// no-op.
    pub fn append_object(&self, key: &str, events: Vec<Event>) -> Result<AppendReceipt> {
        if self.is_ingested(key) {
            debug!(object = key, "Skipping already-ingested object");
            return Ok(AppendReceipt {
                object: key.to_string(),
                appended: 0,
                duplicate: true,
            });
        }

        let commit_time = Utc::now();
        let object_id = object_id(key);

        // Group rows by partition date.
        let mut by_date: BTreeMap<NaiveDate, Vec<StoredEvent>> = BTreeMap::new();
        for (idx, event) in events.into_iter().enumerate() {
            let stored = StoredEvent::new(event, key, idx as u64 + 1, commit_time);
            by_date.entry(stored.event_date).or_default().push(stored);
        }

        let mut appended = 0u64;
        for (date, rows) in &by_date {
            let dir = self.partition_dir(*date);
            std::fs::create_dir_all(&dir)?;

            let mut buf = Vec::new();
            for row in rows {
                serde_json::to_writer(&mut buf, row)?;
                buf.push(b'\n');
            }
            write_atomic(&dir.join(format!("{}.ndjson", object_id)), &buf)?;
            appended += rows.len() as u64;
        }

        // Manifest update is the commit point.
        let entry = ObjectEntry {
            object_id,
            records: appended,
            commit_time,
            partitions: by_date.keys().copied().collect(),
        };
        {
            let mut manifest = self.manifest.write();
            manifest.objects.insert(key.to_string(), entry);
            self.persist_manifest(&manifest)?;
        }

        debug!(object = key, rows = appended, "Committed object");
        Ok(AppendReceipt {
            object: key.to_string(),
            appended,
            duplicate: false,
        })
    }

    /// Events whose commit time falls inside the window, across all
    /// partitions. Objects are pruned by their manifest commit time before
    /// any segment is read.
    pub fn scan_committed(&self, window: &RunWindow) -> Result<Vec<StoredEvent>> {
        let entries: Vec<ObjectEntry> = {
            let manifest = self.manifest.read();
            manifest
                .objects
                .values()
                .filter(|e| window.contains(e.commit_time))
                .cloned()
                .collect()
        };

        let mut events = Vec::new();
        for entry in entries {
            for date in &entry.partitions {
                self.read_segment(*date, &entry.object_id, &mut events, |row| {
                    window.contains(row.commit_time)
                })?;
            }
        }

        events.sort_by_key(|e| (e.dt_updated, e.source_object.clone(), e.source_offset));
        Ok(events)
    }

    /// Full event history for a set of devices, grouped per device and
    /// ordered by event timestamp. One pass over all manifested segments.
    pub fn scan_devices(
        &self,
        devices: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<StoredEvent>>> {
        let entries: Vec<ObjectEntry> = {
            let manifest = self.manifest.read();
            manifest.objects.values().cloned().collect()
        };

        let mut by_device: BTreeMap<String, Vec<StoredEvent>> = BTreeMap::new();
        let mut buf = Vec::new();
        for entry in entries {
            for date in &entry.partitions {
                self.read_segment(*date, &entry.object_id, &mut buf, |row| {
                    devices.contains(&row.device)
                })?;
            }
        }
        for event in buf {
            by_device.entry(event.device.clone()).or_default().push(event);
        }
        for events in by_device.values_mut() {
            events.sort_by_key(|e| e.dt_updated);
        }

        Ok(by_device)
    }

    /// Full event history for one device, ordered by event timestamp.
    pub fn scan_device(&self, device: &str) -> Result<Vec<StoredEvent>> {
        let mut set = BTreeSet::new();
        set.insert(device.to_string());
        Ok(self.scan_devices(&set)?.remove(device).unwrap_or_default())
    }

    /// Total committed events, from the manifest alone.
    pub fn event_count(&self) -> u64 {
        self.manifest.read().objects.values().map(|e| e.records).sum()
    }

    fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(EVENTS_DIR).join(format!("dt={}", date))
    }

    fn read_segment(
        &self,
        date: NaiveDate,
        object_id: &str,
        out: &mut Vec<StoredEvent>,
        keep: impl Fn(&StoredEvent) -> bool,
    ) -> Result<()> {
        let path = self.partition_dir(date).join(format!("{}.ndjson", object_id));
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::storage(format!("read segment {}: {}", path.display(), e)))?;

        for line in bytes.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let row: StoredEvent = serde_json::from_slice(line)?;
            if keep(&row) {
                out.push(row);
            }
        }
        Ok(())
    }

    fn persist_manifest(&self, manifest: &Manifest) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.root.join(MANIFEST_FILE), &bytes)
    }
}

/// Segment file stem for an object key: sanitized key plus a short hash so
/// distinct keys never collide after sanitization.
fn object_id(key: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);

    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();

    format!("{}-{:016x}", sanitized, hasher.finish())
}

/// Write a file atomically: temp file in the target directory, then rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::storage(format!("no parent dir for {}", path.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| Error::storage(format!("persist {}: {}", path.display(), e.error)))?;
    Ok(())
}
