//! Event types and delimited-record parsing.
//!
//! Source objects are delimited text with one record per line:
//! `device,att1,att2,dt_updated`. Records are validated and parsed into
//! typed [`Event`]s; the store persists them as [`StoredEvent`]s carrying
//! provenance (source object + offset) and the commit time that defines
//! merge-job processing windows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// Timestamp format used by the telemetry feed (`dt_updated` column).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of columns in a well-formed record.
pub const RECORD_COLUMNS: usize = 4;

/// A raw delimited record before timestamp parsing.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawRecord {
    /// Device identifier (grouping key)
    #[validate(length(min = 1, max = 128))]
    pub device: String,
    /// Opaque attribute, carried through to outputs
    #[validate(length(max = 512))]
    pub att1: String,
    /// Opaque attribute, carried through to outputs
    #[validate(length(max = 512))]
    pub att2: String,
    /// Event timestamp as written by the feed
    pub dt_updated: String,
}

/// A parsed telemetry event. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub device: String,
    pub att1: String,
    pub att2: String,
    pub dt_updated: DateTime<Utc>,
}

impl Event {
    /// Seconds since the Unix epoch, derived from `dt_updated`.
    pub fn unix_timestamp(&self) -> i64 {
        self.dt_updated.timestamp()
    }

    /// Partition column: the event's calendar date (UTC).
    pub fn event_date(&self) -> NaiveDate {
        self.dt_updated.date_naive()
    }
}

impl TryFrom<RawRecord> for Event {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self> {
        raw.validate()
            .map_err(|e| Error::parse(format!("invalid record: {}", e)))?;

        let dt_updated = parse_timestamp(&raw.dt_updated)?;

        Ok(Self {
            device: raw.device,
            att1: raw.att1,
            att2: raw.att2,
            dt_updated,
        })
    }
}

/// Parse a feed timestamp. Accepts the feed's `YYYY-MM-DD HH:MM:SS` format
/// with an RFC 3339 fallback.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::parse(format!("invalid timestamp '{}': {}", s, e)))
}

/// An event as persisted in the append store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub device: String,
    pub att1: String,
    pub att2: String,
    pub dt_updated: DateTime<Utc>,
    pub unix_timestamp: i64,
    /// Partition column
    pub event_date: NaiveDate,
    /// Object key this record came from
    pub source_object: String,
    /// 1-based record index within the source object
    pub source_offset: u64,
    /// When the append became durable; defines merge-job windows
    pub commit_time: DateTime<Utc>,
}

impl StoredEvent {
    pub fn new(
        event: Event,
        source_object: impl Into<String>,
        source_offset: u64,
        commit_time: DateTime<Utc>,
    ) -> Self {
        Self {
            unix_timestamp: event.unix_timestamp(),
            event_date: event.event_date(),
            device: event.device,
            att1: event.att1,
            att2: event.att2,
            dt_updated: event.dt_updated,
            source_object: source_object.into(),
            source_offset,
            commit_time,
        }
    }
}

/// Per-object parse counters, reported by the ingest job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Records parsed into events
    pub parsed: u64,
    /// Records skipped as malformed (bad timestamp, failed validation)
    pub malformed: u64,
    /// Records rejected for column-count mismatch
    pub schema_rejected: u64,
    /// Records accepted with missing attribute columns defaulted
    pub columns_added: u64,
}

/// Outcome of parsing one source object.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub stats: ParseStats,
}

/// Parse a source object's bytes into events.
///
/// Record-level failures are counted, never propagated: a malformed line
/// must not poison the object. Column layout is positional; with
/// `add_missing_columns`, 2- and 3-column records are accepted with the
/// missing attribute fields defaulted to empty (the last column is always
/// the timestamp).
pub fn parse_object(bytes: &[u8], add_missing_columns: bool) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) => {
                outcome.stats.malformed += 1;
                continue;
            }
        };

        // Skip blank lines without counting them against the feed.
        if record.len() == 1 && record.get(0).map_or(true, |f| f.is_empty()) {
            continue;
        }

        let raw = match raw_from_fields(&record, add_missing_columns) {
            Ok((raw, added)) => {
                if added {
                    outcome.stats.columns_added += 1;
                }
                raw
            }
            Err(_) => {
                outcome.stats.schema_rejected += 1;
                continue;
            }
        };

        match Event::try_from(raw) {
            Ok(event) => {
                outcome.stats.parsed += 1;
                outcome.events.push(event);
            }
            Err(_) => outcome.stats.malformed += 1,
        }
    }

    outcome
}

/// Map positional fields onto a [`RawRecord`]. Returns whether missing
/// attribute columns were defaulted.
fn raw_from_fields(record: &csv::StringRecord, add_missing_columns: bool) -> Result<(RawRecord, bool)> {
    let field = |i: usize| record.get(i).unwrap_or_default().to_string();

    match record.len() {
        4 => Ok((
            RawRecord {
                device: field(0),
                att1: field(1),
                att2: field(2),
                dt_updated: field(3),
            },
            false,
        )),
        3 if add_missing_columns => Ok((
            RawRecord {
                device: field(0),
                att1: field(1),
                att2: String::new(),
                dt_updated: field(2),
            },
            true,
        )),
        2 if add_missing_columns => Ok((
            RawRecord {
                device: field(0),
                att1: String::new(),
                att2: String::new(),
                dt_updated: field(1),
            },
            true,
        )),
        n => Err(Error::schema(format!(
            "expected {} columns, got {}",
            RECORD_COLUMNS, n
        ))),
    }
}
