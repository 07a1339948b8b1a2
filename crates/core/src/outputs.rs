//! Output row types for the two merge jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TIMESTAMP_FORMAT;
use crate::session::{Session, SessionRollup};

/// One flattened (device, session) row. Append-only output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub device: String,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub duration_minutes: f64,
    /// Last-known attributes for the device within the batch window
    pub att1: String,
    pub att2: String,
}

impl SessionRow {
    pub fn from_session(
        device: impl Into<String>,
        session: Session,
        att1: impl Into<String>,
        att2: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            session_start: session.start,
            session_end: session.end,
            duration_minutes: session.duration_minutes(),
            att1: att1.into(),
            att2: att2.into(),
        }
    }

    /// Dedup key: device + session bounds. Re-emitting a row for the same
    /// session under an overlapping window collapses onto this key.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.device,
            self.session_start.timestamp(),
            self.session_end.timestamp()
        )
    }

    pub fn formatted_start(&self) -> String {
        self.session_start.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn formatted_end(&self) -> String {
        self.session_end.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Per-device uptime row. Exactly one live row per device; maintained by
/// keyed upsert (replace on match, insert on miss).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUptimeRow {
    pub device: String,
    pub att1: String,
    pub att2: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Session minutes over span minutes. `None` when the span is zero
    /// (single-event device) rather than a division-by-zero failure.
    pub uptime: Option<f64>,
}

impl DeviceUptimeRow {
    pub fn from_rollup(
        rollup: &SessionRollup,
        att1: impl Into<String>,
        att2: impl Into<String>,
    ) -> Self {
        let span = rollup.span_minutes();
        let uptime = if span > 0.0 {
            Some(rollup.total_session_minutes() / span)
        } else {
            None
        };

        Self {
            device: rollup.device.clone(),
            att1: att1.into(),
            att2: att2.into(),
            first_seen: rollup.first_seen,
            last_seen: rollup.last_seen,
            uptime,
        }
    }
}
