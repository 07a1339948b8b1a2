//! Session windowing: merge-intervals-with-tolerance over event timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default inactivity gap that closes a session (15 minutes).
pub const DEFAULT_SESSION_GAP_SECONDS: i64 = 900;

/// A maximal interval of device activity. Consecutive events more than the
/// gap threshold apart land in different sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Session {
    /// A zero-length session from a single event.
    pub fn point(ts: DateTime<Utc>) -> Self {
        Self { start: ts, end: ts }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration().num_seconds() as f64 / 60.0
    }
}

/// Compute session intervals for one device.
///
/// Timestamps are sorted internally, so callers may pass history in any
/// order. A new session opens at the first event and whenever the gap since
/// the previous timestamp reaches `gap_seconds`; otherwise the current
/// session's end extends. Output sessions are ordered by start and
/// non-overlapping. Empty input yields an empty sequence; a single event
/// yields one zero-length session; identical timestamps merge.
pub fn compute_sessions(timestamps: &[DateTime<Utc>], gap_seconds: i64) -> Vec<Session> {
    if timestamps.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<DateTime<Utc>> = timestamps.to_vec();
    sorted.sort_unstable();

    let mut sessions = Vec::new();
    let mut current = Session::point(sorted[0]);

    for &ts in &sorted[1..] {
        if (ts - current.end).num_seconds() >= gap_seconds {
            sessions.push(current);
            current = Session::point(ts);
        } else {
            current.end = ts;
        }
    }

    sessions.push(current);
    sessions
}

/// Per-device derived view: first/last seen plus the session sequence.
/// Recomputed from the device's full event history on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRollup {
    pub device: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sessions: Vec<Session>,
}

impl SessionRollup {
    /// Build a rollup from a device's event timestamps. Returns `None` for
    /// an empty history.
    pub fn from_events(
        device: impl Into<String>,
        timestamps: &[DateTime<Utc>],
        gap_seconds: i64,
    ) -> Option<Self> {
        let sessions = compute_sessions(timestamps, gap_seconds);
        let first = sessions.first()?.start;
        let last = sessions.last()?.end;

        Some(Self {
            device: device.into(),
            first_seen: first,
            last_seen: last,
            sessions,
        })
    }

    /// Sum of session durations, in minutes.
    pub fn total_session_minutes(&self) -> f64 {
        self.sessions.iter().map(Session::duration_minutes).sum()
    }

    /// Minutes between first and last seen.
    pub fn span_minutes(&self) -> f64 {
        (self.last_seen - self.first_seen).num_seconds() as f64 / 60.0
    }
}
