//! Watermark and run-window types for the periodic jobs.
//!
//! Every job persists the `end` of its last committed window and resumes
//! from it after a restart. A missing watermark means START_FROM=BEGINNING.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The periodic jobs, each owning one watermark document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ingest,
    RollupRefresh,
    FlattenWrite,
    UptimeWrite,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::RollupRefresh => "rollup_refresh",
            Self::FlattenWrite => "flatten_write",
            Self::UptimeWrite => "uptime_write",
        }
    }

    pub fn all() -> [JobKind; 4] {
        [
            Self::Ingest,
            Self::RollupRefresh,
            Self::FlattenWrite,
            Self::UptimeWrite,
        ]
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted watermark state for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkState {
    pub job: JobKind,
    /// Commit-time watermark; `None` until the first run commits
    pub watermark: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub runs_committed: u64,
}

impl WatermarkState {
    pub fn initial(job: JobKind, now: DateTime<Utc>) -> Self {
        Self {
            job,
            watermark: None,
            updated_at: now,
            runs_committed: 0,
        }
    }
}

/// A half-open commit-time window `[start, end)` for one run.
/// `start = None` scans from the beginning of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl RunWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether a commit time falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        match self.start {
            Some(start) => ts >= start && ts < self.end,
            None => ts < self.end,
        }
    }
}

impl std::fmt::Display for RunWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}, {})", start.to_rfc3339(), self.end.to_rfc3339()),
            None => write!(f, "[beginning, {})", self.end.to_rfc3339()),
        }
    }
}

/// Run lifecycle for a windowed job: Idle -> Running -> Committed -> Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(RunWindow),
    Committed(DateTime<Utc>),
}
