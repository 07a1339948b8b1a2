//! Internal metrics collection.
//!
//! Collected in-memory and logged as a snapshot on a fixed interval; per-run
//! counts are also attached to job log events as structured fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for run-latency tracking. Job runs are file-scan bound, so
/// the buckets stretch from milliseconds to a full minute.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 5ms, 25ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 15s, 30s, 60s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [
        5, 25, 100, 250, 500, 1000, 2500, 5000, 15000, 30000, 60000,
    ];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingest
    pub objects_listed: Counter,
    pub objects_ingested: Counter,
    pub objects_skipped_duplicate: Counter,
    pub records_parsed: Counter,
    pub records_malformed: Counter,
    pub records_schema_rejected: Counter,
    pub records_columns_added: Counter,
    pub events_appended: Counter,
    pub ingest_retries: Counter,
    pub ingest_failures: Counter,

    // Rollup refresh
    pub rollup_runs: Counter,
    pub devices_refreshed: Counter,

    // Flatten writer
    pub flatten_runs: Counter,
    pub session_rows_written: Counter,
    pub session_rows_deduplicated: Counter,

    // Uptime writer
    pub uptime_runs: Counter,
    pub uptime_rows_inserted: Counter,
    pub uptime_rows_replaced: Counter,

    // Run latencies
    pub ingest_latency_ms: Histogram,
    pub rollup_latency_ms: Histogram,
    pub flatten_latency_ms: Histogram,
    pub uptime_latency_ms: Histogram,

    // Gauges
    pub devices_tracked: Gauge,
    pub jobs_degraded: Gauge,
    pub runs_skipped_overrun: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub objects_listed: u64,
    pub objects_ingested: u64,
    pub objects_skipped_duplicate: u64,
    pub records_parsed: u64,
    pub records_malformed: u64,
    pub records_schema_rejected: u64,
    pub events_appended: u64,
    pub ingest_retries: u64,
    pub ingest_failures: u64,
    pub rollup_runs: u64,
    pub devices_refreshed: u64,
    pub flatten_runs: u64,
    pub session_rows_written: u64,
    pub session_rows_deduplicated: u64,
    pub uptime_runs: u64,
    pub uptime_rows_inserted: u64,
    pub uptime_rows_replaced: u64,
    pub ingest_latency_mean_ms: f64,
    pub rollup_latency_mean_ms: f64,
    pub flatten_latency_mean_ms: f64,
    pub uptime_latency_mean_ms: f64,
    pub devices_tracked: u64,
    pub jobs_degraded: u64,
    pub runs_skipped_overrun: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            objects_listed: self.objects_listed.get(),
            objects_ingested: self.objects_ingested.get(),
            objects_skipped_duplicate: self.objects_skipped_duplicate.get(),
            records_parsed: self.records_parsed.get(),
            records_malformed: self.records_malformed.get(),
            records_schema_rejected: self.records_schema_rejected.get(),
            events_appended: self.events_appended.get(),
            ingest_retries: self.ingest_retries.get(),
            ingest_failures: self.ingest_failures.get(),
            rollup_runs: self.rollup_runs.get(),
            devices_refreshed: self.devices_refreshed.get(),
            flatten_runs: self.flatten_runs.get(),
            session_rows_written: self.session_rows_written.get(),
            session_rows_deduplicated: self.session_rows_deduplicated.get(),
            uptime_runs: self.uptime_runs.get(),
            uptime_rows_inserted: self.uptime_rows_inserted.get(),
            uptime_rows_replaced: self.uptime_rows_replaced.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            rollup_latency_mean_ms: self.rollup_latency_ms.mean(),
            flatten_latency_mean_ms: self.flatten_latency_ms.mean(),
            uptime_latency_mean_ms: self.uptime_latency_ms.mean(),
            devices_tracked: self.devices_tracked.get(),
            jobs_degraded: self.jobs_degraded.get(),
            runs_skipped_overrun: self.runs_skipped_overrun.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
