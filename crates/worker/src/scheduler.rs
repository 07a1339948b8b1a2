//! Worker scheduler for the periodic pipeline jobs.
//!
//! One tokio task per job, driven by an interval ticker. Jobs coordinate
//! only through the stores: no shared mutable state crosses task
//! boundaries. A tick that lands while the previous run is still in flight
//! is skipped (the runner refuses a second begin).

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use event_store::{EventStore, RollupStore, SessionRowTable, UptimeTable, WatermarkStore};
use objstore::ObjectSource;
use pipeline_core::JobKind;
use telemetry::{health, metrics};

use crate::flatten::FlattenWorker;
use crate::ingest::{IngestConfig, IngestWorker};
use crate::rollup::RollupWorker;
use crate::run::JobRunner;
use crate::uptime::UptimeWorker;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Object prefix poll interval
    pub ingest_interval: Duration,
    /// Rollup view refresh interval
    pub rollup_interval: Duration,
    /// Flatten writer interval
    pub flatten_interval: Duration,
    /// Uptime writer interval
    pub uptime_interval: Duration,
    /// Overlap re-scanned by the flatten writer
    pub flatten_lookback_seconds: i64,
    /// Inactivity gap that closes a session
    pub session_gap_seconds: i64,
    /// Metrics snapshot / health report logging interval
    pub telemetry_interval: Duration,
    pub ingest: IngestConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingest_interval: Duration::from_secs(10),
            rollup_interval: Duration::from_secs(30),
            flatten_interval: Duration::from_secs(60), // 1 minute
            uptime_interval: Duration::from_secs(60),  // 1 minute
            flatten_lookback_seconds: 60,
            session_gap_seconds: pipeline_core::session::DEFAULT_SESSION_GAP_SECONDS,
            telemetry_interval: Duration::from_secs(60),
            ingest: IngestConfig::default(),
        }
    }
}

/// Background job scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    source: Arc<dyn ObjectSource>,
    store: Arc<EventStore>,
    rollups: Arc<RollupStore>,
    session_rows: Arc<SessionRowTable>,
    uptime: Arc<UptimeTable>,
    watermarks: Arc<WatermarkStore>,
}

impl WorkerScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn ObjectSource>,
        store: Arc<EventStore>,
        rollups: Arc<RollupStore>,
        session_rows: Arc<SessionRowTable>,
        uptime: Arc<UptimeTable>,
        watermarks: Arc<WatermarkStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            rollups,
            session_rows,
            uptime,
            watermarks,
        }
    }

    /// Starts all background jobs.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_ingest_loop().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_rollup_loop().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_flatten_loop().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_uptime_loop().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_telemetry_loop().await;
        }));

        info!("Background jobs started");
        handles
    }

    async fn run_ingest_loop(&self) {
        let worker = IngestWorker::with_config(
            self.source.clone(),
            self.store.clone(),
            self.config.ingest.clone(),
        );
        let runner = JobRunner::new(JobKind::Ingest, self.watermarks.clone());
        let mut ticker = self.ticker(self.config.ingest_interval);

        loop {
            ticker.tick().await;
            let Some(handle) = Self::try_begin(&runner) else {
                continue;
            };

            let started = Instant::now();
            match worker.run_once().await {
                Ok(_) => {
                    metrics()
                        .ingest_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    Self::commit(&runner, &handle);
                }
                Err(e) => {
                    error!(job = %runner.job(), error = %e, "Ingest pass failed");
                    health().ingest.set_degraded(e.to_string());
                    runner.abandon(&handle);
                }
            }
        }
    }

    async fn run_rollup_loop(&self) {
        let worker = RollupWorker::new(
            self.store.clone(),
            self.rollups.clone(),
            self.config.session_gap_seconds,
        );
        let runner = JobRunner::new(JobKind::RollupRefresh, self.watermarks.clone());
        let mut ticker = self.ticker(self.config.rollup_interval);

        loop {
            ticker.tick().await;
            let Some(handle) = Self::try_begin(&runner) else {
                continue;
            };

            let started = Instant::now();
            match worker.run_window(handle.window).await {
                Ok(_) => {
                    metrics().rollup_runs.inc();
                    metrics()
                        .rollup_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    health().rollup_refresh.set_healthy();
                    Self::commit(&runner, &handle);
                }
                Err(e) => {
                    error!(job = %runner.job(), error = %e, "Rollup refresh failed");
                    health().rollup_refresh.set_degraded(e.to_string());
                    runner.abandon(&handle);
                }
            }
        }
    }

    async fn run_flatten_loop(&self) {
        let worker = FlattenWorker::new(
            self.store.clone(),
            self.rollups.clone(),
            self.session_rows.clone(),
        );
        let runner = JobRunner::with_lookback(
            JobKind::FlattenWrite,
            self.watermarks.clone(),
            chrono::Duration::seconds(self.config.flatten_lookback_seconds),
        );
        let mut ticker = self.ticker(self.config.flatten_interval);

        loop {
            ticker.tick().await;
            let Some(handle) = Self::try_begin(&runner) else {
                continue;
            };

            let started = Instant::now();
            match worker.run_window(handle.window).await {
                Ok(_) => {
                    metrics().flatten_runs.inc();
                    metrics()
                        .flatten_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    health().flatten_write.set_healthy();
                    Self::commit(&runner, &handle);
                }
                Err(e) => {
                    error!(job = %runner.job(), error = %e, "Flatten run failed");
                    health().flatten_write.set_degraded(e.to_string());
                    runner.abandon(&handle);
                }
            }
        }
    }

    async fn run_uptime_loop(&self) {
        let worker = UptimeWorker::new(
            self.store.clone(),
            self.rollups.clone(),
            self.uptime.clone(),
        );
        let runner = JobRunner::new(JobKind::UptimeWrite, self.watermarks.clone());
        let mut ticker = self.ticker(self.config.uptime_interval);

        loop {
            ticker.tick().await;
            let Some(handle) = Self::try_begin(&runner) else {
                continue;
            };

            let started = Instant::now();
            match worker.run_window(handle.window).await {
                Ok(_) => {
                    metrics().uptime_runs.inc();
                    metrics()
                        .uptime_latency_ms
                        .observe(started.elapsed().as_millis() as u64);
                    health().uptime_write.set_healthy();
                    Self::commit(&runner, &handle);
                }
                Err(e) => {
                    error!(job = %runner.job(), error = %e, "Uptime run failed");
                    health().uptime_write.set_degraded(e.to_string());
                    runner.abandon(&handle);
                }
            }
        }
    }

    async fn run_telemetry_loop(&self) {
        let mut ticker = self.ticker(self.config.telemetry_interval);

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                events_appended = snapshot.events_appended,
                records_malformed = snapshot.records_malformed,
                devices_tracked = snapshot.devices_tracked,
                session_rows_written = snapshot.session_rows_written,
                uptime_rows_inserted = snapshot.uptime_rows_inserted,
                uptime_rows_replaced = snapshot.uptime_rows_replaced,
                runs_skipped_overrun = snapshot.runs_skipped_overrun,
                "Pipeline metrics"
            );

            let report = health().report();
            let unhealthy = report
                .components
                .iter()
                .filter(|c| !c.status.is_healthy())
                .count();
            metrics().jobs_degraded.set(unhealthy as u64);
            if !report.status.is_healthy() {
                for component in report.components.iter().filter(|c| !c.status.is_healthy()) {
                    warn!(
                        component = %component.name,
                        status = ?component.status,
                        message = component.message.as_deref().unwrap_or(""),
                        "Component not healthy"
                    );
                }
            }
        }
    }

    /// Overrun policy: skip the tick rather than queueing behind a slow run.
    fn ticker(&self, period: Duration) -> tokio::time::Interval {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    fn try_begin(runner: &JobRunner) -> Option<crate::run::RunHandle> {
        let handle = runner.begin();
        if handle.is_none() {
            metrics().runs_skipped_overrun.inc();
            warn!(job = %runner.job(), "Previous run still in flight, skipping tick");
        }
        handle
    }

    fn commit(runner: &JobRunner, handle: &crate::run::RunHandle) {
        if let Err(e) = runner.commit(handle) {
            // A refused commit means the watermark moved under us; the next
            // run re-reads it.
            error!(job = %runner.job(), error = %e, "Watermark commit refused");
        }
    }
}
