//! Common test setup.

use std::sync::Arc;

use event_store::{
    EventStore, RollupStore, SessionRowTable, StoreConfig, UptimeTable, WatermarkStore,
};
use objstore::{MemoryObjectSource, ObjectSource};
use pipeline_core::session::DEFAULT_SESSION_GAP_SECONDS;
use pipeline_core::JobKind;
use worker::{
    FlattenWorker, IngestConfig, IngestWorker, JobRunner, RollupWorker, UptimeWorker,
};

/// Test context over a temp-dir store and an in-memory object source.
///
/// This exercises the production code paths end to end: real store engine,
/// real workers, real watermark persistence. Only the object storage
/// transport is in-process.
pub struct TestContext {
    dir: tempfile::TempDir,
    pub source: Arc<MemoryObjectSource>,
    pub store: Arc<EventStore>,
    pub rollups: Arc<RollupStore>,
    pub session_rows: Arc<SessionRowTable>,
    pub uptime: Arc<UptimeTable>,
    pub watermarks: Arc<WatermarkStore>,
}

impl TestContext {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = Arc::new(MemoryObjectSource::new());
        Self::open(dir, source)
    }

    /// Re-open every store from the same directory, simulating a process
    /// restart. The object source (external storage) survives unchanged.
    pub fn restart(self) -> Self {
        let TestContext { dir, source, .. } = self;
        Self::open(dir, source)
    }

    fn open(dir: tempfile::TempDir, source: Arc<MemoryObjectSource>) -> Self {
        let root = dir.path().to_path_buf();
        let store = Arc::new(
            EventStore::open(&StoreConfig { root }).expect("Failed to open event store"),
        );
        let rollups = Arc::new(RollupStore::open(store.root()).expect("Failed to open rollups"));
        let session_rows =
            Arc::new(SessionRowTable::open(store.root()).expect("Failed to open session rows"));
        let uptime = Arc::new(UptimeTable::open(store.root()).expect("Failed to open uptime"));
        let watermarks =
            Arc::new(WatermarkStore::open(store.root()).expect("Failed to open watermarks"));

        Self {
            dir,
            source,
            store,
            rollups,
            session_rows,
            uptime,
            watermarks,
        }
    }

    pub fn ingest_worker(&self) -> IngestWorker {
        self.ingest_worker_over(self.source.clone())
    }

    /// Ingest worker over a custom source (e.g. a flaky mock) with fast
    /// retries.
    pub fn ingest_worker_over(&self, source: Arc<dyn ObjectSource>) -> IngestWorker {
        IngestWorker::with_config(
            source,
            self.store.clone(),
            IngestConfig {
                max_retries: 3,
                retry_backoff: std::time::Duration::from_millis(1),
                add_missing_columns: false,
            },
        )
    }

    pub fn rollup_worker(&self) -> RollupWorker {
        RollupWorker::new(
            self.store.clone(),
            self.rollups.clone(),
            DEFAULT_SESSION_GAP_SECONDS,
        )
    }

    pub fn flatten_worker(&self) -> FlattenWorker {
        FlattenWorker::new(
            self.store.clone(),
            self.rollups.clone(),
            self.session_rows.clone(),
        )
    }

    pub fn uptime_worker(&self) -> UptimeWorker {
        UptimeWorker::new(self.store.clone(), self.rollups.clone(), self.uptime.clone())
    }

    pub fn runner(&self, job: JobKind) -> JobRunner {
        JobRunner::new(job, self.watermarks.clone())
    }

    pub fn runner_with_lookback(&self, job: JobKind, lookback_secs: i64) -> JobRunner {
        JobRunner::with_lookback(
            job,
            self.watermarks.clone(),
            chrono::Duration::seconds(lookback_secs),
        )
    }

    /// Drive one full cycle: ingest, rollup refresh, flatten, uptime, each
    /// as a committed windowed run.
    pub async fn drive_cycle(&self) {
        let ingest = self.ingest_worker();
        let ingest_runner = self.runner(JobKind::Ingest);
        let handle = ingest_runner.begin().expect("ingest run in flight");
        ingest.run_once().await.expect("ingest pass failed");
        ingest_runner.commit(&handle).expect("ingest commit failed");

        let rollup = self.rollup_worker();
        let rollup_runner = self.runner(JobKind::RollupRefresh);
        let handle = rollup_runner.begin().expect("rollup run in flight");
        rollup
            .run_window(handle.window)
            .await
            .expect("rollup run failed");
        rollup_runner.commit(&handle).expect("rollup commit failed");

        let flatten = self.flatten_worker();
        let flatten_runner = self.runner_with_lookback(JobKind::FlattenWrite, 60);
        let handle = flatten_runner.begin().expect("flatten run in flight");
        flatten
            .run_window(handle.window)
            .await
            .expect("flatten run failed");
        flatten_runner.commit(&handle).expect("flatten commit failed");

        let uptime = self.uptime_worker();
        let uptime_runner = self.runner(JobKind::UptimeWrite);
        let handle = uptime_runner.begin().expect("uptime run in flight");
        uptime
            .run_window(handle.window)
            .await
            .expect("uptime run failed");
        uptime_runner.commit(&handle).expect("uptime commit failed");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
