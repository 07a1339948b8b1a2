//! Fleetwatch Uptime Pipeline
//!
//! Streaming ETL over device telemetry:
//! - Ingest: delimited objects from a storage prefix into a partitioned
//!   append-only event store, idempotently per object
//! - Rollup refresh: per-device session windows with a configurable gap
//! - Merge writers: flattened session rows (append + dedup) and device
//!   uptime (keyed upsert), each resuming from a persisted watermark

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use event_store::{EventStore, RollupStore, SessionRowTable, StoreConfig, UptimeTable, WatermarkStore};
use objstore::{FsObjectSource, ObjectSource, ObjectStoreConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{IngestConfig, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Object storage feed to tail
    #[serde(default)]
    source: ObjectStoreConfig,

    /// Local store engine
    #[serde(default)]
    store: StoreConfig,

    /// Inactivity gap that closes a session, in seconds
    #[serde(default = "default_session_gap_seconds")]
    session_gap_seconds: i64,

    /// Overlap re-scanned by the flatten writer, in seconds
    #[serde(default = "default_flatten_lookback_seconds")]
    flatten_lookback_seconds: i64,

    #[serde(default = "default_ingest_interval_secs")]
    ingest_interval_secs: u64,

    #[serde(default = "default_rollup_interval_secs")]
    rollup_interval_secs: u64,

    /// Interval shared by the flatten and uptime writers
    #[serde(default = "default_merge_interval_secs")]
    merge_interval_secs: u64,

    #[serde(default = "default_ingest_max_retries")]
    ingest_max_retries: u32,

    #[serde(default = "default_ingest_retry_backoff_ms")]
    ingest_retry_backoff_ms: u64,

    /// Accept records with missing trailing attribute columns
    #[serde(default)]
    add_missing_columns: bool,
}

fn default_session_gap_seconds() -> i64 {
    pipeline_core::session::DEFAULT_SESSION_GAP_SECONDS
}

fn default_flatten_lookback_seconds() -> i64 {
    60
}

fn default_ingest_interval_secs() -> u64 {
    10
}

fn default_rollup_interval_secs() -> u64 {
    30
}

fn default_merge_interval_secs() -> u64 {
    60
}

fn default_ingest_max_retries() -> u32 {
    3
}

fn default_ingest_retry_backoff_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: ObjectStoreConfig::default(),
            store: StoreConfig::default(),
            session_gap_seconds: default_session_gap_seconds(),
            flatten_lookback_seconds: default_flatten_lookback_seconds(),
            ingest_interval_secs: default_ingest_interval_secs(),
            rollup_interval_secs: default_rollup_interval_secs(),
            merge_interval_secs: default_merge_interval_secs(),
            ingest_max_retries: default_ingest_max_retries(),
            ingest_retry_backoff_ms: default_ingest_retry_backoff_ms(),
            add_missing_columns: false,
        }
    }
}

impl Config {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            ingest_interval: std::time::Duration::from_secs(self.ingest_interval_secs),
            rollup_interval: std::time::Duration::from_secs(self.rollup_interval_secs),
            flatten_interval: std::time::Duration::from_secs(self.merge_interval_secs),
            uptime_interval: std::time::Duration::from_secs(self.merge_interval_secs),
            flatten_lookback_seconds: self.flatten_lookback_seconds,
            session_gap_seconds: self.session_gap_seconds,
            ingest: IngestConfig {
                max_retries: self.ingest_max_retries,
                retry_backoff: std::time::Duration::from_millis(self.ingest_retry_backoff_ms),
                add_missing_columns: self.add_missing_columns,
            },
            ..WorkerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Fleetwatch Uptime Pipeline v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;

    info!(
        source_root = %config.source.root.display(),
        source_prefix = %config.source.prefix,
        store_root = %config.store.root.display(),
        session_gap_seconds = config.session_gap_seconds,
        "Loaded pipeline config"
    );

    // Open the store engine
    let store = Arc::new(EventStore::open(&config.store).context("Failed to open event store")?);
    let rollups =
        Arc::new(RollupStore::open(store.root()).context("Failed to open rollup view")?);
    let session_rows =
        Arc::new(SessionRowTable::open(store.root()).context("Failed to open session-row table")?);
    let uptime =
        Arc::new(UptimeTable::open(store.root()).context("Failed to open uptime table")?);
    let watermarks =
        Arc::new(WatermarkStore::open(store.root()).context("Failed to open watermark store")?);
    health().event_store.set_healthy();

    // Object source feeding the ingest job
    let source: Arc<dyn ObjectSource> = Arc::new(FsObjectSource::new(config.source.clone()));
    check_source_health(source.as_ref()).await;

    // Start background jobs
    let scheduler = Arc::new(WorkerScheduler::new(
        config.worker_config(),
        source,
        store,
        rollups,
        session_rows,
        uptime,
        watermarks,
    ));
    let _job_handles = scheduler.start();

    // Run until shutdown; the jobs coordinate through the store, so there
    // is nothing else to drive here.
    shutdown_signal().await;

    info!("Shutting down...");
    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("FLEETWATCH")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested config from environment
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(root) = std::env::var("FLEETWATCH_SOURCE_ROOT") {
        config.source.root = root.into();
    }
    if let Ok(prefix) = std::env::var("FLEETWATCH_SOURCE_PREFIX") {
        config.source.prefix = prefix;
    }
    if let Ok(root) = std::env::var("FLEETWATCH_STORE_ROOT") {
        config.store.root = root.into();
    }

    if config.session_gap_seconds <= 0 {
        anyhow::bail!(
            "session_gap_seconds must be positive, got {}",
            config.session_gap_seconds
        );
    }

    Ok(config)
}

/// Check the object source on startup.
async fn check_source_health(source: &dyn ObjectSource) {
    match source.list().await {
        Ok(objects) => {
            health().object_source.set_healthy();
            info!(objects = objects.len(), "Object source: healthy");
        }
        Err(e) => {
            // The prefix may simply not exist yet; ingest keeps retrying.
            health().object_source.set_degraded(e.to_string());
            tracing::warn!("Object source: degraded ({})", e);
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
