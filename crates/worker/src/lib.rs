//! Background jobs for the uptime pipeline:
//! - Ingest: object storage -> event store
//! - Rollup refresh: event store -> materialized session view
//! - Flatten writer: session view -> append-only session rows
//! - Uptime writer: session view -> keyed device-uptime table

pub mod flatten;
pub mod ingest;
pub mod rollup;
pub mod run;
pub mod scheduler;
pub mod uptime;

pub use flatten::{FlattenSummary, FlattenWorker};
pub use ingest::{IngestConfig, IngestSummary, IngestWorker};
pub use rollup::{RollupSummary, RollupWorker};
pub use run::{JobRunner, RunHandle};
pub use scheduler::{WorkerConfig, WorkerScheduler};
pub use uptime::{UptimeSummary, UptimeWorker};
