//! Ingest worker: object storage -> event store.
//!
//! Each pass lists the prefix, skips objects the store has already
//! committed, and ingests the rest: fetch with bounded retries, parse the
//! delimited records, append the whole object atomically. Malformed records
//! are counted and skipped; an object that keeps failing marks the job
//! degraded and the pass moves on.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use event_store::EventStore;
use objstore::{ObjectMeta, ObjectSource};
use pipeline_core::{parse_object, ParseStats, Result};
use telemetry::{health, metrics};

/// Ingest worker configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum retries per storage operation
    pub max_retries: u32,
    /// Initial backoff between retries (doubles per attempt)
    pub retry_backoff: Duration,
    /// Accept records with missing trailing attribute columns
    pub add_missing_columns: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            add_missing_columns: false,
        }
    }
}

/// Counts from one ingest pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub objects_ingested: u64,
    pub objects_skipped: u64,
    pub objects_failed: u64,
    pub events_appended: u64,
    pub records_malformed: u64,
    pub records_schema_rejected: u64,
}

/// Worker that tails the object prefix and appends events to the store.
pub struct IngestWorker {
    source: Arc<dyn ObjectSource>,
    store: Arc<EventStore>,
    config: IngestConfig,
}

impl IngestWorker {
    pub fn new(source: Arc<dyn ObjectSource>, store: Arc<EventStore>) -> Self {
        Self::with_config(source, store, IngestConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn ObjectSource>,
        store: Arc<EventStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// One pass over the prefix: list, dedupe, fetch, parse, append.
    pub async fn run_once(&self) -> Result<IngestSummary> {
        let objects = match self.list_with_retry().await {
            Ok(objects) => objects,
            Err(e) => {
                health()
                    .object_source
                    .set_degraded(format!("list failed: {}", e));
                return Err(e);
            }
        };
        health().object_source.set_healthy();
        metrics().objects_listed.inc_by(objects.len() as u64);

        let mut summary = IngestSummary::default();
        for meta in objects {
            if self.store.is_ingested(&meta.key) {
                summary.objects_skipped += 1;
                metrics().objects_skipped_duplicate.inc();
                continue;
            }

            match self.ingest_object(&meta).await {
                Ok(stats) => {
                    summary.objects_ingested += 1;
                    summary.events_appended += stats.parsed;
                    summary.records_malformed += stats.malformed;
                    summary.records_schema_rejected += stats.schema_rejected;
                }
                Err(e) => {
                    summary.objects_failed += 1;
                    metrics().ingest_failures.inc();
                    warn!(object = %meta.key, error = %e, "Giving up on object this pass");
                    health()
                        .ingest
                        .set_degraded(format!("object {}: {}", meta.key, e));
                }
            }
        }

        if summary.objects_failed == 0 {
            health().ingest.set_healthy();
        }

        if summary.objects_ingested > 0 || summary.objects_failed > 0 {
            info!(
                ingested = summary.objects_ingested,
                skipped = summary.objects_skipped,
                failed = summary.objects_failed,
                events = summary.events_appended,
                malformed = summary.records_malformed,
                "Ingest pass complete"
            );
        }

        Ok(summary)
    }

    /// Fetch, parse, and append one object.
    async fn ingest_object(&self, meta: &ObjectMeta) -> Result<ParseStats> {
        let bytes = self.fetch_with_retry(&meta.key).await?;
        let outcome = parse_object(&bytes, self.config.add_missing_columns);

        let m = metrics();
        m.records_parsed.inc_by(outcome.stats.parsed);
        m.records_malformed.inc_by(outcome.stats.malformed);
        m.records_schema_rejected.inc_by(outcome.stats.schema_rejected);
        m.records_columns_added.inc_by(outcome.stats.columns_added);

        let receipt = self.store.append_object(&meta.key, outcome.events)?;
        m.objects_ingested.inc();
        m.events_appended.inc_by(receipt.appended);

        debug!(
            object = %meta.key,
            appended = receipt.appended,
            malformed = outcome.stats.malformed,
            schema_rejected = outcome.stats.schema_rejected,
            "Ingested object"
        );
        Ok(outcome.stats)
    }

    async fn list_with_retry(&self) -> Result<Vec<ObjectMeta>> {
        self.retrying("list", || self.source.list()).await
    }

    async fn fetch_with_retry(&self, key: &str) -> Result<Bytes> {
        self.retrying(key, || self.source.get(key)).await
    }

    /// Run a storage operation with bounded exponential backoff.
    async fn retrying<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    metrics().ingest_retries.inc();
                    warn!(
                        target = what,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient storage error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
