//! Ingest failure modes: malformed records, duplicate delivery, transient
//! storage errors, and schema mismatches.

use std::sync::Arc;

use integration_tests::{fixtures, mocks::FlakyObjectSource, setup::TestContext};

use event_store::query;
use worker::{IngestConfig, IngestWorker};

/// Malformed records are skipped and counted, never fatal to the object.
#[tokio::test]
async fn malformed_records_are_skipped_and_counted() {
    let ctx = TestContext::new();
    let lines = vec![
        fixtures::feed_line("dev-a", "fw", "eu", fixtures::minute(0)),
        "dev-a,fw,eu,not-a-timestamp".to_string(),
        fixtures::feed_line("dev-a", "fw", "eu", fixtures::minute(5)),
        ",fw,eu,2024-03-01 00:10:00".to_string(), // empty device
    ];
    ctx.source
        .put("feed/a.csv", fixtures::feed_object_from_lines(&lines));

    let summary = ctx.ingest_worker().run_once().await.unwrap();

    assert_eq!(summary.objects_ingested, 1);
    assert_eq!(summary.events_appended, 2);
    assert_eq!(summary.records_malformed, 2);
    assert_eq!(query::count_events(&ctx.store), 2);
}

/// Records with a wrong column count are schema mismatches: rejected by
/// default, accepted with defaults when add_missing_columns is on.
#[tokio::test]
async fn short_records_follow_add_missing_columns_policy() {
    let ctx = TestContext::new();
    let body = "dev-a,2024-03-01 00:00:00\ndev-a,fw,eu,2024-03-01 00:05:00\n";
    ctx.source.put("feed/a.csv", body);

    let strict = ctx.ingest_worker().run_once().await.unwrap();
    assert_eq!(strict.events_appended, 1);
    assert_eq!(strict.records_schema_rejected, 1);

    // Same payload under a lenient worker, as a fresh object.
    ctx.source.put("feed/b.csv", body);
    let lenient = IngestWorker::with_config(
        ctx.source.clone(),
        ctx.store.clone(),
        IngestConfig {
            max_retries: 1,
            retry_backoff: std::time::Duration::from_millis(1),
            add_missing_columns: true,
        },
    );
    let summary = lenient.run_once().await.unwrap();
    assert_eq!(summary.events_appended, 2);
    assert_eq!(summary.records_schema_rejected, 0);
}

/// Redelivery of a committed object appends nothing.
#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0, 5]));

    let first = ctx.ingest_worker().run_once().await.unwrap();
    assert_eq!(first.objects_ingested, 1);

    // The object is still listed on the next pass (storage redelivers).
    let second = ctx.ingest_worker().run_once().await.unwrap();
    assert_eq!(second.objects_ingested, 0);
    assert_eq!(second.objects_skipped, 1);
    assert_eq!(query::count_events(&ctx.store), 2);
}

/// Transient fetch errors are retried with backoff until they clear.
#[tokio::test]
async fn transient_get_failures_retry_then_succeed() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0]));

    let flaky = Arc::new(FlakyObjectSource::new(ctx.source.clone()));
    flaky.fail_next_gets(2); // fewer than max_retries = 3

    let summary = ctx.ingest_worker_over(flaky).run_once().await.unwrap();
    assert_eq!(summary.objects_ingested, 1);
    assert_eq!(summary.objects_failed, 0);
    assert_eq!(query::count_events(&ctx.store), 1);
}

/// When retries are exhausted the object is abandoned for the pass and the
/// job keeps going; the next pass picks it up cleanly.
#[tokio::test]
async fn exhausted_retries_degrade_without_stopping() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0]));
    ctx.source
        .put("feed/b.csv", fixtures::feed_object("dev-b", "fw", "eu", &[0]));

    let flaky = Arc::new(FlakyObjectSource::new(ctx.source.clone()));
    // First object burns its initial attempt plus all 3 retries.
    flaky.fail_next_gets(4);

    let summary = ctx
        .ingest_worker_over(flaky.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.objects_failed, 1);
    assert_eq!(summary.objects_ingested, 1); // the second object still landed

    // Storage recovered: the failed object ingests on the next pass.
    let retry = ctx.ingest_worker_over(flaky).run_once().await.unwrap();
    assert_eq!(retry.objects_ingested, 1);
    assert_eq!(retry.objects_failed, 0);
    assert_eq!(query::count_events(&ctx.store), 2);
}

/// A listing failure fails the pass; nothing is partially applied.
#[tokio::test]
async fn listing_failure_fails_the_pass_cleanly() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0]));

    let flaky = Arc::new(FlakyObjectSource::new(ctx.source.clone()));
    flaky.fail_next_lists(10); // outlasts every retry

    let err = ctx
        .ingest_worker_over(flaky.clone())
        .run_once()
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(query::count_events(&ctx.store), 0);

    flaky.fail_next_lists(0);
    let summary = ctx.ingest_worker_over(flaky).run_once().await.unwrap();
    assert_eq!(summary.objects_ingested, 1);
}
