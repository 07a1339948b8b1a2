//! End-to-end tests for the full pipeline:
//! object source -> ingest -> event store -> rollup view -> merge writers.

use integration_tests::{fixtures, setup::TestContext};

use event_store::query;

/// The worked example end to end: device A with sessions (0,5) and (20,25),
/// device B with a single event.
#[tokio::test]
async fn full_pipeline_worked_example() {
    let ctx = TestContext::new();
    ctx.source.put(
        "feed/2024-03-01/a.csv",
        fixtures::worked_example_object("dev-a"),
    );
    ctx.source.put(
        "feed/2024-03-01/b.csv",
        fixtures::feed_object("dev-b", "fw-1.0", "us-east", &[0]),
    );

    ctx.drive_cycle().await;

    // Events landed, partitioned and deduped by object.
    assert_eq!(query::count_events(&ctx.store), 5);
    assert_eq!(
        query::distinct_devices(&ctx.store).unwrap(),
        vec!["dev-a", "dev-b"]
    );

    // Rollup view: two sessions for A, one zero-length for B.
    let rollup_a = ctx.rollups.get("dev-a").unwrap();
    assert_eq!(rollup_a.sessions.len(), 2);
    assert_eq!(rollup_a.first_seen, fixtures::minute(0));
    assert_eq!(rollup_a.last_seen, fixtures::minute(25));

    // Flattened session rows: one per (device, session).
    let rows_a = query::session_rows_for_device(&ctx.session_rows, "dev-a").unwrap();
    assert_eq!(rows_a.len(), 2);
    assert_eq!(rows_a[0].duration_minutes, 5.0);
    assert_eq!(rows_a[1].session_start, fixtures::minute(20));
    assert!(rows_a.iter().all(|r| r.att1 == "fw-2.1"));

    let rows_b = query::session_rows_for_device(&ctx.session_rows, "dev-b").unwrap();
    assert_eq!(rows_b.len(), 1);
    assert_eq!(rows_b[0].duration_minutes, 0.0);

    // Uptime: 10 session minutes over a 25-minute span for A; defined-null
    // for single-event B.
    let uptime_a = query::uptime_for_device(&ctx.uptime, "dev-a").unwrap();
    assert_eq!(uptime_a.uptime, Some(0.4));
    let uptime_b = query::uptime_for_device(&ctx.uptime, "dev-b").unwrap();
    assert_eq!(uptime_b.uptime, None);

    assert_eq!(ctx.uptime.row_count(), 2);
}

/// Late-arriving data extends the device's session; the flatten table keeps
/// both generations of bounds while the uptime row is replaced in place.
#[tokio::test]
async fn late_data_extends_sessions_and_replaces_uptime() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0, 5]));
    ctx.drive_cycle().await;

    assert_eq!(ctx.session_rows.row_count(), 1);
    assert_eq!(
        query::uptime_for_device(&ctx.uptime, "dev-a").unwrap().uptime,
        Some(1.0)
    );

    // A second object lands within the session gap.
    ctx.source
        .put("feed/b.csv", fixtures::feed_object("dev-a", "fw", "eu", &[10]));
    ctx.drive_cycle().await;

    // The rollup merged everything into one session (0,10).
    let rollup = ctx.rollups.get("dev-a").unwrap();
    assert_eq!(rollup.sessions.len(), 1);
    assert_eq!(rollup.last_seen, fixtures::minute(10));

    // Old bounds stay as history; new bounds appended; no duplicates.
    let rows = query::session_rows_for_device(&ctx.session_rows, "dev-a").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].session_end, fixtures::minute(5));
    assert_eq!(rows[1].session_end, fixtures::minute(10));

    // Exactly one live uptime row, replaced with the new span.
    assert_eq!(ctx.uptime.row_count(), 1);
    assert_eq!(
        query::uptime_for_device(&ctx.uptime, "dev-a").unwrap().uptime,
        Some(1.0)
    );
}

/// A batch touching one device must not rewrite another device's outputs.
#[tokio::test]
async fn batches_are_isolated_per_device() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::worked_example_object("dev-a"));
    ctx.drive_cycle().await;

    let before = query::uptime_for_device(&ctx.uptime, "dev-a").unwrap();

    ctx.source
        .put("feed/b.csv", fixtures::feed_object("dev-b", "fw", "us", &[100, 104]));
    ctx.drive_cycle().await;

    assert_eq!(ctx.uptime.row_count(), 2);
    assert_eq!(query::uptime_for_device(&ctx.uptime, "dev-a").unwrap(), before);
}

/// Driving the pipeline over an empty feed commits watermarks and writes
/// nothing.
#[tokio::test]
async fn empty_feed_cycle_is_a_noop() {
    let ctx = TestContext::new();
    ctx.drive_cycle().await;

    assert_eq!(query::count_events(&ctx.store), 0);
    assert_eq!(ctx.session_rows.row_count(), 0);
    assert_eq!(ctx.uptime.row_count(), 0);
    assert!(ctx.rollups.is_empty());
}
