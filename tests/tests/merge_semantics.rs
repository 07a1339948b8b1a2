//! Idempotence, upsert, and restart semantics of the merge writers.

use integration_tests::{fixtures, setup::TestContext};

use event_store::query;
use pipeline_core::JobKind;

/// Re-running the flatten job over a fully overlapping window produces the
/// same set of distinct (device, start, end) rows.
#[tokio::test]
async fn flatten_is_idempotent_under_overlap() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::worked_example_object("dev-a"));
    ctx.drive_cycle().await;
    assert_eq!(ctx.session_rows.row_count(), 2);

    // An hour of lookback makes every committed event recur in the window.
    let worker = ctx.flatten_worker();
    let runner = ctx.runner_with_lookback(JobKind::FlattenWrite, 3600);

    for _ in 0..3 {
        let handle = runner.begin().unwrap();
        let summary = worker.run_window(handle.window).await.unwrap();
        assert_eq!(summary.rows_written, 0);
        assert_eq!(summary.rows_deduplicated, 2);
        runner.commit(&handle).unwrap();
    }

    assert_eq!(ctx.session_rows.row_count(), 2);
}

/// After any sequence of runs, the uptime table holds exactly one row per
/// device that ever appeared in the source.
#[tokio::test]
async fn uptime_table_has_one_row_per_device_ever_seen() {
    let ctx = TestContext::new();

    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0, 5]));
    ctx.drive_cycle().await;

    ctx.source
        .put("feed/b.csv", fixtures::feed_object("dev-b", "fw", "eu", &[0]));
    ctx.source
        .put("feed/c.csv", fixtures::feed_object("dev-c", "fw", "eu", &[3, 90]));
    ctx.drive_cycle().await;

    // More data for already-known devices.
    ctx.source
        .put("feed/d.csv", fixtures::feed_object("dev-a", "fw", "eu", &[200]));
    ctx.drive_cycle().await;
    ctx.drive_cycle().await;

    let devices: Vec<_> = query::uptime_rows(&ctx.uptime)
        .into_iter()
        .map(|r| r.device)
        .collect();
    assert_eq!(devices, vec!["dev-a", "dev-b", "dev-c"]);
}

/// Killing the uptime writer after its table write but before the watermark
/// commit, then restarting, must not leave partial or duplicate rows.
#[tokio::test]
async fn uptime_restart_mid_batch_does_not_duplicate() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::worked_example_object("dev-a"));

    // Ingest and refresh, but crash the uptime job between its write and
    // its watermark commit.
    let ingest_runner = ctx.runner(JobKind::Ingest);
    let handle = ingest_runner.begin().unwrap();
    ctx.ingest_worker().run_once().await.unwrap();
    ingest_runner.commit(&handle).unwrap();

    let rollup_runner = ctx.runner(JobKind::RollupRefresh);
    let handle = rollup_runner.begin().unwrap();
    ctx.rollup_worker().run_window(handle.window).await.unwrap();
    rollup_runner.commit(&handle).unwrap();

    let crashed_runner = ctx.runner(JobKind::UptimeWrite);
    let handle = crashed_runner.begin().unwrap();
    ctx.uptime_worker().run_window(handle.window).await.unwrap();
    // No commit: the process dies here.
    drop(crashed_runner);

    // Restart: the job resumes from the un-advanced watermark and re-scans
    // the same window.
    let ctx = ctx.restart();
    assert_eq!(ctx.watermarks.load(JobKind::UptimeWrite).watermark, None);

    let runner = ctx.runner(JobKind::UptimeWrite);
    let handle = runner.begin().unwrap();
    let summary = ctx.uptime_worker().run_window(handle.window).await.unwrap();
    runner.commit(&handle).unwrap();

    // The re-applied batch replaced the committed row instead of adding one.
    assert_eq!(summary.rows_replaced, 1);
    assert_eq!(ctx.uptime.row_count(), 1);
    assert_eq!(
        query::uptime_for_device(&ctx.uptime, "dev-a").unwrap().uptime,
        Some(0.4)
    );
}

/// The flatten dedup index is rebuilt from the table file on restart.
#[tokio::test]
async fn flatten_dedup_survives_restart() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::worked_example_object("dev-a"));
    ctx.drive_cycle().await;
    assert_eq!(ctx.session_rows.row_count(), 2);

    let ctx = ctx.restart();

    let worker = ctx.flatten_worker();
    let runner = ctx.runner_with_lookback(JobKind::FlattenWrite, 3600);
    let handle = runner.begin().unwrap();
    let summary = worker.run_window(handle.window).await.unwrap();

    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.rows_deduplicated, 2);
    assert_eq!(ctx.session_rows.row_count(), 2);
}

/// Watermarks persist across restarts and windows resume from them.
#[tokio::test]
async fn jobs_resume_from_persisted_watermarks() {
    let ctx = TestContext::new();
    ctx.source
        .put("feed/a.csv", fixtures::feed_object("dev-a", "fw", "eu", &[0]));
    ctx.drive_cycle().await;

    let committed = ctx
        .watermarks
        .load(JobKind::UptimeWrite)
        .watermark
        .expect("watermark committed");

    let ctx = ctx.restart();
    let state = ctx.watermarks.load(JobKind::UptimeWrite);
    assert_eq!(state.watermark, Some(committed));
    assert_eq!(state.runs_committed, 1);

    // The next run starts where the last one committed.
    let runner = ctx.runner(JobKind::UptimeWrite);
    let handle = runner.begin().unwrap();
    assert_eq!(handle.window.start, Some(committed));
}
