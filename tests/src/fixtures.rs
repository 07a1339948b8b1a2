//! Test fixtures and feed-object builders.

use chrono::{DateTime, TimeZone, Utc};
use pipeline_core::event::TIMESTAMP_FORMAT;

/// Base event time shared by the fixtures (2024-03-01 00:00:00 UTC).
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// `base_time` plus `m` minutes.
pub fn minute(m: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::minutes(m)
}

/// One feed line: `device,att1,att2,dt_updated`.
pub fn feed_line(device: &str, att1: &str, att2: &str, ts: DateTime<Utc>) -> String {
    format!(
        "{},{},{},{}",
        device,
        att1,
        att2,
        ts.format(TIMESTAMP_FORMAT)
    )
}

/// A feed object with one event per entry of `minutes`, all for one device.
pub fn feed_object(device: &str, att1: &str, att2: &str, minutes: &[i64]) -> String {
    let mut body = String::new();
    for &m in minutes {
        body.push_str(&feed_line(device, att1, att2, minute(m)));
        body.push('\n');
    }
    body
}

/// A feed object from arbitrary pre-built lines.
pub fn feed_object_from_lines(lines: &[String]) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// The worked example: device with sessions (0,5) and (20,25) under a
/// 15-minute gap, giving uptime 10/25 = 0.4.
pub fn worked_example_object(device: &str) -> String {
    feed_object(device, "fw-2.1", "eu-west", &[0, 5, 20, 25])
}
