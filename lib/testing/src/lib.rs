//! Fixtures shared by the workspace's tests.

pub mod platform;
pub mod repository;

use chrono::{DateTime, Utc};

/// Deterministic 40 character hex sha for `seed`.
pub fn sha(seed: u64) -> String {
    format!("{seed:040x}")
}

/// Parses an RFC 3339 timestamp, panicking on invalid input.
pub fn datetime(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}
