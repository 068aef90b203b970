// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UTC timestamp helpers used across the workspace.
//!
//! All persisted timestamps are RFC 3339 with millisecond precision so that
//! lexicographic ordering matches chronological ordering in SQLite.

use chrono::{DateTime, Utc};

/// Current UTC time formatted for persistence.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Current UTC time as epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC calendar date (`YYYY-MM-DD`), used for per-day dedup keys.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Parse an RFC 3339 timestamp produced by [`now_iso`].
pub fn parse_iso(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
