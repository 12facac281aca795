//! # Timestamp Module
//!
//! Conversion between calendar instants and the store's native timestamp:
//! a signed count of microseconds since 1601-01-01T00:00:00. All instants are
//! treated as local-naive; no time zone is applied in either direction.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::constants::MICROS_PER_DAY;

/// Milliseconds between 1601-01-01 and 1970-01-01.
const EPOCH_OFFSET_MILLIS: i64 = 11_644_473_600_000;

/// Encode a calendar instant as native microseconds since 1601.
///
/// The offset is computed at millisecond precision and scaled to microseconds.
pub fn to_native(instant: NaiveDateTime) -> i64 {
    instant
        .and_utc()
        .timestamp_millis()
        .saturating_add(EPOCH_OFFSET_MILLIS)
        .saturating_mul(1000)
}

/// Decode a native timestamp. Zero, negative and out-of-range values are invalid.
pub fn from_native(native: i64) -> Option<NaiveDateTime> {
    if native <= 0 {
        return None;
    }
    let unix_millis = (native / 1000).checked_sub(EPOCH_OFFSET_MILLIS)?;
    chrono::DateTime::from_timestamp_millis(unix_millis).map(|dt| dt.naive_utc())
}

/// Render a native timestamp as `dd-mm-yyyy HH:MM:SS`, or `Unknown` when invalid.
pub fn format_native(native: i64) -> String {
    match from_native(native) {
        Some(instant) => instant.format("%d-%m-%Y %H:%M:%S").to_string(),
        None => {
            debug!(native, "unknown timestamp");
            "Unknown".to_string()
        }
    }
}

/// Half-open interval `[start, end)` in native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    /// The 24 hours starting at midnight of `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        let start = to_native(date.and_time(chrono::NaiveTime::MIN));
        Self {
            start,
            end: start.saturating_add(MICROS_PER_DAY),
        }
    }

    pub fn contains(&self, native: i64) -> bool {
        native >= self.start && native < self.end
    }
}
