//! Shared utility functions used across multiple modules.

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Interpret a Unix-millisecond timestamp as local wall-clock time.
pub fn millis_to_local_naive(timestamp_ms: i64) -> NaiveDateTime {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(
            || chrono::DateTime::<Utc>::UNIX_EPOCH.naive_utc(),
            |dt| dt.naive_local(),
        )
}

/// Convert local wall-clock time back to Unix milliseconds.
///
/// Falls back to a UTC interpretation for wall-clock values that do not exist
/// in the local zone (DST gaps).
pub fn local_naive_to_millis(naive: NaiveDateTime) -> i64 {
    Local.from_local_datetime(&naive).earliest().map_or_else(
        || Utc.from_utc_datetime(&naive).timestamp_millis(),
        |dt| dt.timestamp_millis(),
    )
}
