//! Epoch-millisecond helpers used throughout presence and health.

use chrono::Utc;

/// Current wall-clock time as epoch milliseconds.
///
/// Sessions, last-seen timestamps, and Date headers are all exchanged as
/// decimal epoch-ms strings or integers on the wire, never as a
/// language-specific timestamp type.
pub fn epoch_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-millisecond timestamp as the decimal string form
/// stored in the presence last-seen key.
pub fn epoch_millis_to_string(millis: i64) -> String {
    millis.to_string()
}

/// Parse a presence last-seen value back into epoch milliseconds.
///
/// Returns `None` for anything that isn't a plain decimal integer, which
/// callers treat as a cache-miss-worthy malformed value per the spec.
pub fn parse_epoch_millis(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}
