use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix epoch time in milliseconds.
pub(crate) fn current_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
