use std::time::{SystemTime, UNIX_EPOCH};

/// wall clock in seconds since the epoch, as used for message timestamps
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
