//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns the current Unix timestamp in microseconds, the unit all wire
/// timestamps (`player/time`, `source/time`, `SessionInfo::now`,
/// `AudioFrame::timestamp_us`) are expressed in.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_positive() {
        assert!(now_millis() > 0);
    }

    #[test]
    fn now_micros_is_roughly_a_thousand_times_millis() {
        let millis = now_millis() as i64;
        let micros = now_micros();
        assert!((micros / 1000 - millis).abs() < 50);
    }
}
