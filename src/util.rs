//! Small timestamp helpers shared by expiry, stream IDs, and INFO output.

use chrono::Utc;

/// Milliseconds since the Unix epoch, used as the `ms` component of
/// auto-generated stream IDs and nowhere else time-sensitive (the event
/// loop uses `Instant` for expiry/deadline math).
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Seconds since the Unix epoch, for INFO's `run_id` and similar.
pub fn unix_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
