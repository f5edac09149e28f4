//! Per-entry expiry policy (§3).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub enum ExpirePolicy {
    Never,
    AtTime(Instant),
    AfterDuration(Instant, Duration),
}

impl ExpirePolicy {
    pub fn from_px_millis(ms: u64) -> ExpirePolicy {
        ExpirePolicy::AfterDuration(Instant::now(), Duration::from_millis(ms))
    }

    /// Same as `from_px_millis`, but takes the caller's `now` instead of
    /// sampling the clock again, so every expiry set within one dispatch
    /// call uses a consistent instant.
    pub fn after(now: Instant, dur: Duration) -> ExpirePolicy {
        ExpirePolicy::AfterDuration(now, dur)
    }

    pub fn from_deadline(deadline: Instant) -> ExpirePolicy {
        ExpirePolicy::AtTime(deadline)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            ExpirePolicy::Never => false,
            ExpirePolicy::AtTime(at) => now >= *at,
            ExpirePolicy::AfterDuration(created, dur) => now.duration_since(*created) >= *dur,
        }
    }

    /// Remaining time-to-live, or `None` if the key never expires.
    pub fn ttl(&self, now: Instant) -> Option<Duration> {
        match self {
            ExpirePolicy::Never => None,
            ExpirePolicy::AtTime(at) => Some(at.saturating_duration_since(now)),
            ExpirePolicy::AfterDuration(created, dur) => {
                let elapsed = now.duration_since(*created);
                Some(dur.saturating_sub(elapsed))
            }
        }
    }
}
