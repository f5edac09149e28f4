//! Persisted-state sink. RDB/AOF on-disk formats are out of scope (§6);
//! the core only needs somewhere to hand off the replication journal as
//! it grows. `PersistenceSink` is that seam — this pass ships the
//! logging-only implementation the spec calls for (§6, §9 Non-goals).

use tracing::debug;

/// Receives write-command bytes as they're appended to the replication
/// journal. A future on-disk implementation (AOF-style) would write
/// `bytes` to a file here; this one only logs.
pub trait PersistenceSink: Send {
    fn on_append(&mut self, offset: u64, bytes: &[u8]);
}

#[derive(Default)]
pub struct LoggingSink;

impl PersistenceSink for LoggingSink {
    fn on_append(&mut self, offset: u64, bytes: &[u8]) {
        debug!(offset, len = bytes.len(), "journal append (persistence disabled)");
    }
}
