//! MULTI/EXEC/WATCH state machine (§4.8).
//!
//! WATCH does not need a live "dirty" callback fired from every write:
//! it is enough to snapshot each watched key's version counter and
//! compare against the current counter at EXEC time (§9 "no persistent
//! snapshots").

use bytes::Bytes;

use crate::resp::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Idle,
    Queuing,
}

#[derive(Default)]
pub struct TxState {
    mode: Option<TxMode>,
    queue: Vec<Frame>,
    watched: Vec<(Bytes, u64)>,
}

impl TxState {
    pub fn mode(&self) -> TxMode {
        self.mode.unwrap_or(TxMode::Idle)
    }

    pub fn is_queuing(&self) -> bool {
        self.mode() == TxMode::Queuing
    }

    pub fn begin(&mut self) {
        self.mode = Some(TxMode::Queuing);
        self.queue.clear();
    }

    pub fn queue_command(&mut self, frame: Frame) {
        self.queue.push(frame);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Clears tx and watch state, handing back the queued commands for
    /// EXEC to run. EXEC always clears watches, win or lose.
    pub fn take_for_exec(&mut self) -> Vec<Frame> {
        self.mode = None;
        self.watched.clear();
        std::mem::take(&mut self.queue)
    }

    pub fn discard(&mut self) {
        self.queue.clear();
        self.mode = None;
        self.watched.clear();
    }

    pub fn watch(&mut self, key: Bytes, version: u64) {
        if !self.watched.iter().any(|(k, _)| k == &key) {
            self.watched.push((key, version));
        }
    }

    pub fn unwatch(&mut self) {
        self.watched.clear();
    }

    pub fn watched_keys(&self) -> &[(Bytes, u64)] {
        &self.watched
    }

    pub fn has_watches(&self) -> bool {
        !self.watched.is_empty()
    }

    pub fn clear_watches(&mut self) {
        self.watched.clear();
    }
}
