//! Master-side command journal + replica ACK tracking, and the
//! replica-side PSYNC handshake state machine (§4.11).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Instant;

use mio::Token;
use rand::Rng;

/// Fixed empty-RDB preamble sent as the PSYNC bulk payload, since
/// on-disk RDB is out of scope (§4.11 resolved).
pub const EMPTY_RDB_PREAMBLE: &[u8] = b"REDIS0011\xff\x00\x00\x00\x00\x00\x00\x00\x00";

pub fn generate_replid() -> String {
    const CHARS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..40).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}

/// `REPLCONF ACK <offset>` reply, sent by a replica in response to a
/// `GETACK` sent down the replication stream (§4.11 resolved: a
/// non-`*` argument is accepted and ignored).
pub fn build_getack_reply(offset: u64) -> Vec<u8> {
    let offset_str = offset.to_string();
    let mut out = Vec::new();
    crate::resp::Encoder::array_header(&mut out, 3);
    crate::resp::Encoder::bulk_string(&mut out, b"REPLCONF");
    crate::resp::Encoder::bulk_string(&mut out, b"ACK");
    crate::resp::Encoder::bulk_string(&mut out, offset_str.as_bytes());
    out
}

struct PendingWait {
    token: Token,
    needed: usize,
    target_offset: u64,
    deadline: Option<Instant>,
}

/// Master-side replication state. Held on `Server`; replica sockets
/// themselves live in the connection table like any other client, keyed
/// by the same `Token`.
pub struct Replication {
    pub replid: String,
    offset: AtomicU64,
    pub replicas: Vec<Token>,
    pending_waits: Vec<PendingWait>,
}

impl Replication {
    pub fn new() -> Self {
        Replication { replid: generate_replid(), offset: AtomicU64::new(0), replicas: Vec::new(), pending_waits: Vec::new() }
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Relaxed)
    }

    pub fn add_replica(&mut self, token: Token) {
        if !self.replicas.contains(&token) {
            self.replicas.push(token);
        }
    }

    pub fn remove_replica(&mut self, token: Token) {
        self.replicas.retain(|t| *t != token);
    }

    /// Appends `bytes` to the journal (advancing the offset) and returns
    /// the new offset, for the caller to fan the bytes out to every
    /// replica's write buffer and to the `PersistenceSink`.
    pub fn append(&self, bytes: &[u8]) -> u64 {
        self.offset.fetch_add(bytes.len() as u64, Relaxed) + bytes.len() as u64
    }

    /// Registers a `WAIT` that can't be satisfied yet. `numreplicas`
    /// acked at or past the current offset is the success condition.
    pub fn register_wait(&mut self, token: Token, numreplicas: usize, deadline: Option<Instant>) {
        self.pending_waits.push(PendingWait { token, needed: numreplicas, target_offset: self.offset(), deadline });
    }

    /// Count of replicas whose acked offset is at or past `target`.
    pub fn acked_count(&self, acked_offsets: &HashMap<Token, u64>, target: u64) -> usize {
        self.replicas.iter().filter(|t| acked_offsets.get(t).copied().unwrap_or(0) >= target).count()
    }

    /// Drains pending waits that are now satisfied or timed out, handing
    /// each to `reply` as `(token, acked-count)`. Called after every
    /// `REPLCONF ACK` and on the scheduler tick.
    pub fn drain_waits(&mut self, acked_offsets: &HashMap<Token, u64>, now: Instant, mut reply: impl FnMut(Token, usize)) {
        let waits = std::mem::take(&mut self.pending_waits);
        let mut remaining = Vec::with_capacity(waits.len());
        for wait in waits {
            let acked = self.acked_count(acked_offsets, wait.target_offset);
            let timed_out = wait.deadline.map(|d| now >= d).unwrap_or(false);
            if acked >= wait.needed || timed_out {
                reply(wait.token, acked);
            } else {
                remaining.push(wait);
            }
        }
        self.pending_waits = remaining;
    }

    pub fn cancel_wait(&mut self, token: Token) {
        self.pending_waits.retain(|w| w.token != token);
    }
}

/// Replica-side handshake against a master, driven by the event loop on
/// the outbound socket registered for `--replicaof` (§4.11 "Replica
/// side"). Grounded on the `ConnectionState` handshake shape in
/// `Gabriel2409-codecrafters-redis-rust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaHandshake {
    SendPing,
    AwaitPingReply,
    SendListeningPort,
    AwaitListeningPortReply,
    SendCapa,
    AwaitCapaReply,
    SendPsync,
    AwaitFullresync,
    /// `+FULLRESYNC` consumed; now reading the `$<len>` RDB bulk header
    /// and the `len` payload bytes that follow it (no trailing CRLF).
    AwaitRdbPayload,
    Streaming,
}

impl ReplicaHandshake {
    pub fn initial() -> Self {
        ReplicaHandshake::SendPing
    }

    /// The command this step sends to the master, for the four `Send*`
    /// steps; `None` for every `Await*`/`Streaming` step, which only
    /// consumes input.
    pub fn outbound_command(self, listening_port: u16) -> Option<Vec<u8>> {
        let args: Vec<Vec<u8>> = match self {
            ReplicaHandshake::SendPing => vec![b"PING".to_vec()],
            ReplicaHandshake::SendListeningPort => {
                vec![b"REPLCONF".to_vec(), b"listening-port".to_vec(), listening_port.to_string().into_bytes()]
            }
            ReplicaHandshake::SendCapa => {
                vec![b"REPLCONF".to_vec(), b"capa".to_vec(), b"eof".to_vec(), b"capa".to_vec(), b"psync2".to_vec()]
            }
            ReplicaHandshake::SendPsync => vec![b"PSYNC".to_vec(), b"?".to_vec(), b"-1".to_vec()],
            _ => return None,
        };
        Some(crate::resp::encode_command(&args))
    }

    /// Step reached immediately after this step's command is sent.
    pub fn sent(self) -> Self {
        match self {
            ReplicaHandshake::SendPing => ReplicaHandshake::AwaitPingReply,
            ReplicaHandshake::SendListeningPort => ReplicaHandshake::AwaitListeningPortReply,
            ReplicaHandshake::SendCapa => ReplicaHandshake::AwaitCapaReply,
            ReplicaHandshake::SendPsync => ReplicaHandshake::AwaitFullresync,
            other => other,
        }
    }

    /// Step reached after receiving this step's expected reply line.
    pub fn replied(self) -> Self {
        match self {
            ReplicaHandshake::AwaitPingReply => ReplicaHandshake::SendListeningPort,
            ReplicaHandshake::AwaitListeningPortReply => ReplicaHandshake::SendCapa,
            ReplicaHandshake::AwaitCapaReply => ReplicaHandshake::SendPsync,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_is_satisfied_once_enough_replicas_ack() {
        let mut repl = Replication::new();
        let t1 = Token(1);
        let t2 = Token(2);
        repl.add_replica(t1);
        repl.add_replica(t2);
        repl.append(b"SET k v");
        repl.register_wait(Token(99), 2, None);

        let mut acked = HashMap::new();
        acked.insert(t1, repl.offset());
        let mut fired = vec![];
        repl.drain_waits(&acked, Instant::now(), |t, n| fired.push((t, n)));
        assert!(fired.is_empty(), "only one of two replicas acked");

        acked.insert(t2, repl.offset());
        repl.drain_waits(&acked, Instant::now(), |t, n| fired.push((t, n)));
        assert_eq!(fired, vec![(Token(99), 2)]);
    }

    #[test]
    fn handshake_steps_send_then_await_in_order() {
        let mut state = ReplicaHandshake::initial();
        assert!(state.outbound_command(6380).is_some());
        state = state.sent();
        assert_eq!(state, ReplicaHandshake::AwaitPingReply);
        assert!(state.outbound_command(6380).is_none());

        state = state.replied();
        assert_eq!(state, ReplicaHandshake::SendListeningPort);
        state = state.sent();
        assert_eq!(state, ReplicaHandshake::AwaitListeningPortReply);

        state = state.replied().sent();
        assert_eq!(state, ReplicaHandshake::AwaitCapaReply);
        state = state.replied().sent();
        assert_eq!(state, ReplicaHandshake::AwaitFullresync);
    }

    #[test]
    fn wait_times_out_with_current_count() {
        let mut repl = Replication::new();
        let now = Instant::now();
        repl.register_wait(Token(1), 5, Some(now));
        let mut fired = vec![];
        repl.drain_waits(&HashMap::new(), now, |t, n| fired.push((t, n)));
        assert_eq!(fired, vec![(Token(1), 0)]);
    }
}
