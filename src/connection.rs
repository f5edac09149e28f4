//! Per-connection state owned outside the keyspace: I/O buffers,
//! transaction mode, watched keys, pub/sub subscriptions, replication
//! role (§3).

use std::collections::HashSet;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use mio::net::TcpStream;
use mio::Token;

use crate::replication::ReplicaHandshake;
use crate::transaction::TxState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplRole {
    Normal,
    /// Became a replica after a successful PSYNC; the master streams
    /// write commands to it instead of normal replies.
    Replica,
}

/// Which blocking operation this connection is parked on, mirrored here
/// so connection close can find and cancel it in the blocking registry
/// without a second lookup structure.
#[derive(Debug, Clone, Copy)]
pub struct ParkedBlock {
    pub deadline: Option<Instant>,
}

pub struct Connection {
    pub token: Token,
    pub stream: TcpStream,
    pub read_buf: BytesMut,
    pub write_buf: BytesMut,
    pub closing: bool,

    pub tx: TxState,

    pub sub_channels: HashSet<Bytes>,
    pub sub_patterns: HashSet<Bytes>,

    pub repl_role: ReplRole,
    /// Listening port advertised via `REPLCONF listening-port`.
    pub replica_listening_port: Option<u16>,
    /// Bytes of the replication stream this replica has acknowledged.
    pub replica_acked_offset: u64,

    pub parked: Option<ParkedBlock>,

    /// `Some` only for the single outbound connection to our configured
    /// `--replicaof` master; tracks which handshake step it's on, and
    /// once `Streaming`, that this link's frames are applied locally
    /// rather than treated as ordinary client commands.
    pub master_link: Option<ReplicaHandshake>,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream) -> Self {
        Connection {
            token,
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::new(),
            closing: false,
            tx: TxState::default(),
            sub_channels: HashSet::new(),
            sub_patterns: HashSet::new(),
            repl_role: ReplRole::Normal,
            replica_listening_port: None,
            replica_acked_offset: 0,
            parked: None,
            master_link: None,
        }
    }

    pub fn in_pubsub_mode(&self) -> bool {
        !self.sub_channels.is_empty() || !self.sub_patterns.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.sub_channels.len() + self.sub_patterns.len()
    }

    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.write_buf.extend_from_slice(bytes);
    }

    pub fn is_replica(&self) -> bool {
        self.repl_role == ReplRole::Replica
    }
}
