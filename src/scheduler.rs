//! Periodic tick (§4.12, suggested 100ms): sweeps lazily-missed
//! expiries, times out blocked clients, and drains `WAIT` waiters whose
//! deadline passed. One tick, no per-entry timers, grounded on the
//! nearest-timer idiom in the teacher's `ae.rs`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mio::Token;

use crate::connection::Connection;
use crate::resp::Encoder;
use crate::server::Server;

pub const TICK: Duration = Duration::from_millis(100);

pub fn tick(server: &mut Server, conns: &mut HashMap<Token, Connection>, now: Instant) {
    let expired = server.keyspace.sweep_expired(now);
    server.metrics.record_expired(expired as u64);

    server.blocking.sweep_expired(now, |token, reply| {
        if let Some(conn) = conns.get_mut(&token) {
            conn.queue_reply(&reply);
            conn.parked = None;
        }
    });

    let acked: HashMap<Token, u64> = conns.iter().map(|(t, c)| (*t, c.replica_acked_offset)).collect();
    server.repl.drain_waits(&acked, now, |token, count| {
        if let Some(conn) = conns.get_mut(&token) {
            let mut out = Vec::new();
            Encoder::integer(&mut out, count as i64);
            conn.queue_reply(&out);
            conn.parked = None;
        }
    });
}
