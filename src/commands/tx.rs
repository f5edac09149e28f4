//! Transaction commands (§6, §4.8): MULTI/EXEC/DISCARD/WATCH/UNWATCH,
//! delegating state to `transaction::TxState`. Grounded on `cmd.rs`'s
//! `multiCommand`/`execCommand`.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::connection::Connection;
use crate::dispatch::{self, Outcome};
use crate::error::{CommandError, CommandResult};
use crate::resp::{self, Encoder};
use crate::server::Server;

pub fn multi(_s: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if conn.tx.is_queuing() {
        return Err(CommandError::NestedMulti);
    }
    conn.tx.begin();
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn discard(_s: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if !conn.tx.is_queuing() {
        return Err(CommandError::DiscardWithoutMulti);
    }
    conn.tx.discard();
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn watch(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    if conn.tx.is_queuing() {
        return Err(CommandError::WatchInsideMulti);
    }
    for key in args {
        let version = server.keyspace.version(key, now);
        conn.tx.watch(Bytes::copy_from_slice(key), version);
    }
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn unwatch(_s: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if !conn.tx.has_watches() {
        return Err(CommandError::UnwatchWithoutWatch);
    }
    conn.tx.unwatch();
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn exec(server: &mut Server, conn: &mut Connection, conns: &mut HashMap<Token, Connection>, token: Token, _args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    if !conn.tx.is_queuing() {
        return Err(CommandError::ExecWithoutMulti);
    }
    let dirty = conn.tx.watched_keys().iter().any(|(k, v)| server.keyspace.version(k, now) != *v);
    let queue = conn.tx.take_for_exec();

    if dirty {
        return Ok(Outcome::Reply(resp::null_array()));
    }

    let mut out = Vec::new();
    Encoder::array_header(&mut out, queue.len());
    for frame in queue {
        let (reply, _is_write) = dispatch::execute(server, conn, conns, token, &frame.args, now);
        out.extend_from_slice(&reply.unwrap_or_else(resp::null_bulk));
    }
    Ok(Outcome::Reply(out))
}
