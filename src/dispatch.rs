//! Command table and dispatch pipeline (§4.7): pub/sub gate, transaction
//! gate, arity validation, handler execution, then replication/metrics
//! bookkeeping. Grounded on the teacher's `redis/cmd.rs` data-driven
//! `CMD_TABLE`/`lookup_command`/`call` shape, restated with a static
//! table instead of the teacher's `Lazy<HashMap<..>>` built at first use
//! (same idiom, `once_cell` is the crate either way).

use std::collections::HashMap;
use std::time::Instant;

use once_cell::sync::Lazy;

use mio::Token;

use crate::commands;
use crate::connection::Connection;
use crate::error::CommandError;
use crate::resp::{self, Frame};
use crate::server::Server;

/// What a handler hands back to the dispatcher.
pub enum Outcome {
    Reply(Vec<u8>),
    /// The connection parked itself in the blocking registry or the
    /// replication wait list; no reply goes out until it's woken.
    Async,
}

pub type Handler = fn(
    &mut Server,
    &mut Connection,
    &mut HashMap<Token, Connection>,
    Token,
    &[Vec<u8>],
    Instant,
) -> Result<Outcome, CommandError>;

pub struct CommandSpec {
    pub name: &'static str,
    /// Positive: exact total argument count (command name included).
    /// Negative: minimum total argument count (abs value), variadic.
    pub arity: i32,
    pub is_write: bool,
    pub is_blocking: bool,
    pub handler: Handler,
}

fn arity_ok(arity: i32, total_argc: usize) -> bool {
    if arity >= 0 {
        total_argc == arity as usize
    } else {
        total_argc >= (-arity) as usize
    }
}

static COMMAND_TABLE: &[CommandSpec] = &[
    CommandSpec { name: "PING", arity: -1, is_write: false, is_blocking: false, handler: commands::conn::ping },
    CommandSpec { name: "ECHO", arity: 2, is_write: false, is_blocking: false, handler: commands::conn::echo },
    CommandSpec { name: "INFO", arity: -1, is_write: false, is_blocking: false, handler: commands::conn::info },
    CommandSpec { name: "CONFIG", arity: -2, is_write: false, is_blocking: false, handler: commands::conn::config },
    CommandSpec { name: "METRICS", arity: -1, is_write: false, is_blocking: false, handler: commands::conn::metrics },
    CommandSpec { name: "KEYS", arity: 2, is_write: false, is_blocking: false, handler: commands::conn::keys },
    CommandSpec { name: "TYPE", arity: 2, is_write: false, is_blocking: false, handler: commands::conn::type_cmd },
    CommandSpec { name: "CLIENT", arity: -1, is_write: false, is_blocking: false, handler: commands::conn::client },
    CommandSpec { name: "DBSIZE", arity: 1, is_write: false, is_blocking: false, handler: commands::conn::dbsize },
    CommandSpec { name: "EXISTS", arity: -2, is_write: false, is_blocking: false, handler: commands::conn::exists },
    CommandSpec { name: "DEL", arity: -2, is_write: true, is_blocking: false, handler: commands::conn::del },
    CommandSpec { name: "EXPIRE", arity: 3, is_write: true, is_blocking: false, handler: commands::conn::expire },
    CommandSpec { name: "PEXPIRE", arity: 3, is_write: true, is_blocking: false, handler: commands::conn::pexpire },
    CommandSpec { name: "TTL", arity: 2, is_write: false, is_blocking: false, handler: commands::conn::ttl },
    CommandSpec { name: "PTTL", arity: 2, is_write: false, is_blocking: false, handler: commands::conn::pttl },
    CommandSpec { name: "PERSIST", arity: 2, is_write: true, is_blocking: false, handler: commands::conn::persist },
    CommandSpec { name: "SET", arity: -3, is_write: true, is_blocking: false, handler: commands::strings::set },
    CommandSpec { name: "GET", arity: 2, is_write: false, is_blocking: false, handler: commands::strings::get },
    CommandSpec { name: "INCR", arity: 2, is_write: true, is_blocking: false, handler: commands::strings::incr },
    CommandSpec { name: "LPUSH", arity: -3, is_write: true, is_blocking: false, handler: commands::lists::lpush },
    CommandSpec { name: "RPUSH", arity: -3, is_write: true, is_blocking: false, handler: commands::lists::rpush },
    CommandSpec { name: "LPOP", arity: -2, is_write: true, is_blocking: false, handler: commands::lists::lpop },
    CommandSpec { name: "RPOP", arity: -2, is_write: true, is_blocking: false, handler: commands::lists::rpop },
    CommandSpec { name: "LLEN", arity: 2, is_write: false, is_blocking: false, handler: commands::lists::llen },
    CommandSpec { name: "LRANGE", arity: 4, is_write: false, is_blocking: false, handler: commands::lists::lrange },
    CommandSpec { name: "BLPOP", arity: -3, is_write: false, is_blocking: true, handler: commands::lists::blpop },
    CommandSpec { name: "XADD", arity: -5, is_write: true, is_blocking: false, handler: commands::streams::xadd },
    CommandSpec { name: "XRANGE", arity: -4, is_write: false, is_blocking: false, handler: commands::streams::xrange },
    CommandSpec { name: "XREAD", arity: -4, is_write: false, is_blocking: true, handler: commands::streams::xread },
    CommandSpec { name: "XLEN", arity: 2, is_write: false, is_blocking: false, handler: commands::streams::xlen },
    CommandSpec { name: "XDEL", arity: -3, is_write: true, is_blocking: false, handler: commands::streams::xdel },
    CommandSpec { name: "ZADD", arity: -4, is_write: true, is_blocking: false, handler: commands::zsets::zadd },
    CommandSpec { name: "ZCARD", arity: 2, is_write: false, is_blocking: false, handler: commands::zsets::zcard },
    CommandSpec { name: "ZRANGE", arity: -4, is_write: false, is_blocking: false, handler: commands::zsets::zrange },
    CommandSpec { name: "ZRANK", arity: 3, is_write: false, is_blocking: false, handler: commands::zsets::zrank },
    CommandSpec { name: "ZREM", arity: -3, is_write: true, is_blocking: false, handler: commands::zsets::zrem },
    CommandSpec { name: "ZSCORE", arity: 3, is_write: false, is_blocking: false, handler: commands::zsets::zscore },
    CommandSpec { name: "GEOADD", arity: -5, is_write: true, is_blocking: false, handler: commands::geo::geoadd },
    CommandSpec { name: "GEODIST", arity: -4, is_write: false, is_blocking: false, handler: commands::geo::geodist },
    CommandSpec { name: "GEOPOS", arity: -3, is_write: false, is_blocking: false, handler: commands::geo::geopos },
    CommandSpec { name: "GEOSEARCH", arity: -7, is_write: false, is_blocking: false, handler: commands::geo::geosearch },
    CommandSpec { name: "SUBSCRIBE", arity: -2, is_write: false, is_blocking: false, handler: commands::pubsub::subscribe },
    CommandSpec { name: "PSUBSCRIBE", arity: -2, is_write: false, is_blocking: false, handler: commands::pubsub::psubscribe },
    CommandSpec { name: "UNSUBSCRIBE", arity: -1, is_write: false, is_blocking: false, handler: commands::pubsub::unsubscribe },
    CommandSpec { name: "PUNSUBSCRIBE", arity: -1, is_write: false, is_blocking: false, handler: commands::pubsub::punsubscribe },
    CommandSpec { name: "PUBLISH", arity: 3, is_write: false, is_blocking: false, handler: commands::pubsub::publish },
    CommandSpec { name: "MULTI", arity: 1, is_write: false, is_blocking: false, handler: commands::tx::multi },
    CommandSpec { name: "EXEC", arity: 1, is_write: false, is_blocking: false, handler: commands::tx::exec },
    CommandSpec { name: "DISCARD", arity: 1, is_write: false, is_blocking: false, handler: commands::tx::discard },
    CommandSpec { name: "WATCH", arity: -2, is_write: false, is_blocking: false, handler: commands::tx::watch },
    CommandSpec { name: "UNWATCH", arity: 1, is_write: false, is_blocking: false, handler: commands::tx::unwatch },
    CommandSpec { name: "REPLCONF", arity: -2, is_write: false, is_blocking: false, handler: commands::replication::replconf },
    CommandSpec { name: "PSYNC", arity: 3, is_write: false, is_blocking: false, handler: commands::replication::psync },
    CommandSpec { name: "WAIT", arity: 3, is_write: false, is_blocking: true, handler: commands::replication::wait },
    CommandSpec { name: "QUIT", arity: 1, is_write: false, is_blocking: false, handler: commands::conn::quit },
    CommandSpec { name: "RESET", arity: 1, is_write: false, is_blocking: false, handler: commands::conn::reset },
];

static COMMAND_INDEX: Lazy<HashMap<&'static str, &'static CommandSpec>> =
    Lazy::new(|| COMMAND_TABLE.iter().map(|c| (c.name, c)).collect());

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_INDEX.get(name).copied()
}

const PUBSUB_ALLOWED: &[&str] = &["SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PING", "QUIT", "RESET"];
const TX_CONTROL: &[&str] = &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"];

/// Looks up, validates arity, runs the handler, and on success handles
/// write-command replication/persistence fan-out. Used both for a
/// top-level command and, recursively, for each command an `EXEC`
/// unqueues (§4.8).
pub fn execute(
    server: &mut Server,
    conn: &mut Connection,
    conns: &mut HashMap<Token, Connection>,
    token: Token,
    args: &[Vec<u8>],
    now: Instant,
) -> (Option<Vec<u8>>, bool) {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let Some(spec) = lookup(&name) else {
        server.metrics.record_error();
        return (Some(CommandError::UnknownCommand(name).to_resp()), false);
    };
    server.metrics.record_command(spec.name);
    if !arity_ok(spec.arity, args.len()) {
        server.metrics.record_error();
        return (Some(CommandError::WrongArgCount(spec.name.to_ascii_lowercase()).to_resp()), false);
    }

    match (spec.handler)(server, conn, conns, token, &args[1..], now) {
        Ok(Outcome::Reply(bytes)) => {
            if spec.is_write {
                propagate(server, conns, args);
            }
            (Some(bytes), spec.is_write)
        }
        Ok(Outcome::Async) => (None, false),
        Err(e) => {
            server.metrics.record_error();
            (Some(e.to_resp()), false)
        }
    }
}

fn propagate(server: &mut Server, conns: &mut HashMap<Token, Connection>, args: &[Vec<u8>]) {
    let encoded = resp::encode_command(args);
    let offset = server.repl.append(&encoded);
    server.persistence.on_append(offset, &encoded);
    for token in server.repl.replicas.clone() {
        if let Some(replica) = conns.get_mut(&token) {
            replica.queue_reply(&encoded);
        }
    }
}

/// Entry point from the event loop: one decoded frame for one connection.
pub fn dispatch_frame(server: &mut Server, conns: &mut HashMap<Token, Connection>, token: Token, frame: Frame, now: Instant) {
    let Some(mut conn) = conns.remove(&token) else { return };
    if frame.args.is_empty() {
        conns.insert(token, conn);
        return;
    }
    let name = String::from_utf8_lossy(frame.name()).to_ascii_uppercase();

    let reply: Option<Vec<u8>> = if conn.in_pubsub_mode() && !PUBSUB_ALLOWED.contains(&name.as_str()) {
        server.metrics.record_error();
        Some(CommandError::NotAllowedInPubsubMode.to_resp())
    } else if conn.tx.is_queuing() && !TX_CONTROL.contains(&name.as_str()) {
        match lookup(&name) {
            None => {
                server.metrics.record_error();
                Some(CommandError::UnknownCommand(name.clone()).to_resp())
            }
            Some(spec) if spec.is_blocking => {
                server.metrics.record_error();
                Some(CommandError::BlockingInTransaction(spec.name.to_ascii_lowercase()).to_resp())
            }
            Some(spec) if !arity_ok(spec.arity, frame.args.len()) => {
                server.metrics.record_error();
                Some(CommandError::WrongArgCount(spec.name.to_ascii_lowercase()).to_resp())
            }
            Some(_) => {
                conn.tx.queue_command(frame.clone());
                Some(resp::simple("QUEUED"))
            }
        }
    } else {
        let (reply, _is_write) = execute(server, &mut conn, conns, token, &frame.args, now);
        reply
    };

    if let Some(bytes) = reply {
        conn.queue_reply(&bytes);
    }
    conns.insert(token, conn);
}
