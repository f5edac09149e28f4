//! Connection-management, introspection, and generic key commands
//! (§6): PING/ECHO/INFO/CONFIG/METRICS/KEYS/TYPE/CLIENT/DBSIZE/EXISTS/
//! DEL/EXPIRE family. Grounded on `cmd.rs`'s `pingCommand`/`infoCommand`
//! and `db.rs`'s generic key commands.

use std::collections::HashMap;
use std::time::Instant;

use mio::Token;

use crate::commands::{parse_i64, parse_u64};
use crate::connection::Connection;
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::expiry::ExpirePolicy;
use crate::resp::{self, Encoder};
use crate::server::Server;

pub fn ping(_s: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if conn.in_pubsub_mode() {
        let mut out = Vec::new();
        Encoder::array_header(&mut out, 2);
        Encoder::bulk_string(&mut out, b"pong");
        Encoder::bulk_string(&mut out, args.first().map(|v| v.as_slice()).unwrap_or(b""));
        return Ok(Outcome::Reply(out));
    }
    match args.first() {
        Some(msg) => Ok(Outcome::Reply(resp::bulk(msg))),
        None => Ok(Outcome::Reply(resp::simple("PONG"))),
    }
}

pub fn echo(_s: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    Ok(Outcome::Reply(resp::bulk(&args[0])))
}

pub fn info(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let section = args.first().map(|a| String::from_utf8_lossy(a).to_string());
    let dbsize = server.keyspace.dbsize(now);
    let text = server.metrics.render_info(section.as_deref(), server.start_time, server.config.port, dbsize, server.role(), server.repl.replicas.len());
    Ok(Outcome::Reply(resp::bulk(text.as_bytes())))
}

pub fn config(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if !args[0].eq_ignore_ascii_case(b"GET") || args.len() != 2 {
        return Err(CommandError::Syntax);
    }
    let param = String::from_utf8_lossy(&args[1]).to_ascii_lowercase();
    let value = match param.as_str() {
        "port" => Some(server.config.port.to_string()),
        "bind" => Some(server.config.bind.to_string()),
        "dir" => server.config.dir.as_ref().map(|d| d.display().to_string()).or(Some(String::new())),
        "dbfilename" => Some(server.config.dbfilename.clone()),
        "appendonly" => Some(if server.config.appendonly { "yes".into() } else { "no".into() }),
        _ => None,
    };
    match value {
        Some(v) => Ok(Outcome::Reply(resp::array_of(vec![resp::bulk(param.as_bytes()), resp::bulk(v.as_bytes())]))),
        None => Ok(Outcome::Reply(resp::array_of(vec![]))),
    }
}

pub fn metrics(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let prometheus = args.first().map(|a| a.eq_ignore_ascii_case(b"prometheus")).unwrap_or(false);
    Ok(Outcome::Reply(resp::bulk(server.metrics.render_metrics(prometheus).as_bytes())))
}

pub fn keys(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let matched = server.keyspace.keys_matching(&args[0], now);
    Ok(Outcome::Reply(resp::array_of(matched.into_iter().map(|k| resp::bulk(&k)).collect())))
}

pub fn type_cmd(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    Ok(Outcome::Reply(resp::simple(server.keyspace.type_name(&args[0], now))))
}

pub fn client(_s: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn dbsize(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    Ok(Outcome::Reply(resp::integer(server.keyspace.dbsize(now) as i64)))
}

pub fn exists(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let count = args.iter().filter(|k| server.keyspace.exists(k, now)).count();
    Ok(Outcome::Reply(resp::integer(count as i64)))
}

pub fn del(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let count = args.iter().filter(|k| server.keyspace.remove(k)).count();
    Ok(Outcome::Reply(resp::integer(count as i64)))
}

pub fn expire(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let seconds = parse_i64(&args[1])?;
    let dur = std::time::Duration::from_secs(seconds.max(0) as u64);
    let ok = server.keyspace.set_expiry(&args[0], now, ExpirePolicy::after(now, dur));
    Ok(Outcome::Reply(resp::integer(ok as i64)))
}

pub fn pexpire(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let ms = parse_u64(&args[1])?;
    let ok = server.keyspace.set_expiry(&args[0], now, ExpirePolicy::after(now, std::time::Duration::from_millis(ms)));
    Ok(Outcome::Reply(resp::integer(ok as i64)))
}

pub fn ttl(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let n = match server.keyspace.ttl(&args[0], now) {
        None => -2,
        Some(None) => -1,
        Some(Some(d)) => d.as_secs() as i64,
    };
    Ok(Outcome::Reply(resp::integer(n)))
}

pub fn pttl(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let n = match server.keyspace.ttl(&args[0], now) {
        None => -2,
        Some(None) => -1,
        Some(Some(d)) => d.as_millis() as i64,
    };
    Ok(Outcome::Reply(resp::integer(n)))
}

pub fn persist(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    Ok(Outcome::Reply(resp::integer(server.keyspace.persist(&args[0], now) as i64)))
}

pub fn quit(_s: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    conn.closing = true;
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn reset(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    conn.tx.discard();
    server.pubsub.unsubscribe_all(token);
    conn.sub_channels.clear();
    conn.sub_patterns.clear();
    server.blocking.cancel(token);
    conn.parked = None;
    Ok(Outcome::Reply(resp::simple("RESET")))
}
