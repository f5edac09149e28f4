//! String commands (§6): SET (with PX), GET, INCR. Grounded on
//! `cmd.rs`'s `setCommand`/`getCommand`/`incrCommand`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mio::Token;

use crate::commands::parse_u64;
use crate::connection::Connection;
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::expiry::ExpirePolicy;
use crate::resp;
use crate::server::Server;
use crate::value::Value;

pub fn set(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let expiry = if args.len() > 2 {
        if args.len() != 4 || !args[2].eq_ignore_ascii_case(b"PX") {
            return Err(CommandError::Syntax);
        }
        ExpirePolicy::after(now, Duration::from_millis(parse_u64(&args[3])?))
    } else {
        ExpirePolicy::Never
    };
    server.keyspace.set(Bytes::copy_from_slice(&args[0]), Value::Str(Bytes::copy_from_slice(&args[1])), expiry);
    Ok(Outcome::Reply(resp::simple("OK")))
}

pub fn get(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    match server.keyspace.get(&args[0], now) {
        None => {
            server.metrics.record_miss();
            Ok(Outcome::Reply(resp::null_bulk()))
        }
        Some(v) => {
            server.metrics.record_hit();
            let s = v.as_str().ok_or(CommandError::WrongType)?;
            Ok(Outcome::Reply(resp::bulk(s)))
        }
    }
}

pub fn incr(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let n = server.keyspace.compute(
        &args[0],
        now,
        || Value::Str(Bytes::from_static(b"0")),
        |v| {
            let s = v.as_str().ok_or(CommandError::WrongType)?.clone();
            let current: i64 = std::str::from_utf8(&s).ok().and_then(|s| s.parse().ok()).ok_or(CommandError::InvalidInteger)?;
            let next = current.checked_add(1).ok_or_else(|| CommandError::Other("increment or decrement would overflow".into()))?;
            *v = Value::Str(Bytes::from(next.to_string()));
            Ok::<_, CommandError>(next)
        },
    )?;
    Ok(Outcome::Reply(resp::integer(n)))
}
