//! Sorted set commands (§6, §4.5): ZADD/ZCARD/ZRANGE/ZRANK/ZREM/ZSCORE.
//! Grounded on `cmd.rs`'s `zaddCommand`/`zrangeCommand`.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::commands::{format_score, parse_f64, parse_i64};
use crate::connection::Connection;
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::resp;
use crate::server::Server;
use crate::value::Value;
use crate::zset::QuickZSet;

pub fn zadd(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let rest = &args[1..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::WrongArgCount("zadd".into()));
    }
    let mut pairs = Vec::with_capacity(rest.len() / 2);
    for chunk in rest.chunks(2) {
        let score = parse_f64(&chunk[0])?;
        if !score.is_finite() {
            return Err(CommandError::Other("value is not a valid float".into()));
        }
        pairs.push((score, Bytes::copy_from_slice(&chunk[1])));
    }
    let added = server.keyspace.compute(&args[0], now, || Value::ZSet(QuickZSet::new()), |v| {
        let z = v.as_zset_mut().ok_or(CommandError::WrongType)?;
        let mut added = 0;
        for (score, member) in pairs {
            if z.insert(member, score) {
                added += 1;
            }
        }
        Ok::<_, CommandError>(added)
    })?;
    Ok(Outcome::Reply(resp::integer(added as i64)))
}

pub fn zcard(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let len = match server.keyspace.get(&args[0], now) {
        None => 0,
        Some(v) => v.as_zset().ok_or(CommandError::WrongType)?.len(),
    };
    Ok(Outcome::Reply(resp::integer(len as i64)))
}

pub fn zrange(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let start = parse_i64(&args[1])?;
    let stop = parse_i64(&args[2])?;
    let withscores = match args.get(3) {
        None => false,
        Some(a) if a.eq_ignore_ascii_case(b"WITHSCORES") => true,
        Some(_) => return Err(CommandError::Syntax),
    };
    let items = match server.keyspace.get(&args[0], now) {
        None => vec![],
        Some(v) => v.as_zset().ok_or(CommandError::WrongType)?.range(start, stop),
    };
    let mut out = Vec::new();
    for (member, score) in items {
        out.push(member.to_vec());
        if withscores {
            out.push(format_score(score).into_bytes());
        }
    }
    Ok(Outcome::Reply(resp::array_of(out.into_iter().map(|v| resp::bulk(&v)).collect())))
}

pub fn zrank(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let rank = match server.keyspace.get(&args[0], now) {
        None => None,
        Some(v) => v.as_zset().ok_or(CommandError::WrongType)?.rank(&args[1]),
    };
    match rank {
        Some(r) => Ok(Outcome::Reply(resp::integer(r as i64))),
        None => Ok(Outcome::Reply(resp::null_bulk())),
    }
}

pub fn zrem(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let members = &args[1..];
    let removed = server.keyspace.update_existing(&args[0], now, |v| -> Result<usize, CommandError> {
        let z = v.as_zset_mut().ok_or(CommandError::WrongType)?;
        Ok(members.iter().filter(|m| z.remove(m)).count())
    });
    match removed {
        None => Ok(Outcome::Reply(resp::integer(0))),
        Some(Err(e)) => Err(e),
        Some(Ok(n)) => Ok(Outcome::Reply(resp::integer(n as i64))),
    }
}

pub fn zscore(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let score = match server.keyspace.get(&args[0], now) {
        None => None,
        Some(v) => v.as_zset().ok_or(CommandError::WrongType)?.score(&args[1]),
    };
    match score {
        Some(s) => Ok(Outcome::Reply(resp::bulk(format_score(s).as_bytes()))),
        None => Ok(Outcome::Reply(resp::null_bulk())),
    }
}
