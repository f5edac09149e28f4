//! List commands (§6, §4.4, §4.9): LPUSH/RPUSH/LPOP/RPOP/LLEN/LRANGE/
//! BLPOP. Grounded on `cmd.rs`'s `pushGenericCommand`/`popGenericCommand`
//! and `list.rs`'s `lpushCommand`/`blpopCommand` split into a shared
//! `front: bool` helper the way the teacher shares one push/pop body
//! between the L*/R* pair.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mio::Token;

use crate::blocking::BlockContext;
use crate::commands::{parse_f64, parse_usize};
use crate::connection::{Connection, ParkedBlock};
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::quicklist::QuickList;
use crate::resp::{self, Encoder};
use crate::server::Server;
use crate::value::Value;

fn push(front: bool, server: &mut Server, conns: &mut HashMap<Token, Connection>, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let key = &args[0];
    let values = &args[1..];
    let len = server.keyspace.compute(
        key,
        now,
        || Value::List(QuickList::new()),
        |v| {
            let list = v.as_list_mut().ok_or(CommandError::WrongType)?;
            for val in values {
                if front {
                    list.push_front(Bytes::copy_from_slice(val));
                } else {
                    list.push_back(Bytes::copy_from_slice(val));
                }
            }
            Ok::<_, CommandError>(list.len())
        },
    )?;
    server.blocking.on_data_added(key, &mut server.keyspace, now, |t, reply| {
        if let Some(c) = conns.get_mut(&t) {
            c.queue_reply(&reply);
            c.parked = None;
        }
    });
    Ok(Outcome::Reply(resp::integer(len as i64)))
}

pub fn lpush(server: &mut Server, _conn: &mut Connection, conns: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    push(true, server, conns, args, now)
}

pub fn rpush(server: &mut Server, _conn: &mut Connection, conns: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    push(false, server, conns, args, now)
}

fn pop(front: bool, server: &mut Server, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let key = &args[0];
    match args.get(1) {
        None => {
            let popped = server.keyspace.update_existing(key, now, |v| -> Result<Option<Bytes>, CommandError> {
                let list = v.as_list_mut().ok_or(CommandError::WrongType)?;
                Ok(if front { list.pop_front() } else { list.pop_back() })
            });
            match popped {
                None => Ok(Outcome::Reply(resp::null_bulk())),
                Some(Err(e)) => Err(e),
                Some(Ok(None)) => Ok(Outcome::Reply(resp::null_bulk())),
                Some(Ok(Some(val))) => Ok(Outcome::Reply(resp::bulk(&val))),
            }
        }
        Some(count_arg) => {
            let count = parse_usize(count_arg)?;
            let popped = server.keyspace.update_existing(key, now, |v| -> Result<Vec<Bytes>, CommandError> {
                let list = v.as_list_mut().ok_or(CommandError::WrongType)?;
                Ok(if front { list.pop_front_n(count) } else { list.pop_back_n(count) })
            });
            match popped {
                None => Ok(Outcome::Reply(resp::null_array())),
                Some(Err(e)) => Err(e),
                Some(Ok(values)) => Ok(Outcome::Reply(resp::array_of(values.into_iter().map(|v| resp::bulk(&v)).collect()))),
            }
        }
    }
}

pub fn lpop(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    pop(true, server, args, now)
}

pub fn rpop(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    pop(false, server, args, now)
}

pub fn llen(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let len = match server.keyspace.get(&args[0], now) {
        None => 0,
        Some(v) => v.as_list().ok_or(CommandError::WrongType)?.len(),
    };
    Ok(Outcome::Reply(resp::integer(len as i64)))
}

pub fn lrange(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let start = crate::commands::parse_i64(&args[1])?;
    let stop = crate::commands::parse_i64(&args[2])?;
    let values = match server.keyspace.get(&args[0], now) {
        None => vec![],
        Some(v) => v.as_list().ok_or(CommandError::WrongType)?.range(start, stop),
    };
    Ok(Outcome::Reply(resp::array_of(values.into_iter().map(|v| resp::bulk(&v)).collect())))
}

pub fn blpop(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let (keys, timeout_arg) = args.split_at(args.len() - 1);
    let timeout_secs = parse_f64(&timeout_arg[0])?;
    if timeout_secs < 0.0 || !timeout_secs.is_finite() {
        return Err(CommandError::InvalidTimeout);
    }

    for key in keys {
        match server.keyspace.update_existing(key, now, |v| -> Result<Option<Bytes>, CommandError> {
            let list = v.as_list_mut().ok_or(CommandError::WrongType)?;
            Ok(list.pop_front())
        }) {
            Some(Err(e)) => return Err(e),
            Some(Ok(Some(val))) => {
                let mut out = Vec::new();
                Encoder::array_header(&mut out, 2);
                Encoder::bulk_string(&mut out, key);
                Encoder::bulk_string(&mut out, &val);
                return Ok(Outcome::Reply(out));
            }
            _ => continue,
        }
    }

    let deadline = if timeout_secs == 0.0 { None } else { Some(now + Duration::from_secs_f64(timeout_secs)) };
    server.blocking.block(token, keys.iter().map(|k| Bytes::copy_from_slice(k)).collect(), BlockContext::ListPop { from_front: true }, deadline);
    conn.parked = Some(ParkedBlock { deadline });
    Ok(Outcome::Async)
}
