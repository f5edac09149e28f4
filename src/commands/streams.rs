//! Stream commands (§6, §4.3, §4.9): XADD/XRANGE/XREAD (incl. BLOCK)/
//! XLEN/XDEL. Grounded on `cmd.rs`'s `xaddCommand`/`xrangeCommand`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mio::Token;

use crate::blocking::BlockContext;
use crate::commands::{parse_u64, parse_usize};
use crate::connection::{Connection, ParkedBlock};
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::resp::{self, Encoder};
use crate::server::Server;
use crate::stream::{Entry, IdSpec, Stream, StreamId};
use crate::value::Value;

fn parse_id_spec(s: &[u8]) -> CommandResult<IdSpec> {
    if s == b"*" {
        return Ok(IdSpec::Auto);
    }
    let text = std::str::from_utf8(s).map_err(|_| CommandError::InvalidStreamId)?;
    if let Some(ms_part) = text.strip_suffix("-*") {
        return Ok(IdSpec::AutoSeq(ms_part.parse().map_err(|_| CommandError::InvalidStreamId)?));
    }
    Ok(IdSpec::Explicit(StreamId::parse(text)?))
}

fn parse_range_id(b: &[u8]) -> CommandResult<StreamId> {
    match b {
        b"-" => Ok(StreamId::MIN),
        b"+" => Ok(StreamId::MAX),
        _ => StreamId::parse(std::str::from_utf8(b).map_err(|_| CommandError::InvalidStreamId)?),
    }
}

fn encode_entries(out: &mut Vec<u8>, entries: &[Entry]) {
    Encoder::array_header(out, entries.len());
    for e in entries {
        Encoder::array_header(out, 2);
        Encoder::bulk_string(out, e.id.to_string().as_bytes());
        Encoder::array_header(out, e.fields.len() * 2);
        for (f, v) in &e.fields {
            Encoder::bulk_string(out, f);
            Encoder::bulk_string(out, v);
        }
    }
}

pub fn xadd(server: &mut Server, _conn: &mut Connection, conns: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let key = &args[0];
    let spec = parse_id_spec(&args[1])?;
    let rest = &args[2..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::WrongArgCount("xadd".into()));
    }
    let fields: Vec<(Bytes, Bytes)> = rest.chunks(2).map(|c| (Bytes::copy_from_slice(&c[0]), Bytes::copy_from_slice(&c[1]))).collect();
    let now_ms = crate::util::now_ms();

    let assigned = server.keyspace.compute(key, now, || Value::Stream(Stream::new()), |v| {
        let stream = v.as_stream_mut().ok_or(CommandError::WrongType)?;
        stream.append(spec, fields, now_ms)
    })?;
    server.blocking.on_data_added(key, &mut server.keyspace, now, |t, reply| {
        if let Some(c) = conns.get_mut(&t) {
            c.queue_reply(&reply);
            c.parked = None;
        }
    });
    Ok(Outcome::Reply(resp::bulk(assigned.to_string().as_bytes())))
}

pub fn xrange(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let start = parse_range_id(&args[1])?;
    let stop = parse_range_id(&args[2])?;
    let count = if args.len() > 3 {
        if args.len() != 5 || !args[3].eq_ignore_ascii_case(b"COUNT") {
            return Err(CommandError::Syntax);
        }
        Some(parse_usize(&args[4])?)
    } else {
        None
    };

    let entries = match server.keyspace.get(&args[0], now) {
        None => vec![],
        Some(v) => v.as_stream().ok_or(CommandError::WrongType)?.range(start, stop, count),
    };
    let mut out = Vec::new();
    encode_entries(&mut out, &entries);
    Ok(Outcome::Reply(out))
}

pub fn xlen(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let len = match server.keyspace.get(&args[0], now) {
        None => 0,
        Some(v) => v.as_stream().ok_or(CommandError::WrongType)?.len(),
    };
    Ok(Outcome::Reply(resp::integer(len as i64)))
}

pub fn xdel(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let mut ids = Vec::with_capacity(args.len() - 1);
    for id in &args[1..] {
        ids.push(StreamId::parse(std::str::from_utf8(id).map_err(|_| CommandError::InvalidStreamId)?)?);
    }
    let removed = server.keyspace.update_existing(&args[0], now, |v| -> Result<usize, CommandError> {
        let stream = v.as_stream_mut().ok_or(CommandError::WrongType)?;
        Ok(stream.remove(&ids))
    });
    match removed {
        None => Ok(Outcome::Reply(resp::integer(0))),
        Some(Err(e)) => Err(e),
        Some(Ok(n)) => Ok(Outcome::Reply(resp::integer(n as i64))),
    }
}

pub fn xread(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let mut i = 0;
    let mut count = None;
    let mut block_ms = None;
    loop {
        if i >= args.len() {
            return Err(CommandError::Syntax);
        }
        if args[i].eq_ignore_ascii_case(b"COUNT") {
            count = Some(parse_usize(args.get(i + 1).ok_or(CommandError::Syntax)?)?);
            i += 2;
        } else if args[i].eq_ignore_ascii_case(b"BLOCK") {
            block_ms = Some(parse_u64(args.get(i + 1).ok_or(CommandError::Syntax)?)?);
            i += 2;
        } else if args[i].eq_ignore_ascii_case(b"STREAMS") {
            i += 1;
            break;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let n = rest.len() / 2;
    let keys = &rest[..n];
    let id_args = &rest[n..];

    let mut last_ids = Vec::with_capacity(n);
    for (k, idb) in keys.iter().zip(id_args.iter()) {
        let id = if idb.as_slice() == b"$" {
            server.keyspace.get(k, now).and_then(|v| v.as_stream()).map(|s| s.last_id()).unwrap_or(StreamId::MIN)
        } else {
            StreamId::parse(std::str::from_utf8(idb).map_err(|_| CommandError::InvalidStreamId)?)?
        };
        last_ids.push((Bytes::copy_from_slice(k), id));
    }

    let mut per_stream = Vec::new();
    for (k, after) in &last_ids {
        if let Some(v) = server.keyspace.get(k, now) {
            let entries = v.as_stream().ok_or(CommandError::WrongType)?.after(*after, count);
            if !entries.is_empty() {
                per_stream.push((k.clone(), entries));
            }
        }
    }

    if !per_stream.is_empty() {
        let mut out = Vec::new();
        Encoder::array_header(&mut out, per_stream.len());
        for (key, entries) in &per_stream {
            Encoder::array_header(&mut out, 2);
            Encoder::bulk_string(&mut out, key);
            encode_entries(&mut out, entries);
        }
        return Ok(Outcome::Reply(out));
    }

    match block_ms {
        None => Ok(Outcome::Reply(resp::null_array())),
        Some(ms) => {
            let deadline = if ms == 0 { None } else { Some(now + Duration::from_millis(ms)) };
            server.blocking.block(token, keys.iter().map(|k| Bytes::copy_from_slice(k)).collect(), BlockContext::StreamRead { last_ids, count }, deadline);
            conn.parked = Some(ParkedBlock { deadline });
            Ok(Outcome::Async)
        }
    }
}
