//! Pub/Sub commands (§6, §4.10): SUBSCRIBE/PSUBSCRIBE/UNSUBSCRIBE/
//! PUNSUBSCRIBE/PUBLISH. Grounded on `cmd.rs`'s `subscribeCommand`/
//! `publishCommand`; delivery itself fans out into `conns` since
//! `pubsub.rs` only resolves targets.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::connection::Connection;
use crate::dispatch::Outcome;
use crate::error::CommandResult;
use crate::resp::{self, Encoder};
use crate::server::Server;

fn push_ack(out: &mut Vec<u8>, kind: &str, name: Option<&[u8]>, count: usize) {
    Encoder::array_header(out, 3);
    Encoder::bulk_string(out, kind.as_bytes());
    match name {
        Some(n) => Encoder::bulk_string(out, n),
        None => Encoder::null_bulk(out),
    }
    Encoder::integer(out, count as i64);
}

pub fn subscribe(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let mut out = Vec::new();
    for ch in args {
        let channel = Bytes::copy_from_slice(ch);
        server.pubsub.subscribe(token, channel.clone());
        conn.sub_channels.insert(channel.clone());
        push_ack(&mut out, "subscribe", Some(&channel), conn.subscription_count());
    }
    Ok(Outcome::Reply(out))
}

pub fn psubscribe(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let mut out = Vec::new();
    for pat in args {
        let pattern = Bytes::copy_from_slice(pat);
        server.pubsub.psubscribe(token, pattern.clone());
        conn.sub_patterns.insert(pattern.clone());
        push_ack(&mut out, "psubscribe", Some(&pattern), conn.subscription_count());
    }
    Ok(Outcome::Reply(out))
}

pub fn unsubscribe(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let mut out = Vec::new();
    let channels: Vec<Bytes> = if args.is_empty() { conn.sub_channels.iter().cloned().collect() } else { args.iter().map(|a| Bytes::copy_from_slice(a)).collect() };
    if channels.is_empty() {
        push_ack(&mut out, "unsubscribe", None, conn.subscription_count());
    }
    for ch in channels {
        conn.sub_channels.remove(&ch);
        server.pubsub.unsubscribe(token, &ch);
        push_ack(&mut out, "unsubscribe", Some(&ch), conn.subscription_count());
    }
    Ok(Outcome::Reply(out))
}

pub fn punsubscribe(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let mut out = Vec::new();
    let patterns: Vec<Bytes> = if args.is_empty() { conn.sub_patterns.iter().cloned().collect() } else { args.iter().map(|a| Bytes::copy_from_slice(a)).collect() };
    if patterns.is_empty() {
        push_ack(&mut out, "punsubscribe", None, conn.subscription_count());
    }
    for pat in patterns {
        conn.sub_patterns.remove(&pat);
        server.pubsub.punsubscribe(token, &pat);
        push_ack(&mut out, "punsubscribe", Some(&pat), conn.subscription_count());
    }
    Ok(Outcome::Reply(out))
}

pub fn publish(server: &mut Server, _conn: &mut Connection, conns: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    let channel = &args[0];
    let msg = &args[1];
    let targets = server.pubsub.resolve_publish(channel);

    let mut direct_msg = Vec::new();
    Encoder::array_header(&mut direct_msg, 3);
    Encoder::bulk_string(&mut direct_msg, b"message");
    Encoder::bulk_string(&mut direct_msg, channel);
    Encoder::bulk_string(&mut direct_msg, msg);
    for t in &targets.direct {
        if *t != token {
            if let Some(c) = conns.get_mut(t) {
                c.queue_reply(&direct_msg);
            }
        }
    }

    for (pattern, t) in &targets.pattern_matches {
        if *t == token {
            continue;
        }
        let mut out = Vec::new();
        Encoder::array_header(&mut out, 4);
        Encoder::bulk_string(&mut out, b"pmessage");
        Encoder::bulk_string(&mut out, pattern);
        Encoder::bulk_string(&mut out, channel);
        Encoder::bulk_string(&mut out, msg);
        if let Some(c) = conns.get_mut(t) {
            c.queue_reply(&out);
        }
    }

    Ok(Outcome::Reply(resp::integer(targets.count() as i64)))
}
