//! Replication commands (§6, §4.11): REPLCONF/PSYNC/WAIT. Grounded on
//! `cmd.rs`'s `replconfCommand`/`syncCommand`/`waitCommand`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mio::Token;

use crate::commands::{parse_u16, parse_u64, parse_usize};
use crate::connection::{Connection, ParkedBlock, ReplRole};
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::replication;
use crate::resp;
use crate::server::Server;

pub fn replconf(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    if args.is_empty() {
        return Err(CommandError::Syntax);
    }
    match args[0].to_ascii_uppercase().as_slice() {
        b"LISTENING-PORT" => {
            let port = parse_u16(args.get(1).ok_or(CommandError::Syntax)?)?;
            conn.replica_listening_port = Some(port);
            Ok(Outcome::Reply(resp::simple("OK")))
        }
        b"CAPA" => Ok(Outcome::Reply(resp::simple("OK"))),
        b"GETACK" => Ok(Outcome::Reply(replication::build_getack_reply(server.repl.offset()))),
        b"ACK" => {
            let offset = parse_u64(args.get(1).ok_or(CommandError::Syntax)?)?;
            conn.replica_acked_offset = offset;
            Ok(Outcome::Reply(Vec::new()))
        }
        _ => Ok(Outcome::Reply(resp::simple("OK"))),
    }
}

pub fn psync(server: &mut Server, conn: &mut Connection, _c: &mut HashMap<Token, Connection>, token: Token, _args: &[Vec<u8>], _now: Instant) -> CommandResult<Outcome> {
    conn.repl_role = ReplRole::Replica;
    server.repl.add_replica(token);

    let mut out = Vec::new();
    out.extend_from_slice(format!("+FULLRESYNC {} 0\r\n", server.repl.replid).as_bytes());
    out.extend_from_slice(format!("${}\r\n", replication::EMPTY_RDB_PREAMBLE.len()).as_bytes());
    out.extend_from_slice(replication::EMPTY_RDB_PREAMBLE);
    Ok(Outcome::Reply(out))
}

pub fn wait(server: &mut Server, conn: &mut Connection, conns: &mut HashMap<Token, Connection>, token: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let numreplicas = parse_usize(&args[0])?;
    let timeout_ms = parse_u64(&args[1])?;

    let acked: HashMap<Token, u64> = conns.iter().map(|(t, c)| (*t, c.replica_acked_offset)).collect();
    let current = server.repl.acked_count(&acked, server.repl.offset());
    if current >= numreplicas || timeout_ms == 0 {
        return Ok(Outcome::Reply(resp::integer(current as i64)));
    }

    let deadline = Some(now + Duration::from_millis(timeout_ms));
    server.repl.register_wait(token, numreplicas, deadline);
    conn.parked = Some(ParkedBlock { deadline });
    Ok(Outcome::Async)
}
