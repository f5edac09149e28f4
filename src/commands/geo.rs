//! Geospatial commands (§6, §4.6): GEOADD/GEODIST/GEOPOS/GEOSEARCH,
//! layered directly on the zset type (§3 "geo is just a zset").
//! Grounded on `cmd.rs`'s `geoaddCommand`/`geodistCommand`.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::commands::{format_score, parse_f64};
use crate::connection::Connection;
use crate::dispatch::Outcome;
use crate::error::{CommandError, CommandResult};
use crate::geo::{self, DistanceUnit};
use crate::resp;
use crate::server::Server;
use crate::value::Value;
use crate::zset::QuickZSet;

pub fn geoadd(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let rest = &args[1..];
    if rest.is_empty() || rest.len() % 3 != 0 {
        return Err(CommandError::WrongArgCount("geoadd".into()));
    }
    let mut entries = Vec::with_capacity(rest.len() / 3);
    for chunk in rest.chunks(3) {
        let lon = parse_f64(&chunk[0])?;
        let lat = parse_f64(&chunk[1])?;
        let bits = geo::encode(lon, lat).ok_or_else(|| CommandError::Other("invalid longitude,latitude pair".into()))?;
        entries.push((bits as f64, Bytes::copy_from_slice(&chunk[2])));
    }
    let added = server.keyspace.compute(&args[0], now, || Value::ZSet(QuickZSet::new()), |v| {
        let z = v.as_zset_mut().ok_or(CommandError::WrongType)?;
        let mut added = 0;
        for (score, member) in entries {
            if z.insert(member, score) {
                added += 1;
            }
        }
        Ok::<_, CommandError>(added)
    })?;
    Ok(Outcome::Reply(resp::integer(added as i64)))
}

pub fn geodist(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let unit = match args.get(3) {
        None => DistanceUnit::Meters,
        Some(u) => DistanceUnit::parse(&String::from_utf8_lossy(u)).ok_or(CommandError::Syntax)?,
    };
    let z = match server.keyspace.get(&args[0], now) {
        None => return Ok(Outcome::Reply(resp::null_bulk())),
        Some(v) => v.as_zset().ok_or(CommandError::WrongType)?,
    };
    let (Some(s1), Some(s2)) = (z.score(&args[1]), z.score(&args[2])) else {
        return Ok(Outcome::Reply(resp::null_bulk()));
    };
    let (lon1, lat1) = geo::decode(s1 as u64);
    let (lon2, lat2) = geo::decode(s2 as u64);
    let meters = geo::haversine_m(lon1, lat1, lon2, lat2);
    Ok(Outcome::Reply(resp::bulk(format!("{:.4}", unit.from_meters(meters)).as_bytes())))
}

pub fn geopos(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let z = server.keyspace.get(&args[0], now).map(|v| v.as_zset().ok_or(CommandError::WrongType)).transpose()?;
    let mut elements = Vec::with_capacity(args.len() - 1);
    for member in &args[1..] {
        let mut elem = Vec::new();
        match z.and_then(|z| z.score(member)) {
            Some(score) => {
                let (lon, lat) = geo::decode(score as u64);
                elem.extend_from_slice(&resp::array_of(vec![
                    resp::bulk(format!("{lon:.17}").as_bytes()),
                    resp::bulk(format!("{lat:.17}").as_bytes()),
                ]));
            }
            None => elem.extend_from_slice(&resp::null_array()),
        }
        elements.push(elem);
    }
    Ok(Outcome::Reply(resp::array_of(elements)))
}

pub fn geosearch(server: &mut Server, _conn: &mut Connection, _c: &mut HashMap<Token, Connection>, _t: Token, args: &[Vec<u8>], now: Instant) -> CommandResult<Outcome> {
    let key = &args[0];
    let mut i = 1;
    let mut origin: Option<(f64, f64)> = None;
    let mut radius_m: Option<f64> = None;

    let z = server.keyspace.get(key, now).map(|v| v.as_zset().ok_or(CommandError::WrongType)).transpose()?;

    while i < args.len() {
        if args[i].eq_ignore_ascii_case(b"FROMMEMBER") {
            let member = args.get(i + 1).ok_or(CommandError::Syntax)?;
            let score = z.and_then(|z| z.score(member)).ok_or_else(|| CommandError::Other("could not decode requested zset member".into()))?;
            origin = Some(geo::decode(score as u64));
            i += 2;
        } else if args[i].eq_ignore_ascii_case(b"FROMLONLAT") {
            let lon = parse_f64(args.get(i + 1).ok_or(CommandError::Syntax)?)?;
            let lat = parse_f64(args.get(i + 2).ok_or(CommandError::Syntax)?)?;
            origin = Some((lon, lat));
            i += 3;
        } else if args[i].eq_ignore_ascii_case(b"BYRADIUS") {
            let r = parse_f64(args.get(i + 1).ok_or(CommandError::Syntax)?)?;
            let unit = DistanceUnit::parse(&String::from_utf8_lossy(args.get(i + 2).ok_or(CommandError::Syntax)?)).ok_or(CommandError::Syntax)?;
            radius_m = Some(unit.to_meters(r));
            i += 3;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let (lon, lat) = origin.ok_or(CommandError::Syntax)?;
    let radius_m = radius_m.ok_or(CommandError::Syntax)?;
    let Some(z) = z else {
        return Ok(Outcome::Reply(resp::array_of(vec![])));
    };

    let (lo, hi) = geo::bounding_score_range(lon, lat, radius_m);
    let candidates = z.range_by_score(lo as f64, hi as f64);
    let mut matches = Vec::new();
    for (member, score) in candidates {
        let (mlon, mlat) = geo::decode(score as u64);
        if geo::haversine_m(lon, lat, mlon, mlat) <= radius_m {
            matches.push(resp::bulk(&member));
        }
    }
    Ok(Outcome::Reply(resp::array_of(matches)))
}
