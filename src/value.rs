//! Tagged value union stored per keyspace entry. One variant per key,
//! never an inheritance hierarchy — every access site checks the
//! variant and yields `WRONGTYPE` on mismatch.

use bytes::Bytes;

use crate::quicklist::QuickList;
use crate::stream::Stream;
use crate::zset::QuickZSet;

#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    List(QuickList),
    Stream(Stream),
    ZSet(QuickZSet),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Stream(_) => "stream",
            Value::ZSet(_) => "zset",
        }
    }

    pub fn as_str(&self) -> Option<&Bytes> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&QuickList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut QuickList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_zset(&self) -> Option<&QuickZSet> {
        match self {
            Value::ZSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_zset_mut(&mut self) -> Option<&mut QuickZSet> {
        match self {
            Value::ZSet(z) => Some(z),
            _ => None,
        }
    }

    /// True when the collection-typed value holds no elements and the
    /// key should therefore be removed from the keyspace (§3 invariant).
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(l) => l.len() == 0,
            Value::Stream(s) => s.len() == 0,
            Value::ZSet(z) => z.len() == 0,
        }
    }
}
