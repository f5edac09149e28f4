//! Append-only stream: a totally ordered map keyed by `ms-seq`,
//! preserving insertion order of the field/value pairs within each
//! entry (§3, §4.3).

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };

    pub fn parse(s: &str) -> Result<StreamId, CommandError> {
        match s.split_once('-') {
            Some((ms, seq)) => Ok(StreamId {
                ms: ms.parse().map_err(|_| CommandError::InvalidStreamId)?,
                seq: seq.parse().map_err(|_| CommandError::InvalidStreamId)?,
            }),
            None => Ok(StreamId {
                ms: s.parse().map_err(|_| CommandError::InvalidStreamId)?,
                seq: 0,
            }),
        }
    }

}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// What the caller asked for when appending with `XADD`.
pub enum IdSpec {
    /// `*`: fully auto-generated.
    Auto,
    /// `ms-*`: explicit millisecond component, auto sequence.
    AutoSeq(u64),
    /// `ms-seq`: fully explicit.
    Explicit(StreamId),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, Vec<(Bytes, Bytes)>>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Resolves and appends a new entry per the ID-generation rules in
    /// §4.3, returning the ID actually assigned.
    pub fn append(
        &mut self,
        spec: IdSpec,
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, CommandError> {
        let id = match spec {
            IdSpec::Auto => {
                let ms = now_ms.max(self.last_id.ms);
                let seq = if ms == self.last_id.ms { self.last_id.seq + 1 } else { 0 };
                StreamId { ms, seq }
            }
            IdSpec::AutoSeq(ms) => {
                if ms == self.last_id.ms && !self.entries.is_empty() {
                    StreamId { ms, seq: self.last_id.seq + 1 }
                } else if self.entries.is_empty() && ms == 0 {
                    StreamId { ms, seq: 1 }
                } else if ms < self.last_id.ms {
                    return Err(CommandError::StreamIdTooSmall);
                } else {
                    StreamId { ms, seq: 0 }
                }
            }
            IdSpec::Explicit(id) => {
                if id == StreamId::ZERO {
                    return Err(CommandError::StreamIdZero);
                }
                if !self.entries.is_empty() || self.last_id != StreamId::ZERO {
                    if id <= self.last_id {
                        return Err(CommandError::StreamIdExists);
                    }
                } else if id == StreamId::ZERO {
                    return Err(CommandError::StreamIdZero);
                }
                id
            }
        };

        self.entries.insert(id, fields);
        self.last_id = id;
        Ok(id)
    }

    /// Inclusive range query. `-`/`+` are passed in already resolved to
    /// `StreamId::MIN`/`MAX` by the caller.
    pub fn range(&self, start: StreamId, stop: StreamId, count: Option<usize>) -> Vec<Entry> {
        let iter = self
            .entries
            .range(start..=stop)
            .map(|(id, fields)| Entry { id: *id, fields: fields.clone() });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// Entries strictly greater than `after`, used by XREAD/blocking reads.
    pub fn after(&self, after: StreamId, count: Option<usize>) -> Vec<Entry> {
        let iter = self
            .entries
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .map(|(id, fields)| Entry { id: *id, fields: fields.clone() });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn has_after(&self, after: StreamId) -> bool {
        self.entries.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)).next().is_some()
    }

    pub fn remove(&mut self, ids: &[StreamId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.entries.remove(id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f() -> Vec<(Bytes, Bytes)> {
        vec![(Bytes::from_static(b"k"), Bytes::from_static(b"v"))]
    }

    #[test]
    fn auto_ids_are_monotonic() {
        let mut s = Stream::new();
        let id1 = s.append(IdSpec::Auto, f(), 1000).unwrap();
        let id2 = s.append(IdSpec::Auto, f(), 1000).unwrap();
        let id3 = s.append(IdSpec::Auto, f(), 999).unwrap();
        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn zero_zero_is_rejected() {
        let mut s = Stream::new();
        let err = s.append(IdSpec::Explicit(StreamId::ZERO), f(), 0).unwrap_err();
        assert_eq!(err, CommandError::StreamIdZero);
    }

    #[test]
    fn explicit_id_must_exceed_last() {
        let mut s = Stream::new();
        s.append(IdSpec::Explicit(StreamId { ms: 5, seq: 0 }), f(), 0).unwrap();
        let err = s.append(IdSpec::Explicit(StreamId { ms: 5, seq: 0 }), f(), 0).unwrap_err();
        assert_eq!(err, CommandError::StreamIdExists);
        let err2 = s.append(IdSpec::Explicit(StreamId { ms: 4, seq: 9 }), f(), 0).unwrap_err();
        assert_eq!(err2, CommandError::StreamIdExists);
    }

    #[test]
    fn range_is_insertion_order() {
        let mut s = Stream::new();
        let id1 = s.append(IdSpec::Auto, f(), 1).unwrap();
        let id2 = s.append(IdSpec::Auto, f(), 2).unwrap();
        let got = s.range(StreamId::MIN, StreamId::MAX, None);
        assert_eq!(got.iter().map(|e| e.id).collect::<Vec<_>>(), vec![id1, id2]);
    }
}
