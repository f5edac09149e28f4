//! Blocking-client registry (§4.9): parks connections on keys instead of
//! spawning a thread per waiter, and fans out wakeups from the mutation
//! path that already holds `&mut Keyspace`.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::keyspace::Keyspace;
use crate::resp::{self, Encoder};
use crate::stream::StreamId;

pub enum BlockContext {
    /// `BLPOP`/`BRPOP`: take the first element of the first key (in the
    /// client's own key order) that holds a non-empty list.
    ListPop { from_front: bool },
    /// `XREAD BLOCK`: wake once any requested stream has an entry whose
    /// ID exceeds the paired last-seen ID.
    StreamRead { last_ids: Vec<(Bytes, StreamId)>, count: Option<usize> },
}

struct Entry {
    keys: Vec<Bytes>,
    context: BlockContext,
    deadline: Option<Instant>,
}

#[derive(Default)]
pub struct BlockingRegistry {
    entries: HashMap<Token, Entry>,
    index: HashMap<Bytes, VecDeque<Token>>,
}

impl BlockingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self, token: Token, keys: Vec<Bytes>, context: BlockContext, deadline: Option<Instant>) {
        for key in &keys {
            self.index.entry(key.clone()).or_default().push_back(token);
        }
        self.entries.insert(token, Entry { keys, context, deadline });
    }

    pub fn is_blocked(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    fn remove_entry(&mut self, token: Token) -> Option<Entry> {
        let entry = self.entries.remove(&token)?;
        for key in &entry.keys {
            if let Some(queue) = self.index.get_mut(key) {
                queue.retain(|t| *t != token);
                if queue.is_empty() {
                    self.index.remove(key);
                }
            }
        }
        Some(entry)
    }

    /// Cancels every blocking entry this connection owns, without a
    /// reply (connection close, §5 "Cancellation").
    pub fn cancel(&mut self, token: Token) {
        self.remove_entry(token);
    }

    /// Called after a write to `key`. Wakes the first FIFO-eligible
    /// waiter whose predicate is now satisfied, repeating while a waiter
    /// remains and data is still available. `wake` is handed the
    /// woken token and its reply bytes.
    pub fn on_data_added(&mut self, key: &[u8], keyspace: &mut Keyspace, now: Instant, mut wake: impl FnMut(Token, Vec<u8>)) {
        loop {
            let Some(queue) = self.index.get(key) else { return };
            let candidates: Vec<Token> = queue.iter().copied().collect();
            let mut woke_any = false;
            for token in candidates {
                if let Some(reply) = self.try_satisfy(token, keyspace, now) {
                    self.remove_entry(token);
                    wake(token, reply);
                    woke_any = true;
                    break;
                }
            }
            if !woke_any {
                return;
            }
        }
    }

    /// Checks (and, if satisfied, consumes) the entry's predicate. A
    /// list-pop entry actually pops on success; a stream-read entry only
    /// peeks, since XREAD doesn't consume entries.
    fn try_satisfy(&self, token: Token, keyspace: &mut Keyspace, now: Instant) -> Option<Vec<u8>> {
        let entry = self.entries.get(&token)?;
        match &entry.context {
            BlockContext::ListPop { from_front } => {
                for key in &entry.keys {
                    let popped = keyspace.update_existing(key, now, |value| {
                        let list = value.as_list_mut()?;
                        if *from_front { list.pop_front() } else { list.pop_back() }
                    });
                    if let Some(Some(value)) = popped {
                        let mut out = Vec::new();
                        Encoder::array_header(&mut out, 2);
                        Encoder::bulk_string(&mut out, key);
                        Encoder::bulk_string(&mut out, &value);
                        return Some(out);
                    }
                }
                None
            }
            BlockContext::StreamRead { last_ids, count } => {
                let mut per_stream = Vec::new();
                for (key, after) in last_ids {
                    if let Some(entries) = keyspace.with_existing(key, now, |value| {
                        value.as_stream().map(|s| s.after(*after, *count)).unwrap_or_default()
                    }) {
                        if !entries.is_empty() {
                            per_stream.push((key.clone(), entries));
                        }
                    }
                }
                if per_stream.is_empty() {
                    return None;
                }
                let mut out = Vec::new();
                Encoder::array_header(&mut out, per_stream.len());
                for (key, entries) in per_stream {
                    Encoder::array_header(&mut out, 2);
                    Encoder::bulk_string(&mut out, &key);
                    Encoder::array_header(&mut out, entries.len());
                    for e in entries {
                        Encoder::array_header(&mut out, 2);
                        Encoder::bulk_string(&mut out, e.id.to_string().as_bytes());
                        Encoder::array_header(&mut out, e.fields.len() * 2);
                        for (f, v) in e.fields {
                            Encoder::bulk_string(&mut out, &f);
                            Encoder::bulk_string(&mut out, &v);
                        }
                    }
                }
                Some(out)
            }
        }
    }

    /// Periodic tick (§4.12): evicts entries past their deadline, each
    /// getting a null-bulk reply.
    pub fn sweep_expired(&mut self, now: Instant, mut on_timeout: impl FnMut(Token, Vec<u8>)) {
        let expired: Vec<Token> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline.map(|d| now >= d).unwrap_or(false))
            .map(|(t, _)| *t)
            .collect();
        for token in expired {
            self.remove_entry(token);
            on_timeout(token, resp::null_array());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn tok(n: usize) -> Token {
        Token(n)
    }

    #[test]
    fn wakes_first_waiter_fifo_on_push() {
        let mut reg = BlockingRegistry::new();
        let mut ks = Keyspace::new();
        let now = Instant::now();
        reg.block(tok(1), vec![Bytes::from_static(b"L")], BlockContext::ListPop { from_front: true }, None);
        reg.block(tok(2), vec![Bytes::from_static(b"L")], BlockContext::ListPop { from_front: true }, None);

        ks.compute(
            b"L",
            now,
            || Value::List(crate::quicklist::QuickList::new()),
            |v| -> Result<(), crate::error::CommandError> {
                v.as_list_mut().unwrap().push_back(Bytes::from_static(b"v"));
                Ok(())
            },
        )
        .unwrap();
        let mut woken = vec![];
        reg.on_data_added(b"L", &mut ks, now, |t, reply| woken.push((t, reply)));
        assert_eq!(woken.len(), 1);
        assert_eq!(woken[0].0, tok(1));
        assert!(!reg.is_blocked(tok(1)));
        assert!(reg.is_blocked(tok(2)));
    }

    #[test]
    fn sweep_expired_times_out_with_null_reply() {
        let mut reg = BlockingRegistry::new();
        let now = Instant::now();
        reg.block(tok(1), vec![Bytes::from_static(b"L")], BlockContext::ListPop { from_front: true }, Some(now));
        let mut timed_out = vec![];
        reg.sweep_expired(now, |t, reply| timed_out.push((t, reply)));
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].1, resp::null_array());
    }
}
