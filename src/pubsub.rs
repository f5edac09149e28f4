//! Channel and pattern subscription index (§4.10). Delivery itself
//! writes into other connections' write buffers, which this module
//! doesn't own — `publish` only resolves *who* should receive a
//! message; the caller (`commands::pubsub`) does the actual fan-out.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use mio::Token;

use crate::glob;

#[derive(Default)]
pub struct PubSub {
    channels: HashMap<Bytes, HashSet<Token>>,
    patterns: HashMap<Bytes, HashSet<Token>>,
}

/// Subscribers resolved for one `PUBLISH`, captured before delivery so
/// the reported count matches "subscribed at the start of the call"
/// even if delivery itself somehow changes subscriptions.
pub struct PublishTargets {
    pub direct: Vec<Token>,
    /// `(pattern, token)` pairs so `pmessage` replies can name the
    /// pattern that matched, not just the channel.
    pub pattern_matches: Vec<(Bytes, Token)>,
}

impl PublishTargets {
    pub fn count(&self) -> usize {
        self.direct.len() + self.pattern_matches.len()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, token: Token, channel: Bytes) {
        self.channels.entry(channel).or_default().insert(token);
    }

    pub fn psubscribe(&mut self, token: Token, pattern: Bytes) {
        self.patterns.entry(pattern).or_default().insert(token);
    }

    pub fn unsubscribe(&mut self, token: Token, channel: &[u8]) {
        if let Some(set) = self.channels.get_mut(channel) {
            set.remove(&token);
            if set.is_empty() {
                self.channels.remove(channel);
            }
        }
    }

    pub fn punsubscribe(&mut self, token: Token, pattern: &[u8]) {
        if let Some(set) = self.patterns.get_mut(pattern) {
            set.remove(&token);
            if set.is_empty() {
                self.patterns.remove(pattern);
            }
        }
    }

    /// Drops every subscription this connection holds, used on close and
    /// on `UNSUBSCRIBE`/`PUNSUBSCRIBE` with no arguments.
    pub fn unsubscribe_all(&mut self, token: Token) {
        self.channels.retain(|_, set| {
            set.remove(&token);
            !set.is_empty()
        });
        self.patterns.retain(|_, set| {
            set.remove(&token);
            !set.is_empty()
        });
    }

    pub fn channel_count(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map(HashSet::len).unwrap_or(0)
    }

    pub fn pattern_count(&self, pattern: &[u8]) -> usize {
        self.patterns.get(pattern).map(HashSet::len).unwrap_or(0)
    }

    pub fn resolve_publish(&self, channel: &[u8]) -> PublishTargets {
        let direct = self.channels.get(channel).map(|s| s.iter().copied().collect()).unwrap_or_default();
        let mut pattern_matches = Vec::new();
        for (pattern, subs) in &self.patterns {
            if glob::matches(pattern, channel) {
                for token in subs {
                    pattern_matches.push((pattern.clone(), *token));
                }
            }
        }
        PublishTargets { direct, pattern_matches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(n: usize) -> Token {
        Token(n)
    }

    #[test]
    fn publish_counts_direct_and_pattern_subscribers() {
        let mut ps = PubSub::new();
        ps.subscribe(tok(1), Bytes::from_static(b"news"));
        ps.psubscribe(tok(2), Bytes::from_static(b"n*"));
        let targets = ps.resolve_publish(b"news");
        assert_eq!(targets.count(), 2);
    }

    #[test]
    fn unsubscribe_all_clears_every_index() {
        let mut ps = PubSub::new();
        ps.subscribe(tok(1), Bytes::from_static(b"a"));
        ps.psubscribe(tok(1), Bytes::from_static(b"b*"));
        ps.unsubscribe_all(tok(1));
        assert_eq!(ps.channel_count(b"a"), 0);
        assert_eq!(ps.pattern_count(b"b*"), 0);
    }
}
