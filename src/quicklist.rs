//! Segmented list ("quicklist"): a deque of fixed-capacity segments.
//! Each segment is itself a small deque, so pushes/pops at either end of
//! the list are amortized O(1) without shifting the whole structure.

use std::collections::VecDeque;

use bytes::Bytes;

/// Suggested fixed capacity per segment (§3, §4.4).
const SEGMENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
struct Segment {
    items: VecDeque<Bytes>,
}

impl Segment {
    fn is_full(&self) -> bool {
        self.items.len() >= SEGMENT_CAPACITY
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuickList {
    segments: VecDeque<Segment>,
    len: usize,
}

impl QuickList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_front(&mut self, value: Bytes) {
        match self.segments.front_mut() {
            Some(seg) if !seg.is_full() => seg.items.push_front(value),
            _ => {
                let mut seg = Segment::default();
                seg.items.push_front(value);
                self.segments.push_front(seg);
            }
        }
        self.len += 1;
    }

    pub fn push_back(&mut self, value: Bytes) {
        match self.segments.back_mut() {
            Some(seg) if !seg.is_full() => seg.items.push_back(value),
            _ => {
                let mut seg = Segment::default();
                seg.items.push_back(value);
                self.segments.push_back(seg);
            }
        }
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        let seg = self.segments.front_mut()?;
        let val = seg.items.pop_front();
        if seg.items.is_empty() {
            self.segments.pop_front();
        }
        if val.is_some() {
            self.len -= 1;
        }
        val
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        let seg = self.segments.back_mut()?;
        let val = seg.items.pop_back();
        if seg.items.is_empty() {
            self.segments.pop_back();
        }
        if val.is_some() {
            self.len -= 1;
        }
        val
    }

    /// Pops up to `count` elements from the front, returning however
    /// many were actually available (§4.4 resolved open question: never
    /// fails when `count` exceeds the length, just returns the prefix).
    pub fn pop_front_n(&mut self, count: usize) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(count.min(self.len));
        for _ in 0..count {
            match self.pop_front() {
                Some(v) => out.push(v),
                None => break,
            }
        }
        out
    }

    pub fn pop_back_n(&mut self, count: usize) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(count.min(self.len));
        for _ in 0..count {
            match self.pop_back() {
                Some(v) => out.push(v),
                None => break,
            }
        }
        out
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        let mut remaining = index;
        for seg in &self.segments {
            if remaining < seg.items.len() {
                return seg.items.get(remaining);
            }
            remaining -= seg.items.len();
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.segments.iter().flat_map(|s| s.items.iter())
    }

    /// Inclusive-range slice per LRANGE semantics: negative indices count
    /// from the end, both clamped to `[0, len-1]`, empty if start>end.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        if self.len == 0 {
            return vec![];
        }
        let len = self.len as i64;
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i
            }
        };
        let mut start = norm(start);
        let mut stop = norm(stop);
        if stop >= len {
            stop = len - 1;
        }
        if start > stop || start >= len {
            return vec![];
        }
        if start < 0 {
            start = 0;
        }
        self.iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn lpush_yields_reverse_arg_order_at_head() {
        let mut l = QuickList::new();
        for v in ["a", "b", "c"] {
            l.push_front(b(v));
        }
        let all: Vec<_> = l.iter().cloned().collect();
        assert_eq!(all, vec![b("c"), b("b"), b("a")]);
    }

    #[test]
    fn rpush_preserves_arg_order() {
        let mut l = QuickList::new();
        for v in ["a", "b", "c"] {
            l.push_back(b(v));
        }
        let all: Vec<_> = l.iter().cloned().collect();
        assert_eq!(all, vec![b("a"), b("b"), b("c")]);
    }

    #[test]
    fn pop_count_exceeding_length_returns_available_prefix() {
        let mut l = QuickList::new();
        l.push_back(b("a"));
        l.push_back(b("b"));
        let popped = l.pop_front_n(10);
        assert_eq!(popped, vec![b("a"), b("b")]);
        assert_eq!(l.len(), 0);
    }

    #[test]
    fn range_handles_negative_and_out_of_range_indices() {
        let mut l = QuickList::new();
        for v in ["a", "b", "c", "d"] {
            l.push_back(b(v));
        }
        assert_eq!(l.range(0, -1), vec![b("a"), b("b"), b("c"), b("d")]);
        assert_eq!(l.range(-2, -1), vec![b("c"), b("d")]);
        assert_eq!(l.range(2, 1), Vec::<Bytes>::new());
        assert_eq!(l.range(0, 100), vec![b("a"), b("b"), b("c"), b("d")]);
    }

    #[test]
    fn segments_span_multiple_capacity_blocks() {
        let mut l = QuickList::new();
        for i in 0..200 {
            l.push_back(Bytes::from(i.to_string()));
        }
        assert_eq!(l.len(), 200);
        assert_eq!(l.get(199), Some(&Bytes::from("199")));
        assert!(l.segments.len() > 1);
    }
}
