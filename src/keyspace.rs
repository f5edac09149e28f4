//! Key -> tagged value map with lazy expiry and per-key version
//! counters (§4.2, §4.8 versioning).

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;

use crate::error::CommandError;
use crate::expiry::ExpirePolicy;
use crate::glob;
use crate::value::Value;

struct Entry {
    value: Value,
    expiry: ExpirePolicy,
    version: u64,
}

#[derive(Default)]
pub struct Keyspace {
    map: HashMap<Bytes, Entry>,
    /// Monotonic counter handed out to new/updated entries so WATCH can
    /// snapshot a value even for keys that don't exist yet at watch time.
    next_version: u64,
    /// Version stamped on a key at the moment it stops existing (DEL,
    /// expiry, or a write that empties a collection), so `version()`
    /// keeps climbing across a write-then-remove sequence instead of
    /// reverting to 0 and hiding the write from a `WATCH`er (§4.8).
    tombstones: HashMap<Bytes, u64>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Records that `key` stopped existing as of `version`, overwriting
    /// any earlier tombstone for the same key.
    fn tombstone(&mut self, key: &[u8], version: u64) {
        self.tombstones.insert(Bytes::copy_from_slice(key), version);
    }

    /// Removes `key` and tombstones it with a freshly bumped version.
    /// Used wherever the removal itself is the write (DEL, expiry) as
    /// opposed to a write that merely empties out an existing entry
    /// (see `compute`/`update_existing`, which stamp the version they
    /// already bumped for the write instead of bumping a second one).
    fn evict(&mut self, key: &[u8]) -> bool {
        if self.map.remove(key).is_some() {
            let version = self.bump_version();
            self.tombstone(key, version);
            true
        } else {
            false
        }
    }

    /// Removes `key` if its entry is present but expired. Called before
    /// every read/write access (lazy expiry, §4.2).
    fn expire_if_needed(&mut self, key: &[u8], now: Instant) {
        let expired = self.map.get(key).map(|e| e.expiry.is_expired(now)).unwrap_or(false);
        if expired {
            self.evict(key);
        }
    }

    pub fn type_name(&mut self, key: &[u8], now: Instant) -> &'static str {
        self.expire_if_needed(key, now);
        self.map.get(key).map(|e| e.value.type_name()).unwrap_or("none")
    }

    pub fn get(&mut self, key: &[u8], now: Instant) -> Option<&Value> {
        self.expire_if_needed(key, now);
        self.map.get(key).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, key: &[u8], now: Instant) -> Option<&mut Value> {
        self.expire_if_needed(key, now);
        self.map.get_mut(key).map(|e| &mut e.value)
    }

    /// Version of a key's last write, the version it was removed at if
    /// it once existed and no longer does, or 0 if it has never existed
    /// at all (WATCH on a not-yet-existing key still needs a stable
    /// baseline).
    pub fn version(&mut self, key: &[u8], now: Instant) -> u64 {
        self.expire_if_needed(key, now);
        match self.map.get(key) {
            Some(e) => e.version,
            None => self.tombstones.get(key).copied().unwrap_or(0),
        }
    }

    /// Replaces (or inserts) the value at `key` outright, resetting its
    /// expiry policy, per the "reassignment replaces atomically" rule.
    pub fn set(&mut self, key: Bytes, value: Value, expiry: ExpirePolicy) {
        let version = self.bump_version();
        self.tombstones.remove(&key);
        self.map.insert(key, Entry { value, expiry, version });
    }

    /// Fetches-or-creates the value at `key` via `init` if absent, runs
    /// `f` against it, then removes the key if the collection emptied
    /// out. Bumps the key's version on success (a write happened). If
    /// `f` errors against a key it just auto-created, that empty
    /// placeholder is removed rather than left behind as a phantom key.
    pub fn compute<T>(
        &mut self,
        key: &[u8],
        now: Instant,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        self.expire_if_needed(key, now);
        let freshly_created = !self.map.contains_key(key);
        if freshly_created {
            self.map.insert(
                Bytes::copy_from_slice(key),
                Entry { value: init(), expiry: ExpirePolicy::Never, version: 0 },
            );
        }
        let entry = self.map.get_mut(key).expect("just inserted");
        match f(&mut entry.value) {
            Ok(result) => {
                let version = self.bump_version();
                let entry = self.map.get_mut(key).expect("just checked");
                entry.version = version;
                if entry.value.is_empty_collection() {
                    self.map.remove(key);
                    self.tombstone(key, version);
                }
                Ok(result)
            }
            Err(e) => {
                if freshly_created {
                    self.map.remove(key);
                }
                Err(e)
            }
        }
    }

    /// Runs `f` against an existing value at `key`, returning `None` if
    /// absent, without creating anything and without bumping the
    /// version (read-only helper for handlers that already checked type).
    pub fn with_existing<T>(&mut self, key: &[u8], now: Instant, f: impl FnOnce(&mut Value) -> T) -> Option<T> {
        self.expire_if_needed(key, now);
        self.map.get_mut(key).map(|e| f(&mut e.value))
    }

    /// Like `with_existing`, but for writes against a value that must
    /// already exist: bumps the key's version and removes the key if the
    /// mutation emptied its collection (LPOP/ZREM/XDEL and friends).
    /// Returns `None` without side effects if the key is absent.
    pub fn update_existing<T>(&mut self, key: &[u8], now: Instant, f: impl FnOnce(&mut Value) -> T) -> Option<T> {
        self.expire_if_needed(key, now);
        if !self.map.contains_key(key) {
            return None;
        }
        let version = self.bump_version();
        let entry = self.map.get_mut(key).expect("just checked");
        let result = f(&mut entry.value);
        entry.version = version;
        if entry.value.is_empty_collection() {
            self.map.remove(key);
            self.tombstone(key, version);
        }
        Some(result)
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.evict(key)
    }

    pub fn exists(&mut self, key: &[u8], now: Instant) -> bool {
        self.expire_if_needed(key, now);
        self.map.contains_key(key)
    }

    pub fn dbsize(&mut self, now: Instant) -> usize {
        let expired: Vec<Bytes> = self
            .map
            .iter()
            .filter(|(_, e)| e.expiry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            self.evict(&k);
        }
        self.map.len()
    }

    pub fn keys_matching(&mut self, pattern: &[u8], now: Instant) -> Vec<Bytes> {
        let expired: Vec<Bytes> = self
            .map
            .iter()
            .filter(|(_, e)| e.expiry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            self.evict(&k);
        }
        self.map.keys().filter(|k| glob::matches(pattern, k)).cloned().collect()
    }

    /// Sets a key's expiry policy. A write (§4.8): bumps the version the
    /// same way `update_existing` does.
    pub fn set_expiry(&mut self, key: &[u8], now: Instant, expiry: ExpirePolicy) -> bool {
        self.expire_if_needed(key, now);
        if !self.map.contains_key(key) {
            return false;
        }
        let version = self.bump_version();
        let entry = self.map.get_mut(key).expect("just checked");
        entry.expiry = expiry;
        entry.version = version;
        true
    }

    pub fn ttl(&mut self, key: &[u8], now: Instant) -> Option<Option<std::time::Duration>> {
        self.expire_if_needed(key, now);
        self.map.get(key).map(|e| e.expiry.ttl(now))
    }

    /// Clears a key's expiry policy. A write (§4.8): bumps the version
    /// the same way `update_existing` does.
    pub fn persist(&mut self, key: &[u8], now: Instant) -> bool {
        self.expire_if_needed(key, now);
        if !self.map.contains_key(key) {
            return false;
        }
        let version = self.bump_version();
        let entry = self.map.get_mut(key).expect("just checked");
        let had_ttl = !matches!(entry.expiry, ExpirePolicy::Never);
        entry.expiry = ExpirePolicy::Never;
        entry.version = version;
        had_ttl
    }

    /// Sweeps the whole map for lazily-missed expiries (scheduler tick,
    /// §4.12). Returns the number of keys evicted.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<Bytes> = self
            .map
            .iter()
            .filter(|(_, e)| e.expiry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let n = expired.len();
        for k in expired {
            self.evict(&k);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_reverts_to_none_after_removal() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")), ExpirePolicy::Never);
        assert_eq!(ks.type_name(b"k", now), "string");
        ks.remove(b"k");
        assert_eq!(ks.type_name(b"k", now), "none");
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(
            Bytes::from_static(b"k"),
            Value::Str(Bytes::from_static(b"v")),
            ExpirePolicy::from_px_millis(0),
        );
        let later = now + std::time::Duration::from_millis(5);
        assert!(ks.get(b"k", later).is_none());
    }

    #[test]
    fn glob_search_matches_pattern() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(Bytes::from_static(b"foo:1"), Value::Str(Bytes::new()), ExpirePolicy::Never);
        ks.set(Bytes::from_static(b"bar:1"), Value::Str(Bytes::new()), ExpirePolicy::Never);
        let matched = ks.keys_matching(b"foo:*", now);
        assert_eq!(matched, vec![Bytes::from_static(b"foo:1")]);
    }

    #[test]
    fn version_keeps_climbing_across_set_then_del() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        let watched_at = ks.version(b"k", now);
        assert_eq!(watched_at, 0);

        ks.set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")), ExpirePolicy::Never);
        ks.remove(b"k");

        assert_ne!(ks.version(b"k", now), watched_at);
    }

    #[test]
    fn version_keeps_climbing_across_expiry() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(
            Bytes::from_static(b"k"),
            Value::Str(Bytes::from_static(b"v")),
            ExpirePolicy::from_px_millis(0),
        );
        let watched_at = ks.version(b"k", now);

        let later = now + std::time::Duration::from_millis(5);
        assert!(ks.get(b"k", later).is_none());
        assert_ne!(ks.version(b"k", later), watched_at);
    }

    #[test]
    fn set_expiry_and_persist_bump_version() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")), ExpirePolicy::Never);
        let v0 = ks.version(b"k", now);

        assert!(ks.set_expiry(b"k", now, ExpirePolicy::from_px_millis(60_000)));
        let v1 = ks.version(b"k", now);
        assert_ne!(v1, v0);

        assert!(ks.persist(b"k", now));
        let v2 = ks.version(b"k", now);
        assert_ne!(v2, v1);
    }

    #[test]
    fn compute_discards_freshly_created_key_on_error() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        let err: Result<(), CommandError> = ks.compute(
            b"k",
            now,
            || Value::Str(Bytes::new()),
            |_v| Err(CommandError::WrongType),
        );
        assert!(err.is_err());
        assert!(!ks.exists(b"k", now));
    }

    #[test]
    fn reinserting_a_removed_key_clears_its_tombstone() {
        let mut ks = Keyspace::new();
        let now = Instant::now();
        ks.set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")), ExpirePolicy::Never);
        ks.remove(b"k");
        let tombstoned_at = ks.version(b"k", now);

        ks.set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v2")), ExpirePolicy::Never);
        assert_ne!(ks.version(b"k", now), tombstoned_at);
    }
}
