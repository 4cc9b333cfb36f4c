//! The keyspace (spec §4.1): key→value mapping with lazy expiry, glob
//! enumeration, rename, and random-key selection. Every mutator in this
//! module is the single choke point other components go through, so
//! expiry and (at the engine layer) WATCH dirty-tracking stay uniform.

mod dump;
mod stream;
mod value;
mod zset;

pub use dump::{dump, restore};
pub use stream::{Consumer, Entry, Group, PendingEntry, Stream, StreamId};
pub use value::Value;
pub use zset::ZSet;

use bytes::Bytes;
use hashbrown::HashMap;
use rand::seq::IteratorRandom;
use std::time::Duration;

/// A keyspace: a flat map from key bytes to [`Value`] containers, each
/// with an optional absolute expiry deadline in Unix milliseconds.
#[derive(Default)]
pub struct Db {
    entries: HashMap<Bytes, Slot>,
}

struct Slot {
    value: Value,
    expires_at: Option<u64>,
}

impl Db {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_expired(entry: &Slot, now_ms: u64) -> bool {
        entry.expires_at.is_some_and(|deadline| deadline <= now_ms)
    }

    /// Reaps `key` if it has expired as of `now_ms`, returning whether it
    /// was reaped.
    fn reap_if_expired(&mut self, key: &[u8], now_ms: u64) -> bool {
        let expired = self.entries.get(key).is_some_and(|entry| Self::is_expired(entry, now_ms));
        if expired {
            self.entries.remove(key);
        }
        expired
    }

    pub fn get(&mut self, key: &[u8], now_ms: u64) -> Option<&Value> {
        self.reap_if_expired(key, now_ms);
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &[u8], now_ms: u64) -> Option<&mut Value> {
        self.reap_if_expired(key, now_ms);
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    pub fn exists(&mut self, key: &[u8], now_ms: u64) -> bool {
        self.get(key, now_ms).is_some()
    }

    pub fn contains_live(&self, key: &[u8], now_ms: u64) -> bool {
        self.entries.get(key).is_some_and(|entry| !Self::is_expired(entry, now_ms))
    }

    /// Inserts or replaces `key`. Clears any prior TTL unless
    /// `keep_ttl` is set (spec §4.8).
    pub fn set(&mut self, key: Bytes, value: Value, keep_ttl: bool) {
        let expires_at = if keep_ttl {
            self.entries.get(&key).and_then(|entry| entry.expires_at)
        } else {
            None
        };
        self.entries.insert(key, Slot { value, expires_at });
    }

    pub fn set_with_expiry(&mut self, key: Bytes, value: Value, expires_at: Option<u64>) {
        self.entries.insert(key, Slot { value, expires_at });
    }

    /// Gets-or-inserts the value at `key`, running `default` to produce
    /// an initial value if absent (or expired).
    pub fn entry_or_insert_with(
        &mut self,
        key: &Bytes,
        now_ms: u64,
        default: impl FnOnce() -> Value,
    ) -> &mut Value {
        self.reap_if_expired(key, now_ms);
        &mut self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot { value: default(), expires_at: None })
            .value
    }

    pub fn remove(&mut self, key: &[u8], now_ms: u64) -> Option<Value> {
        if self.reap_if_expired(key, now_ms) {
            return None;
        }
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Deletes `key` only if it is present and non-empty after
    /// `mutate` runs; used by list/set/hash/zset ops where popping the
    /// last element removes the key (spec §4.3–4.6).
    pub fn remove_if_empty(&mut self, key: &[u8], is_empty: impl FnOnce(&Value) -> bool) {
        if self.entries.get(key).is_some_and(|entry| is_empty(&entry.value)) {
            self.entries.remove(key);
        }
    }

    pub fn rename(&mut self, source: &[u8], dest: Bytes, now_ms: u64) -> bool {
        if self.reap_if_expired(source, now_ms) {
            return false;
        }
        let Some(entry) = self.entries.remove(source) else {
            return false;
        };
        self.entries.insert(dest, entry);
        true
    }

    pub fn rename_nx(&mut self, source: &[u8], dest: Bytes, now_ms: u64) -> bool {
        if self.contains_live(&dest, now_ms) {
            return false;
        }
        self.rename(source, dest, now_ms)
    }

    /// Keys matching `pattern`, filtering out expired entries as of
    /// `now_ms` without mutating the map (a point-in-time snapshot).
    pub fn keys_matching(&self, pattern: &[u8], now_ms: u64) -> Vec<Bytes> {
        self.entries
            .iter()
            .filter(|(_, entry)| !Self::is_expired(entry, now_ms))
            .filter(|(key, _)| crate::glob::matches(key, pattern))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn keys(&self, now_ms: u64) -> Vec<Bytes> {
        self.entries
            .iter()
            .filter(|(_, entry)| !Self::is_expired(entry, now_ms))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn random_key(&self, now_ms: u64) -> Option<Bytes> {
        self.entries
            .iter()
            .filter(|(_, entry)| !Self::is_expired(entry, now_ms))
            .map(|(key, _)| key.clone())
            .choose(&mut rand::thread_rng())
    }

    // --- Expiry (spec §4.8) ---

    pub fn expires_at(&self, key: &[u8], now_ms: u64) -> Option<u64> {
        let entry = self.entries.get(key)?;
        if Self::is_expired(entry, now_ms) {
            return None;
        }
        entry.expires_at
    }

    /// `None` means the key is absent; `Some(None)` means present
    /// without a TTL.
    pub fn ttl_state(&mut self, key: &[u8], now_ms: u64) -> Option<Option<u64>> {
        self.reap_if_expired(key, now_ms);
        self.entries.get(key).map(|entry| entry.expires_at)
    }

    pub fn set_expiry(&mut self, key: &[u8], expires_at: Option<u64>, now_ms: u64) -> bool {
        if self.reap_if_expired(key, now_ms) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    pub fn persist(&mut self, key: &[u8], now_ms: u64) -> bool {
        if self.reap_if_expired(key, now_ms) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                true
            }
            _ => false,
        }
    }
}

pub fn now_ms() -> u64 {
    duration_as_ms(crate::time::epoch())
}

fn duration_as_ms(duration: Duration) -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let millis = duration.as_millis() as u64;
    millis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_expiry_hides_expired_keys() {
        let mut db = Db::default();
        db.set_with_expiry(Bytes::from_static(b"k"), Value::String(vec![1]), Some(100));
        assert!(db.get(b"k", 50).is_some());
        assert!(db.get(b"k", 200).is_none());
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn set_without_keep_ttl_clears_expiry() {
        let mut db = Db::default();
        db.set_with_expiry(Bytes::from_static(b"k"), Value::String(vec![1]), Some(100));
        db.set(Bytes::from_static(b"k"), Value::String(vec![2]), false);
        assert_eq!(db.ttl_state(b"k", 0), Some(None));
    }

    #[test]
    fn keep_ttl_preserves_expiry() {
        let mut db = Db::default();
        db.set_with_expiry(Bytes::from_static(b"k"), Value::String(vec![1]), Some(100));
        db.set(Bytes::from_static(b"k"), Value::String(vec![2]), true);
        assert_eq!(db.ttl_state(b"k", 0), Some(Some(100)));
    }

    #[test]
    fn rename_transfers_expiry() {
        let mut db = Db::default();
        db.set_with_expiry(Bytes::from_static(b"a"), Value::String(vec![1]), Some(100));
        assert!(db.rename(b"a", Bytes::from_static(b"b"), 0));
        assert_eq!(db.ttl_state(b"b", 0), Some(Some(100)));
        assert!(db.get(b"a", 0).is_none());
    }

    #[test]
    fn rename_nx_fails_if_dest_exists() {
        let mut db = Db::default();
        db.set(Bytes::from_static(b"a"), Value::String(vec![1]), false);
        db.set(Bytes::from_static(b"b"), Value::String(vec![2]), false);
        assert!(!db.rename_nx(b"a", Bytes::from_static(b"b"), 0));
    }

    #[test]
    fn glob_filters_keys() {
        let mut db = Db::default();
        db.set(Bytes::from_static(b"foo"), Value::String(vec![]), false);
        db.set(Bytes::from_static(b"bar"), Value::String(vec![]), false);
        let matched = db.keys_matching(b"f*", 0);
        assert_eq!(matched, vec![Bytes::from_static(b"foo")]);
    }
}
