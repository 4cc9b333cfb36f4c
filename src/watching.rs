//! WATCH bookkeeping (spec §4.9, §3 Transaction state): which
//! connections are watching which keys, and which connections have
//! gone dirty because a watched key was mutated.

use crate::connection::ConnectionId;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use hashbrown::hash_map::Entry;

/// Tracks watchers per key and, in reverse, watched keys per connection
/// so a connection's watches can be torn down in one pass on
/// `UNWATCH`/`EXEC`/disconnect.
#[derive(Default)]
pub struct Watching {
    watchers: HashMap<Bytes, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, HashSet<Bytes>>,
    dirty: HashSet<ConnectionId>,
}

impl Watching {
    pub fn add(&mut self, key: Bytes, id: ConnectionId) {
        self.watchers.entry(key.clone()).or_default().insert(id);
        self.connections.entry(id).or_default().insert(key);
    }

    /// Removes every key `id` is watching.
    pub fn remove(&mut self, id: ConnectionId) {
        let Some(keys) = self.connections.remove(&id) else {
            return;
        };
        for key in keys {
            if let Entry::Occupied(mut entry) = self.watchers.entry(key) {
                entry.get_mut().remove(&id);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
    }

    /// Marks every watcher of `key` dirty, and stops watching them (a
    /// dirty watch no longer needs tracking; EXEC will reset it anyway).
    pub fn touch(&mut self, key: &[u8]) {
        let Some(ids) = self.watchers.remove(key) else {
            return;
        };
        for id in ids {
            self.remove(id);
            self.dirty.insert(id);
        }
    }

    pub fn is_dirty(&self, id: ConnectionId) -> bool {
        self.dirty.contains(&id)
    }

    pub fn clear_dirty(&mut self, id: ConnectionId) {
        self.dirty.remove(&id);
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.remove(id);
        self.dirty.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_marks_watchers_dirty() {
        let mut watching = Watching::default();
        watching.add(Bytes::from_static(b"k"), ConnectionId(1));
        watching.touch(b"k");
        assert!(watching.is_dirty(ConnectionId(1)));
    }

    #[test]
    fn unrelated_key_does_not_dirty() {
        let mut watching = Watching::default();
        watching.add(Bytes::from_static(b"k"), ConnectionId(1));
        watching.touch(b"other");
        assert!(!watching.is_dirty(ConnectionId(1)));
    }

    #[test]
    fn remove_clears_reverse_index() {
        let mut watching = Watching::default();
        watching.add(Bytes::from_static(b"k"), ConnectionId(1));
        watching.remove(ConnectionId(1));
        watching.touch(b"k");
        assert!(!watching.is_dirty(ConnectionId(1)));
    }

    #[test]
    fn disconnect_clears_dirty_too() {
        let mut watching = Watching::default();
        watching.add(Bytes::from_static(b"k"), ConnectionId(1));
        watching.touch(b"k");
        watching.disconnect(ConnectionId(1));
        assert!(!watching.is_dirty(ConnectionId(1)));
    }
}
