//! Append-only stream with monotone IDs and consumer-group PEL
//! bookkeeping (spec §3's Stream entity, §4.7).
//!
//! The teacher repo has no stream support; this module's shape follows
//! the same "owned collections, plain structs" idiom used elsewhere in
//! this crate rather than any one borrowed design.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// A 128-bit stream entry ID, rendered on the wire as `<ms>-<seq>`.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    /// The smallest ID strictly greater than `self`.
    pub fn next(self) -> Self {
        if self.seq == u64::MAX {
            StreamId { ms: self.ms + 1, seq: 0 }
        } else {
            StreamId { ms: self.ms, seq: self.seq + 1 }
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Clone, Debug)]
pub struct Entry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

#[derive(Clone, Debug)]
pub struct PendingEntry {
    pub consumer: Bytes,
    pub delivery_time_ms: u64,
    pub delivery_count: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Consumer {
    pub seen_time_ms: u64,
    pub active_time_ms: u64,
}

#[derive(Clone, Debug)]
pub struct Group {
    pub last_delivered_id: StreamId,
    pub consumers: HashMap<Bytes, Consumer>,
    pub pending: BTreeMap<StreamId, PendingEntry>,
    pub entries_read: u64,
}

impl Group {
    fn new(last_delivered_id: StreamId) -> Self {
        Group {
            last_delivered_id,
            consumers: HashMap::new(),
            pending: BTreeMap::new(),
            entries_read: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, Vec<(Bytes, Bytes)>>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    pub entries_added: u64,
    pub groups: HashMap<Bytes, Group>,
}

impl Stream {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the auto-generated ID for the next append, per spec §3
    /// invariant 3: `ms = max(now_ms, last.ms)`, `seq = last.seq + 1` if
    /// `ms == last.ms` else `0`.
    pub fn auto_id(&self, now_ms: u64) -> StreamId {
        if now_ms > self.last_id.ms {
            StreamId::new(now_ms, 0)
        } else {
            StreamId::new(self.last_id.ms, self.last_id.seq + 1)
        }
    }

    /// Appends `fields` under `id`, which must strictly exceed `last_id`.
    pub fn append(&mut self, id: StreamId, fields: Vec<(Bytes, Bytes)>) -> Result<StreamId, ()> {
        if !self.entries.is_empty() || self.entries_added > 0 {
            if id <= self.last_id {
                return Err(());
            }
        } else if id == StreamId::MIN {
            return Err(());
        }
        self.entries.insert(id, fields);
        self.last_id = id;
        self.entries_added += 1;
        Ok(id)
    }

    pub fn get(&self, id: StreamId) -> Option<&Vec<(Bytes, Bytes)>> {
        self.entries.get(&id)
    }

    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<Entry> {
        self.entries
            .range(start..=end)
            .map(|(&id, fields)| Entry { id, fields: fields.clone() })
            .collect()
    }

    pub fn range_rev(&self, start: StreamId, end: StreamId) -> Vec<Entry> {
        let mut entries = self.range(start, end);
        entries.reverse();
        entries
    }

    /// Entries with ID strictly greater than `after`.
    pub fn after(&self, after: StreamId) -> impl Iterator<Item = Entry> + '_ {
        self.entries
            .range(after.next()..)
            .map(|(&id, fields)| Entry { id, fields: fields.clone() })
    }

    pub fn delete(&mut self, id: StreamId) -> bool {
        if self.entries.remove(&id).is_some() {
            if id > self.max_deleted_id {
                self.max_deleted_id = id;
            }
            true
        } else {
            false
        }
    }

    /// Trims to at most `maxlen` entries, evicting the oldest first.
    /// Returns the number of entries removed.
    pub fn trim_to_maxlen(&mut self, maxlen: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > maxlen {
            let Some(&id) = self.entries.keys().next() else {
                break;
            };
            self.entries.remove(&id);
            if id > self.max_deleted_id {
                self.max_deleted_id = id;
            }
            removed += 1;
        }
        removed
    }

    /// Trims all entries with ID strictly less than `minid`.
    pub fn trim_to_minid(&mut self, minid: StreamId) -> usize {
        let to_remove: Vec<StreamId> =
            self.entries.range(..minid).map(|(&id, _)| id).collect();
        for id in &to_remove {
            self.entries.remove(id);
            if *id > self.max_deleted_id {
                self.max_deleted_id = *id;
            }
        }
        to_remove.len()
    }

    pub fn group(&self, name: &[u8]) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &[u8]) -> Option<&mut Group> {
        self.groups.get_mut(name)
    }

    pub fn create_group(&mut self, name: Bytes, last_delivered_id: StreamId) -> bool {
        if self.groups.contains_key(&name) {
            return false;
        }
        self.groups.insert(name, Group::new(last_delivered_id));
        true
    }

    pub fn destroy_group(&mut self, name: &[u8]) -> bool {
        self.groups.remove(name).is_some()
    }

    /// Delivers new (never-before-delivered) entries to `consumer` in
    /// `group`, advancing `last_delivered_id` and (unless `no_ack`)
    /// creating PEL entries.
    pub fn read_group_new(
        &mut self,
        group_name: &[u8],
        consumer: Bytes,
        count: usize,
        no_ack: bool,
        now_ms: u64,
    ) -> Vec<Entry> {
        let Some(group) = self.groups.get(group_name).cloned() else {
            return Vec::new();
        };
        let entries: Vec<Entry> = self.after(group.last_delivered_id).take(count).collect();
        if entries.is_empty() {
            return entries;
        }
        let group = self.groups.get_mut(group_name).expect("checked above");
        group.last_delivered_id = entries.last().expect("non-empty").id;
        group.entries_read += entries.len() as u64;
        group.consumers.entry(consumer.clone()).or_default().seen_time_ms = now_ms;
        group.consumers.entry(consumer.clone()).or_default().active_time_ms = now_ms;
        if !no_ack {
            for entry in &entries {
                group.pending.insert(
                    entry.id,
                    PendingEntry {
                        consumer: consumer.clone(),
                        delivery_time_ms: now_ms,
                        delivery_count: 1,
                    },
                );
            }
        }
        entries
    }

    /// Re-delivers `consumer`'s own pending entries with ID greater than
    /// `start` (the history form of `XREADGROUP`, `id != ">"`).
    pub fn read_group_history(
        &self,
        group_name: &[u8],
        consumer: &[u8],
        start: StreamId,
        count: usize,
    ) -> Vec<Entry> {
        let Some(group) = self.groups.get(group_name) else {
            return Vec::new();
        };
        group
            .pending
            .range(start..)
            .filter(|(_, pending)| pending.consumer == consumer)
            .take(count)
            .filter_map(|(&id, _)| self.entries.get(&id).map(|fields| Entry { id, fields: fields.clone() }))
            .collect()
    }

    pub fn ack(&mut self, group_name: &[u8], ids: &[StreamId]) -> usize {
        let Some(group) = self.groups.get_mut(group_name) else {
            return 0;
        };
        let mut removed = 0;
        for id in ids {
            if group.pending.remove(id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(key: &str, value: &str) -> (Bytes, Bytes) {
        (Bytes::copy_from_slice(key.as_bytes()), Bytes::copy_from_slice(value.as_bytes()))
    }

    #[test]
    fn auto_id_advances_ms() {
        let stream = Stream::default();
        assert_eq!(stream.auto_id(100), StreamId::new(100, 0));
    }

    #[test]
    fn auto_id_bumps_seq_on_same_ms() {
        let mut stream = Stream::default();
        stream.append(StreamId::new(100, 0), vec![field("a", "1")]).unwrap();
        assert_eq!(stream.auto_id(100), StreamId::new(100, 1));
    }

    #[test]
    fn append_rejects_non_increasing_id() {
        let mut stream = Stream::default();
        stream.append(StreamId::new(5, 0), vec![]).unwrap();
        assert!(stream.append(StreamId::new(5, 0), vec![]).is_err());
        assert!(stream.append(StreamId::new(4, 0), vec![]).is_err());
    }

    #[test]
    fn range_is_inclusive() {
        let mut stream = Stream::default();
        for ms in 1..=3 {
            stream.append(StreamId::new(ms, 0), vec![field("n", "v")]).unwrap();
        }
        let entries = stream.range(StreamId::new(1, 0), StreamId::new(2, 0));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn trim_to_maxlen_drops_oldest() {
        let mut stream = Stream::default();
        for ms in 1..=5 {
            stream.append(StreamId::new(ms, 0), vec![]).unwrap();
        }
        let removed = stream.trim_to_maxlen(2);
        assert_eq!(removed, 3);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn group_delivery_creates_pel_entries() {
        let mut stream = Stream::default();
        stream.append(StreamId::new(1, 0), vec![field("a", "1")]).unwrap();
        stream.create_group(Bytes::from_static(b"g"), StreamId::MIN);
        let entries = stream.read_group_new(b"g", Bytes::from_static(b"c1"), 10, false, 1000);
        assert_eq!(entries.len(), 1);
        assert_eq!(stream.group(b"g").unwrap().pending.len(), 1);
    }

    #[test]
    fn ack_removes_pending() {
        let mut stream = Stream::default();
        stream.append(StreamId::new(1, 0), vec![]).unwrap();
        stream.create_group(Bytes::from_static(b"g"), StreamId::MIN);
        stream.read_group_new(b"g", Bytes::from_static(b"c1"), 10, false, 1000);
        let removed = stream.ack(b"g", &[StreamId::new(1, 0)]);
        assert_eq!(removed, 1);
        assert!(stream.group(b"g").unwrap().pending.is_empty());
    }
}
