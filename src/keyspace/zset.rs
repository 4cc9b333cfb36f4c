//! Sorted-set container: member→score map plus a score-ordered index,
//! kept in lockstep (spec §3's Zset invariant).

use bytes::Bytes;
use ordered_float::NotNan;
use std::collections::{BTreeSet, HashMap};

/// A sorted set. `by_member` and `by_order` are always consistent: a
/// member is in both or neither, under the same score.
#[derive(Clone, Debug, Default)]
pub struct ZSet {
    by_member: HashMap<Bytes, NotNan<f64>>,
    by_order: BTreeSet<(NotNan<f64>, Bytes)>,
}

impl ZSet {
    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).map(|score| score.into_inner())
    }

    /// Inserts or updates `member` at `score`, returning the previous
    /// score if the member already existed.
    pub fn insert(&mut self, member: Bytes, score: NotNan<f64>) -> Option<f64> {
        let previous = self.by_member.insert(member.clone(), score);
        if let Some(previous) = previous {
            self.by_order.remove(&(previous, member.clone()));
        }
        self.by_order.insert((score, member));
        previous.map(NotNan::into_inner)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        if let Some((_, score)) = self.by_member.remove_entry(member) {
            self.by_order.remove(&(score, Bytes::copy_from_slice(member)));
            true
        } else {
            false
        }
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.by_member.contains_key(member)
    }

    /// Ascending `(score, member)` pairs.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Bytes, f64)> {
        self.by_order.iter().map(|(score, member)| (member, score.into_inner()))
    }

    /// 0-based ascending rank of `member`, or `None` if absent.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = *self.by_member.get(member)?;
        self.by_order
            .iter()
            .position(|(s, m)| *s == score && m.as_ref() == member)
    }

    pub fn range_by_rank(&self, start: usize, end: usize) -> Vec<(&Bytes, f64)> {
        self.iter().skip(start).take(end.saturating_sub(start) + 1).collect()
    }

    pub fn range_by_score(
        &self,
        min: f64,
        min_exclusive: bool,
        max: f64,
        max_exclusive: bool,
    ) -> Vec<(&Bytes, f64)> {
        self.iter()
            .filter(|(_, score)| {
                let above_min = if min_exclusive { *score > min } else { *score >= min };
                let below_max = if max_exclusive { *score < max } else { *score <= max };
                above_min && below_max
            })
            .collect()
    }

    pub fn pop_min(&mut self, count: usize) -> Vec<(Bytes, f64)> {
        let mut popped = Vec::with_capacity(count);
        for _ in 0..count {
            let Some((score, member)) = self.by_order.iter().next().cloned() else {
                break;
            };
            self.by_order.remove(&(score, member.clone()));
            self.by_member.remove(&member);
            popped.push((member, score.into_inner()));
        }
        popped
    }

    pub fn pop_max(&mut self, count: usize) -> Vec<(Bytes, f64)> {
        let mut popped = Vec::with_capacity(count);
        for _ in 0..count {
            let Some((score, member)) = self.by_order.iter().next_back().cloned() else {
                break;
            };
            self.by_order.remove(&(score, member.clone()));
            self.by_member.remove(&member);
            popped.push((member, score.into_inner()));
        }
        popped
    }

    pub fn members(&self) -> impl Iterator<Item = &Bytes> {
        self.by_member.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nn(value: f64) -> NotNan<f64> {
        NotNan::new(value).unwrap()
    }

    #[test]
    fn insert_and_score() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        assert_eq!(zset.score(b"a"), Some(1.0));
        assert_eq!(zset.len(), 1);
    }

    #[test]
    fn update_moves_order() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        zset.insert(Bytes::from_static(b"b"), nn(2.0));
        zset.insert(Bytes::from_static(b"a"), nn(3.0));
        let order: Vec<_> = zset.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(order, vec![Bytes::from_static(b"b"), Bytes::from_static(b"a")]);
    }

    #[test]
    fn rank_is_bijection() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"c"), nn(3.0));
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        zset.insert(Bytes::from_static(b"b"), nn(2.0));
        assert_eq!(zset.rank(b"a"), Some(0));
        assert_eq!(zset.rank(b"b"), Some(1));
        assert_eq!(zset.rank(b"c"), Some(2));
    }

    #[test]
    fn tie_break_is_lexicographic() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"z"), nn(1.0));
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        let order: Vec<_> = zset.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(order, vec![Bytes::from_static(b"a"), Bytes::from_static(b"z")]);
    }

    #[test]
    fn remove_drops_from_both_indices() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        assert!(zset.remove(b"a"));
        assert!(!zset.contains(b"a"));
        assert_eq!(zset.len(), 0);
    }

    #[test]
    fn pop_min_max() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"a"), nn(1.0));
        zset.insert(Bytes::from_static(b"b"), nn(2.0));
        zset.insert(Bytes::from_static(b"c"), nn(3.0));
        assert_eq!(zset.pop_min(1), vec![(Bytes::from_static(b"a"), 1.0)]);
        assert_eq!(zset.pop_max(1), vec![(Bytes::from_static(b"c"), 3.0)]);
        assert_eq!(zset.len(), 1);
    }
}
