//! Subscriber↔channel fan-out (spec §4.10, §3's Subscriber state
//! entity). Exact-channel and glob-pattern subscriptions are tracked
//! separately, each as a bidirectional channel↔subscriber index so
//! both "who is subscribed to X" and "what is X subscribed to" are
//! O(1)/O(pattern count) respectively.

use crate::connection::{ConnectionId, Subscriber};
use crate::glob;
use crate::reply::Reply;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};

#[derive(Default)]
struct Registry {
    channels: HashMap<Bytes, HashSet<Subscriber>>,
    subscribers: HashMap<ConnectionId, HashSet<Bytes>>,
}

impl Registry {
    fn add(&mut self, channel: Bytes, subscriber: Subscriber) {
        self.channels.entry(channel.clone()).or_default().insert(subscriber.clone());
        self.subscribers.entry(subscriber.id).or_default().insert(channel);
    }

    fn remove(&mut self, channel: &[u8], id: ConnectionId) {
        if let Some(subscribers) = self.channels.get_mut(channel) {
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.is_empty() {
                self.channels.remove(channel);
            }
        }
        if let Some(channels) = self.subscribers.get_mut(&id) {
            channels.remove(channel);
            if channels.is_empty() {
                self.subscribers.remove(&id);
            }
        }
    }

    fn remove_all(&mut self, id: ConnectionId) {
        let Some(channels) = self.subscribers.remove(&id) else {
            return;
        };
        for channel in channels {
            if let Some(subscribers) = self.channels.get_mut(&channel) {
                subscribers.retain(|subscriber| subscriber.id != id);
                if subscribers.is_empty() {
                    self.channels.remove(&channel);
                }
            }
        }
    }

    fn targets_for(&self, id: ConnectionId) -> Vec<Bytes> {
        self.subscribers.get(&id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    fn count(&self, id: ConnectionId) -> usize {
        self.subscribers.get(&id).map_or(0, HashSet::len)
    }

    fn channels(&self) -> impl Iterator<Item = &Bytes> {
        self.channels.keys()
    }

    fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map_or(0, HashSet::len)
    }
}

/// The process-wide pub/sub registry (spec §3: "Channel registry maps
/// channel → set of subscriber IDs").
#[derive(Default)]
pub struct PubSub {
    exact: Registry,
    patterns: Registry,
}

impl PubSub {
    pub fn subscribe(&mut self, channel: Bytes, subscriber: &Subscriber) -> usize {
        self.exact.add(channel.clone(), subscriber.clone());
        let count = self.subscriber_subscription_count(subscriber.id);
        let _ = subscriber.sender.send(Reply::Array(vec![
            Reply::from("subscribe"),
            Reply::bulk(channel),
            Reply::from(count),
        ]));
        count
    }

    pub fn psubscribe(&mut self, pattern: Bytes, subscriber: &Subscriber) -> usize {
        self.patterns.add(pattern.clone(), subscriber.clone());
        let count = self.subscriber_subscription_count(subscriber.id);
        let _ = subscriber.sender.send(Reply::Array(vec![
            Reply::from("psubscribe"),
            Reply::bulk(pattern),
            Reply::from(count),
        ]));
        count
    }

    pub fn unsubscribe(&mut self, channels: &[Bytes], subscriber: &Subscriber) {
        let targets = if channels.is_empty() {
            self.exact.targets_for(subscriber.id)
        } else {
            channels.to_vec()
        };

        if targets.is_empty() {
            let count = self.subscriber_subscription_count(subscriber.id);
            let _ = subscriber.sender.send(Reply::Array(vec![
                Reply::from("unsubscribe"),
                Reply::NilArray,
                Reply::from(count),
            ]));
            return;
        }

        for channel in targets {
            self.exact.remove(&channel, subscriber.id);
            let count = self.subscriber_subscription_count(subscriber.id);
            let _ = subscriber.sender.send(Reply::Array(vec![
                Reply::from("unsubscribe"),
                Reply::bulk(channel),
                Reply::from(count),
            ]));
        }
    }

    pub fn punsubscribe(&mut self, patterns: &[Bytes], subscriber: &Subscriber) {
        let targets = if patterns.is_empty() {
            self.patterns.targets_for(subscriber.id)
        } else {
            patterns.to_vec()
        };

        if targets.is_empty() {
            let count = self.subscriber_subscription_count(subscriber.id);
            let _ = subscriber.sender.send(Reply::Array(vec![
                Reply::from("punsubscribe"),
                Reply::NilArray,
                Reply::from(count),
            ]));
            return;
        }

        for pattern in targets {
            self.patterns.remove(&pattern, subscriber.id);
            let count = self.subscriber_subscription_count(subscriber.id);
            let _ = subscriber.sender.send(Reply::Array(vec![
                Reply::from("punsubscribe"),
                Reply::bulk(pattern),
                Reply::from(count),
            ]));
        }
    }

    /// Clears every subscription (exact and pattern) for a disconnecting
    /// connection.
    pub fn disconnect(&mut self, id: ConnectionId) {
        self.exact.remove_all(id);
        self.patterns.remove_all(id);
    }

    fn subscriber_subscription_count(&self, id: ConnectionId) -> usize {
        self.exact.count(id) + self.patterns.count(id)
    }

    /// Delivers `message` to every exact subscriber of `channel` and
    /// every pattern subscriber whose pattern matches it, returning the
    /// number of deliveries (spec §4.10's `PUBLISH` return value).
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        let mut delivered = 0;
        if let Some(subscribers) = self.exact.channels.get(channel) {
            for subscriber in subscribers {
                let frame = Reply::Array(vec![
                    Reply::from("message"),
                    Reply::bulk(Bytes::copy_from_slice(channel)),
                    Reply::bulk(Bytes::copy_from_slice(message)),
                ]);
                if subscriber.sender.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }
        for (pattern, subscribers) in &self.patterns.channels {
            if !glob::matches(channel, pattern) {
                continue;
            }
            for subscriber in subscribers {
                let frame = Reply::Array(vec![
                    Reply::from("pmessage"),
                    Reply::bulk(pattern.clone()),
                    Reply::bulk(Bytes::copy_from_slice(channel)),
                    Reply::bulk(Bytes::copy_from_slice(message)),
                ]);
                if subscriber.sender.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn channels_matching(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.exact
            .channels()
            .filter(|channel| pattern.is_none_or(|pattern| glob::matches(channel, pattern)))
            .cloned()
            .collect()
    }

    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.exact.subscriber_count(channel)
    }

    pub fn numpat(&self) -> usize {
        self.patterns.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(id: u64) -> Subscriber {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        Subscriber { id: ConnectionId(id), sender }
    }

    #[test]
    fn publish_delivers_to_exact_subscriber() {
        let mut pubsub = PubSub::default();
        let sub = subscriber(1);
        pubsub.subscribe(Bytes::from_static(b"ch"), &sub);
        assert_eq!(pubsub.publish(b"ch", b"hi"), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut pubsub = PubSub::default();
        let sub = subscriber(1);
        pubsub.subscribe(Bytes::from_static(b"ch"), &sub);
        pubsub.unsubscribe(&[Bytes::from_static(b"ch")], &sub);
        assert_eq!(pubsub.publish(b"ch", b"hi"), 0);
    }

    #[test]
    fn pattern_subscriber_matches_glob() {
        let mut pubsub = PubSub::default();
        let sub = subscriber(1);
        pubsub.psubscribe(Bytes::from_static(b"ch.*"), &sub);
        assert_eq!(pubsub.publish(b"ch.1", b"hi"), 1);
        assert_eq!(pubsub.publish(b"other", b"hi"), 0);
    }

    #[test]
    fn disconnect_clears_both_registries() {
        let mut pubsub = PubSub::default();
        let sub = subscriber(1);
        pubsub.subscribe(Bytes::from_static(b"ch"), &sub);
        pubsub.psubscribe(Bytes::from_static(b"p*"), &sub);
        pubsub.disconnect(ConnectionId(1));
        assert_eq!(pubsub.publish(b"ch", b"hi"), 0);
        assert_eq!(pubsub.numpat(), 0);
    }

    #[test]
    fn numsub_counts_exact_subscribers() {
        let mut pubsub = PubSub::default();
        pubsub.subscribe(Bytes::from_static(b"ch"), &subscriber(1));
        pubsub.subscribe(Bytes::from_static(b"ch"), &subscriber(2));
        assert_eq!(pubsub.numsub(b"ch"), 2);
    }
}
