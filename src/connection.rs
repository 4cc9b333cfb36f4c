//! Per-connection state: identity, transaction queue/watch set, and
//! pub/sub subscriptions (spec §3's Transaction state / Subscriber
//! state entities). The RESP decode loop and socket I/O live in
//! [`crate::server`]; this module only holds what the engine needs to
//! know about a connection.

use bytes::Bytes;
use hashbrown::HashSet;
use tokio::sync::mpsc;

use crate::reply::Reply;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ConnectionId(pub u64);

/// A queued command, captured as its raw argument vector so `EXEC` can
/// re-dispatch it exactly as received.
pub type QueuedCommand = Vec<Bytes>;

#[derive(Default)]
pub struct Transaction {
    pub active: bool,
    pub queue: Vec<QueuedCommand>,
    pub watched_keys: HashSet<Bytes>,
    /// Set once any queued command failed to parse; forces `EXEC` to
    /// abort with `EXECABORT` (spec §4.9).
    pub aborted: bool,
}

impl Transaction {
    pub fn reset(&mut self) {
        self.active = false;
        self.queue.clear();
        self.watched_keys.clear();
        self.aborted = false;
    }
}

/// A handle other connections (or the engine, for pub/sub fan-out) use
/// to push a reply frame onto this connection's outbound stream.
#[derive(Clone)]
pub struct Subscriber {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<Reply>,
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl std::hash::Hash for Subscriber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-connection state as seen by the engine: its identity, its
/// transaction state, and the outbound sender used for subscribe-family
/// pushes.
pub struct Connection {
    pub id: ConnectionId,
    pub transaction: Transaction,
    pub channels: HashSet<Bytes>,
    pub patterns: HashSet<Bytes>,
    pub sender: mpsc::UnboundedSender<Reply>,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<Reply>) -> Self {
        Connection {
            id,
            transaction: Transaction::default(),
            channels: HashSet::new(),
            patterns: HashSet::new(),
            sender,
        }
    }

    pub fn subscriber(&self) -> Subscriber {
        Subscriber { id: self.id, sender: self.sender.clone() }
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    pub fn push(&self, reply: Reply) {
        let _ = self.sender.send(reply);
    }
}
