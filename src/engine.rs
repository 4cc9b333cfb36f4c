//! The engine: the opaque handle spec §9 calls for, owning the
//! keyspace, the pub/sub registry, the WATCH dirty-tracker, and the
//! per-connection table. This is the single API surface §4 describes;
//! everything above it (wire codec, TCP loop, command dispatch) is
//! ambient shell (spec §1).

use crate::commands;
use crate::config::Config;
use crate::connection::{Connection, ConnectionId};
use crate::keyspace::{self, Db};
use crate::pubsub::PubSub;
use crate::reply::Reply;
use crate::watching::Watching;
use bytes::Bytes;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The process-wide store. Behind a `tokio::sync::Mutex` in
/// [`crate::server`], one logical writer owns it per command (spec §5's
/// "mutex-guarded engine façade" option).
pub struct Engine {
    pub db: Db,
    pub pubsub: PubSub,
    pub watching: Watching,
    pub config: Config,
    pub connections: HashMap<ConnectionId, Connection>,
    next_connection_id: AtomicU64,
    pub dirty: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            db: Db::default(),
            pubsub: PubSub::default(),
            watching: Watching::default(),
            config: Config::default(),
            connections: HashMap::new(),
            next_connection_id: AtomicU64::new(1),
            dirty: 0,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        keyspace::now_ms()
    }

    /// Registers a new connection, returning the ID commands and
    /// pub/sub use to address it.
    pub fn connect(&mut self, sender: tokio::sync::mpsc::UnboundedSender<Reply>) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(id, Connection::new(id, sender));
        id
    }

    /// Tears down all engine-owned state for a disconnecting
    /// connection: transaction state, watches, and subscriptions (spec
    /// §5's "Cancellation").
    pub fn disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
        self.watching.disconnect(id);
        self.pubsub.disconnect(id);
    }

    /// Marks every watcher of `key` dirty. Every mutator in the command
    /// layer calls this just before returning (spec §4.9).
    pub fn touch(&mut self, key: &[u8]) {
        self.watching.touch(key);
        self.dirty += 1;
    }

    /// Dispatches one already-tokenized command (`argv[0]` is the
    /// command name) for `id`, honoring queued-vs-immediate MULTI
    /// semantics. Returns `None` when the handler already delivered its
    /// reply directly through the connection's sender (the subscribe
    /// family); callers write nothing to the wire in that case.
    pub fn dispatch(&mut self, id: ConnectionId, argv: Vec<Bytes>) -> Option<Reply> {
        commands::dispatch(self, id, argv)
    }

    pub fn key_exists(&mut self, key: &[u8]) -> bool {
        let now = self.now_ms();
        self.db.exists(key, now)
    }
}

pub fn random_key_bytes(db: &Db, now_ms: u64) -> Option<Bytes> {
    db.random_key(now_ms)
}
