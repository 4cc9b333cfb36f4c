//! `keelson` is an in-memory key/value store engine that speaks a
//! Redis-compatible wire protocol (RESP). This crate implements the engine:
//! the keyspace data model, per-type operations, expiry, optimistic
//! transactions, pub/sub fan-out, and stream consumer groups. The RESP
//! wire codec and TCP server in [`server`] are a thin, ambient shell around
//! the engine, not its focus.

mod commands;
mod config;
mod connection;
mod crc64;
mod engine;
mod error;
mod glob;
mod keyspace;
mod numeric;
mod pubsub;
mod reply;
pub mod server;
mod slice;
mod time;
mod watching;

pub use config::Config;
pub use connection::{Connection, ConnectionId};
pub use engine::Engine;
pub use error::EngineError;
pub use keyspace::{Stream, Value, ZSet};
pub use reply::Reply;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
