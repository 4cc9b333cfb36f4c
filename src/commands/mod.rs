//! Command dispatch: a static `Command` table keyed by name, the same
//! shape the teacher repo uses for its own (much larger) command
//! surface, minus the `logos`-lexed enum (command *names* are matched
//! with a plain case-insensitive lookup here; `logos` is still used the
//! teacher's way for in-command sub-option tokens like `NX`/`XX`/`GT`/
//! `LT`). `dispatch` looks the command up, validates arity, and either
//! queues it (inside `MULTI`) or runs it immediately.

mod bitops;
mod expire;
mod generic;
mod hash;
mod list;
mod pubsub;
mod set;
mod string;
mod stream;
mod transaction;
mod zset;

use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::reply::Reply;
use bytes::Bytes;
use std::collections::VecDeque;

/// Argument cursor over one request's argv, excluding the command name
/// itself. Mirrors the teacher's `Request`, reduced to what this
/// command surface needs.
pub struct Args {
    items: VecDeque<Bytes>,
}

impl Args {
    fn new(items: VecDeque<Bytes>) -> Self {
        Args { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pop(&mut self) -> Result<Bytes, CommandError> {
        self.items.pop_front().ok_or(CommandError::Syntax)
    }

    pub fn try_pop(&mut self) -> Option<Bytes> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&Bytes> {
        self.items.front()
    }

    pub fn push_front(&mut self, item: Bytes) {
        self.items.push_front(item);
    }

    pub fn rest(&mut self) -> Vec<Bytes> {
        self.items.drain(..).collect()
    }

    pub fn i64(&mut self) -> Result<i64, CommandError> {
        let bytes = self.pop()?;
        crate::numeric::parse_i64(&bytes).map_err(|_| CommandError::NotAnInteger)
    }

    pub fn usize(&mut self) -> Result<usize, CommandError> {
        let value = self.i64()?;
        usize::try_from(value).map_err(|_| CommandError::NotAnInteger)
    }

    pub fn f64(&mut self) -> Result<f64, CommandError> {
        let bytes = self.pop()?;
        crate::numeric::parse_f64(&bytes).map_err(|_| CommandError::NotAFloat)
    }

    /// Matches `bytes` case-insensitively against `word` (for option
    /// tokens like `NX`/`GET`/`WITHSCORES`).
    pub fn eq_ignore_case(bytes: &[u8], word: &str) -> bool {
        bytes.eq_ignore_ascii_case(word.as_bytes())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Exact(usize),
    Minimum(usize),
}

impl Arity {
    fn matches(self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == n,
            Arity::Minimum(n) => argc >= n,
        }
    }
}

/// Where a command's key arguments live, for introspection purposes
/// (`COMMAND`); the per-command handlers call `Engine::touch` directly
/// rather than relying on this for WATCH dirty-tracking.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Keys {
    None,
    Single,
    All,
}

type Handler = fn(&mut Engine, ConnectionId, Args) -> Result<Reply, CommandError>;

pub struct Command {
    pub name: &'static str,
    pub arity: Arity,
    pub keys: Keys,
    pub handler: Handler,
    /// Allowed to run immediately even while a `MULTI` is queuing
    /// (spec §4.9).
    pub queueable: bool,
}

macro_rules! commands {
    ($($konst:ident => $name:literal, $arity:expr, $keys:expr, $handler:path, $queueable:expr;)*) => {
        $(static $konst: Command = Command {
            name: $name,
            arity: $arity,
            keys: $keys,
            handler: $handler,
            queueable: $queueable,
        };)*

        fn lookup(name: &[u8]) -> Option<&'static Command> {
            let lowered = name.to_ascii_lowercase();
            match lowered.as_slice() {
                $($name.as_bytes() => Some(&$konst),)*
                _ => None,
            }
        }
    };
}

commands! {
    PING => "ping", Arity::Minimum(1), Keys::None, generic::ping, true;
    ECHO => "echo", Arity::Exact(2), Keys::None, generic::echo, true;
    SELECT => "select", Arity::Exact(2), Keys::None, generic::select, true;
    DBSIZE => "dbsize", Arity::Exact(1), Keys::None, generic::dbsize, true;
    FLUSHDB => "flushdb", Arity::Minimum(1), Keys::None, generic::flushdb, true;
    FLUSHALL => "flushall", Arity::Minimum(1), Keys::None, generic::flushdb, true;
    MOVE => "move", Arity::Exact(3), Keys::Single, generic::move_, true;
    COMMAND => "command", Arity::Minimum(1), Keys::None, generic::command, true;
    CONFIG => "config", Arity::Minimum(2), Keys::None, generic::config, true;
    CLIENT => "client", Arity::Minimum(2), Keys::None, generic::client, true;
    AUTH => "auth", Arity::Minimum(2), Keys::None, generic::auth, true;
    HELLO => "hello", Arity::Minimum(1), Keys::None, generic::hello, true;
    ACL => "acl", Arity::Minimum(2), Keys::None, generic::acl, true;
    EVAL => "eval", Arity::Minimum(3), Keys::None, generic::noscript, true;
    EVALSHA => "evalsha", Arity::Minimum(3), Keys::None, generic::noscript, true;
    SCRIPT => "script", Arity::Minimum(2), Keys::None, generic::noscript, true;
    TYPE => "type", Arity::Exact(2), Keys::Single, generic::type_, true;
    EXISTS => "exists", Arity::Minimum(2), Keys::All, generic::exists, true;
    DEL => "del", Arity::Minimum(2), Keys::All, generic::del, true;
    UNLINK => "unlink", Arity::Minimum(2), Keys::All, generic::del, true;
    KEYS => "keys", Arity::Exact(2), Keys::None, generic::keys, true;
    RENAME => "rename", Arity::Exact(3), Keys::All, generic::rename, true;
    RENAMENX => "renamenx", Arity::Exact(3), Keys::All, generic::renamenx, true;
    RANDOMKEY => "randomkey", Arity::Exact(1), Keys::None, generic::randomkey, true;
    COPY => "copy", Arity::Minimum(3), Keys::All, generic::copy, true;
    OBJECT => "object", Arity::Minimum(2), Keys::None, generic::object, true;
    SCAN => "scan", Arity::Minimum(2), Keys::None, generic::scan, true;
    DUMP => "dump", Arity::Exact(2), Keys::Single, generic::dump, true;
    RESTORE => "restore", Arity::Minimum(4), Keys::Single, generic::restore, true;

    EXPIRE => "expire", Arity::Minimum(3), Keys::Single, expire::expire, true;
    PEXPIRE => "pexpire", Arity::Minimum(3), Keys::Single, expire::pexpire, true;
    EXPIREAT => "expireat", Arity::Minimum(3), Keys::Single, expire::expireat, true;
    PEXPIREAT => "pexpireat", Arity::Minimum(3), Keys::Single, expire::pexpireat, true;
    TTL => "ttl", Arity::Exact(2), Keys::Single, expire::ttl, true;
    PTTL => "pttl", Arity::Exact(2), Keys::Single, expire::pttl, true;
    PERSIST => "persist", Arity::Exact(2), Keys::Single, expire::persist, true;
    EXPIRETIME => "expiretime", Arity::Exact(2), Keys::Single, expire::expiretime, true;
    PEXPIRETIME => "pexpiretime", Arity::Exact(2), Keys::Single, expire::pexpiretime, true;

    SET => "set", Arity::Minimum(3), Keys::Single, string::set, true;
    GET => "get", Arity::Exact(2), Keys::Single, string::get, true;
    GETSET => "getset", Arity::Exact(3), Keys::Single, string::getset, true;
    GETDEL => "getdel", Arity::Exact(2), Keys::Single, string::getdel, true;
    GETEX => "getex", Arity::Minimum(2), Keys::Single, string::getex, true;
    SETNX => "setnx", Arity::Exact(3), Keys::Single, string::setnx, true;
    SETEX => "setex", Arity::Exact(4), Keys::Single, string::setex, true;
    PSETEX => "psetex", Arity::Exact(4), Keys::Single, string::psetex, true;
    APPEND => "append", Arity::Exact(3), Keys::Single, string::append, true;
    STRLEN => "strlen", Arity::Exact(2), Keys::Single, string::strlen, true;
    INCR => "incr", Arity::Exact(2), Keys::Single, string::incr, true;
    INCRBY => "incrby", Arity::Exact(3), Keys::Single, string::incrby, true;
    DECR => "decr", Arity::Exact(2), Keys::Single, string::decr, true;
    DECRBY => "decrby", Arity::Exact(3), Keys::Single, string::decrby, true;
    INCRBYFLOAT => "incrbyfloat", Arity::Exact(3), Keys::Single, string::incrbyfloat, true;
    GETRANGE => "getrange", Arity::Exact(4), Keys::Single, string::getrange, true;
    SUBSTR => "substr", Arity::Exact(4), Keys::Single, string::getrange, true;
    SETRANGE => "setrange", Arity::Exact(4), Keys::Single, string::setrange, true;
    MGET => "mget", Arity::Minimum(2), Keys::All, string::mget, true;
    MSET => "mset", Arity::Minimum(3), Keys::All, string::mset, true;
    MSETNX => "msetnx", Arity::Minimum(3), Keys::All, string::msetnx, true;

    SETBIT => "setbit", Arity::Exact(4), Keys::Single, bitops::setbit, true;
    GETBIT => "getbit", Arity::Exact(3), Keys::Single, bitops::getbit, true;
    BITCOUNT => "bitcount", Arity::Minimum(2), Keys::Single, bitops::bitcount, true;
    BITOP => "bitop", Arity::Minimum(4), Keys::All, bitops::bitop, true;
    BITPOS => "bitpos", Arity::Minimum(3), Keys::Single, bitops::bitpos, true;
    BITFIELD => "bitfield", Arity::Minimum(2), Keys::Single, bitops::bitfield, true;

    LPUSH => "lpush", Arity::Minimum(3), Keys::Single, list::lpush, true;
    RPUSH => "rpush", Arity::Minimum(3), Keys::Single, list::rpush, true;
    LPUSHX => "lpushx", Arity::Minimum(3), Keys::Single, list::lpushx, true;
    RPUSHX => "rpushx", Arity::Minimum(3), Keys::Single, list::rpushx, true;
    LPOP => "lpop", Arity::Minimum(2), Keys::Single, list::lpop, true;
    RPOP => "rpop", Arity::Minimum(2), Keys::Single, list::rpop, true;
    LLEN => "llen", Arity::Exact(2), Keys::Single, list::llen, true;
    LRANGE => "lrange", Arity::Exact(4), Keys::Single, list::lrange, true;
    LINDEX => "lindex", Arity::Exact(3), Keys::Single, list::lindex, true;
    LSET => "lset", Arity::Exact(4), Keys::Single, list::lset, true;
    LINSERT => "linsert", Arity::Exact(5), Keys::Single, list::linsert, true;
    LREM => "lrem", Arity::Exact(4), Keys::Single, list::lrem, true;
    LTRIM => "ltrim", Arity::Exact(4), Keys::Single, list::ltrim, true;
    LPOS => "lpos", Arity::Minimum(3), Keys::Single, list::lpos, true;
    LMOVE => "lmove", Arity::Exact(5), Keys::All, list::lmove, true;
    RPOPLPUSH => "rpoplpush", Arity::Exact(3), Keys::All, list::rpoplpush, true;

    SADD => "sadd", Arity::Minimum(3), Keys::Single, set::sadd, true;
    SREM => "srem", Arity::Minimum(3), Keys::Single, set::srem, true;
    SMEMBERS => "smembers", Arity::Exact(2), Keys::Single, set::smembers, true;
    SCARD => "scard", Arity::Exact(2), Keys::Single, set::scard, true;
    SISMEMBER => "sismember", Arity::Exact(3), Keys::Single, set::sismember, true;
    SMISMEMBER => "smismember", Arity::Minimum(3), Keys::Single, set::smismember, true;
    SUNION => "sunion", Arity::Minimum(2), Keys::All, set::sunion, true;
    SINTER => "sinter", Arity::Minimum(2), Keys::All, set::sinter, true;
    SDIFF => "sdiff", Arity::Minimum(2), Keys::All, set::sdiff, true;
    SUNIONSTORE => "sunionstore", Arity::Minimum(3), Keys::All, set::sunionstore, true;
    SINTERSTORE => "sinterstore", Arity::Minimum(3), Keys::All, set::sinterstore, true;
    SDIFFSTORE => "sdiffstore", Arity::Minimum(3), Keys::All, set::sdiffstore, true;
    SINTERCARD => "sintercard", Arity::Minimum(3), Keys::None, set::sintercard, true;
    SMOVE => "smove", Arity::Exact(4), Keys::All, set::smove, true;
    SRANDMEMBER => "srandmember", Arity::Minimum(2), Keys::Single, set::srandmember, true;
    SPOP => "spop", Arity::Minimum(2), Keys::Single, set::spop, true;
    SSCAN => "sscan", Arity::Minimum(3), Keys::Single, set::sscan, true;

    HSET => "hset", Arity::Minimum(4), Keys::Single, hash::hset, true;
    HMSET => "hmset", Arity::Minimum(4), Keys::Single, hash::hmset, true;
    HSETNX => "hsetnx", Arity::Exact(4), Keys::Single, hash::hsetnx, true;
    HGET => "hget", Arity::Exact(3), Keys::Single, hash::hget, true;
    HMGET => "hmget", Arity::Minimum(3), Keys::Single, hash::hmget, true;
    HGETALL => "hgetall", Arity::Exact(2), Keys::Single, hash::hgetall, true;
    HKEYS => "hkeys", Arity::Exact(2), Keys::Single, hash::hkeys, true;
    HVALS => "hvals", Arity::Exact(2), Keys::Single, hash::hvals, true;
    HLEN => "hlen", Arity::Exact(2), Keys::Single, hash::hlen, true;
    HEXISTS => "hexists", Arity::Exact(3), Keys::Single, hash::hexists, true;
    HDEL => "hdel", Arity::Minimum(3), Keys::Single, hash::hdel, true;
    HINCRBY => "hincrby", Arity::Exact(4), Keys::Single, hash::hincrby, true;
    HINCRBYFLOAT => "hincrbyfloat", Arity::Exact(4), Keys::Single, hash::hincrbyfloat, true;
    HRANDFIELD => "hrandfield", Arity::Minimum(2), Keys::Single, hash::hrandfield, true;
    HSCAN => "hscan", Arity::Minimum(3), Keys::Single, hash::hscan, true;
    HSTRLEN => "hstrlen", Arity::Exact(3), Keys::Single, hash::hstrlen, true;

    ZADD => "zadd", Arity::Minimum(4), Keys::Single, zset::zadd, true;
    ZREM => "zrem", Arity::Minimum(3), Keys::Single, zset::zrem, true;
    ZSCORE => "zscore", Arity::Exact(3), Keys::Single, zset::zscore, true;
    ZMSCORE => "zmscore", Arity::Minimum(3), Keys::Single, zset::zmscore, true;
    ZINCRBY => "zincrby", Arity::Exact(4), Keys::Single, zset::zincrby, true;
    ZCARD => "zcard", Arity::Exact(2), Keys::Single, zset::zcard, true;
    ZCOUNT => "zcount", Arity::Exact(4), Keys::Single, zset::zcount, true;
    ZRANGE => "zrange", Arity::Minimum(4), Keys::Single, zset::zrange, true;
    ZREVRANGE => "zrevrange", Arity::Minimum(4), Keys::Single, zset::zrevrange, true;
    ZRANGEBYSCORE => "zrangebyscore", Arity::Minimum(4), Keys::Single, zset::zrangebyscore, true;
    ZREVRANGEBYSCORE => "zrevrangebyscore", Arity::Minimum(4), Keys::Single, zset::zrevrangebyscore, true;
    ZRANK => "zrank", Arity::Minimum(3), Keys::Single, zset::zrank, true;
    ZREVRANK => "zrevrank", Arity::Minimum(3), Keys::Single, zset::zrevrank, true;
    ZPOPMIN => "zpopmin", Arity::Minimum(2), Keys::Single, zset::zpopmin, true;
    ZPOPMAX => "zpopmax", Arity::Minimum(2), Keys::Single, zset::zpopmax, true;
    ZRANDMEMBER => "zrandmember", Arity::Minimum(2), Keys::Single, zset::zrandmember, true;
    ZSCAN => "zscan", Arity::Minimum(3), Keys::Single, zset::zscan, true;
    BZPOPMIN => "bzpopmin", Arity::Minimum(3), Keys::All, zset::bzpopmin, true;
    BZPOPMAX => "bzpopmax", Arity::Minimum(3), Keys::All, zset::bzpopmax, true;

    XADD => "xadd", Arity::Minimum(5), Keys::Single, stream::xadd, true;
    XLEN => "xlen", Arity::Exact(2), Keys::Single, stream::xlen, true;
    XRANGE => "xrange", Arity::Minimum(4), Keys::Single, stream::xrange, true;
    XREVRANGE => "xrevrange", Arity::Minimum(4), Keys::Single, stream::xrevrange, true;
    XREAD => "xread", Arity::Minimum(4), Keys::None, stream::xread, true;
    XDEL => "xdel", Arity::Minimum(3), Keys::Single, stream::xdel, true;
    XTRIM => "xtrim", Arity::Minimum(4), Keys::Single, stream::xtrim, true;
    XSETID => "xsetid", Arity::Exact(3), Keys::Single, stream::xsetid, true;
    XGROUP => "xgroup", Arity::Minimum(2), Keys::None, stream::xgroup, true;
    XREADGROUP => "xreadgroup", Arity::Minimum(7), Keys::None, stream::xreadgroup, true;
    XACK => "xack", Arity::Minimum(4), Keys::Single, stream::xack, true;
    XPENDING => "xpending", Arity::Minimum(3), Keys::Single, stream::xpending, true;
    XCLAIM => "xclaim", Arity::Minimum(6), Keys::Single, stream::xclaim, true;
    XAUTOCLAIM => "xautoclaim", Arity::Minimum(6), Keys::Single, stream::xautoclaim, true;
    XINFO => "xinfo", Arity::Minimum(3), Keys::None, stream::xinfo, true;

    MULTI => "multi", Arity::Exact(1), Keys::None, transaction::multi, false;
    EXEC => "exec", Arity::Exact(1), Keys::None, transaction::exec, false;
    DISCARD => "discard", Arity::Exact(1), Keys::None, transaction::discard, false;
    WATCH => "watch", Arity::Minimum(2), Keys::All, transaction::watch, false;
    UNWATCH => "unwatch", Arity::Exact(1), Keys::None, transaction::unwatch, false;

    SUBSCRIBE => "subscribe", Arity::Minimum(2), Keys::None, pubsub::subscribe, false;
    UNSUBSCRIBE => "unsubscribe", Arity::Minimum(1), Keys::None, pubsub::unsubscribe, false;
    PSUBSCRIBE => "psubscribe", Arity::Minimum(2), Keys::None, pubsub::psubscribe, false;
    PUNSUBSCRIBE => "punsubscribe", Arity::Minimum(1), Keys::None, pubsub::punsubscribe, false;
    PUBLISH => "publish", Arity::Exact(3), Keys::None, pubsub::publish, true;
    PUBSUB => "pubsub", Arity::Minimum(2), Keys::None, pubsub::pubsub, true;
}

/// Commands whose handlers push every reply frame straight onto the
/// connection's outbound sender (one frame per channel argument) rather
/// than returning a single value: `dispatch` suppresses their `Ok`
/// return so the server shell never writes a second, spurious frame for
/// them.
fn replies_directly(name: &str) -> bool {
    matches!(name, "subscribe" | "unsubscribe" | "psubscribe" | "punsubscribe")
}

/// Entry point the server shell calls for each parsed request. Returns
/// `None` when the handler already delivered its own reply frame(s)
/// directly through the connection's sender (the subscribe family);
/// the server shell writes `Some(reply)` and writes nothing for `None`.
pub fn dispatch(engine: &mut Engine, id: ConnectionId, mut argv: Vec<Bytes>) -> Option<Reply> {
    let queuing = engine
        .connections
        .get(&id)
        .is_some_and(|connection| connection.transaction.active);

    if argv.is_empty() {
        return Some(CommandError::Syntax.into());
    }
    let name = argv.remove(0);
    let Some(command) = lookup(&name) else {
        if queuing {
            if let Some(connection) = engine.connections.get_mut(&id) {
                connection.transaction.aborted = true;
            }
        }
        return Some(
            CommandError::UnknownCommand(String::from_utf8_lossy(&name).into_owned(), String::new()).into(),
        );
    };

    if !command.arity.matches(argv.len() + 1) {
        if queuing {
            if let Some(connection) = engine.connections.get_mut(&id) {
                connection.transaction.aborted = true;
            }
        }
        return Some(CommandError::WrongArguments(command.name.to_owned()).into());
    }

    if queuing && command.queueable {
        let Some(connection) = engine.connections.get_mut(&id) else {
            return Some(Reply::ok());
        };
        let mut frame = argv;
        frame.insert(0, name);
        connection.transaction.queue.push(frame);
        return Some(Reply::Status("QUEUED"));
    }

    let args = Args::new(argv.into());
    match (command.handler)(engine, id, args) {
        Ok(_reply) if replies_directly(command.name) => None,
        Ok(reply) => Some(reply),
        Err(error) => Some(error.into()),
    }
}
