//! Key expiry (spec §4.8): relative/absolute TTL setting with
//! `NX`/`XX`/`GT`/`LT` guards, and TTL/expiretime introspection.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::reply::Reply;
use logos::Logos;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum ExpireOption {
    #[regex(b"(?i:nx)")]
    Nx,

    #[regex(b"(?i:xx)")]
    Xx,

    #[regex(b"(?i:gt)")]
    Gt,

    #[regex(b"(?i:lt)")]
    Lt,
}

fn lex(bytes: &[u8]) -> Option<ExpireOption> {
    ExpireOption::lexer(bytes).next().and_then(Result::ok)
}

/// Applies `at` (an absolute Unix-millisecond deadline) to `key`,
/// honoring an optional trailing `NX`/`XX`/`GT`/`LT` guard and deleting
/// the key outright if the deadline has already passed.
fn set_expiration(engine: &mut Engine, mut args: Args, at: i64) -> Result<Reply, CommandError> {
    let key = args.pop()?;

    if !args.is_empty() {
        let option = args.pop()?;
        if !args.is_empty() {
            return Err(CommandError::Syntax);
        }
        let now = engine.now_ms();
        let current = engine.db.expires_at(&key, now);
        let skip = match (lex(&option), current) {
            (Some(ExpireOption::Nx), Some(_)) => true,
            (Some(ExpireOption::Xx), None) => true,
            (Some(ExpireOption::Gt), None) => true,
            (Some(ExpireOption::Gt), Some(existing)) => at <= i64::try_from(existing).unwrap_or(i64::MAX),
            (Some(ExpireOption::Lt), Some(existing)) => at >= i64::try_from(existing).unwrap_or(i64::MAX),
            (None, _) => return Err(CommandError::Syntax),
            _ => false,
        };
        if skip {
            return Ok(Reply::from(0_i64));
        }
    }

    let now = engine.now_ms();
    if !engine.db.contains_live(&key, now) {
        return Ok(Reply::from(0_i64));
    }

    if at <= i64::try_from(now).unwrap_or(i64::MAX) {
        engine.db.remove(&key, now);
        engine.touch(&key);
        return Ok(Reply::from(1_i64));
    }

    #[allow(clippy::cast_sign_loss)]
    let deadline = at as u64;
    let applied = engine.db.set_expiry(&key, Some(deadline), now);
    if applied {
        engine.touch(&key);
    }
    Ok(Reply::from(applied))
}

pub fn expire(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let seconds = args.i64()?;
    let now = engine.now_ms();
    let at = now_plus_seconds(now, seconds)?;
    args.push_front(key);
    set_expiration(engine, args, at)
}

fn now_plus_seconds(now_ms: u64, seconds: i64) -> Result<i64, CommandError> {
    let millis = seconds.checked_mul(1000).ok_or(CommandError::InvalidExpireTime("expire".to_owned()))?;
    i64::try_from(now_ms)
        .ok()
        .and_then(|now| now.checked_add(millis))
        .ok_or(CommandError::InvalidExpireTime("expire".to_owned()))
}

pub fn pexpire(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let millis = args.i64()?;
    let now = engine.now_ms();
    let at = i64::try_from(now)
        .ok()
        .and_then(|now| now.checked_add(millis))
        .ok_or_else(|| CommandError::InvalidExpireTime("pexpire".to_owned()))?;
    args.push_front(key);
    set_expiration(engine, args, at)
}

pub fn expireat(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let seconds = args.i64()?;
    let at = seconds
        .checked_mul(1000)
        .ok_or_else(|| CommandError::InvalidExpireTime("expireat".to_owned()))?;
    args.push_front(key);
    set_expiration(engine, args, at)
}

pub fn pexpireat(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let at = args.i64()?;
    args.push_front(key);
    set_expiration(engine, args, at)
}

pub fn ttl(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let result = match engine.db.ttl_state(&key, now) {
        Some(Some(deadline)) => {
            let millis = deadline.saturating_sub(now);
            i64::try_from(millis.div_ceil(1000)).unwrap_or(i64::MAX)
        }
        Some(None) => -1,
        None => -2,
    };
    Ok(Reply::from(result))
}

pub fn pttl(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let result = match engine.db.ttl_state(&key, now) {
        Some(Some(deadline)) => i64::try_from(deadline.saturating_sub(now)).unwrap_or(i64::MAX),
        Some(None) => -1,
        None => -2,
    };
    Ok(Reply::from(result))
}

pub fn persist(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    Ok(Reply::from(engine.db.persist(&key, now)))
}

pub fn expiretime(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let result = match engine.db.ttl_state(&key, now) {
        Some(Some(deadline)) => i64::try_from(deadline / 1000).unwrap_or(i64::MAX),
        Some(None) => -1,
        None => -2,
    };
    Ok(Reply::from(result))
}

pub fn pexpiretime(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let result = match engine.db.ttl_state(&key, now) {
        Some(Some(deadline)) => i64::try_from(deadline).unwrap_or(i64::MAX),
        Some(None) => -1,
        None => -2,
    };
    Ok(Reply::from(result))
}
