//! String commands (spec §4.2): the byte-string value plus counter and
//! range operations built on top of it.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::{CommandError, EngineError};
use crate::keyspace::Value;
use crate::reply::Reply;
use bytes::Bytes;

/// Converts a `seconds`-or-milliseconds value into an absolute
/// Unix-millisecond deadline, rejecting anything that can't represent
/// one (negative, or too large to fit `u64`).
fn absolute_expiry(_now_ms: u64, seconds: bool, value: i64, command: &str) -> Result<u64, CommandError> {
    let millis = if seconds {
        value
            .checked_mul(1000)
            .ok_or_else(|| CommandError::InvalidExpireTime(command.to_owned()))?
    } else {
        value
    };
    u64::try_from(millis).map_err(|_| CommandError::InvalidExpireTime(command.to_owned()))
}

pub fn set(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let value = args.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut get = false;
    let mut keep_ttl = false;
    let mut expires_at: Option<Option<u64>> = None;
    let now = engine.now_ms();

    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "NX") {
            nx = true;
        } else if Args::eq_ignore_case(&option, "XX") {
            xx = true;
        } else if Args::eq_ignore_case(&option, "GET") {
            get = true;
        } else if Args::eq_ignore_case(&option, "KEEPTTL") {
            keep_ttl = true;
        } else if Args::eq_ignore_case(&option, "EX") {
            let seconds = args.i64()?;
            expires_at = Some(Some(absolute_expiry(now, true, now_plus(now, seconds, true)?, "set")?));
        } else if Args::eq_ignore_case(&option, "PX") {
            let millis = args.i64()?;
            expires_at = Some(Some(absolute_expiry(now, false, now_plus(now, millis, false)?, "set")?));
        } else if Args::eq_ignore_case(&option, "EXAT") {
            let seconds = args.i64()?;
            expires_at = Some(Some(absolute_expiry(now, true, seconds, "set")?));
        } else if Args::eq_ignore_case(&option, "PXAT") {
            let millis = args.i64()?;
            expires_at = Some(Some(absolute_expiry(now, false, millis, "set")?));
        } else {
            return Err(CommandError::Syntax);
        }
    }

    if nx && xx {
        return Err(CommandError::Syntax);
    }
    if keep_ttl && expires_at.is_some() {
        return Err(CommandError::Syntax);
    }

    let old_reply = if get {
        match engine.db.get(&key, now) {
            Some(existing) => Some(Reply::bulk(Bytes::from(existing.as_string()?.clone()))),
            None => Some(Reply::Nil),
        }
    } else {
        None
    };

    let exists = engine.db.contains_live(&key, now);
    if (nx && exists) || (xx && !exists) {
        return Ok(old_reply.unwrap_or(Reply::Nil));
    }

    engine.db.set(key.clone(), Value::String(value.to_vec()), keep_ttl);
    if let Some(deadline) = expires_at {
        engine.db.set_expiry(&key, deadline, now);
    }
    engine.touch(&key);

    Ok(old_reply.unwrap_or_else(Reply::ok))
}

/// Computes `now_ms + delta` in the given unit, guarding overflow.
fn now_plus(now_ms: u64, delta: i64, seconds: bool) -> Result<i64, CommandError> {
    let delta_ms = if seconds {
        delta.checked_mul(1000).ok_or_else(|| CommandError::InvalidExpireTime("set".to_owned()))?
    } else {
        delta
    };
    i64::try_from(now_ms)
        .ok()
        .and_then(|now| now.checked_add(delta_ms))
        .ok_or_else(|| CommandError::InvalidExpireTime("set".to_owned()))
}

pub fn get(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::bulk(Bytes::from(value.as_string()?.clone()))),
        None => Ok(Reply::Nil),
    }
}

pub fn getset(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let value = args.pop()?;
    let now = engine.now_ms();
    let old = match engine.db.get(&key, now) {
        Some(existing) => Some(Reply::bulk(Bytes::from(existing.as_string()?.clone()))),
        None => None,
    };
    engine.db.set(key.clone(), Value::String(value.to_vec()), false);
    engine.touch(&key);
    Ok(old.unwrap_or(Reply::Nil))
}

pub fn getdel(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Nil);
    };
    let bytes = value.as_string()?.clone();
    engine.db.remove(&key, now);
    engine.touch(&key);
    Ok(Reply::bulk(Bytes::from(bytes)))
}

pub fn getex(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();

    let mut new_expiry: Option<Option<u64>> = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "PERSIST") {
            new_expiry = Some(None);
        } else if Args::eq_ignore_case(&option, "EX") {
            let seconds = args.i64()?;
            new_expiry = Some(Some(absolute_expiry(now, true, now_plus(now, seconds, true)?, "getex")?));
        } else if Args::eq_ignore_case(&option, "PX") {
            let millis = args.i64()?;
            new_expiry = Some(Some(absolute_expiry(now, false, now_plus(now, millis, false)?, "getex")?));
        } else if Args::eq_ignore_case(&option, "EXAT") {
            let seconds = args.i64()?;
            new_expiry = Some(Some(absolute_expiry(now, true, seconds, "getex")?));
        } else if Args::eq_ignore_case(&option, "PXAT") {
            let millis = args.i64()?;
            new_expiry = Some(Some(absolute_expiry(now, false, millis, "getex")?));
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Nil);
    };
    let bytes = value.as_string()?.clone();
    if let Some(deadline) = new_expiry {
        engine.db.set_expiry(&key, deadline, now);
        engine.touch(&key);
    }
    Ok(Reply::bulk(Bytes::from(bytes)))
}

pub fn setnx(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let value = args.pop()?;
    let now = engine.now_ms();
    if engine.db.contains_live(&key, now) {
        return Ok(Reply::from(0_i64));
    }
    engine.db.set(key.clone(), Value::String(value.to_vec()), false);
    engine.touch(&key);
    Ok(Reply::from(1_i64))
}

pub fn setex(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let seconds = args.i64()?;
    let value = args.pop()?;
    set_with_ttl(engine, id, key, value, seconds, true)
}

pub fn psetex(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let millis = args.i64()?;
    let value = args.pop()?;
    set_with_ttl(engine, id, key, value, millis, false)
}

fn set_with_ttl(
    engine: &mut Engine,
    _id: ConnectionId,
    key: Bytes,
    value: Bytes,
    ttl: i64,
    seconds: bool,
) -> Result<Reply, CommandError> {
    if ttl <= 0 {
        return Err(CommandError::InvalidTtl);
    }
    let now = engine.now_ms();
    let at = now_plus(now, ttl, seconds)?;
    let deadline = absolute_expiry(now, false, at, "setex")?;
    engine.db.set_with_expiry(key.clone(), Value::String(value.to_vec()), Some(deadline));
    engine.touch(&key);
    Ok(Reply::ok())
}

pub fn append(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let addition = args.pop()?;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::String(Vec::new()));
    let string = value.as_string_mut()?;
    string.extend_from_slice(&addition);
    let len = string.len();
    engine.touch(&key);
    Ok(Reply::from(len))
}

pub fn strlen(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let len = match engine.db.get(&key, now) {
        Some(value) => value.as_string()?.len(),
        None => 0,
    };
    Ok(Reply::from(len))
}

fn increment(engine: &mut Engine, key: Bytes, delta: i64) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::String(b"0".to_vec()));
    let string = value.as_string_mut()?;
    let current = crate::numeric::parse_i64(string)?;
    let updated = current.checked_add(delta).ok_or(EngineError::IncrOverflow)?;
    *string = updated.to_string().into_bytes();
    engine.touch(&key);
    Ok(Reply::from(updated))
}

pub fn incr(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    increment(engine, key, 1)
}

pub fn incrby(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let delta = args.i64()?;
    increment(engine, key, delta)
}

pub fn decr(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    increment(engine, key, -1)
}

pub fn decrby(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let delta = args.i64()?;
    let delta = delta.checked_neg().ok_or(EngineError::IncrOverflow)?;
    increment(engine, key, delta)
}

pub fn incrbyfloat(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let delta = args.f64()?;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::String(b"0".to_vec()));
    let string = value.as_string_mut()?;
    let current = crate::numeric::parse_f64(string).map_err(|_| EngineError::NotAFloat)?;
    let updated = current + delta;
    if updated.is_nan() || updated.is_infinite() {
        return Err(EngineError::NanOrInfinity.into());
    }
    let formatted = crate::numeric::format_float(updated);
    *string = formatted.clone().into_bytes();
    engine.touch(&key);
    Ok(Reply::bulk(Bytes::from(formatted.into_bytes())))
}

fn normalize_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let clamp = |index: i64| -> i64 {
        if index < 0 {
            (len as i64 + index).max(0)
        } else {
            index
        }
    };
    let start = clamp(start).min(len as i64 - 1);
    let end = clamp(end).min(len as i64 - 1);
    if start > end || start >= len as i64 {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

pub fn getrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = args.i64()?;
    let end = args.i64()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::bulk(Bytes::new()));
    };
    let string = value.as_string()?;
    match normalize_range(string.len(), start, end) {
        Some((start, end)) => Ok(Reply::bulk(Bytes::copy_from_slice(&string[start..=end]))),
        None => Ok(Reply::bulk(Bytes::new())),
    }
}

pub fn setrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let offset = args.i64()?;
    let patch = args.pop()?;
    if offset < 0 {
        return Err(EngineError::OffsetRange.into());
    }
    let offset = offset as usize;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::String(Vec::new()));
    let string = value.as_string_mut()?;
    if patch.is_empty() {
        return Ok(Reply::from(string.len()));
    }
    let required = offset + patch.len();
    if string.len() < required {
        string.resize(required, 0);
    }
    string[offset..offset + patch.len()].copy_from_slice(&patch);
    let len = string.len();
    engine.touch(&key);
    Ok(Reply::from(len))
}

pub fn mget(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let mut results = Vec::new();
    for key in args.rest() {
        let reply = match engine.db.get(&key, now) {
            Some(value) => match value.as_string() {
                Ok(bytes) => Reply::bulk(Bytes::from(bytes.clone())),
                Err(_) => Reply::Nil,
            },
            None => Reply::Nil,
        };
        results.push(reply);
    }
    Ok(Reply::Array(results))
}

pub fn mset(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    if args.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let pairs = args.rest();
    for pair in pairs.chunks(2) {
        let key = pair[0].clone();
        let value = pair[1].clone();
        engine.db.set(key.clone(), Value::String(value.to_vec()), false);
        engine.touch(&key);
    }
    Ok(Reply::ok())
}

pub fn msetnx(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    if args.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let now = engine.now_ms();
    let pairs = args.rest();
    if pairs.chunks(2).any(|pair| engine.db.contains_live(&pair[0], now)) {
        return Ok(Reply::from(0_i64));
    }
    for pair in pairs.chunks(2) {
        let key = pair[0].clone();
        let value = pair[1].clone();
        engine.db.set(key.clone(), Value::String(value.to_vec()), false);
        engine.touch(&key);
    }
    Ok(Reply::from(1_i64))
}
