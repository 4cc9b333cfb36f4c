//! Hash commands (spec §4.5): field/value maps nested under a single key.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::{CommandError, EngineError};
use crate::reply::Reply;
use bytes::Bytes;
use hashbrown::HashMap;
use rand::seq::{IteratorRandom, SliceRandom};

pub fn hset(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let pairs = args.rest();
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(CommandError::WrongArguments("hset".to_owned()));
    }
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || crate::keyspace::Value::Hash(HashMap::new()));
    let hash = value.as_hash_mut()?;
    let mut added = 0_i64;
    for pair in pairs.chunks_exact(2) {
        if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
            added += 1;
        }
    }
    engine.touch(&key);
    Ok(Reply::from(added))
}

pub fn hmset(engine: &mut Engine, id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    hset(engine, id, args)?;
    Ok(Reply::ok())
}

pub fn hsetnx(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let value = args.pop()?;
    let now = engine.now_ms();
    let entry = engine.db.entry_or_insert_with(&key, now, || crate::keyspace::Value::Hash(HashMap::new()));
    let hash = entry.as_hash_mut()?;
    if hash.contains_key(&field) {
        return Ok(Reply::from(false));
    }
    hash.insert(field, value);
    engine.touch(&key);
    Ok(Reply::from(true))
}

pub fn hget(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.get(&field).cloned())),
        None => Ok(Reply::Nil),
    }
}

pub fn hmget(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let fields = args.rest();
    let now = engine.now_ms();
    let hash = engine.db.get(&key, now).map(crate::keyspace::Value::as_hash).transpose()?;
    let items = fields
        .into_iter()
        .map(|field| Reply::from(hash.and_then(|hash| hash.get(&field).cloned())))
        .collect();
    Ok(Reply::Array(items))
}

pub fn hgetall(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let hash = value.as_hash()?;
    let mut items = Vec::with_capacity(hash.len() * 2);
    for (field, value) in hash {
        items.push(Reply::bulk(field.clone()));
        items.push(Reply::bulk(value.clone()));
    }
    Ok(Reply::Array(items))
}

pub fn hkeys(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.keys().cloned().collect::<Vec<_>>())),
        None => Ok(Reply::Array(Vec::new())),
    }
}

pub fn hvals(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.values().cloned().collect::<Vec<_>>())),
        None => Ok(Reply::Array(Vec::new())),
    }
}

pub fn hlen(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.len())),
        None => Ok(Reply::from(0_i64)),
    }
}

pub fn hexists(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.contains_key(&field))),
        None => Ok(Reply::from(false)),
    }
}

pub fn hdel(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let hash = value.as_hash_mut()?;
    let mut removed = 0_i64;
    for field in args.rest() {
        if hash.remove(&field).is_some() {
            removed += 1;
        }
    }
    engine.db.remove_if_empty(&key, |value| matches!(value, crate::keyspace::Value::Hash(hash) if hash.is_empty()));
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn hincrby(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let delta = args.i64()?;
    let now = engine.now_ms();
    let entry = engine.db.entry_or_insert_with(&key, now, || crate::keyspace::Value::Hash(HashMap::new()));
    let hash = entry.as_hash_mut()?;
    let current = match hash.get(&field) {
        Some(bytes) => crate::numeric::parse_i64(bytes).map_err(|_| EngineError::HashValueNotAnInteger)?,
        None => 0,
    };
    let updated = current.checked_add(delta).ok_or(EngineError::IncrOverflow)?;
    hash.insert(field, Bytes::from(updated.to_string()));
    engine.touch(&key);
    Ok(Reply::from(updated))
}

pub fn hincrbyfloat(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let delta = args.f64()?;
    let now = engine.now_ms();
    let entry = engine.db.entry_or_insert_with(&key, now, || crate::keyspace::Value::Hash(HashMap::new()));
    let hash = entry.as_hash_mut()?;
    let current = match hash.get(&field) {
        Some(bytes) => crate::numeric::parse_f64(bytes).map_err(|_| EngineError::HashValueNotAFloat)?,
        None => 0.0,
    };
    let updated = current + delta;
    if !updated.is_finite() {
        return Err(EngineError::NanOrInfinity.into());
    }
    let formatted = crate::numeric::format_float(updated);
    hash.insert(field, Bytes::from(formatted.clone()));
    engine.touch(&key);
    Ok(Reply::bulk(formatted))
}

pub fn hstrlen(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let field = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_hash()?.get(&field).map_or(0, Bytes::len))),
        None => Ok(Reply::from(0_i64)),
    }
}

pub fn hrandfield(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return if args.is_empty() { Ok(Reply::Nil) } else { Ok(Reply::Array(Vec::new())) };
    };
    let hash = value.as_hash()?;
    let fields: Vec<&Bytes> = hash.keys().collect();

    let Some(count) = args.try_pop() else {
        let mut rng = rand::thread_rng();
        return Ok(fields.choose(&mut rng).map(|f| Reply::bulk((*f).clone())).unwrap_or(Reply::Nil));
    };
    let count = crate::numeric::parse_i64(&count).map_err(|_| CommandError::NotAnInteger)?;
    let with_values = match args.try_pop() {
        Some(option) if Args::eq_ignore_case(&option, "WITHVALUES") => true,
        Some(_) => return Err(CommandError::Syntax),
        None => false,
    };

    let mut rng = rand::thread_rng();
    let chosen: Vec<&Bytes> = if count >= 0 {
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;
        fields.into_iter().choose_multiple(&mut rng, count)
    } else {
        let count = count.unsigned_abs();
        let mut out = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            if let Some(field) = fields.choose(&mut rng) {
                out.push(*field);
            }
        }
        out
    };

    if with_values {
        let mut items = Vec::with_capacity(chosen.len() * 2);
        for field in chosen {
            items.push(Reply::bulk(field.clone()));
            items.push(Reply::bulk(hash.get(field).cloned().unwrap_or_default()));
        }
        Ok(Reply::Array(items))
    } else {
        Ok(Reply::from(chosen.into_iter().cloned().collect::<Vec<_>>()))
    }
}

pub fn hscan(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let _cursor = args.pop()?;
    let mut pattern: Option<Bytes> = None;
    let mut novalues = false;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "MATCH") {
            pattern = Some(args.pop()?);
        } else if Args::eq_ignore_case(&option, "COUNT") {
            let _ = args.i64()?;
        } else if Args::eq_ignore_case(&option, "NOVALUES") {
            novalues = true;
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(vec![Reply::bulk(Bytes::from_static(b"0")), Reply::Array(Vec::new())]));
    };
    let hash = value.as_hash()?;
    let mut items = Vec::new();
    for (field, value) in hash {
        if pattern.as_deref().is_some_and(|pattern| !crate::glob::matches(field, pattern)) {
            continue;
        }
        items.push(Reply::bulk(field.clone()));
        if !novalues {
            items.push(Reply::bulk(value.clone()));
        }
    }
    Ok(Reply::Array(vec![Reply::bulk(Bytes::from_static(b"0")), Reply::Array(items)]))
}
