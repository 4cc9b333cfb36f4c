//! Set commands (spec §4.4): unordered unique-member collections, their
//! algebraic union/intersect/difference forms, and random selection.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::keyspace::Value;
use crate::reply::Reply;
use bytes::Bytes;
use hashbrown::HashSet;
use rand::seq::{IteratorRandom, SliceRandom};

pub fn sadd(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::Set(HashSet::new()));
    let set = value.as_set_mut()?;
    let mut added = 0_i64;
    for member in args.rest() {
        if set.insert(member) {
            added += 1;
        }
    }
    if added > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(added))
}

pub fn srem(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let set = value.as_set_mut()?;
    let mut removed = 0_i64;
    for member in args.rest() {
        if set.remove(&member) {
            removed += 1;
        }
    }
    engine.db.remove_if_empty(&key, |value| matches!(value, Value::Set(set) if set.is_empty()));
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn smembers(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_set()?.iter().cloned().collect::<Vec<_>>())),
        None => Ok(Reply::Array(Vec::new())),
    }
}

pub fn scard(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_set()?.len())),
        None => Ok(Reply::from(0_i64)),
    }
}

pub fn sismember(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let member = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_set()?.contains(&member))),
        None => Ok(Reply::from(false)),
    }
}

pub fn smismember(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let set = engine.db.get(&key, now).map(Value::as_set).transpose()?;
    let results = args
        .rest()
        .into_iter()
        .map(|member| Reply::from(set.is_some_and(|set| set.contains(&member))))
        .collect();
    Ok(Reply::Array(results))
}

fn load_set<'a>(engine: &'a mut Engine, key: &[u8], now: u64) -> Result<&'a HashSet<Bytes>, CommandError> {
    static EMPTY: std::sync::OnceLock<HashSet<Bytes>> = std::sync::OnceLock::new();
    match engine.db.get(key, now) {
        Some(value) => Ok(value.as_set()?),
        None => Ok(EMPTY.get_or_init(HashSet::new)),
    }
}

fn algebra(engine: &mut Engine, keys: &[Bytes], op: fn(&HashSet<Bytes>, &HashSet<Bytes>) -> HashSet<Bytes>) -> Result<HashSet<Bytes>, CommandError> {
    let now = engine.now_ms();
    let mut iter = keys.iter();
    let Some(first) = iter.next() else {
        return Ok(HashSet::new());
    };
    let mut result = load_set(engine, first, now)?.clone();
    for key in iter {
        let set = load_set(engine, key, now)?;
        result = op(&result, set);
    }
    Ok(result)
}

fn union(a: &HashSet<Bytes>, b: &HashSet<Bytes>) -> HashSet<Bytes> {
    a.union(b).cloned().collect()
}

fn intersect(a: &HashSet<Bytes>, b: &HashSet<Bytes>) -> HashSet<Bytes> {
    a.intersection(b).cloned().collect()
}

fn difference(a: &HashSet<Bytes>, b: &HashSet<Bytes>) -> HashSet<Bytes> {
    a.difference(b).cloned().collect()
}

pub fn sunion(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let keys = args.rest();
    let result = algebra(engine, &keys, union)?;
    Ok(Reply::from(result.into_iter().collect::<Vec<_>>()))
}

pub fn sinter(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let keys = args.rest();
    let result = algebra(engine, &keys, intersect)?;
    Ok(Reply::from(result.into_iter().collect::<Vec<_>>()))
}

pub fn sdiff(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let keys = args.rest();
    let result = algebra(engine, &keys, difference)?;
    Ok(Reply::from(result.into_iter().collect::<Vec<_>>()))
}

fn store(engine: &mut Engine, dest: Bytes, result: HashSet<Bytes>) -> Reply {
    let len = result.len();
    if result.is_empty() {
        let now = engine.now_ms();
        engine.db.remove(&dest, now);
    } else {
        engine.db.set(dest.clone(), Value::Set(result), false);
    }
    engine.touch(&dest);
    Reply::from(len)
}

pub fn sunionstore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let dest = args.pop()?;
    let keys = args.rest();
    let result = algebra(engine, &keys, union)?;
    Ok(store(engine, dest, result))
}

pub fn sinterstore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let dest = args.pop()?;
    let keys = args.rest();
    let result = algebra(engine, &keys, intersect)?;
    Ok(store(engine, dest, result))
}

pub fn sdiffstore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let dest = args.pop()?;
    let keys = args.rest();
    let result = algebra(engine, &keys, difference)?;
    Ok(store(engine, dest, result))
}

pub fn sintercard(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let numkeys = args.usize()?;
    if numkeys == 0 {
        return Err(CommandError::NumkeysZero);
    }
    if numkeys > args.len() {
        return Err(CommandError::NumberOfKeys);
    }
    let mut keys = Vec::with_capacity(numkeys);
    for _ in 0..numkeys {
        keys.push(args.pop()?);
    }
    let mut limit = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "LIMIT") {
            limit = Some(args.usize()?);
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let now = engine.now_ms();
    let mut iter = keys.iter();
    let Some(first) = iter.next() else {
        return Ok(Reply::from(0_i64));
    };
    let mut current: HashSet<Bytes> = load_set(engine, first, now)?.clone();
    for key in iter {
        let set = load_set(engine, key, now)?;
        current = intersect(&current, set);
        if current.is_empty() {
            break;
        }
    }
    let count = match limit {
        Some(0) | None => current.len(),
        Some(limit) => current.len().min(limit),
    };
    Ok(Reply::from(count))
}

pub fn smove(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    let member = args.pop()?;
    let now = engine.now_ms();

    let removed = match engine.db.get_mut(&source, now) {
        Some(value) => value.as_set_mut()?.remove(&member),
        None => false,
    };
    if !removed {
        return Ok(Reply::from(false));
    }
    engine.db.remove_if_empty(&source, |value| matches!(value, Value::Set(set) if set.is_empty()));

    let value = engine.db.entry_or_insert_with(&dest, now, || Value::Set(HashSet::new()));
    value.as_set_mut()?.insert(member);

    engine.touch(&source);
    engine.touch(&dest);
    Ok(Reply::from(true))
}

pub fn srandmember(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return if args.is_empty() { Ok(Reply::Nil) } else { Ok(Reply::Array(Vec::new())) };
    };
    let set = value.as_set()?;
    let members: Vec<&Bytes> = set.iter().collect();

    let Some(count) = args.try_pop() else {
        let mut rng = rand::thread_rng();
        return Ok(members.choose(&mut rng).map(|m| Reply::bulk((*m).clone())).unwrap_or(Reply::Nil));
    };
    let count = crate::numeric::parse_i64(&count).map_err(|_| CommandError::NotAnInteger)?;

    let mut rng = rand::thread_rng();
    if count >= 0 {
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;
        let chosen: Vec<Bytes> = members.into_iter().cloned().choose_multiple(&mut rng, count);
        Ok(Reply::from(chosen))
    } else {
        let count = count.unsigned_abs();
        if members.is_empty() {
            return Ok(Reply::Array(Vec::new()));
        }
        let mut chosen = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            if let Some(member) = members.choose(&mut rng) {
                chosen.push(Reply::bulk((*member).clone()));
            }
        }
        Ok(Reply::Array(chosen))
    }
}

pub fn spop(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let count = args.try_pop();
    let now = engine.now_ms();

    let Some(value) = engine.db.get_mut(&key, now) else {
        return if count.is_some() { Ok(Reply::Array(Vec::new())) } else { Ok(Reply::Nil) };
    };
    let set = value.as_set_mut()?;

    let Some(count) = count else {
        let mut rng = rand::thread_rng();
        let chosen = set.iter().cloned().choose(&mut rng);
        let Some(member) = chosen else {
            return Ok(Reply::Nil);
        };
        set.remove(&member);
        engine.db.remove_if_empty(&key, |value| matches!(value, Value::Set(set) if set.is_empty()));
        engine.touch(&key);
        return Ok(Reply::bulk(member));
    };

    let count = crate::numeric::parse_i64(&count).map_err(|_| CommandError::NotAnInteger)?;
    if count < 0 {
        return Err(CommandError::Syntax);
    }
    #[allow(clippy::cast_sign_loss)]
    let count = (count as usize).min(set.len());
    let mut rng = rand::thread_rng();
    let chosen: Vec<Bytes> = set.iter().cloned().choose_multiple(&mut rng, count);
    for member in &chosen {
        set.remove(member);
    }
    engine.db.remove_if_empty(&key, |value| matches!(value, Value::Set(set) if set.is_empty()));
    if !chosen.is_empty() {
        engine.touch(&key);
    }
    Ok(Reply::from(chosen))
}

pub fn sscan(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let _cursor = args.pop()?;
    let mut pattern: Option<Bytes> = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "MATCH") {
            pattern = Some(args.pop()?);
        } else if Args::eq_ignore_case(&option, "COUNT") {
            let _ = args.i64()?;
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(vec![Reply::bulk(Bytes::from_static(b"0")), Reply::Array(Vec::new())]));
    };
    let set = value.as_set()?;
    let matched: Vec<Bytes> = set
        .iter()
        .filter(|member| pattern.as_deref().is_none_or(|pattern| crate::glob::matches(member, pattern)))
        .cloned()
        .collect();
    Ok(Reply::Array(vec![Reply::bulk(Bytes::from_static(b"0")), Reply::from(matched)]))
}
