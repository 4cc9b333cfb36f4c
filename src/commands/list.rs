//! List commands (spec §4.3): ordered, duplicate-permitting sequences
//! with push/pop from either end and index/range access.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::keyspace::Value;
use crate::reply::Reply;
use bytes::Bytes;
use std::collections::VecDeque;

fn push(engine: &mut Engine, mut args: Args, front: bool, require_existing: bool) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();

    if require_existing && !engine.db.contains_live(&key, now) {
        return Ok(Reply::from(0_i64));
    }

    let value = engine.db.entry_or_insert_with(&key, now, || Value::List(VecDeque::new()));
    let list = value.as_list_mut()?;
    for item in args.rest() {
        if front {
            list.push_front(item);
        } else {
            list.push_back(item);
        }
    }
    let len = list.len();
    engine.touch(&key);
    Ok(Reply::from(len))
}

pub fn lpush(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    push(engine, args, true, false)
}

pub fn rpush(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    push(engine, args, false, false)
}

pub fn lpushx(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    push(engine, args, true, true)
}

pub fn rpushx(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    push(engine, args, false, true)
}

fn pop(engine: &mut Engine, mut args: Args, front: bool) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let count = args.try_pop();
    let now = engine.now_ms();

    let Some(value) = engine.db.get_mut(&key, now) else {
        return if count.is_some() { Ok(Reply::NilArray) } else { Ok(Reply::Nil) };
    };
    let list = value.as_list_mut()?;

    let result = match count {
        None => {
            let item = if front { list.pop_front() } else { list.pop_back() };
            item.map_or(Reply::Nil, Reply::bulk)
        }
        Some(count) => {
            let count = crate::numeric::parse_i64(&count).map_err(|_| CommandError::NotAnInteger)?;
            if count < 0 {
                return Err(CommandError::Syntax);
            }
            #[allow(clippy::cast_sign_loss)]
            let count = (count as usize).min(list.len());
            let mut popped = Vec::with_capacity(count);
            for _ in 0..count {
                let item = if front { list.pop_front() } else { list.pop_back() };
                let Some(item) = item else { break };
                popped.push(item);
            }
            // The key already exists here, so an empty result means
            // `count` was 0, not "key missing" — that's an empty array,
            // not a nil array (spec §8's boundary case for LPOP/RPOP).
            Reply::from(popped)
        }
    };

    engine.db.remove_if_empty(&key, |value| matches!(value, Value::List(list) if list.is_empty()));
    engine.touch(&key);
    Ok(result)
}

pub fn lpop(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    pop(engine, args, true)
}

pub fn rpop(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    pop(engine, args, false)
}

pub fn llen(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_list()?.len())),
        None => Ok(Reply::from(0_i64)),
    }
}

pub fn lrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = args.i64()?;
    let stop = args.i64()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let list = value.as_list()?;
    let Some(range) = crate::slice::slice(list.len(), start, stop) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let items: Vec<Bytes> = list.iter().skip(range.start).take(range.len()).cloned().collect();
    Ok(Reply::from(items))
}

pub fn lindex(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let index = args.i64()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Nil);
    };
    let list = value.as_list()?;
    let Some(index) = normalize_index(list.len(), index) else {
        return Ok(Reply::Nil);
    };
    Ok(list.get(index).cloned().map_or(Reply::Nil, Reply::bulk))
}

fn normalize_index(len: usize, index: i64) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len_i } else { index };
    if index < 0 || index >= len_i {
        return None;
    }
    usize::try_from(index).ok()
}

pub fn lset(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let index = args.i64()?;
    let element = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Err(crate::error::EngineError::NoSuchKey.into());
    };
    let list = value.as_list_mut()?;
    let Some(index) = normalize_index(list.len(), index) else {
        return Err(crate::error::EngineError::IndexOutOfRange.into());
    };
    list[index] = element;
    engine.touch(&key);
    Ok(Reply::ok())
}

pub fn linsert(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let where_ = args.pop()?;
    let before = if Args::eq_ignore_case(&where_, "BEFORE") {
        true
    } else if Args::eq_ignore_case(&where_, "AFTER") {
        false
    } else {
        return Err(CommandError::Syntax);
    };
    let pivot = args.pop()?;
    let element = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let list = value.as_list_mut()?;
    let Some(position) = list.iter().position(|item| *item == pivot) else {
        return Ok(Reply::from(-1_i64));
    };
    let index = if before { position } else { position + 1 };
    list.insert(index, element);
    let len = list.len();
    engine.touch(&key);
    Ok(Reply::from(len))
}

pub fn lrem(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let count = args.i64()?;
    let element = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let list = value.as_list_mut()?;

    let mut removed = 0_i64;
    if count == 0 {
        let before = list.len();
        list.retain(|item| *item != element);
        removed = i64::try_from(before - list.len()).unwrap_or(i64::MAX);
    } else if count > 0 {
        #[allow(clippy::cast_sign_loss)]
        let mut remaining = count as usize;
        let mut kept = VecDeque::with_capacity(list.len());
        for item in list.drain(..) {
            if remaining > 0 && item == element {
                remaining -= 1;
                removed += 1;
            } else {
                kept.push_back(item);
            }
        }
        *list = kept;
    } else {
        let mut remaining = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);
        let mut kept = VecDeque::with_capacity(list.len());
        for item in list.drain(..).collect::<Vec<_>>().into_iter().rev() {
            if remaining > 0 && item == element {
                remaining -= 1;
                removed += 1;
            } else {
                kept.push_front(item);
            }
        }
        *list = kept;
    }

    engine.db.remove_if_empty(&key, |value| matches!(value, Value::List(list) if list.is_empty()));
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn ltrim(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = args.i64()?;
    let stop = args.i64()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::ok());
    };
    let list = value.as_list_mut()?;
    match crate::slice::slice(list.len(), start, stop) {
        Some(range) => {
            let kept: VecDeque<Bytes> = list.iter().skip(range.start).take(range.len()).cloned().collect();
            *list = kept;
        }
        None => list.clear(),
    }
    engine.db.remove_if_empty(&key, |value| matches!(value, Value::List(list) if list.is_empty()));
    engine.touch(&key);
    Ok(Reply::ok())
}

pub fn lpos(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let element = args.pop()?;

    let mut rank = 1_i64;
    let mut count: Option<usize> = None;
    let mut maxlen = 0_usize;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "RANK") {
            rank = args.i64()?;
            if rank == 0 {
                return Err(CommandError::Syntax);
            }
        } else if Args::eq_ignore_case(&option, "COUNT") {
            count = Some(args.usize()?);
        } else if Args::eq_ignore_case(&option, "MAXLEN") {
            maxlen = args.usize()?;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(if count.is_some() { Reply::Array(Vec::new()) } else { Reply::Nil });
    };
    let list = value.as_list()?;

    let mut matches_found = Vec::new();
    let mut scanned = 0_usize;
    let mut to_skip = usize::try_from(rank.unsigned_abs()).unwrap_or(usize::MAX) - 1;
    let limit = count.unwrap_or(1);

    let indices: Vec<usize> = if rank > 0 {
        (0..list.len()).collect()
    } else {
        (0..list.len()).rev().collect()
    };

    for index in indices {
        if maxlen != 0 && scanned >= maxlen {
            break;
        }
        scanned += 1;
        if list[index] == element {
            if to_skip > 0 {
                to_skip -= 1;
                continue;
            }
            matches_found.push(index);
            if limit != 0 && matches_found.len() >= limit {
                break;
            }
        }
    }

    match count {
        Some(_) => Ok(Reply::from(matches_found)),
        None => Ok(matches_found.into_iter().next().map_or(Reply::Nil, Reply::from)),
    }
}

fn move_element(engine: &mut Engine, source: Bytes, dest: Bytes, source_left: bool, dest_left: bool) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&source, now) else {
        return Ok(Reply::Nil);
    };
    let list = value.as_list_mut()?;
    let item = if source_left { list.pop_front() } else { list.pop_back() };
    let Some(item) = item else {
        return Ok(Reply::Nil);
    };
    engine.db.remove_if_empty(&source, |value| matches!(value, Value::List(list) if list.is_empty()));

    let dest_value = engine.db.entry_or_insert_with(&dest, now, || Value::List(VecDeque::new()));
    let dest_list = dest_value.as_list_mut()?;
    if dest_left {
        dest_list.push_front(item.clone());
    } else {
        dest_list.push_back(item.clone());
    }

    engine.touch(&source);
    engine.touch(&dest);
    Ok(Reply::bulk(item))
}

pub fn lmove(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    let from = args.pop()?;
    let to = args.pop()?;
    let source_left = Args::eq_ignore_case(&from, "LEFT");
    let dest_left = Args::eq_ignore_case(&to, "LEFT");
    if !source_left && !Args::eq_ignore_case(&from, "RIGHT") {
        return Err(CommandError::Syntax);
    }
    if !dest_left && !Args::eq_ignore_case(&to, "RIGHT") {
        return Err(CommandError::Syntax);
    }
    move_element(engine, source, dest, source_left, dest_left)
}

pub fn rpoplpush(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    move_element(engine, source, dest, false, true)
}
