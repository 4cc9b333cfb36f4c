//! Stream commands (spec §4.7): an append-only log of entries keyed by
//! monotone IDs, plus the consumer-group/PEL bookkeeping `XREADGROUP`/
//! `XCLAIM`/`XAUTOCLAIM` operate on. The teacher repo has no stream
//! command family; this module follows the command-handler shape used
//! throughout the rest of `commands/` (logos-free here — stream IDs
//! and sentinels are matched as literal byte strings, not case-folded
//! option words).

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::{CommandError, EngineError};
use crate::keyspace::{Consumer, Entry, PendingEntry, Stream, StreamId, Value};
use crate::reply::Reply;
use bytes::Bytes;
use std::collections::HashMap;

fn no_group_err(key: &[u8], group: &[u8]) -> CommandError {
    EngineError::NoGroup(String::from_utf8_lossy(key).into_owned(), String::from_utf8_lossy(group).into_owned()).into()
}

fn no_such_group_err(key: &[u8], group: &[u8]) -> CommandError {
    EngineError::NoSuchGroup(String::from_utf8_lossy(key).into_owned(), String::from_utf8_lossy(group).into_owned()).into()
}

/// Parses `<ms>-<seq>` or bare `<ms>` (defaulting `seq` to 0), per
/// spec §4.7's ID format.
fn parse_id(bytes: &[u8]) -> Result<StreamId, EngineError> {
    let text = std::str::from_utf8(bytes).map_err(|_| EngineError::InvalidStreamId)?;
    let (ms, seq) = match text.split_once('-') {
        Some((ms, seq)) => (ms, Some(seq)),
        None => (text, None),
    };
    let ms: u64 = ms.parse().map_err(|_| EngineError::InvalidStreamId)?;
    let seq = match seq {
        Some(seq) => seq.parse().map_err(|_| EngineError::InvalidStreamId)?,
        None => 0,
    };
    Ok(StreamId::new(ms, seq))
}

/// Parses a range-start bound: `-` is `0-1` (spec §4.7's stated
/// minimum), bare `<ms>` implies `seq = 0`.
fn parse_range_start(bytes: &[u8]) -> Result<StreamId, EngineError> {
    if bytes == b"-" {
        return Ok(StreamId::new(0, 1));
    }
    if bytes == b"+" {
        return Ok(StreamId::MAX);
    }
    parse_range_bound(bytes, 0)
}

/// Parses a range-end bound: `+` is the maximum ID, bare `<ms>` implies
/// `seq = u64::MAX`.
fn parse_range_end(bytes: &[u8]) -> Result<StreamId, EngineError> {
    if bytes == b"+" {
        return Ok(StreamId::MAX);
    }
    if bytes == b"-" {
        return Ok(StreamId::new(0, 1));
    }
    parse_range_bound(bytes, u64::MAX)
}

fn parse_range_bound(bytes: &[u8], default_seq: u64) -> Result<StreamId, EngineError> {
    let text = std::str::from_utf8(bytes).map_err(|_| EngineError::InvalidStreamId)?;
    let (ms, seq) = match text.split_once('-') {
        Some((ms, seq)) => (ms, Some(seq)),
        None => (text, None),
    };
    let ms: u64 = ms.parse().map_err(|_| EngineError::InvalidStreamId)?;
    let seq = match seq {
        Some(seq) => seq.parse().map_err(|_| EngineError::InvalidStreamId)?,
        None => default_seq,
    };
    Ok(StreamId::new(ms, seq))
}

/// `XADD`'s own ID grammar: bare `*` auto-generates, `<ms>-*` keeps the
/// millisecond part and auto-bumps the sequence.
fn parse_xadd_id(bytes: &[u8], stream: &Stream, now_ms: u64) -> Result<StreamId, EngineError> {
    if bytes == b"*" {
        return Ok(stream.auto_id(now_ms));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| EngineError::InvalidStreamId)?;
    if let Some(ms_part) = text.strip_suffix("-*") {
        let ms: u64 = ms_part.parse().map_err(|_| EngineError::InvalidStreamId)?;
        let seq = if ms == stream.last_id.ms { stream.last_id.seq + 1 } else { 0 };
        return Ok(StreamId::new(ms, seq));
    }
    parse_id(bytes)
}

/// Consumes an optional `~`/`=` trimming-strategy marker. Trimming is
/// always exact here, so the marker is accepted and discarded rather
/// than changing behavior.
fn consume_trim_strategy(args: &mut Args) {
    if let Some(peeked) = args.peek() {
        if &peeked[..] == b"~" || &peeked[..] == b"=" {
            let _ = args.pop();
        }
    }
}

fn parse_optional_count(args: &mut Args) -> Result<Option<usize>, CommandError> {
    let Some(option) = args.try_pop() else {
        return Ok(None);
    };
    if Args::eq_ignore_case(&option, "COUNT") {
        Ok(Some(args.usize()?))
    } else {
        Err(CommandError::Syntax)
    }
}

fn entry_reply(entry: &Entry) -> Reply {
    let mut fields = Vec::with_capacity(entry.fields.len() * 2);
    for (field, value) in &entry.fields {
        fields.push(Reply::bulk(field.clone()));
        fields.push(Reply::bulk(value.clone()));
    }
    Reply::Array(vec![Reply::bulk(entry.id.to_string()), Reply::Array(fields)])
}

fn info_map(pairs: Vec<(&'static str, Reply)>) -> Reply {
    let mut out = Vec::with_capacity(pairs.len() * 2);
    for (field, value) in pairs {
        out.push(Reply::bulk(Bytes::from_static(field.as_bytes())));
        out.push(value);
    }
    Reply::Array(out)
}

pub fn xadd(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;

    let mut nomkstream = false;
    let mut maxlen = None;
    let mut minid = None;
    loop {
        let Some(peeked) = args.peek().cloned() else {
            return Err(CommandError::Syntax);
        };
        if Args::eq_ignore_case(&peeked, "NOMKSTREAM") {
            args.pop()?;
            nomkstream = true;
        } else if Args::eq_ignore_case(&peeked, "MAXLEN") {
            args.pop()?;
            consume_trim_strategy(&mut args);
            maxlen = Some(args.usize()?);
        } else if Args::eq_ignore_case(&peeked, "MINID") {
            args.pop()?;
            consume_trim_strategy(&mut args);
            minid = Some(parse_id(&args.pop()?)?);
        } else if Args::eq_ignore_case(&peeked, "LIMIT") {
            args.pop()?;
            let _count = args.usize()?;
        } else {
            break;
        }
    }

    let id_arg = args.pop()?;
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let mut fields = Vec::new();
    while !args.is_empty() {
        let field = args.pop()?;
        let value = args.pop()?;
        fields.push((field, value));
    }

    let now = engine.now_ms();
    if nomkstream && engine.db.get(&key, now).is_none() {
        return Ok(Reply::Nil);
    }
    let value = engine.db.entry_or_insert_with(&key, now, || Value::Stream(Stream::default()));
    let stream = value.as_stream_mut()?;

    let entry_id = parse_xadd_id(&id_arg, stream, now)?;
    stream.append(entry_id, fields).map_err(|()| EngineError::StreamIdTooSmall)?;

    if let Some(maxlen) = maxlen {
        stream.trim_to_maxlen(maxlen);
    }
    if let Some(minid) = minid {
        stream.trim_to_minid(minid);
    }

    engine.touch(&key);
    Ok(Reply::bulk(entry_id.to_string()))
}

pub fn xlen(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_stream()?.len())),
        None => Ok(Reply::from(0_i64)),
    }
}

pub fn xrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = parse_range_start(&args.pop()?)?;
    let end = parse_range_end(&args.pop()?)?;
    let count = parse_optional_count(&mut args)?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let mut entries = value.as_stream()?.range(start, end);
    if let Some(count) = count {
        entries.truncate(count);
    }
    Ok(Reply::Array(entries.iter().map(entry_reply).collect()))
}

pub fn xrevrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let end = parse_range_end(&args.pop()?)?;
    let start = parse_range_start(&args.pop()?)?;
    let count = parse_optional_count(&mut args)?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let mut entries = value.as_stream()?.range_rev(start, end);
    if let Some(count) = count {
        entries.truncate(count);
    }
    Ok(Reply::Array(entries.iter().map(entry_reply).collect()))
}

/// `BLOCK` is parsed and discarded: spec §4.7 says `$` always yields no
/// data since blocking is not implemented, and this command never
/// waits regardless of the timeout given.
pub fn xread(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let mut count = None;
    loop {
        let Some(peeked) = args.peek().cloned() else {
            return Err(CommandError::Syntax);
        };
        if Args::eq_ignore_case(&peeked, "COUNT") {
            args.pop()?;
            count = Some(args.usize()?);
        } else if Args::eq_ignore_case(&peeked, "BLOCK") {
            args.pop()?;
            let _ms = args.i64()?;
        } else if Args::eq_ignore_case(&peeked, "STREAMS") {
            args.pop()?;
            break;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let rest = args.rest();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let n = rest.len() / 2;
    let (keys, ids) = rest.split_at(n);

    let now = engine.now_ms();
    let mut pairs = Vec::new();
    for (key, id_arg) in keys.iter().zip(ids) {
        let Some(value) = engine.db.get(key, now) else {
            continue;
        };
        let stream = value.as_stream()?;
        let after_id = if &id_arg[..] == b"$" { stream.last_id } else { parse_id(id_arg)? };
        let mut entries: Vec<Entry> = stream.after(after_id).collect();
        if let Some(count) = count {
            entries.truncate(count);
        }
        if !entries.is_empty() {
            pairs.push(Reply::Array(vec![
                Reply::bulk(key.clone()),
                Reply::Array(entries.iter().map(entry_reply).collect()),
            ]));
        }
    }
    if pairs.is_empty() { Ok(Reply::NilArray) } else { Ok(Reply::Array(pairs)) }
}

pub fn xdel(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let stream = value.as_stream_mut()?;
    let mut removed = 0_i64;
    for id_arg in args.rest() {
        let id = parse_id(&id_arg)?;
        if stream.delete(id) {
            removed += 1;
        }
    }
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn xtrim(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let strategy = args.pop()?;
    consume_trim_strategy(&mut args);
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let stream = value.as_stream_mut()?;
    let removed = if Args::eq_ignore_case(&strategy, "MAXLEN") {
        stream.trim_to_maxlen(args.usize()?)
    } else if Args::eq_ignore_case(&strategy, "MINID") {
        stream.trim_to_minid(parse_id(&args.pop()?)?)
    } else {
        return Err(CommandError::Syntax);
    };
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn xsetid(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let new_id = parse_id(&args.pop()?)?;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::Stream(Stream::default()));
    let stream = value.as_stream_mut()?;
    stream.last_id = new_id;
    engine.touch(&key);
    Ok(Reply::ok())
}

pub fn xgroup(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    if Args::eq_ignore_case(&sub, "CREATE") {
        let key = args.pop()?;
        let group = args.pop()?;
        let id_arg = args.pop()?;
        let mut mkstream = false;
        while let Some(option) = args.try_pop() {
            if Args::eq_ignore_case(&option, "MKSTREAM") {
                mkstream = true;
            } else if Args::eq_ignore_case(&option, "ENTRIESREAD") {
                let _ = args.try_pop();
            } else {
                return Err(CommandError::Syntax);
            }
        }
        let now = engine.now_ms();
        if engine.db.get(&key, now).is_none() {
            if !mkstream {
                return Err(no_such_group_err(&key, &group));
            }
            engine.db.set(key.clone(), Value::Stream(Stream::default()), false);
        }
        let value = engine.db.get_mut(&key, now).expect("just ensured present");
        let stream = value.as_stream_mut()?;
        let start_id = if &id_arg[..] == b"$" { stream.last_id } else { parse_id(&id_arg)? };
        if !stream.create_group(group.clone(), start_id) {
            return Err(EngineError::BusyGroup.into());
        }
        engine.touch(&key);
        Ok(Reply::ok())
    } else if Args::eq_ignore_case(&sub, "DESTROY") {
        let key = args.pop()?;
        let group = args.pop()?;
        let now = engine.now_ms();
        let destroyed = engine
            .db
            .get_mut(&key, now)
            .map(Value::as_stream_mut)
            .transpose()?
            .is_some_and(|stream| stream.destroy_group(&group));
        if destroyed {
            engine.touch(&key);
        }
        Ok(Reply::from(destroyed))
    } else if Args::eq_ignore_case(&sub, "SETID") {
        let key = args.pop()?;
        let group = args.pop()?;
        let id_arg = args.pop()?;
        let now = engine.now_ms();
        let value = engine.db.get_mut(&key, now).ok_or_else(|| no_such_group_err(&key, &group))?;
        let stream = value.as_stream_mut()?;
        let start_id = if &id_arg[..] == b"$" { stream.last_id } else { parse_id(&id_arg)? };
        let group_mut = stream.group_mut(&group).ok_or_else(|| no_such_group_err(&key, &group))?;
        group_mut.last_delivered_id = start_id;
        engine.touch(&key);
        Ok(Reply::ok())
    } else if Args::eq_ignore_case(&sub, "CREATECONSUMER") {
        let key = args.pop()?;
        let group = args.pop()?;
        let consumer = args.pop()?;
        let now = engine.now_ms();
        let value = engine.db.get_mut(&key, now).ok_or_else(|| no_such_group_err(&key, &group))?;
        let stream = value.as_stream_mut()?;
        let group_mut = stream.group_mut(&group).ok_or_else(|| no_such_group_err(&key, &group))?;
        let created = !group_mut.consumers.contains_key(&consumer);
        group_mut.consumers.entry(consumer).or_insert_with(|| Consumer { seen_time_ms: now, active_time_ms: now });
        engine.touch(&key);
        Ok(Reply::from(created))
    } else if Args::eq_ignore_case(&sub, "DELCONSUMER") {
        let key = args.pop()?;
        let group = args.pop()?;
        let consumer = args.pop()?;
        let now = engine.now_ms();
        let value = engine.db.get_mut(&key, now).ok_or_else(|| no_such_group_err(&key, &group))?;
        let stream = value.as_stream_mut()?;
        let group_mut = stream.group_mut(&group).ok_or_else(|| no_such_group_err(&key, &group))?;
        let pending = group_mut.pending.values().filter(|pending| pending.consumer == consumer).count();
        group_mut.consumers.remove(&consumer);
        group_mut.pending.retain(|_, pending| pending.consumer != consumer);
        engine.touch(&key);
        Ok(Reply::from(pending))
    } else {
        Err(CommandError::UnknownSubcommand(String::from_utf8_lossy(&sub).into_owned(), "XGROUP".to_owned()))
    }
}

pub fn xreadgroup(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let group_kw = args.pop()?;
    if !Args::eq_ignore_case(&group_kw, "GROUP") {
        return Err(CommandError::Syntax);
    }
    let group = args.pop()?;
    let consumer = args.pop()?;

    let mut count = None;
    let mut no_ack = false;
    loop {
        let Some(peeked) = args.peek().cloned() else {
            return Err(CommandError::Syntax);
        };
        if Args::eq_ignore_case(&peeked, "COUNT") {
            args.pop()?;
            count = Some(args.usize()?);
        } else if Args::eq_ignore_case(&peeked, "BLOCK") {
            args.pop()?;
            let _ms = args.i64()?;
        } else if Args::eq_ignore_case(&peeked, "NOACK") {
            args.pop()?;
            no_ack = true;
        } else if Args::eq_ignore_case(&peeked, "STREAMS") {
            args.pop()?;
            break;
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let count = count.unwrap_or(usize::MAX);

    let rest = args.rest();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let n = rest.len() / 2;
    let (keys, ids) = rest.split_at(n);

    let now = engine.now_ms();
    let mut pairs = Vec::new();
    for (key, id_arg) in keys.iter().zip(ids) {
        let Some(value) = engine.db.get_mut(key, now) else {
            return Err(no_group_err(key, &group));
        };
        let stream = value.as_stream_mut()?;
        if stream.group(&group).is_none() {
            return Err(no_group_err(key, &group));
        }
        let is_new = &id_arg[..] == b">";
        let entries = if is_new {
            stream.read_group_new(&group, consumer.clone(), count, no_ack, now)
        } else {
            let start = parse_id(id_arg)?;
            stream.read_group_history(&group, &consumer, start, count)
        };
        if !entries.is_empty() {
            engine.touch(key);
        }
        if !entries.is_empty() || !is_new {
            pairs.push(Reply::Array(vec![
                Reply::bulk(key.clone()),
                Reply::Array(entries.iter().map(entry_reply).collect()),
            ]));
        }
    }
    if pairs.is_empty() { Ok(Reply::NilArray) } else { Ok(Reply::Array(pairs)) }
}

pub fn xack(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let group = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let stream = value.as_stream_mut()?;
    let mut ids = Vec::new();
    for id_arg in args.rest() {
        ids.push(parse_id(&id_arg)?);
    }
    let removed = stream.ack(&group, &ids);
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn xpending(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let group = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Err(no_group_err(&key, &group));
    };
    let stream = value.as_stream()?;
    let Some(group_ref) = stream.group(&group) else {
        return Err(no_group_err(&key, &group));
    };

    if args.is_empty() {
        if group_ref.pending.is_empty() {
            return Ok(Reply::Array(vec![Reply::from(0_i64), Reply::Nil, Reply::Nil, Reply::NilArray]));
        }
        let min_id = *group_ref.pending.keys().next().expect("non-empty");
        let max_id = *group_ref.pending.keys().next_back().expect("non-empty");
        let mut per_consumer: HashMap<Bytes, i64> = HashMap::new();
        for pending in group_ref.pending.values() {
            *per_consumer.entry(pending.consumer.clone()).or_insert(0) += 1;
        }
        let consumers = per_consumer
            .into_iter()
            .map(|(consumer, count)| Reply::Array(vec![Reply::bulk(consumer), Reply::bulk(count.to_string())]))
            .collect();
        return Ok(Reply::Array(vec![
            Reply::from(group_ref.pending.len()),
            Reply::bulk(min_id.to_string()),
            Reply::bulk(max_id.to_string()),
            Reply::Array(consumers),
        ]));
    }

    let mut idle_ms = None;
    let peeked = args.peek().cloned().ok_or(CommandError::Syntax)?;
    if Args::eq_ignore_case(&peeked, "IDLE") {
        args.pop()?;
        idle_ms = Some(args.i64()?);
    }
    let start = parse_range_start(&args.pop()?)?;
    let end = parse_range_end(&args.pop()?)?;
    let count = args.usize()?;
    let consumer_filter = args.try_pop();

    let items: Vec<Reply> = group_ref
        .pending
        .range(start..=end)
        .filter(|(_, pending)| match &consumer_filter {
            Some(consumer) => &pending.consumer == consumer,
            None => true,
        })
        .filter(|(_, pending)| match idle_ms {
            Some(min_idle) => {
                let idle = now.saturating_sub(pending.delivery_time_ms);
                i64::try_from(idle).unwrap_or(i64::MAX) >= min_idle
            }
            None => true,
        })
        .take(count)
        .map(|(&id, pending)| {
            let idle = now.saturating_sub(pending.delivery_time_ms);
            Reply::Array(vec![
                Reply::bulk(id.to_string()),
                Reply::bulk(pending.consumer.clone()),
                Reply::from(i64::try_from(idle).unwrap_or(i64::MAX)),
                Reply::from(i64::try_from(pending.delivery_count).unwrap_or(i64::MAX)),
            ])
        })
        .collect();
    Ok(Reply::Array(items))
}

pub fn xclaim(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let group = args.pop()?;
    let consumer = args.pop()?;
    let min_idle_ms = args.i64()?;

    let mut ids = Vec::new();
    loop {
        let Some(peeked) = args.peek().cloned() else { break };
        match parse_id(&peeked) {
            Ok(parsed) => {
                ids.push(parsed);
                args.pop()?;
            }
            Err(_) => break,
        }
    }
    if ids.is_empty() {
        return Err(CommandError::Syntax);
    }

    let mut idle_override = None;
    let mut time_override = None;
    let mut retry_count = None;
    let mut force = false;
    let mut justid = false;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "IDLE") {
            idle_override = Some(args.i64()?);
        } else if Args::eq_ignore_case(&option, "TIME") {
            time_override = Some(args.i64()?);
        } else if Args::eq_ignore_case(&option, "RETRYCOUNT") {
            retry_count = Some(args.i64()?);
        } else if Args::eq_ignore_case(&option, "FORCE") {
            force = true;
        } else if Args::eq_ignore_case(&option, "JUSTID") {
            justid = true;
        } else if Args::eq_ignore_case(&option, "LASTID") {
            let _ = args.try_pop();
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Err(no_group_err(&key, &group));
    };
    let stream = value.as_stream_mut()?;

    let entry_fields: HashMap<StreamId, Vec<(Bytes, Bytes)>> =
        ids.iter().filter_map(|&claim_id| stream.get(claim_id).map(|fields| (claim_id, fields.clone()))).collect();

    let Some(group_mut) = stream.group_mut(&group) else {
        return Err(no_such_group_err(&key, &group));
    };

    let delivery_time = time_override
        .map(|ms| u64::try_from(ms).unwrap_or(now))
        .or_else(|| idle_override.map(|idle| now.saturating_sub(u64::try_from(idle).unwrap_or(0))))
        .unwrap_or(now);

    let mut claimed = Vec::new();
    for claim_id in ids {
        let Some(fields) = entry_fields.get(&claim_id) else {
            group_mut.pending.remove(&claim_id);
            continue;
        };
        let current = group_mut.pending.get(&claim_id).cloned();
        let eligible = match &current {
            Some(pending) => {
                let idle_for = now.saturating_sub(pending.delivery_time_ms);
                i64::try_from(idle_for).unwrap_or(i64::MAX) >= min_idle_ms
            }
            None => force,
        };
        if !eligible {
            continue;
        }
        let delivery_count = match retry_count {
            Some(n) => u64::try_from(n).unwrap_or(0),
            None => match &current {
                Some(pending) if justid => pending.delivery_count,
                Some(pending) => pending.delivery_count + 1,
                None => 1,
            },
        };
        group_mut.pending.insert(claim_id, PendingEntry { consumer: consumer.clone(), delivery_time_ms: delivery_time, delivery_count });
        claimed.push((claim_id, fields.clone()));
    }
    group_mut.consumers.entry(consumer.clone()).or_insert_with(|| Consumer { seen_time_ms: now, active_time_ms: now });

    engine.touch(&key);

    if justid {
        Ok(Reply::Array(claimed.into_iter().map(|(claim_id, _)| Reply::bulk(claim_id.to_string())).collect()))
    } else {
        Ok(Reply::Array(claimed.into_iter().map(|(claim_id, fields)| entry_reply(&Entry { id: claim_id, fields })).collect()))
    }
}

/// Claims every pending entry from `start` onward in one pass (no real
/// pagination, the "cursor always 0" pattern §9 uses for `SCAN`):
/// returns `0-0` as the next cursor since nothing is left to resume.
pub fn xautoclaim(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let group = args.pop()?;
    let consumer = args.pop()?;
    let min_idle_ms = args.i64()?;
    let start = parse_range_start(&args.pop()?)?;

    let mut count = 100_usize;
    let mut justid = false;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "COUNT") {
            count = args.usize()?;
        } else if Args::eq_ignore_case(&option, "JUSTID") {
            justid = true;
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Err(no_group_err(&key, &group));
    };
    let stream = value.as_stream_mut()?;

    let candidate_ids: Vec<StreamId> = {
        let Some(group_ref) = stream.group(&group) else {
            return Err(no_such_group_err(&key, &group));
        };
        group_ref
            .pending
            .range(start..)
            .filter(|(_, pending)| {
                let idle = now.saturating_sub(pending.delivery_time_ms);
                i64::try_from(idle).unwrap_or(i64::MAX) >= min_idle_ms
            })
            .take(count)
            .map(|(&claim_id, _)| claim_id)
            .collect()
    };

    let entry_fields: HashMap<StreamId, Vec<(Bytes, Bytes)>> =
        candidate_ids.iter().filter_map(|&claim_id| stream.get(claim_id).map(|fields| (claim_id, fields.clone()))).collect();

    let group_mut = stream.group_mut(&group).expect("checked above");
    let mut claimed = Vec::new();
    let mut deleted = Vec::new();
    for claim_id in candidate_ids {
        if let Some(fields) = entry_fields.get(&claim_id) {
            let delivery_count = group_mut.pending.get(&claim_id).map_or(1, |pending| pending.delivery_count + 1);
            group_mut.pending.insert(claim_id, PendingEntry { consumer: consumer.clone(), delivery_time_ms: now, delivery_count });
            claimed.push((claim_id, fields.clone()));
        } else {
            group_mut.pending.remove(&claim_id);
            deleted.push(claim_id);
        }
    }
    group_mut.consumers.entry(consumer.clone()).or_insert_with(|| Consumer { seen_time_ms: now, active_time_ms: now });

    engine.touch(&key);

    let entries_reply = if justid {
        Reply::Array(claimed.into_iter().map(|(claim_id, _)| Reply::bulk(claim_id.to_string())).collect())
    } else {
        Reply::Array(claimed.into_iter().map(|(claim_id, fields)| entry_reply(&Entry { id: claim_id, fields })).collect())
    };
    let deleted_reply = Reply::Array(deleted.into_iter().map(|claim_id| Reply::bulk(claim_id.to_string())).collect());

    Ok(Reply::Array(vec![Reply::bulk("0-0"), entries_reply, deleted_reply]))
}

pub fn xinfo(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    let key = args.pop()?;
    let now = engine.now_ms();
    if Args::eq_ignore_case(&sub, "STREAM") {
        let value = engine.db.get(&key, now).ok_or(EngineError::NoSuchKey)?;
        let stream = value.as_stream()?;
        let entries = stream.range(StreamId::MIN, StreamId::MAX);
        let first = entries.first().cloned();
        let last = entries.last().cloned();
        Ok(info_map(vec![
            ("length", Reply::from(stream.len())),
            ("radix-tree-keys", Reply::from(1_i64)),
            ("radix-tree-nodes", Reply::from(2_i64)),
            ("last-generated-id", Reply::bulk(stream.last_id.to_string())),
            ("max-deleted-entry-id", Reply::bulk(stream.max_deleted_id.to_string())),
            ("entries-added", Reply::from(i64::try_from(stream.entries_added).unwrap_or(i64::MAX))),
            ("recorded-first-entry-id", Reply::bulk(first.as_ref().map_or_else(|| StreamId::MIN.to_string(), |entry| entry.id.to_string()))),
            ("groups", Reply::from(stream.groups.len())),
            ("first-entry", first.as_ref().map_or(Reply::Nil, entry_reply)),
            ("last-entry", last.as_ref().map_or(Reply::Nil, entry_reply)),
        ]))
    } else if Args::eq_ignore_case(&sub, "GROUPS") {
        let value = engine.db.get(&key, now).ok_or(EngineError::NoSuchKey)?;
        let stream = value.as_stream()?;
        let groups = stream
            .groups
            .iter()
            .map(|(name, group)| {
                let lag = stream.entries_added.saturating_sub(group.entries_read);
                info_map(vec![
                    ("name", Reply::bulk(name.clone())),
                    ("consumers", Reply::from(group.consumers.len())),
                    ("pending", Reply::from(group.pending.len())),
                    ("last-delivered-id", Reply::bulk(group.last_delivered_id.to_string())),
                    ("entries-read", Reply::from(i64::try_from(group.entries_read).unwrap_or(i64::MAX))),
                    ("lag", Reply::from(i64::try_from(lag).unwrap_or(i64::MAX))),
                ])
            })
            .collect();
        Ok(Reply::Array(groups))
    } else if Args::eq_ignore_case(&sub, "CONSUMERS") {
        let group = args.pop()?;
        let value = engine.db.get(&key, now).ok_or(EngineError::NoSuchKey)?;
        let stream = value.as_stream()?;
        let group_ref = stream.group(&group).ok_or_else(|| no_such_group_err(&key, &group))?;
        let consumers = group_ref
            .consumers
            .iter()
            .map(|(name, consumer)| {
                let pending = group_ref.pending.values().filter(|pending| &pending.consumer == name).count();
                info_map(vec![
                    ("name", Reply::bulk(name.clone())),
                    ("pending", Reply::from(pending)),
                    ("idle", Reply::from(i64::try_from(now.saturating_sub(consumer.seen_time_ms)).unwrap_or(i64::MAX))),
                    ("inactive", Reply::from(i64::try_from(now.saturating_sub(consumer.active_time_ms)).unwrap_or(i64::MAX))),
                ])
            })
            .collect();
        Ok(Reply::Array(consumers))
    } else {
        Err(CommandError::UnknownSubcommand(String::from_utf8_lossy(&sub).into_owned(), "XINFO".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use tokio::sync::mpsc;

    fn args(items: &[&str]) -> Args {
        Args::new(items.iter().map(|item| Bytes::copy_from_slice(item.as_bytes())).collect())
    }

    fn connect(engine: &mut Engine) -> ConnectionId {
        let (tx, _rx) = mpsc::unbounded_channel();
        engine.connect(tx)
    }

    #[test]
    fn xadd_assigns_and_rejects_non_increasing_ids() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        let reply = xadd(&mut engine, id, args(&["s", "1-1", "f", "v"])).unwrap();
        assert_eq!(reply, Reply::bulk(Bytes::from_static(b"1-1")));
        let err = xadd(&mut engine, id, args(&["s", "1-1", "f", "v"])).unwrap_err();
        assert!(matches!(err, CommandError::Engine(EngineError::StreamIdTooSmall)));
    }

    #[test]
    fn xadd_nomkstream_skips_missing_key() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        let reply = xadd(&mut engine, id, args(&["s", "NOMKSTREAM", "*", "f", "v"])).unwrap();
        assert_eq!(reply, Reply::Nil);
    }

    #[test]
    fn xrange_is_inclusive_and_ordered() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        xadd(&mut engine, id, args(&["s", "1-1", "f", "a"])).unwrap();
        xadd(&mut engine, id, args(&["s", "2-1", "f", "b"])).unwrap();
        let reply = xrange(&mut engine, id, args(&["s", "-", "+"])).unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn xgroup_create_then_xreadgroup_delivers_and_acks() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        xadd(&mut engine, id, args(&["s", "1-1", "f", "v"])).unwrap();
        xgroup(&mut engine, id, args(&["CREATE", "s", "g", "0"])).unwrap();
        let reply = xreadgroup(&mut engine, id, args(&["GROUP", "g", "c1", "STREAMS", "s", ">"])).unwrap();
        match reply {
            Reply::Array(streams) => assert_eq!(streams.len(), 1),
            other => panic!("expected array, got {other:?}"),
        }
        let pending = xpending(&mut engine, id, args(&["s", "g"])).unwrap();
        match pending {
            Reply::Array(items) => assert_eq!(items[0], Reply::Integer(1)),
            other => panic!("expected array, got {other:?}"),
        }
        let acked = xack(&mut engine, id, args(&["s", "g", "1-1"])).unwrap();
        assert_eq!(acked, Reply::Integer(1));
    }

    #[test]
    fn xclaim_transfers_ownership_when_idle_exceeds_threshold() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        xadd(&mut engine, id, args(&["s", "1-1", "f", "v"])).unwrap();
        xgroup(&mut engine, id, args(&["CREATE", "s", "g", "0"])).unwrap();
        xreadgroup(&mut engine, id, args(&["GROUP", "g", "c1", "STREAMS", "s", ">"])).unwrap();
        let reply = xclaim(&mut engine, id, args(&["s", "g", "c2", "0", "1-1"])).unwrap();
        match reply {
            Reply::Array(items) => assert_eq!(items.len(), 1),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn xtrim_maxlen_drops_oldest() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        for ms in 1..=5 {
            xadd(&mut engine, id, args(&["s", &format!("{ms}-1"), "f", "v"])).unwrap();
        }
        let removed = xtrim(&mut engine, id, args(&["s", "MAXLEN", "2"])).unwrap();
        assert_eq!(removed, Reply::Integer(3));
        let len = xlen(&mut engine, id, args(&["s"])).unwrap();
        assert_eq!(len, Reply::Integer(2));
    }
}
