//! Sorted-set commands (spec §4.6): score-ordered unique members, with
//! rank/score range queries and randomized selection.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::keyspace::{Value, ZSet};
use crate::reply::Reply;
use bytes::Bytes;
use logos::Logos;
use ordered_float::NotNan;
use rand::seq::{IteratorRandom, SliceRandom};

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum ZaddOption {
    #[regex(b"(?i:nx)")]
    Nx,
    #[regex(b"(?i:xx)")]
    Xx,
    #[regex(b"(?i:gt)")]
    Gt,
    #[regex(b"(?i:lt)")]
    Lt,
    #[regex(b"(?i:ch)")]
    Ch,
    #[regex(b"(?i:incr)")]
    Incr,
}

fn lex_zadd(bytes: &[u8]) -> Option<ZaddOption> {
    ZaddOption::lexer(bytes).next().and_then(Result::ok)
}

pub fn zadd(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;

    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    let mut ch = false;
    let mut incr = false;
    loop {
        let Some(peeked) = args.peek().cloned() else {
            return Err(CommandError::Syntax);
        };
        match lex_zadd(&peeked) {
            Some(ZaddOption::Nx) => {
                nx = true;
                args.pop()?;
            }
            Some(ZaddOption::Xx) => {
                xx = true;
                args.pop()?;
            }
            Some(ZaddOption::Gt) => {
                gt = true;
                args.pop()?;
            }
            Some(ZaddOption::Lt) => {
                lt = true;
                args.pop()?;
            }
            Some(ZaddOption::Ch) => {
                ch = true;
                args.pop()?;
            }
            Some(ZaddOption::Incr) => {
                incr = true;
                args.pop()?;
            }
            None => break,
        }
    }
    if nx && (gt || lt) {
        return Err(CommandError::GtLtNx);
    }
    if nx && xx {
        return Err(CommandError::XxAndNx);
    }
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    if incr && args.len() != 2 {
        return Err(CommandError::Syntax);
    }

    let mut pairs = Vec::new();
    while !args.is_empty() {
        let score = crate::numeric::parse_score(&args.pop()?)?;
        let member = args.pop()?;
        pairs.push((member, score));
    }

    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::SortedSet(ZSet::default()));
    let zset = value.as_zset_mut()?;

    let mut added = 0_i64;
    let mut changed = 0_i64;
    let mut incr_result = None;
    for (member, score) in pairs {
        let existing = zset.score(&member);
        if xx && existing.is_none() {
            if incr {
                incr_result = Some(None);
            }
            continue;
        }
        if nx && existing.is_some() {
            if incr {
                incr_result = Some(None);
            }
            continue;
        }
        let new_score = if incr { existing.unwrap_or(0.0) + score } else { score };
        if let Some(current) = existing {
            if gt && new_score <= current {
                if incr {
                    incr_result = Some(None);
                }
                continue;
            }
            if lt && new_score >= current {
                if incr {
                    incr_result = Some(None);
                }
                continue;
            }
        }
        let new_score = NotNan::new(new_score).map_err(|_| crate::error::EngineError::NanOrInfinity)?;
        let previous = zset.insert(member, new_score);
        if previous.is_none() {
            added += 1;
            changed += 1;
        } else if previous != Some(new_score.into_inner()) {
            changed += 1;
        }
        if incr {
            incr_result = Some(Some(new_score.into_inner()));
        }
    }

    engine.touch(&key);

    if incr {
        return Ok(match incr_result.flatten() {
            Some(score) => Reply::bulk(crate::numeric::format_float(score)),
            None => Reply::Nil,
        });
    }
    Ok(Reply::from(if ch { changed } else { added }))
}

pub fn zrem(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let zset = value.as_zset_mut()?;
    let mut removed = 0_i64;
    for member in args.rest() {
        if zset.remove(&member) {
            removed += 1;
        }
    }
    engine.db.remove_if_empty(&key, |value| matches!(value, Value::SortedSet(zset) if zset.is_empty()));
    if removed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::from(removed))
}

pub fn zscore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let member = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => match value.as_zset()?.score(&member) {
            Some(score) => Ok(Reply::bulk(crate::numeric::format_float(score))),
            None => Ok(Reply::Nil),
        },
        None => Ok(Reply::Nil),
    }
}

pub fn zmscore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let zset = engine.db.get(&key, now).map(Value::as_zset).transpose()?;
    let items = args
        .rest()
        .into_iter()
        .map(|member| match zset.and_then(|zset| zset.score(&member)) {
            Some(score) => Reply::bulk(crate::numeric::format_float(score)),
            None => Reply::Nil,
        })
        .collect();
    Ok(Reply::Array(items))
}

pub fn zincrby(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let delta = crate::numeric::parse_score(&args.pop()?)?;
    let member = args.pop()?;
    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::SortedSet(ZSet::default()));
    let zset = value.as_zset_mut()?;
    let updated = zset.score(&member).unwrap_or(0.0) + delta;
    let updated = NotNan::new(updated).map_err(|_| crate::error::EngineError::NanOrInfinity)?;
    zset.insert(member, updated);
    engine.touch(&key);
    Ok(Reply::bulk(crate::numeric::format_float(updated.into_inner())))
}

pub fn zcard(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::from(value.as_zset()?.len())),
        None => Ok(Reply::from(0_i64)),
    }
}

fn parse_bound(bytes: &[u8]) -> Result<(f64, bool), CommandError> {
    if let Some(rest) = bytes.strip_prefix(b"(") {
        Ok((crate::numeric::parse_score(rest)?, true))
    } else {
        Ok((crate::numeric::parse_score(bytes)?, false))
    }
}

pub fn zcount(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let (min, min_exclusive) = parse_bound(&args.pop()?)?;
    let (max, max_exclusive) = parse_bound(&args.pop()?)?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => {
            let zset = value.as_zset()?;
            Ok(Reply::from(zset.range_by_score(min, min_exclusive, max, max_exclusive).len()))
        }
        None => Ok(Reply::from(0_i64)),
    }
}

fn members_reply(items: Vec<(&Bytes, f64)>, withscores: bool) -> Reply {
    if withscores {
        let mut out = Vec::with_capacity(items.len() * 2);
        for (member, score) in items {
            out.push(Reply::bulk(member.clone()));
            out.push(Reply::bulk(crate::numeric::format_float(score)));
        }
        Reply::Array(out)
    } else {
        Reply::Array(items.into_iter().map(|(member, _)| Reply::bulk(member.clone())).collect())
    }
}

fn rank_range(engine: &mut Engine, key: &[u8], start: i64, stop: i64, rev: bool) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let Some(value) = engine.db.get(key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let zset = value.as_zset()?;
    let Some(range) = crate::slice::slice(zset.len(), start, stop) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let all: Vec<(&Bytes, f64)> = if rev { zset.iter().rev().collect() } else { zset.iter().collect() };
    Ok(members_reply(all.into_iter().skip(range.start).take(range.len()).collect(), false))
}

pub fn zrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = args.pop()?;
    let stop = args.pop()?;

    let mut withscores = false;
    let mut rev = false;
    let mut byscore = false;
    let mut limit: Option<(i64, i64)> = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "WITHSCORES") {
            withscores = true;
        } else if Args::eq_ignore_case(&option, "REV") {
            rev = true;
        } else if Args::eq_ignore_case(&option, "BYSCORE") {
            byscore = true;
        } else if Args::eq_ignore_case(&option, "BYLEX") {
            return Err(CommandError::Syntax);
        } else if Args::eq_ignore_case(&option, "LIMIT") {
            let offset = args.i64()?;
            let count = args.i64()?;
            limit = Some((offset, count));
        } else {
            return Err(CommandError::Syntax);
        }
    }

    if byscore {
        let (mut min_bytes, mut max_bytes) = (start, stop);
        if rev {
            std::mem::swap(&mut min_bytes, &mut max_bytes);
        }
        let (min, min_exclusive) = parse_bound(&min_bytes)?;
        let (max, max_exclusive) = parse_bound(&max_bytes)?;
        let now = engine.now_ms();
        let Some(value) = engine.db.get(&key, now) else {
            return Ok(Reply::Array(Vec::new()));
        };
        let zset = value.as_zset()?;
        let mut items = zset.range_by_score(min, min_exclusive, max, max_exclusive);
        if rev {
            items.reverse();
        }
        if let Some((offset, count)) = limit {
            let offset = usize::try_from(offset.max(0)).unwrap_or(0);
            items = items.into_iter().skip(offset).collect();
            if count >= 0 {
                let count = usize::try_from(count).unwrap_or(0);
                items.truncate(count);
            }
        }
        return Ok(members_reply(items, withscores));
    }

    let start = crate::numeric::parse_i64(&start)?;
    let stop = crate::numeric::parse_i64(&stop)?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let zset = value.as_zset()?;
    let Some(range) = crate::slice::slice(zset.len(), start, stop) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let all: Vec<(&Bytes, f64)> = if rev { zset.iter().rev().collect() } else { zset.iter().collect() };
    Ok(members_reply(all.into_iter().skip(range.start).take(range.len()).collect(), withscores))
}

pub fn zrevrange(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let start = args.i64()?;
    let stop = args.i64()?;
    let withscores = matches!(args.try_pop(), Some(option) if Args::eq_ignore_case(&option, "WITHSCORES"));
    if withscores {
        let now = engine.now_ms();
        let Some(value) = engine.db.get(&key, now) else {
            return Ok(Reply::Array(Vec::new()));
        };
        let zset = value.as_zset()?;
        let Some(range) = crate::slice::slice(zset.len(), start, stop) else {
            return Ok(Reply::Array(Vec::new()));
        };
        let all: Vec<(&Bytes, f64)> = zset.iter().rev().collect();
        return Ok(members_reply(all.into_iter().skip(range.start).take(range.len()).collect(), true));
    }
    rank_range(engine, &key, start, stop, true)
}

fn score_range(engine: &mut Engine, key: &[u8], min: &[u8], max: &[u8], withscores: bool, limit: Option<(i64, i64)>, rev: bool) -> Result<Reply, CommandError> {
    let (min, min_exclusive) = parse_bound(min)?;
    let (max, max_exclusive) = parse_bound(max)?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let zset = value.as_zset()?;
    let mut items = zset.range_by_score(min, min_exclusive, max, max_exclusive);
    if rev {
        items.reverse();
    }
    if let Some((offset, count)) = limit {
        let offset = usize::try_from(offset.max(0)).unwrap_or(0);
        items = items.into_iter().skip(offset).collect();
        if count >= 0 {
            let count = usize::try_from(count).unwrap_or(0);
            items.truncate(count);
        }
    }
    Ok(members_reply(items, withscores))
}

pub fn zrangebyscore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let min = args.pop()?;
    let max = args.pop()?;
    let mut withscores = false;
    let mut limit = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "WITHSCORES") {
            withscores = true;
        } else if Args::eq_ignore_case(&option, "LIMIT") {
            limit = Some((args.i64()?, args.i64()?));
        } else {
            return Err(CommandError::Syntax);
        }
    }
    score_range(engine, &key, &min, &max, withscores, limit, false)
}

pub fn zrevrangebyscore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let max = args.pop()?;
    let min = args.pop()?;
    let mut withscores = false;
    let mut limit = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "WITHSCORES") {
            withscores = true;
        } else if Args::eq_ignore_case(&option, "LIMIT") {
            limit = Some((args.i64()?, args.i64()?));
        } else {
            return Err(CommandError::Syntax);
        }
    }
    score_range(engine, &key, &min, &max, withscores, limit, true)
}

pub fn zrank(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let member = args.pop()?;
    let withscore = matches!(args.try_pop(), Some(option) if Args::eq_ignore_case(&option, "WITHSCORE"));
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(if withscore { Reply::NilArray } else { Reply::Nil });
    };
    let zset = value.as_zset()?;
    match zset.rank(&member) {
        Some(rank) if withscore => {
            let score = zset.score(&member).unwrap_or(0.0);
            Ok(Reply::Array(vec![Reply::from(rank), Reply::bulk(crate::numeric::format_float(score))]))
        }
        Some(rank) => Ok(Reply::from(rank)),
        None => Ok(if withscore { Reply::NilArray } else { Reply::Nil }),
    }
}

pub fn zrevrank(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let member = args.pop()?;
    let withscore = matches!(args.try_pop(), Some(option) if Args::eq_ignore_case(&option, "WITHSCORE"));
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(if withscore { Reply::NilArray } else { Reply::Nil });
    };
    let zset = value.as_zset()?;
    match zset.rank(&member) {
        Some(rank) => {
            let rev_rank = zset.len() - 1 - rank;
            if withscore {
                let score = zset.score(&member).unwrap_or(0.0);
                Ok(Reply::Array(vec![Reply::from(rev_rank), Reply::bulk(crate::numeric::format_float(score))]))
            } else {
                Ok(Reply::from(rev_rank))
            }
        }
        None => Ok(if withscore { Reply::NilArray } else { Reply::Nil }),
    }
}

fn pop(engine: &mut Engine, key: Bytes, count: usize, max: bool) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let Some(value) = engine.db.get_mut(&key, now) else {
        return Ok(Reply::Array(Vec::new()));
    };
    let zset = value.as_zset_mut()?;
    let popped = if max { zset.pop_max(count) } else { zset.pop_min(count) };
    engine.db.remove_if_empty(&key, |value| matches!(value, Value::SortedSet(zset) if zset.is_empty()));
    if !popped.is_empty() {
        engine.touch(&key);
    }
    let mut out = Vec::with_capacity(popped.len() * 2);
    for (member, score) in popped {
        out.push(Reply::bulk(member));
        out.push(Reply::bulk(crate::numeric::format_float(score)));
    }
    Ok(Reply::Array(out))
}

pub fn zpopmin(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let count = args.try_pop().map(|bytes| crate::numeric::parse_i64(&bytes)).transpose()?.unwrap_or(1);
    let count = usize::try_from(count).map_err(|_| CommandError::NotAnInteger)?;
    pop(engine, key, count, false)
}

pub fn zpopmax(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let count = args.try_pop().map(|bytes| crate::numeric::parse_i64(&bytes)).transpose()?.unwrap_or(1);
    let count = usize::try_from(count).map_err(|_| CommandError::NotAnInteger)?;
    pop(engine, key, count, true)
}

pub fn bzpopmin(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let mut items = args.rest();
    let _timeout = items.pop();
    for key in items {
        let now = engine.now_ms();
        if let Some(value) = engine.db.get_mut(&key, now) {
            let zset = value.as_zset_mut()?;
            if !zset.is_empty() {
                let popped = zset.pop_min(1);
                engine.db.remove_if_empty(&key, |value| matches!(value, Value::SortedSet(zset) if zset.is_empty()));
                engine.touch(&key);
                let (member, score) = popped.into_iter().next().expect("checked non-empty");
                return Ok(Reply::Array(vec![
                    Reply::bulk(key),
                    Reply::bulk(member),
                    Reply::bulk(crate::numeric::format_float(score)),
                ]));
            }
        }
    }
    Ok(Reply::NilArray)
}

pub fn bzpopmax(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let mut items = args.rest();
    let _timeout = items.pop();
    for key in items {
        let now = engine.now_ms();
        if let Some(value) = engine.db.get_mut(&key, now) {
            let zset = value.as_zset_mut()?;
            if !zset.is_empty() {
                let popped = zset.pop_max(1);
                engine.db.remove_if_empty(&key, |value| matches!(value, Value::SortedSet(zset) if zset.is_empty()));
                engine.touch(&key);
                let (member, score) = popped.into_iter().next().expect("checked non-empty");
                return Ok(Reply::Array(vec![
                    Reply::bulk(key),
                    Reply::bulk(member),
                    Reply::bulk(crate::numeric::format_float(score)),
                ]));
            }
        }
    }
    Ok(Reply::NilArray)
}

pub fn zrandmember(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return if args.is_empty() { Ok(Reply::Nil) } else { Ok(Reply::Array(Vec::new())) };
    };
    let zset = value.as_zset()?;
    let members: Vec<&Bytes> = zset.members().collect();

    let Some(count) = args.try_pop() else {
        let mut rng = rand::thread_rng();
        return Ok(members.choose(&mut rng).map(|m| Reply::bulk((*m).clone())).unwrap_or(Reply::Nil));
    };
    let count = crate::numeric::parse_i64(&count).map_err(|_| CommandError::NotAnInteger)?;
    let withscores = matches!(args.try_pop(), Some(option) if Args::eq_ignore_case(&option, "WITHSCORES"));

    let mut rng = rand::thread_rng();
    let chosen: Vec<&Bytes> = if count >= 0 {
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;
        members.into_iter().choose_multiple(&mut rng, count)
    } else {
        let count = count.unsigned_abs();
        let mut out = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            if let Some(member) = members.choose(&mut rng) {
                out.push(*member);
            }
        }
        out
    };

    if withscores {
        let mut out = Vec::with_capacity(chosen.len() * 2);
        for member in chosen {
            out.push(Reply::bulk(member.clone()));
            out.push(Reply::bulk(crate::numeric::format_float(zset.score(member).unwrap_or(0.0))));
        }
        Ok(Reply::Array(out))
    } else {
        Ok(Reply::from(chosen.into_iter().cloned().collect::<Vec<_>>()))
    }
}

pub fn zscan(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
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
    let zset = value.as_zset()?;
    let mut items = Vec::new();
    for (member, score) in zset.iter() {
        if pattern.as_deref().is_some_and(|pattern| !crate::glob::matches(member, pattern)) {
            continue;
        }
        items.push(Reply::bulk(member.clone()));
        items.push(Reply::bulk(crate::numeric::format_float(score)));
    }
    Ok(Reply::Array(vec![Reply::bulk(Bytes::from_static(b"0")), Reply::Array(items)]))
}
