//! Generic key commands (spec §4.1): existence, deletion, renaming,
//! enumeration, and the `DUMP`/`RESTORE`/`OBJECT`/`CONFIG` family.

use super::Args;
use crate::config::ConfigKey;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::{CommandError, EngineError};
use crate::keyspace;
use crate::reply::Reply;
use bytes::Bytes;

pub fn ping(_engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    match args.try_pop() {
        Some(message) => Ok(Reply::bulk(message)),
        None => Ok(Reply::Status("PONG")),
    }
}

pub fn echo(_engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    Ok(Reply::bulk(args.pop()?))
}

pub fn select(_engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let _index = args.i64()?;
    Ok(Reply::ok())
}

pub fn dbsize(engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Ok(Reply::from(engine.db.len()))
}

pub fn flushdb(engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    engine.db.clear();
    Ok(Reply::ok())
}

/// A single keyspace, so there is never another database to move a key
/// into; always reports failure, matching a real server asked to move
/// within its own database.
pub fn move_(_engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let _key = args.pop()?;
    let _db = args.i64()?;
    Ok(Reply::from(0_i64))
}

pub fn command(_engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Ok(Reply::Array(Vec::new()))
}

pub fn config(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    if Args::eq_ignore_case(&sub, "GET") {
        let pattern = args.pop()?;
        let mut items = Vec::new();
        for key in ConfigKey::ALL {
            if crate::glob::matches_nocase(key.name().as_bytes(), &pattern) {
                items.push(Reply::bulk(Bytes::from_static(key.name().as_bytes())));
                items.push(Reply::bulk(Bytes::from(engine.config.get(key).into_bytes())));
            }
        }
        Ok(Reply::Array(items))
    } else if Args::eq_ignore_case(&sub, "SET") {
        let name = args.pop()?;
        let value = args.pop()?;
        let Some(key) = ConfigKey::from_name(&name) else {
            return Err(CommandError::Syntax);
        };
        let parsed = crate::numeric::parse_i64(&value).map_err(|_| CommandError::NotAnInteger)?;
        let parsed = usize::try_from(parsed).map_err(|_| CommandError::NotAnInteger)?;
        engine.config.set(key, parsed);
        Ok(Reply::ok())
    } else {
        Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).into_owned(),
            "CONFIG".to_owned(),
        ))
    }
}

pub fn client(_engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    if Args::eq_ignore_case(&sub, "ID") {
        Ok(Reply::from(id.0 as i64))
    } else if Args::eq_ignore_case(&sub, "GETNAME") {
        Ok(Reply::bulk(Bytes::new()))
    } else if Args::eq_ignore_case(&sub, "SETNAME") {
        let _name = args.pop()?;
        Ok(Reply::ok())
    } else if Args::eq_ignore_case(&sub, "LIST") || Args::eq_ignore_case(&sub, "INFO") {
        Ok(Reply::bulk(Bytes::new()))
    } else {
        Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).into_owned(),
            "CLIENT".to_owned(),
        ))
    }
}

pub fn auth(_engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Ok(Reply::ok())
}

pub fn hello(_engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Ok(Reply::Array(vec![
        Reply::bulk(Bytes::from_static(b"server")),
        Reply::bulk(Bytes::from_static(b"keelson")),
        Reply::bulk(Bytes::from_static(b"version")),
        Reply::bulk(Bytes::from_static(crate::VERSION.as_bytes())),
        Reply::bulk(Bytes::from_static(b"proto")),
        Reply::from(2_i64),
        Reply::bulk(Bytes::from_static(b"mode")),
        Reply::bulk(Bytes::from_static(b"standalone")),
        Reply::bulk(Bytes::from_static(b"role")),
        Reply::bulk(Bytes::from_static(b"master")),
    ]))
}

pub fn acl(_engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Err(CommandError::AclUnsupported)
}

pub fn noscript(_engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    Err(CommandError::NoScript)
}

pub fn type_(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::Status(value.type_name())),
        None => Ok(Reply::Status("none")),
    }
}

pub fn exists(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let mut count = 0_i64;
    for key in args.rest() {
        if engine.db.exists(&key, now) {
            count += 1;
        }
    }
    Ok(Reply::from(count))
}

pub fn del(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    let mut count = 0_i64;
    for key in args.rest() {
        if engine.db.remove(&key, now).is_some() {
            engine.touch(&key);
            count += 1;
        }
    }
    Ok(Reply::from(count))
}

pub fn keys(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let pattern = args.pop()?;
    let now = engine.now_ms();
    let matched = engine.db.keys_matching(&pattern, now);
    Ok(Reply::from(matched.into_iter().collect::<Vec<_>>()))
}

pub fn rename(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    let now = engine.now_ms();
    if !engine.db.rename(&source, dest.clone(), now) {
        return Err(EngineError::NoSuchKey.into());
    }
    engine.touch(&source);
    engine.touch(&dest);
    Ok(Reply::ok())
}

pub fn renamenx(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    let now = engine.now_ms();
    if !engine.db.contains_live(&source, now) {
        return Err(EngineError::NoSuchKey.into());
    }
    let moved = engine.db.rename_nx(&source, dest.clone(), now);
    if moved {
        engine.touch(&source);
        engine.touch(&dest);
    }
    Ok(Reply::from(moved))
}

pub fn randomkey(engine: &mut Engine, _id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    let now = engine.now_ms();
    Ok(Reply::from(engine.db.random_key(now)))
}

pub fn copy(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let source = args.pop()?;
    let dest = args.pop()?;
    let mut replace = false;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "REPLACE") {
            replace = true;
        } else if Args::eq_ignore_case(&option, "DB") {
            let _ = args.i64()?;
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&source, now).cloned() else {
        return Ok(Reply::from(0_i64));
    };
    if !replace && engine.db.contains_live(&dest, now) {
        return Ok(Reply::from(0_i64));
    }
    let expires_at = engine.db.expires_at(&source, now);
    engine.db.set_with_expiry(dest.clone(), value, expires_at);
    engine.touch(&dest);
    Ok(Reply::from(1_i64))
}

pub fn object(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    if Args::eq_ignore_case(&sub, "HELP") {
        return Ok(Reply::bulk(Bytes::from_static(b"OBJECT ENCODING|REFCOUNT <key>")));
    }
    let key = args.pop()?;
    let now = engine.now_ms();
    if Args::eq_ignore_case(&sub, "ENCODING") {
        let value = engine.db.get(&key, now).ok_or(EngineError::NoSuchKey)?;
        let encoding = value.encoding(&engine.config);
        Ok(Reply::bulk(Bytes::from_static(encoding.as_bytes())))
    } else if Args::eq_ignore_case(&sub, "REFCOUNT") {
        engine.db.get(&key, now).ok_or(EngineError::NoSuchKey)?;
        Ok(Reply::from(1_i64))
    } else {
        Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).into_owned(),
            "OBJECT".to_owned(),
        ))
    }
}

/// A cursor-free `SCAN`: the whole keyspace fits comfortably in memory,
/// so one call walks it all and always returns cursor `0` (spec §9's
/// open question on incremental iteration).
pub fn scan(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let _cursor = args.pop()?;
    let mut pattern: Option<Bytes> = None;
    let mut type_filter: Option<Bytes> = None;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "MATCH") {
            pattern = Some(args.pop()?);
        } else if Args::eq_ignore_case(&option, "COUNT") {
            let _ = args.i64()?;
        } else if Args::eq_ignore_case(&option, "TYPE") {
            type_filter = Some(args.pop()?);
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let now = engine.now_ms();
    let keys = match &pattern {
        Some(pattern) => engine.db.keys_matching(pattern, now),
        None => engine.db.keys(now),
    };
    let matched: Vec<Bytes> = keys
        .into_iter()
        .filter(|key| match &type_filter {
            Some(expected) => engine
                .db
                .get(key, now)
                .is_some_and(|value| value.type_name().as_bytes().eq_ignore_ascii_case(expected)),
            None => true,
        })
        .collect();
    Ok(Reply::Array(vec![
        Reply::bulk(Bytes::from_static(b"0")),
        Reply::from(matched),
    ]))
}

pub fn dump(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    match engine.db.get(&key, now) {
        Some(value) => Ok(Reply::bulk(Bytes::from(keyspace::dump(value)))),
        None => Ok(Reply::Nil),
    }
}

pub fn restore(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let ttl_ms = args.i64()?;
    if ttl_ms < 0 {
        return Err(CommandError::InvalidTtl);
    }
    let payload = args.pop()?;
    let mut replace = false;
    let mut absttl = false;
    while let Some(option) = args.try_pop() {
        if Args::eq_ignore_case(&option, "REPLACE") {
            replace = true;
        } else if Args::eq_ignore_case(&option, "ABSTTL") {
            absttl = true;
        } else if Args::eq_ignore_case(&option, "IDLETIME") || Args::eq_ignore_case(&option, "FREQ") {
            let _ = args.try_pop();
        } else {
            return Err(CommandError::Syntax);
        }
    }
    let now = engine.now_ms();
    if !replace && engine.db.contains_live(&key, now) {
        return Err(EngineError::BusyKey.into());
    }
    let value = keyspace::restore(&payload)?;
    let expires_at = if ttl_ms == 0 {
        None
    } else if absttl {
        Some(ttl_ms as u64)
    } else {
        Some(now + ttl_ms as u64)
    };
    engine.db.set_with_expiry(key.clone(), value, expires_at);
    engine.touch(&key);
    Ok(Reply::ok())
}
