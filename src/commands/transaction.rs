//! Transaction commands (spec §4.9): `MULTI` opens a queuing window,
//! `EXEC`/`DISCARD` close it, and `WATCH`/`UNWATCH` arm and disarm the
//! optimistic-concurrency check `EXEC` consults. All five are
//! `queueable: false` in the dispatch table, so they always run
//! immediately even while a transaction is open.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::reply::Reply;

pub fn multi(engine: &mut Engine, id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    let Some(connection) = engine.connections.get_mut(&id) else {
        return Ok(Reply::ok());
    };
    if connection.transaction.active {
        return Err(CommandError::MultiNested);
    }
    connection.transaction.active = true;
    Ok(Reply::ok())
}

pub fn discard(engine: &mut Engine, id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    let Some(connection) = engine.connections.get_mut(&id) else {
        return Ok(Reply::ok());
    };
    if !connection.transaction.active {
        return Err(CommandError::DiscardWithoutMulti);
    }
    connection.transaction.reset();
    engine.watching.disconnect(id);
    Ok(Reply::ok())
}

pub fn watch(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let active = engine.connections.get(&id).is_some_and(|c| c.transaction.active);
    if active {
        return Err(CommandError::WatchInMulti);
    }
    for key in args.rest() {
        engine.watching.add(key.clone(), id);
        if let Some(connection) = engine.connections.get_mut(&id) {
            connection.transaction.watched_keys.insert(key);
        }
    }
    Ok(Reply::ok())
}

pub fn unwatch(engine: &mut Engine, id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    engine.watching.disconnect(id);
    if let Some(connection) = engine.connections.get_mut(&id) {
        connection.transaction.watched_keys.clear();
    }
    Ok(Reply::ok())
}

/// Drains the queue and re-dispatches each frame with the transaction
/// already closed, so nothing re-enters the queue. A per-command error
/// becomes an array element rather than aborting the batch (spec §4.9).
pub fn exec(engine: &mut Engine, id: ConnectionId, _args: Args) -> Result<Reply, CommandError> {
    let Some(connection) = engine.connections.get_mut(&id) else {
        return Ok(Reply::NilArray);
    };
    if !connection.transaction.active {
        return Err(CommandError::ExecWithoutMulti);
    }
    let aborted = connection.transaction.aborted;
    let queue = std::mem::take(&mut connection.transaction.queue);
    connection.transaction.reset();

    if aborted {
        engine.watching.disconnect(id);
        return Err(CommandError::ExecAbort);
    }

    let dirty = engine.watching.is_dirty(id);
    engine.watching.disconnect(id);
    if dirty {
        return Ok(Reply::NilArray);
    }

    let mut replies = Vec::with_capacity(queue.len());
    for frame in queue {
        replies.push(super::dispatch(engine, id, frame).unwrap_or(Reply::Status("OK")));
    }
    Ok(Reply::Array(replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::Reply;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn connect(engine: &mut Engine) -> ConnectionId {
        let (tx, _rx) = mpsc::unbounded_channel();
        engine.connect(tx)
    }

    #[test]
    fn multi_then_multi_aborts_nested() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        multi(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        let err = multi(&mut engine, id, Args::new(Vec::new().into())).unwrap_err();
        assert!(matches!(err, CommandError::MultiNested));
    }

    #[test]
    fn exec_without_multi_errors() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        let err = exec(&mut engine, id, Args::new(Vec::new().into())).unwrap_err();
        assert!(matches!(err, CommandError::ExecWithoutMulti));
    }

    #[test]
    fn watch_inside_multi_errors() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        multi(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        let err = watch(&mut engine, id, Args::new(vec![Bytes::from_static(b"k")].into())).unwrap_err();
        assert!(matches!(err, CommandError::WatchInMulti));
    }

    #[test]
    fn exec_runs_queued_commands_in_order() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        multi(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        engine.connections.get_mut(&id).unwrap().transaction.queue.push(vec![
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
        ]);
        engine.connections.get_mut(&id).unwrap().transaction.queue.push(vec![
            Bytes::from_static(b"GET"),
            Bytes::from_static(b"k"),
        ]);
        let reply = exec(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[1], Reply::Bulk(_)));
            }
            other => panic!("expected array, got {other:?}"),
        }
        assert!(!engine.connections.get(&id).unwrap().transaction.active);
    }

    #[test]
    fn exec_aborts_when_queuing_saw_a_bad_command() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        multi(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        engine.connections.get_mut(&id).unwrap().transaction.aborted = true;
        let err = exec(&mut engine, id, Args::new(Vec::new().into())).unwrap_err();
        assert!(matches!(err, CommandError::ExecAbort));
    }

    #[test]
    fn exec_returns_nil_array_when_watched_key_touched() {
        let mut engine = Engine::new();
        let id = connect(&mut engine);
        watch(&mut engine, id, Args::new(vec![Bytes::from_static(b"k")].into())).unwrap();
        engine.touch(b"k");
        multi(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        let reply = exec(&mut engine, id, Args::new(Vec::new().into())).unwrap();
        assert!(matches!(reply, Reply::NilArray));
    }
}
