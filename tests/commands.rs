//! Black-box scenarios driven straight through [`keelson::Engine`] (no
//! TCP), styled after spec.md §8's end-to-end scenario table: one
//! connection issues a command sequence and the test asserts on the
//! replies it gets back.

use bytes::Bytes;
use keelson::{Engine, Reply};

fn connected(engine: &mut Engine) -> keelson::ConnectionId {
    let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
    engine.connect(sender)
}

fn cmd(engine: &mut Engine, id: keelson::ConnectionId, argv: &[&str]) -> Option<Reply> {
    let argv = argv.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect();
    engine.dispatch(id, argv)
}

fn bulk(text: &str) -> Reply {
    Reply::Bulk(Bytes::copy_from_slice(text.as_bytes()))
}

#[test]
fn set_get_round_trips_a_string() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    assert_eq!(cmd(&mut engine, id, &["SET", "k", "v"]), Some(Reply::ok()));
    assert_eq!(cmd(&mut engine, id, &["GET", "k"]), Some(bulk("v")));
}

#[test]
fn get_on_missing_key_is_nil() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    assert_eq!(cmd(&mut engine, id, &["GET", "missing"]), Some(Reply::Nil));
}

#[test]
fn incr_creates_and_increments_a_counter() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    assert_eq!(cmd(&mut engine, id, &["INCR", "n"]), Some(Reply::Integer(1)));
    assert_eq!(cmd(&mut engine, id, &["INCR", "n"]), Some(Reply::Integer(2)));
    assert_eq!(cmd(&mut engine, id, &["INCRBY", "n", "5"]), Some(Reply::Integer(7)));
}

#[test]
fn wrong_type_is_rejected_across_type_families() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SET", "k", "v"]);
    let reply = cmd(&mut engine, id, &["LPUSH", "k", "x"]).unwrap();
    assert!(matches!(reply, Reply::Error(ref message) if message.starts_with("WRONGTYPE")));
}

#[test]
fn list_push_pop_and_range() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["RPUSH", "l", "a", "b", "c"]);
    assert_eq!(
        cmd(&mut engine, id, &["LRANGE", "l", "0", "-1"]),
        Some(Reply::Array(vec![bulk("a"), bulk("b"), bulk("c")]))
    );
    assert_eq!(cmd(&mut engine, id, &["LPOP", "l"]), Some(bulk("a")));
    assert_eq!(cmd(&mut engine, id, &["LLEN", "l"]), Some(Reply::Integer(2)));
}

#[test]
fn hash_set_and_read_back_fields() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["HSET", "h", "f1", "v1", "f2", "v2"]);
    assert_eq!(cmd(&mut engine, id, &["HGET", "h", "f1"]), Some(bulk("v1")));
    assert_eq!(cmd(&mut engine, id, &["HLEN", "h"]), Some(Reply::Integer(2)));
}

#[test]
fn set_operations_cover_membership_and_cardinality() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SADD", "s", "a", "b", "a"]);
    assert_eq!(cmd(&mut engine, id, &["SCARD", "s"]), Some(Reply::Integer(2)));
    assert_eq!(cmd(&mut engine, id, &["SISMEMBER", "s", "a"]), Some(Reply::Integer(1)));
    assert_eq!(cmd(&mut engine, id, &["SISMEMBER", "s", "z"]), Some(Reply::Integer(0)));
}

#[test]
fn zset_ordering_and_rank() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["ZADD", "z", "1", "a", "2", "b", "3", "c"]);
    assert_eq!(cmd(&mut engine, id, &["ZRANK", "z", "b"]), Some(Reply::Integer(1)));
    assert_eq!(
        cmd(&mut engine, id, &["ZRANGE", "z", "0", "-1"]),
        Some(Reply::Array(vec![bulk("a"), bulk("b"), bulk("c")]))
    );
}

#[test]
fn expire_and_ttl_round_trip() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SET", "k", "v"]);
    assert_eq!(cmd(&mut engine, id, &["EXPIRE", "k", "100"]), Some(Reply::Integer(1)));
    let ttl = cmd(&mut engine, id, &["TTL", "k"]).unwrap();
    match ttl {
        Reply::Integer(seconds) => assert!(seconds > 0 && seconds <= 100),
        other => panic!("expected an integer TTL, got {other:?}"),
    }
    assert_eq!(cmd(&mut engine, id, &["PERSIST", "k"]), Some(Reply::Integer(1)));
    assert_eq!(cmd(&mut engine, id, &["TTL", "k"]), Some(Reply::Integer(-1)));
}

#[test]
fn expired_key_reads_as_missing() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SET", "k", "v"]);
    cmd(&mut engine, id, &["PEXPIRE", "k", "0"]);
    assert_eq!(cmd(&mut engine, id, &["GET", "k"]), Some(Reply::Nil));
    assert_eq!(cmd(&mut engine, id, &["EXISTS", "k"]), Some(Reply::Integer(0)));
}

#[test]
fn multi_exec_runs_queued_commands_in_order() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    assert_eq!(cmd(&mut engine, id, &["MULTI"]), Some(Reply::ok()));
    assert_eq!(cmd(&mut engine, id, &["SET", "k", "v"]), Some(Reply::Status("QUEUED")));
    assert_eq!(cmd(&mut engine, id, &["INCR", "counter"]), Some(Reply::Status("QUEUED")));
    let reply = cmd(&mut engine, id, &["EXEC"]).unwrap();
    assert_eq!(reply, Reply::Array(vec![Reply::ok(), Reply::Integer(1)]));
    assert_eq!(cmd(&mut engine, id, &["GET", "k"]), Some(bulk("v")));
}

#[test]
fn discard_drops_the_queue_without_running_it() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["MULTI"]);
    cmd(&mut engine, id, &["SET", "k", "v"]);
    assert_eq!(cmd(&mut engine, id, &["DISCARD"]), Some(Reply::ok()));
    assert_eq!(cmd(&mut engine, id, &["GET", "k"]), Some(Reply::Nil));
}

#[test]
fn watch_aborts_exec_when_the_key_changes_first() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    let other = connected(&mut engine);

    cmd(&mut engine, id, &["SET", "k", "v1"]);
    cmd(&mut engine, id, &["WATCH", "k"]);
    cmd(&mut engine, other, &["SET", "k", "v2"]);
    cmd(&mut engine, id, &["MULTI"]);
    cmd(&mut engine, id, &["GET", "k"]);
    assert_eq!(cmd(&mut engine, id, &["EXEC"]), Some(Reply::NilArray));
}

#[test]
fn publish_counts_only_active_subscribers() {
    let mut engine = Engine::new();
    let publisher = connected(&mut engine);
    assert_eq!(cmd(&mut engine, publisher, &["PUBLISH", "ch", "hi"]), Some(Reply::Integer(0)));

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let subscriber = engine.connect(sender);
    cmd(&mut engine, subscriber, &["SUBSCRIBE", "ch"]);
    // The SUBSCRIBE confirmation frame is pushed directly to the
    // subscriber's sender, not returned as dispatch's reply.
    assert!(receiver.try_recv().is_ok());

    assert_eq!(cmd(&mut engine, publisher, &["PUBLISH", "ch", "hi"]), Some(Reply::Integer(1)));
    let pushed = receiver.try_recv().expect("subscriber should have received the message");
    assert_eq!(
        pushed,
        Reply::Array(vec![Reply::from("message"), bulk("ch"), bulk("hi")])
    );
}

#[test]
fn disconnect_clears_subscriptions_and_watches() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SUBSCRIBE", "ch"]);
    cmd(&mut engine, id, &["WATCH", "k"]);
    engine.disconnect(id);

    let publisher = connected(&mut engine);
    assert_eq!(cmd(&mut engine, publisher, &["PUBLISH", "ch", "hi"]), Some(Reply::Integer(0)));
}

#[test]
fn dbsize_and_flushall_reflect_the_keyspace() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    cmd(&mut engine, id, &["SET", "a", "1"]);
    cmd(&mut engine, id, &["SET", "b", "2"]);
    assert_eq!(cmd(&mut engine, id, &["DBSIZE"]), Some(Reply::Integer(2)));
    assert_eq!(cmd(&mut engine, id, &["FLUSHALL"]), Some(Reply::ok()));
    assert_eq!(cmd(&mut engine, id, &["DBSIZE"]), Some(Reply::Integer(0)));
}

#[test]
fn unknown_command_reports_an_error() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    let reply = cmd(&mut engine, id, &["NOTACOMMAND", "x"]).unwrap();
    assert!(matches!(reply, Reply::Error(_)));
}

#[test]
fn stream_xadd_and_xrange_round_trip_entries() {
    let mut engine = Engine::new();
    let id = connected(&mut engine);
    assert_eq!(
        cmd(&mut engine, id, &["XADD", "events", "1-1", "field", "value"]),
        Some(bulk("1-1"))
    );
    cmd(&mut engine, id, &["XADD", "events", "2-1", "field", "value2"]);
    assert_eq!(cmd(&mut engine, id, &["XLEN", "events"]), Some(Reply::Integer(2)));
}
