//! Byte-level RESP2 encoding checks (spec §6), driven against the
//! public `Reply` type only — no TCP involved.

use bytes::{Bytes, BytesMut};
use keelson::Reply;

fn encode(reply: &Reply) -> Vec<u8> {
    let mut buf = BytesMut::new();
    reply.encode(&mut buf);
    buf.to_vec()
}

#[test]
fn simple_status_is_a_plus_line() {
    assert_eq!(encode(&Reply::ok()), b"+OK\r\n");
}

#[test]
fn error_is_a_minus_line() {
    assert_eq!(encode(&Reply::Error("ERR wrong number of arguments".into())), b"-ERR wrong number of arguments\r\n");
}

#[test]
fn negative_integer_round_trips() {
    assert_eq!(encode(&Reply::Integer(-42)), b":-42\r\n");
}

#[test]
fn bulk_string_carries_its_byte_length_not_char_count() {
    let reply = Reply::bulk(Bytes::from_static("héllo".as_bytes()));
    let encoded = encode(&reply);
    assert_eq!(encoded, b"$6\r\nh\xc3\xa9llo\r\n".to_vec());
}

#[test]
fn nil_bulk_is_dollar_minus_one() {
    assert_eq!(encode(&Reply::Nil), b"$-1\r\n");
}

#[test]
fn nil_array_is_star_minus_one() {
    assert_eq!(encode(&Reply::NilArray), b"*-1\r\n");
}

#[test]
fn array_of_mixed_frames_nests_correctly() {
    let reply = Reply::Array(vec![
        Reply::Integer(1),
        Reply::bulk(Bytes::from_static(b"two")),
        Reply::Nil,
        Reply::Array(vec![Reply::ok()]),
    ]);
    assert_eq!(encode(&reply), b"*4\r\n:1\r\n$3\r\ntwo\r\n$-1\r\n*1\r\n+OK\r\n".to_vec());
}

#[test]
fn empty_array_has_zero_count() {
    assert_eq!(encode(&Reply::Array(Vec::new())), b"*0\r\n");
}
