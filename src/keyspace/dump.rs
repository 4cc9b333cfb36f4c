//! `DUMP`/`RESTORE` payload format (spec §6): one type-tag byte, the
//! value body in a crate-internal serialization, a two-byte version, and
//! an eight-byte CRC64 footer. Cross-implementation compatibility is
//! explicitly not required (spec §6); only same-process round-trip is.

use super::stream::{Group, PendingEntry, Stream, StreamId};
use super::value::Value;
use super::zset::ZSet;
use crate::crc64;
use crate::error::EngineError;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use ordered_float::NotNan;
use std::collections::VecDeque;

const VERSION: u16 = 1;

const TAG_STRING: u8 = 0;
const TAG_LIST: u8 = 1;
const TAG_SET: u8 = 2;
const TAG_HASH: u8 = 3;
const TAG_ZSET: u8 = 4;
const TAG_STREAM: u8 = 5;

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn take_bytes(input: &mut &[u8]) -> Result<Bytes, EngineError> {
    let (len_bytes, rest) = input.split_at_checked(4).ok_or(EngineError::BadDumpPayload)?;
    let len = u32::from_le_bytes(len_bytes.try_into().expect("checked length")) as usize;
    let (body, rest) = rest.split_at_checked(len).ok_or(EngineError::BadDumpPayload)?;
    *input = rest;
    Ok(Bytes::copy_from_slice(body))
}

fn take_u32(input: &mut &[u8]) -> Result<u32, EngineError> {
    let (bytes, rest) = input.split_at_checked(4).ok_or(EngineError::BadDumpPayload)?;
    *input = rest;
    Ok(u32::from_le_bytes(bytes.try_into().expect("checked length")))
}

fn take_u64(input: &mut &[u8]) -> Result<u64, EngineError> {
    let (bytes, rest) = input.split_at_checked(8).ok_or(EngineError::BadDumpPayload)?;
    *input = rest;
    Ok(u64::from_le_bytes(bytes.try_into().expect("checked length")))
}

fn take_f64(input: &mut &[u8]) -> Result<f64, EngineError> {
    Ok(f64::from_bits(take_u64(input)?))
}

/// Serializes `value` into a `DUMP` payload: tag, body, version, CRC64.
pub fn dump(value: &Value) -> Vec<u8> {
    let mut body = Vec::new();
    let tag = match value {
        Value::String(bytes) => {
            put_bytes(&mut body, bytes);
            TAG_STRING
        }
        Value::List(list) => {
            #[allow(clippy::cast_possible_truncation)]
            body.extend_from_slice(&(list.len() as u32).to_le_bytes());
            for item in list {
                put_bytes(&mut body, item);
            }
            TAG_LIST
        }
        Value::Set(set) => {
            #[allow(clippy::cast_possible_truncation)]
            body.extend_from_slice(&(set.len() as u32).to_le_bytes());
            for member in set {
                put_bytes(&mut body, member);
            }
            TAG_SET
        }
        Value::Hash(hash) => {
            #[allow(clippy::cast_possible_truncation)]
            body.extend_from_slice(&(hash.len() as u32).to_le_bytes());
            for (field, value) in hash {
                put_bytes(&mut body, field);
                put_bytes(&mut body, value);
            }
            TAG_HASH
        }
        Value::SortedSet(zset) => {
            #[allow(clippy::cast_possible_truncation)]
            body.extend_from_slice(&(zset.len() as u32).to_le_bytes());
            for (member, score) in zset.iter() {
                put_bytes(&mut body, member);
                body.extend_from_slice(&score.to_bits().to_le_bytes());
            }
            TAG_ZSET
        }
        Value::Stream(stream) => {
            dump_stream(&mut body, stream);
            TAG_STREAM
        }
    };

    let mut payload = Vec::with_capacity(1 + body.len() + 2 + 8);
    payload.push(tag);
    payload.extend_from_slice(&body);
    payload.extend_from_slice(&VERSION.to_le_bytes());
    let crc = crc64::checksum(0, &payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

fn dump_stream(body: &mut Vec<u8>, stream: &Stream) {
    let entries: Vec<_> = stream.range(StreamId::MIN, StreamId::MAX);
    #[allow(clippy::cast_possible_truncation)]
    body.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in &entries {
        body.extend_from_slice(&entry.id.ms.to_le_bytes());
        body.extend_from_slice(&entry.id.seq.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        body.extend_from_slice(&(entry.fields.len() as u32).to_le_bytes());
        for (field, value) in &entry.fields {
            put_bytes(body, field);
            put_bytes(body, value);
        }
    }
    body.extend_from_slice(&stream.last_id.ms.to_le_bytes());
    body.extend_from_slice(&stream.last_id.seq.to_le_bytes());
    body.extend_from_slice(&stream.max_deleted_id.ms.to_le_bytes());
    body.extend_from_slice(&stream.max_deleted_id.seq.to_le_bytes());
    body.extend_from_slice(&stream.entries_added.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)]
    body.extend_from_slice(&(stream.groups.len() as u32).to_le_bytes());
    for (name, group) in &stream.groups {
        put_bytes(body, name);
        body.extend_from_slice(&group.last_delivered_id.ms.to_le_bytes());
        body.extend_from_slice(&group.last_delivered_id.seq.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        body.extend_from_slice(&(group.pending.len() as u32).to_le_bytes());
        for (id, pending) in &group.pending {
            body.extend_from_slice(&id.ms.to_le_bytes());
            body.extend_from_slice(&id.seq.to_le_bytes());
            put_bytes(body, &pending.consumer);
            body.extend_from_slice(&pending.delivery_time_ms.to_le_bytes());
            body.extend_from_slice(&pending.delivery_count.to_le_bytes());
        }
    }
}

/// Deserializes a `DUMP` payload, validating the CRC and version
/// strictly (spec §6).
pub fn restore(payload: &[u8]) -> Result<Value, EngineError> {
    if payload.len() < 1 + 2 + 8 {
        return Err(EngineError::BadDumpPayload);
    }
    let (content, crc_bytes) = payload.split_at(payload.len() - 8);
    let expected = u64::from_le_bytes(crc_bytes.try_into().expect("checked length"));
    if crc64::checksum(0, content) != expected {
        return Err(EngineError::BadDumpPayload);
    }
    let (content, version_bytes) = content.split_at(content.len() - 2);
    let version = u16::from_le_bytes(version_bytes.try_into().expect("checked length"));
    if version != VERSION {
        return Err(EngineError::BadDumpPayload);
    }
    let (&tag, mut body) = content.split_first().ok_or(EngineError::BadDumpPayload)?;

    match tag {
        TAG_STRING => {
            let bytes = take_bytes(&mut body)?;
            Ok(Value::String(bytes.to_vec()))
        }
        TAG_LIST => {
            let count = take_u32(&mut body)?;
            let mut list = VecDeque::with_capacity(count as usize);
            for _ in 0..count {
                list.push_back(take_bytes(&mut body)?);
            }
            Ok(Value::List(list))
        }
        TAG_SET => {
            let count = take_u32(&mut body)?;
            let mut set = HashSet::with_capacity(count as usize);
            for _ in 0..count {
                set.insert(take_bytes(&mut body)?);
            }
            Ok(Value::Set(set))
        }
        TAG_HASH => {
            let count = take_u32(&mut body)?;
            let mut hash = HashMap::with_capacity(count as usize);
            for _ in 0..count {
                let field = take_bytes(&mut body)?;
                let value = take_bytes(&mut body)?;
                hash.insert(field, value);
            }
            Ok(Value::Hash(hash))
        }
        TAG_ZSET => {
            let count = take_u32(&mut body)?;
            let mut zset = ZSet::default();
            for _ in 0..count {
                let member = take_bytes(&mut body)?;
                let score = take_f64(&mut body)?;
                let score = NotNan::new(score).map_err(|_| EngineError::BadDumpPayload)?;
                zset.insert(member, score);
            }
            Ok(Value::SortedSet(zset))
        }
        TAG_STREAM => restore_stream(&mut body),
        _ => Err(EngineError::BadDumpPayload),
    }
}

fn take_stream_id(input: &mut &[u8]) -> Result<StreamId, EngineError> {
    Ok(StreamId::new(take_u64(input)?, take_u64(input)?))
}

fn restore_stream(body: &mut &[u8]) -> Result<Value, EngineError> {
    let mut stream = Stream::default();
    let entry_count = take_u32(body)?;
    for _ in 0..entry_count {
        let id = take_stream_id(body)?;
        let field_count = take_u32(body)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field = take_bytes(body)?;
            let value = take_bytes(body)?;
            fields.push((field, value));
        }
        stream
            .append(id, fields)
            .map_err(|()| EngineError::BadDumpPayload)?;
    }
    stream.last_id = take_stream_id(body)?;
    stream.max_deleted_id = take_stream_id(body)?;
    stream.entries_added = take_u64(body)?;
    let group_count = take_u32(body)?;
    for _ in 0..group_count {
        let name = take_bytes(body)?;
        let last_delivered_id = take_stream_id(body)?;
        stream.create_group(name.clone(), last_delivered_id);
        let pending_count = take_u32(body)?;
        let group = stream.group_mut(&name).expect("just created");
        for _ in 0..pending_count {
            let id = take_stream_id(body)?;
            let consumer = take_bytes(body)?;
            let delivery_time_ms = take_u64(body)?;
            let delivery_count = take_u64(body)?;
            group.pending.insert(
                id,
                PendingEntry { consumer, delivery_time_ms, delivery_count },
            );
        }
    }
    Ok(Value::Stream(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips() {
        let value = Value::String(b"hello".to_vec());
        let payload = dump(&value);
        let restored = restore(&payload).unwrap();
        match restored {
            Value::String(bytes) => assert_eq!(bytes, b"hello"),
            _ => panic!("wrong type"),
        }
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let value = Value::String(b"hello".to_vec());
        let mut payload = dump(&value);
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        assert!(matches!(restore(&payload), Err(EngineError::BadDumpPayload)));
    }

    #[test]
    fn zset_round_trips() {
        let mut zset = ZSet::default();
        zset.insert(Bytes::from_static(b"a"), NotNan::new(1.5).unwrap());
        let payload = dump(&Value::SortedSet(zset));
        match restore(&payload).unwrap() {
            Value::SortedSet(zset) => assert_eq!(zset.score(b"a"), Some(1.5)),
            _ => panic!("wrong type"),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        assert!(matches!(restore(&[0, 1]), Err(EngineError::BadDumpPayload)));
    }
}
