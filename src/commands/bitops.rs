//! Bit-level string commands (spec §4.7): single-bit get/set, population
//! counts, bitwise combination across keys, bit search, and packed
//! integer fields layered over a string's raw bytes.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::{CommandError, EngineError};
use crate::keyspace::Value;
use crate::reply::Reply;
use logos::Logos;
use std::cmp::max;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum Unit {
    #[regex(b"(?i:bit)")]
    Bit,
    #[regex(b"(?i:byte)")]
    Byte,
}

fn lex_unit(bytes: &[u8]) -> Option<Unit> {
    Unit::lexer(bytes).next().and_then(Result::ok)
}

pub fn setbit(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let offset = args.i64()?;
    let offset = usize::try_from(offset).map_err(|_| EngineError::BitOffset)?;
    let bit = args.i64()?;
    let bit = match bit {
        0 => false,
        1 => true,
        _ => return Err(EngineError::BitOffset.into()),
    };

    let now = engine.now_ms();
    let value = engine.db.entry_or_insert_with(&key, now, || Value::String(Vec::new()));
    let bytes = value.as_string_mut()?;

    let byte_index = offset / 8;
    if bytes.len() <= byte_index {
        bytes.resize(byte_index + 1, 0);
    }
    let mask = 0x80_u8 >> (offset % 8);
    let previous = bytes[byte_index] & mask != 0;
    if bit {
        bytes[byte_index] |= mask;
    } else {
        bytes[byte_index] &= !mask;
    }
    engine.touch(&key);
    Ok(Reply::from(i64::from(previous)))
}

pub fn getbit(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let offset = args.i64()?;
    let offset = usize::try_from(offset).map_err(|_| EngineError::BitOffset)?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let bytes = value.as_string()?;
    let byte_index = offset / 8;
    let mask = 0x80_u8 >> (offset % 8);
    let result = bytes.get(byte_index).is_some_and(|byte| byte & mask != 0);
    Ok(Reply::from(i64::from(result)))
}

fn bit_range(args: &mut Args, len_bits: usize) -> Result<Option<(usize, usize)>, CommandError> {
    if args.is_empty() {
        return Ok(crate::slice::slice(len_bits, 0, -1).map(|range| (range.start, range.end)));
    }
    let start = args.i64()?;
    let end = args.try_pop();
    let (start, end) = match end {
        None => (start, -1),
        Some(end) => {
            let end = crate::numeric::parse_i64(&end).map_err(|_| CommandError::NotAnInteger)?;
            let unit = args.try_pop();
            match unit {
                None => (start, end),
                Some(unit) if Args::eq_ignore_case(&unit, "BIT") => (start, end),
                Some(unit) if lex_unit(&unit) == Some(Unit::Byte) => (8 * start, 7 + 8 * end),
                _ => return Err(CommandError::Syntax),
            }
        }
    };
    Ok(crate::slice::slice(len_bits, start, end).map(|range| (range.start, range.end)))
}

pub fn bitcount(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::from(0_i64));
    };
    let bytes = value.as_string()?;
    let Some((start, end)) = bit_range(&mut args, 8 * bytes.len())? else {
        return Ok(Reply::from(0_i64));
    };

    let mut count = 0_i64;
    for bit in start..end {
        let byte = bytes[bit / 8];
        let mask = 0x80_u8 >> (bit % 8);
        if byte & mask != 0 {
            count += 1;
        }
    }
    Ok(Reply::from(count))
}

pub fn bitpos(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let key = args.pop()?;
    let target = args.i64()?;
    let target = match target {
        0 => false,
        1 => true,
        _ => return Err(CommandError::Syntax),
    };
    let end_given = args.len() >= 2;

    let now = engine.now_ms();
    let Some(value) = engine.db.get(&key, now) else {
        return Ok(Reply::from(if target { -1_i64 } else { 0_i64 }));
    };
    let bytes = value.as_string()?;
    let Some((start, end)) = bit_range(&mut args, 8 * bytes.len())? else {
        return Ok(Reply::from(-1_i64));
    };

    for bit in start..end {
        let byte = bytes[bit / 8];
        let mask = 0x80_u8 >> (bit % 8);
        if (byte & mask != 0) == target {
            return Ok(Reply::from(i64::try_from(bit).unwrap_or(i64::MAX)));
        }
    }
    if end_given || target {
        Ok(Reply::from(-1_i64))
    } else {
        Ok(Reply::from(i64::try_from(8 * bytes.len()).unwrap_or(i64::MAX)))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum BitopType {
    #[regex(b"(?i:and)")]
    And,
    #[regex(b"(?i:or)")]
    Or,
    #[regex(b"(?i:xor)")]
    Xor,
    #[regex(b"(?i:not)")]
    Not,
}

pub fn bitop(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let op = args.pop()?;
    let Some(op) = BitopType::lexer(&op).next().and_then(Result::ok) else {
        return Err(CommandError::Syntax);
    };
    let dest = args.pop()?;
    let keys = args.rest();

    if op == BitopType::Not {
        if keys.len() != 1 {
            return Err(CommandError::Syntax);
        }
        let now = engine.now_ms();
        let source = engine.db.get(&keys[0], now).map(Value::as_string).transpose()?;
        let Some(source) = source else {
            let now = engine.now_ms();
            engine.db.remove(&dest, now);
            engine.touch(&dest);
            return Ok(Reply::from(0_i64));
        };
        let result: Vec<u8> = source.iter().map(|byte| !byte).collect();
        let len = result.len();
        engine.db.set(dest.clone(), Value::String(result), false);
        engine.touch(&dest);
        return Ok(Reply::from(len));
    }

    let now = engine.now_ms();
    let mut max_len = 0;
    for key in &keys {
        if let Some(value) = engine.db.get(key, now) {
            max_len = max(max_len, value.as_string()?.len());
        }
    }

    if max_len == 0 {
        let removed = engine.db.remove(&dest, now).is_some();
        if removed {
            engine.touch(&dest);
        }
        return Ok(Reply::from(0_i64));
    }

    let init = if op == BitopType::And { 0xff } else { 0 };
    let combine: fn(u8, u8) -> u8 = match op {
        BitopType::And => |a, b| a & b,
        BitopType::Or => |a, b| a | b,
        BitopType::Xor => |a, b| a ^ b,
        BitopType::Not => unreachable!("handled above"),
    };

    let mut result = vec![init; max_len];
    for key in &keys {
        let bytes = engine.db.get(key, now).map(Value::as_string).transpose()?;
        for (index, slot) in result.iter_mut().enumerate() {
            let byte = bytes.and_then(|bytes| bytes.get(index)).copied().unwrap_or(0);
            *slot = combine(byte, *slot);
        }
    }

    let len = result.len();
    engine.db.set(dest.clone(), Value::String(result), false);
    engine.touch(&dest);
    Ok(Reply::from(len))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Field {
    signed: bool,
    bits: usize,
    offset: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Overflow {
    Wrap,
    Sat,
    Fail,
}

#[derive(Debug)]
enum BitfieldOp {
    Get(Field),
    Set(Field, i64),
    Incrby(Field, i64),
    Overflow(Overflow),
}

fn parse_field(args: &mut Args) -> Result<Field, CommandError> {
    let spec = args.pop()?;
    let signed = match spec.first() {
        Some(b'i') => true,
        Some(b'u') => false,
        _ => return Err(EngineError::BitOffset.into()),
    };
    let bits: usize = std::str::from_utf8(&spec[1..])
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(EngineError::BitOffset)?;
    if bits == 0 || (signed && bits > 64) || (!signed && bits > 63) {
        return Err(EngineError::BitOffset.into());
    }

    let offset = args.pop()?;
    let offset = if offset.first() == Some(&b'#') {
        let multiplier: usize = std::str::from_utf8(&offset[1..])
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(EngineError::BitOffset)?;
        multiplier * bits
    } else {
        std::str::from_utf8(&offset)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(EngineError::BitOffset)?
    };

    Ok(Field { signed, bits, offset })
}

fn parse_overflow(args: &mut Args) -> Result<Overflow, CommandError> {
    let token = args.pop()?;
    if Args::eq_ignore_case(&token, "WRAP") {
        Ok(Overflow::Wrap)
    } else if Args::eq_ignore_case(&token, "SAT") {
        Ok(Overflow::Sat)
    } else if Args::eq_ignore_case(&token, "FAIL") {
        Ok(Overflow::Fail)
    } else {
        Err(CommandError::Syntax)
    }
}

fn parse_bitfield_ops(mut args: Args) -> Result<Vec<BitfieldOp>, CommandError> {
    let mut ops = Vec::new();
    while !args.is_empty() {
        let sub = args.pop()?;
        if Args::eq_ignore_case(&sub, "GET") {
            ops.push(BitfieldOp::Get(parse_field(&mut args)?));
        } else if Args::eq_ignore_case(&sub, "SET") {
            let field = parse_field(&mut args)?;
            let value = args.i64()?;
            ops.push(BitfieldOp::Set(field, value));
        } else if Args::eq_ignore_case(&sub, "INCRBY") {
            let field = parse_field(&mut args)?;
            let by = args.i64()?;
            ops.push(BitfieldOp::Incrby(field, by));
        } else if Args::eq_ignore_case(&sub, "OVERFLOW") {
            ops.push(BitfieldOp::Overflow(parse_overflow(&mut args)?));
        } else {
            return Err(CommandError::Syntax);
        }
    }
    Ok(ops)
}

/// Reads a signed/unsigned `field.bits`-wide integer out of `value`
/// starting at `field.offset` bits from the start, zero-extending past
/// the end of `value` the way Redis treats a short string.
fn get_field(value: &[u8], field: Field) -> i64 {
    let mut buffer = [0u8; 16];
    let byte_offset = field.offset / 8;
    if value.len() > byte_offset {
        let available = &value[byte_offset..];
        let len = available.len().min(buffer.len());
        buffer[..len].copy_from_slice(&available[..len]);
    }
    let bit_shift = field.offset % 8;
    if field.signed {
        let raw = i128::from_be_bytes(buffer) << bit_shift;
        i64::try_from(raw >> (128 - field.bits)).unwrap_or(if raw < 0 { i64::MIN } else { i64::MAX })
    } else {
        let raw = u128::from_be_bytes(buffer) << bit_shift;
        i64::try_from(raw >> (128 - field.bits)).unwrap_or(i64::MAX)
    }
}

/// Writes `n`'s low `field.bits` bits into `value` at `field.offset`,
/// leaving every other bit untouched. `value` must already be long
/// enough to hold the field.
fn set_field(value: &mut [u8], field: Field, n: i64) {
    let end = (field.offset + field.bits - 1) / 8 + 1;
    let span = &mut value[field.offset / 8..end];

    #[allow(clippy::cast_sign_loss)]
    let inner = (n as u128) << (128 - field.bits - field.offset % 8);

    let mut outer_bytes = [0u8; 16];
    outer_bytes[..span.len()].copy_from_slice(span);
    let outer = u128::from_be_bytes(outer_bytes);

    let mask = (!0u128 << (128 - field.bits)) >> (field.offset % 8);
    let result = ((outer & !mask) | (inner & mask)).to_be_bytes();
    span.copy_from_slice(&result[..span.len()]);
}

/// Adds `by` to `value` under `field`'s width/signedness, applying
/// `overflow`'s wrap/saturate/fail semantics when the result doesn't fit.
fn increment_field(field: Field, value: i64, by: i64, overflow: Overflow) -> Option<i64> {
    let (result, mut wrapped) = value.overflowing_add(by);

    wrapped |= if field.signed {
        let mask = !0_i64 << (field.bits - 1);
        if result >= 0 { result & mask != 0 } else { !result & mask != 0 }
    } else {
        let mask = !0_i64 << field.bits;
        result < 0 || mask & result != 0
    };

    if !wrapped {
        return Some(result);
    }

    match overflow {
        Overflow::Fail => None,
        Overflow::Wrap if field.bits >= 64 => Some(result),
        Overflow::Wrap => Some(result & !(!0_i64 << field.bits)),
        Overflow::Sat => Some(match (field.signed, result < 0) {
            (true, true) => !0_i64 << (field.bits - 1),
            (true, false) => !(!0_i64 << (field.bits - 1)),
            (false, true) => 0,
            (false, false) => !(!0_i64 << field.bits),
        }),
    }
}

pub fn bitfield(engine: &mut Engine, _id: ConnectionId, args: Args) -> Result<Reply, CommandError> {
    let key = {
        let mut peek = Args::new_for_peek(&args);
        peek.pop()?
    };
    let mut args = args;
    let key = args.pop().unwrap_or(key);

    let ops = parse_bitfield_ops(args)?;

    let needed = ops
        .iter()
        .filter_map(|op| match op {
            BitfieldOp::Set(field, _) | BitfieldOp::Incrby(field, _) => Some((field.offset + field.bits - 1) / 8 + 1),
            _ => None,
        })
        .max();

    let now = engine.now_ms();
    let mut replies = Vec::with_capacity(ops.len());
    let mut changed = 0_u64;

    if let Some(needed) = needed {
        let value = engine.db.entry_or_insert_with(&key, now, || Value::String(Vec::new()));
        let bytes = value.as_string_mut()?;
        if bytes.len() < needed {
            bytes.resize(needed, 0);
        }

        let mut overflow = Overflow::Wrap;
        for op in ops {
            match op {
                BitfieldOp::Get(field) => replies.push(Reply::from(get_field(bytes, field))),
                BitfieldOp::Set(field, n) => {
                    let original = get_field(bytes, field);
                    match increment_field(field, n, 0, overflow) {
                        Some(result) => {
                            set_field(bytes, field, result);
                            if original != result {
                                changed += 1;
                            }
                            replies.push(Reply::from(original));
                        }
                        None => replies.push(Reply::Nil),
                    }
                }
                BitfieldOp::Incrby(field, by) => {
                    let current = get_field(bytes, field);
                    match increment_field(field, current, by, overflow) {
                        Some(result) => {
                            set_field(bytes, field, result);
                            if current != result {
                                changed += 1;
                            }
                            replies.push(Reply::from(result));
                        }
                        None => replies.push(Reply::Nil),
                    }
                }
                BitfieldOp::Overflow(value) => overflow = value,
            }
        }
    } else {
        let bytes = engine.db.get(&key, now).map(Value::as_string).transpose()?.cloned().unwrap_or_default();
        for op in ops {
            match op {
                BitfieldOp::Get(field) => replies.push(Reply::from(get_field(&bytes, field))),
                BitfieldOp::Overflow(_) => {}
                BitfieldOp::Set(..) | BitfieldOp::Incrby(..) => unreachable!("no write ops without `needed`"),
            }
        }
    }

    if changed > 0 {
        engine.touch(&key);
    }
    Ok(Reply::Array(replies))
}
