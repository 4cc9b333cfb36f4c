//! The polymorphic value container (spec §3's Value container entity):
//! a tagged union of the five primary kinds plus streams, with WRONGTYPE
//! enforcement concentrated at a single dispatch joint.

use super::stream::Stream;
use super::zset::ZSet;
use crate::error::EngineError;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub enum Value {
    String(Vec<u8>),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    SortedSet(ZSet),
    Stream(Stream),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
        }
    }

    pub fn as_string(&self) -> Result<&Vec<u8>, EngineError> {
        match self {
            Value::String(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut Vec<u8>, EngineError> {
        match self {
            Value::String(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, EngineError> {
        match self {
            Value::List(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, EngineError> {
        match self {
            Value::List(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, EngineError> {
        match self {
            Value::Set(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, EngineError> {
        match self {
            Value::Set(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, EngineError> {
        match self {
            Value::Hash(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, EngineError> {
        match self {
            Value::Hash(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&ZSet, EngineError> {
        match self {
            Value::SortedSet(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut ZSet, EngineError> {
        match self {
            Value::SortedSet(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_stream(&self) -> Result<&Stream, EngineError> {
        match self {
            Value::Stream(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream, EngineError> {
        match self {
            Value::Stream(value) => Ok(value),
            _ => Err(EngineError::WrongType),
        }
    }

    /// A conservative size/count measure used by `OBJECT ENCODING`'s
    /// threshold heuristic (spec §4.11, §9's open question).
    pub fn encoding(&self, config: &crate::config::Config) -> &'static str {
        match self {
            Value::String(bytes) => {
                if std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .is_some()
                {
                    "int"
                } else if bytes.len() <= 44 {
                    "embstr"
                } else {
                    "raw"
                }
            }
            Value::List(list) => {
                if list.len() <= config.list_max_listpack_size {
                    "listpack"
                } else {
                    "quicklist"
                }
            }
            Value::Set(set) => {
                let all_ints = set.iter().all(|member| {
                    std::str::from_utf8(member)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .is_some()
                });
                if all_ints && set.len() <= config.set_max_intset_entries {
                    "intset"
                } else if set.len() <= config.set_max_listpack_entries
                    && set.iter().all(|member| member.len() <= config.set_max_listpack_value)
                {
                    "listpack"
                } else {
                    "hashtable"
                }
            }
            Value::Hash(hash) => {
                if hash.len() <= config.hash_max_listpack_entries
                    && hash
                        .iter()
                        .all(|(k, v)| k.len() <= config.hash_max_listpack_value && v.len() <= config.hash_max_listpack_value)
                {
                    "listpack"
                } else {
                    "hashtable"
                }
            }
            Value::SortedSet(zset) => {
                if zset.len() <= config.zset_max_listpack_entries
                    && zset.members().all(|member| member.len() <= config.zset_max_listpack_value)
                {
                    "listpack"
                } else {
                    "skiplist"
                }
            }
            Value::Stream(_) => "stream",
        }
    }
}
