//! Error taxonomy (spec §7): argument errors, `WRONGTYPE`, range/overflow,
//! missing-target, conflict, transaction, and internal failures, each
//! carrying its canonical wire message as `Display`.

use thiserror::Error;

/// Errors raised by the keyspace/value layer itself, once arguments have
/// already been parsed into the right shapes. These are the errors that
/// can occur "mid-operation" — wrong value kind, overflow, missing target,
/// conflicting keys.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum EngineError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR value is not a valid float")]
    NotAValidFloat,

    #[error("ERR increment or decrement would overflow")]
    IncrOverflow,

    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("ERR hash value is not an integer")]
    HashValueNotAnInteger,

    #[error("ERR hash value is not a float")]
    HashValueNotAFloat,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR offset is out of range")]
    OffsetRange,

    #[error("ERR bit offset is not an integer or out of range")]
    BitOffset,

    #[error("ERR string exceeds maximum allowed size (proto-max-bulk-len)")]
    StringLength,

    #[error("BUSYKEY Target key name already exists.")]
    BusyKey,

    #[error("NOGROUP No such key '{0}' or consumer group '{1}' in XREADGROUP with GROUP option")]
    NoGroup(String, String),

    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    #[error("NOGROUP No such consumer group '{1}' for key name '{0}'")]
    NoSuchGroup(String, String),

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    InvalidStreamId,

    #[error("ERR source and destination objects are the same")]
    SameObject,

    #[error("ERR DUMP payload version or checksum are wrong")]
    BadDumpPayload,
}

/// Errors raised while parsing a command's arguments, before any engine
/// operation runs. Wraps [`EngineError`] so a single `Reply::Error`
/// conversion covers both layers.
#[derive(Clone, Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArguments(String),

    #[error("ERR Unknown subcommand or wrong number of arguments for '{0}'. Try {1} HELP.")]
    UnknownSubcommand(String, String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR GT, LT, and/or NX options at the same time are not compatible")]
    GtLtNx,

    #[error("ERR NX and XX, GT or LT options at the same time are not compatible")]
    XxAndNx,

    #[error("ERR Invalid TTL value, must be >= 0")]
    InvalidTtl,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR count should be greater than 0")]
    CountZero,

    #[error("ERR numkeys should be greater than 0")]
    NumkeysZero,

    #[error("ERR Number of keys can't be greater than number of args")]
    NumberOfKeys,

    #[error("ERR MULTI calls can not be nested")]
    MultiNested,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInMulti,

    #[error(
        "ERR wrong number of arguments for 'subscribe' command"
    )]
    WrongSubscribeArguments,

    #[error(
        "NOSCRIPT No matching script. Please use EVAL."
    )]
    NoScript,

    #[error("ERR ACL is not supported")]
    AclUnsupported,
}

impl From<CommandError> for crate::reply::Reply {
    fn from(error: CommandError) -> Self {
        crate::reply::Reply::Error(error.to_string())
    }
}

impl From<EngineError> for crate::reply::Reply {
    fn from(error: EngineError) -> Self {
        crate::reply::Reply::Error(error.to_string())
    }
}
