//! Error taxonomy mapped to stable RESP error text.

use thiserror::Error;

/// Every way a command can fail. `Display` renders the exact wire text;
/// the leading `-ERR`/`-WRONGTYPE` prefix is part of the rendered text,
/// not appended separately, so handlers can pass the message straight
/// into the encoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR value is not an integer or out of range")]
    InvalidInteger,

    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    InvalidStreamId,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,

    #[error("ERR The ID specified in XADD already exists")]
    StreamIdExists,

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("ERR UNWATCH without WATCH")]
    UnwatchWithoutWatch,

    #[error("ERR {0} is not allowed in transactions")]
    BlockingInTransaction(String),

    #[error("ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context")]
    NotAllowedInPubsubMode,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR {0}")]
    Other(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CommandError {
    /// Encodes as a RESP error line, including the trailing CRLF.
    pub fn to_resp(&self) -> Vec<u8> {
        format!("-{}\r\n", self).into_bytes()
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

impl From<std::num::ParseIntError> for CommandError {
    fn from(_: std::num::ParseIntError) -> Self {
        CommandError::InvalidInteger
    }
}

impl From<std::num::ParseFloatError> for CommandError {
    fn from(_: std::num::ParseFloatError) -> Self {
        CommandError::Other("value is not a valid float".into())
    }
}
