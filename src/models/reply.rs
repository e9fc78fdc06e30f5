//! Asynchronous replies delivered to a caller's mailbox.

use super::{Token, Value};
use crate::handle::Statement;
use thiserror::Error as ThisError;

/// A reply to one request, paired with the request's token.
#[derive(Debug)]
pub struct Reply {
    /// Token supplied with the request.
    pub token: Token,
    /// What the worker produced.
    pub outcome: Result<Answer, ReplyError>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    pub const fn new(token: Token, outcome: Result<Answer, ReplyError>) -> Self {
        Self { token, outcome }
    }
}

/// Successful outcome of a request.
#[derive(Debug)]
pub enum Answer {
    /// open, exec, bind and close succeeded.
    Ok,
    /// prepare produced a statement.
    Statement(Statement),
    /// step produced a row.
    Row(Vec<Value>),
    /// step found no more rows.
    Done,
    /// step hit a transient lock; the caller may retry.
    Busy,
    /// Column names in declaration order.
    Columns(Vec<String>),
}

impl Answer {
    /// Returns a short name for the answer kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Statement(_) => "statement",
            Self::Row(_) => "row",
            Self::Done => "done",
            Self::Busy => "busy",
            Self::Columns(_) => "columns",
        }
    }
}

/// Error outcome carried inside a [`Reply`].
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotOpen` | Any command other than open runs with no engine handle |
/// | `AlreadyOpen` | open runs while a handle is already open |
/// | `Engine` | The engine rejected the operation |
/// | `ArgsWrongLength` | bind got a list that does not match the parameter count |
/// | `WrongType` | bind met a value it cannot map |
/// | `NoPreparedStatement` | The statement was already finalized |
/// | `NoConnection` | prepare finished while its connection was being torn down |
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ReplyError {
    /// The connection has no open engine handle.
    #[error("database not open")]
    NotOpen,

    /// The connection already has an open engine handle.
    #[error("database already open")]
    AlreadyOpen,

    /// The engine reported an error.
    #[error("sqlite error {code}: {message}")]
    Engine {
        /// Engine result code.
        code: i32,
        /// Engine error text.
        message: String,
    },

    /// The bind list length differs from the statement's parameter count.
    #[error("wrong number of arguments: expected {expected}, got {actual}")]
    ArgsWrongLength {
        /// Number of parameters the statement declares.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A bind value has a shape that cannot be mapped.
    #[error("wrong type for bind value at index {index}")]
    WrongType {
        /// Zero-based position in the bind list.
        index: usize,
    },

    /// The statement is no longer registered with its worker.
    #[error("no prepared statement")]
    NoPreparedStatement,

    /// The owning connection is gone.
    #[error("no connection")]
    NoConnection,
}

impl ReplyError {
    /// Returns true for an engine error with the given primary result code.
    #[must_use]
    pub const fn is_engine_code(&self, primary: i32) -> bool {
        matches!(self, Self::Engine { code, .. } if *code & 0xff == primary)
    }
}
