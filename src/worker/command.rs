//! Commands carried from the dispatch layer to a connection worker.

use crate::handle::StatementId;
use crate::mailbox::Mailbox;
use crate::models::Token;
use std::ffi::CString;
use std::fmt;

/// One unit of work on a connection's queue.
///
/// Every payload is owned: nothing in a command borrows from the caller.
#[derive(Debug)]
pub enum Command {
    /// A caller request that will be answered with exactly one reply.
    Request(Request),
    /// Finalize a prepared statement. Sent when a statement handle drops.
    Finalize(StatementId),
    /// Terminal command. Ends the worker loop without a reply.
    Stop,
}

impl Command {
    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Request(request) => request.operation.name(),
            Self::Finalize(_) => "finalize",
            Self::Stop => "stop",
        }
    }
}

/// A correlated request: what to do, and where to send the answer.
#[derive(Debug)]
pub struct Request {
    /// Operation and its isolated arguments.
    pub operation: RequestOp,
    /// Echoed back in the reply.
    pub token: Token,
    /// Where the reply goes.
    pub reply_to: Mailbox,
}

impl Request {
    /// Wraps an operation into a command.
    #[must_use]
    pub const fn into_command(self) -> Command {
        Command::Request(self)
    }
}

/// Operation kinds with their payloads.
pub enum RequestOp {
    /// Open the engine handle at `path`.
    Open {
        /// NUL-terminated copy of the path.
        path: CString,
    },
    /// Run SQL that takes no parameters and returns no rows.
    Exec {
        /// NUL-terminated copy of the SQL.
        sql: CString,
    },
    /// Compile a statement.
    Prepare {
        /// NUL-terminated copy of the SQL.
        sql: CString,
    },
    /// Reset a statement and bind a full parameter list.
    Bind {
        /// Target statement.
        statement: StatementId,
        /// Deep copy of the caller's values.
        values: Vec<serde_json::Value>,
    },
    /// Advance a statement by one row.
    Step {
        /// Target statement.
        statement: StatementId,
    },
    /// List a statement's column names.
    ColumnNames {
        /// Target statement.
        statement: StatementId,
    },
    /// Close the engine handle.
    Close,
}

impl RequestOp {
    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Exec { .. } => "exec",
            Self::Prepare { .. } => "prepare",
            Self::Bind { .. } => "bind",
            Self::Step { .. } => "step",
            Self::ColumnNames { .. } => "column_names",
            Self::Close => "close",
        }
    }

    /// The statement this operation addresses, if any.
    #[must_use]
    pub const fn statement(&self) -> Option<StatementId> {
        match self {
            Self::Bind { statement, .. }
            | Self::Step { statement }
            | Self::ColumnNames { statement } => Some(*statement),
            Self::Open { .. } | Self::Exec { .. } | Self::Prepare { .. } | Self::Close => None,
        }
    }
}

// SQL and bind values stay out of logs.
impl fmt::Debug for RequestOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path } => f.debug_struct("Open").field("path", path).finish(),
            Self::Exec { sql } => f
                .debug_struct("Exec")
                .field("sql_len", &sql.as_bytes().len())
                .finish(),
            Self::Prepare { sql } => f
                .debug_struct("Prepare")
                .field("sql_len", &sql.as_bytes().len())
                .finish(),
            Self::Bind { statement, values } => f
                .debug_struct("Bind")
                .field("statement", statement)
                .field("values", &values.len())
                .finish(),
            Self::Step { statement } => f.debug_struct("Step").field("statement", statement).finish(),
            Self::ColumnNames { statement } => f
                .debug_struct("ColumnNames")
                .field("statement", statement)
                .finish(),
            Self::Close => f.write_str("Close"),
        }
    }
}
