//! # sqlite-courier
//!
//! Runs blocking `SQLite` work on a dedicated worker thread per connection and
//! mails every result back to the caller as a reply correlated by token.
//!
//! A caller never touches the engine directly. Each operation validates its
//! arguments, copies them into a [`Command`](worker::Command), pushes the
//! command onto the connection's queue and returns at once. The connection's
//! worker executes commands strictly in FIFO order and sends exactly one
//! [`Reply`] per request to the [`Mailbox`] named in the request.
//!
//! ## Features
//!
//! - One worker thread and one unbounded command queue per connection
//! - Statements share their connection's queue, so all engine access is
//!   serialized through a single thread
//! - Statements keep their connection (and its worker) alive
//! - Teardown drains: queued commands still run before the worker stops
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_courier::{Answer, Connection, Token, mailbox};
//!
//! let (reply_to, mut inbox) = mailbox();
//! let conn = Connection::start()?;
//!
//! conn.open(Token::new(), &reply_to, "app.db")?;
//! conn.exec(Token::new(), &reply_to, "create table t(a)")?;
//!
//! let opened = inbox.blocking_recv().map(|reply| reply.outcome);
//! assert!(matches!(opened, Some(Ok(Answer::Ok))));
//! # Ok::<(), sqlite_courier::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// The engine bindings in `engine::sqlite` are the only place allowed to opt out.
#![deny(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod handle;
pub mod mailbox;
pub mod models;
pub mod observability;
pub mod worker;

pub use config::WorkerConfig;
pub use dispatch::{Operation, Target, invoke};
pub use handle::{Connection, ConnectionId, Statement, StatementId};
pub use mailbox::{Inbox, Mailbox, mailbox};
pub use models::{Answer, Reply, ReplyError, Token, Value};

/// Synchronous error type for courier operations.
///
/// These errors are returned directly from the call that caused them. A call
/// that fails synchronously never produces a later asynchronous reply.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Wrong argument shape or arity, interior NUL bytes, bad paths |
/// | `InvalidToken` | A correlation token string cannot be parsed |
/// | `InvalidDestination` | The reply mailbox has no receiver any more |
/// | `CommandPushFailed` | The queue could not grow, or its worker has exited |
/// | `OperationFailed` | Thread spawn, config loading, logging setup |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A path is empty or longer than the configured maximum
    /// - SQL text or a path contains an interior NUL byte
    /// - A bind argument is not a list
    /// - The dynamic entry point receives the wrong number of arguments,
    ///   an unknown operation, or the wrong target kind
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The correlation token is malformed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The reply destination can no longer receive messages.
    #[error("invalid destination: mailbox is closed")]
    InvalidDestination,

    /// The command could not be placed on the connection's queue.
    ///
    /// Raised when:
    /// - Growing the queue storage fails
    /// - The worker has exited and closed its queue
    #[error("command push failed: {0}")]
    CommandPushFailed(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The worker thread cannot be spawned
    /// - A configuration file cannot be read or parsed
    /// - Logging has already been initialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for courier operations.
pub type Result<T> = std::result::Result<T, Error>;
