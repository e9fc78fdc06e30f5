//! Prepared statement handle.

use super::connection::ensure_reachable;
use super::{Connection, StatementId};
use crate::mailbox::Mailbox;
use crate::models::Token;
use crate::worker::RequestOp;
use crate::{Error, Result};
use std::fmt;

/// A prepared statement, delivered in the reply to
/// [`Connection::prepare`].
///
/// Holds a strong reference to its connection: the worker keeps running
/// while any statement is alive, even if every [`Connection`] clone has
/// been dropped. Statement commands go onto the connection's queue, so they
/// are ordered with everything else sent to that connection.
///
/// Dropping the handle queues a finalize for the worker, ahead of the stop
/// command that a final release of the connection would queue.
pub struct Statement {
    id: StatementId,
    connection: Connection,
}

impl Statement {
    pub(crate) const fn new(id: StatementId, connection: Connection) -> Self {
        Self { id, connection }
    }

    /// Returns the statement's identifier within its connection.
    #[must_use]
    pub const fn id(&self) -> StatementId {
        self.id
    }

    /// Returns the owning connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Resets the statement and binds `values` to its parameters in order.
    ///
    /// `values` must be a list whose length equals the statement's parameter
    /// count; otherwise the reply is an arity error and nothing is bound.
    /// Elements map as `null` to NULL, booleans to 1/0, integers to INTEGER,
    /// other numbers to REAL, strings to TEXT and `{"blob": "<hex>"}` to BLOB.
    /// Any other element stops binding with a type error naming its index.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::InvalidInput`] if `values` is not a list
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn bind(&self, token: Token, reply_to: &Mailbox, values: &serde_json::Value) -> Result<()> {
        ensure_reachable(reply_to)?;
        let serde_json::Value::Array(values) = values else {
            return Err(Error::InvalidInput("bind values must be a list".to_string()));
        };
        let operation = RequestOp::Bind {
            statement: self.id,
            values: values.clone(),
        };
        self.connection.inner().submit(operation, token, reply_to)
    }

    /// Advances the statement by one row.
    ///
    /// Replies with a row, `Done` when no rows remain, or `Busy` when the
    /// engine could not take a lock. `Busy` is not retried. Once `Done` has
    /// been replied, further steps reply `Done` again until the next bind.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn step(&self, token: Token, reply_to: &Mailbox) -> Result<()> {
        ensure_reachable(reply_to)?;
        let operation = RequestOp::Step { statement: self.id };
        self.connection.inner().submit(operation, token, reply_to)
    }

    /// Lists the statement's column names in declaration order.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn column_names(&self, token: Token, reply_to: &Mailbox) -> Result<()> {
        ensure_reachable(reply_to)?;
        let operation = RequestOp::ColumnNames { statement: self.id };
        self.connection.inner().submit(operation, token, reply_to)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // Queued before `connection` drops, so it lands ahead of any stop.
        self.connection.inner().finalize(self.id);
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("connection", &self.connection.inner().id())
            .finish()
    }
}
