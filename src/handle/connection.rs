//! Connection handle and worker lifecycle.

use super::{ConnectionId, StatementId};
use crate::config::{self, WorkerConfig};
use crate::mailbox::Mailbox;
use crate::models::Token;
use crate::worker::{Command, CommandQueue, Request, RequestOp, Worker};
use crate::{Error, Result};
use std::ffi::CString;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// Shared state behind every [`Connection`] clone and every [`Statement`].
///
/// The worker thread holds only a weak reference, so dropping the last
/// caller-side owner runs [`Drop`] here: stop is pushed behind everything
/// already queued and the worker is joined.
///
/// [`Statement`]: super::Statement
pub(crate) struct ConnectionInner {
    id: ConnectionId,
    queue: Arc<CommandQueue<Command>>,
    max_path_len: usize,
    worker: OnceLock<JoinHandle<()>>,
}

impl ConnectionInner {
    pub(crate) const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueues a validated request.
    pub(crate) fn submit(&self, operation: RequestOp, token: Token, reply_to: &Mailbox) -> Result<()> {
        let request = Request {
            operation,
            token,
            reply_to: reply_to.clone(),
        };
        self.queue.push(request.into_command())
    }

    /// Asks the worker to finalize a statement. Never replies.
    pub(crate) fn finalize(&self, statement: StatementId) {
        if let Err(e) = self.queue.push(Command::Finalize(statement)) {
            // The worker has exited and already finalized everything.
            tracing::debug!(
                connection_id = %self.id,
                statement_id = %statement,
                error = %e,
                "finalize not queued"
            );
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.queue.push_unchecked(Command::Stop);

        let Some(handle) = self.worker.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Released from inside the worker (a dropped reply held the last
            // statement). The loop will reach the stop command on its own.
            tracing::debug!(connection_id = %self.id, "last handle released on worker thread");
            return;
        }
        if handle.join().is_err() {
            tracing::error!(connection_id = %self.id, "connection worker panicked");
        }
    }
}

/// Handle to a connection and its dedicated worker thread.
///
/// Cloning is cheap and shares the same worker. Every operation validates
/// its arguments, queues a command and returns immediately; the outcome
/// arrives later as a [`Reply`](crate::Reply) in the given mailbox, tagged
/// with the caller's token.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Starts a connection using the process-wide [`WorkerConfig`].
    ///
    /// The worker thread is launched immediately. No database is open until
    /// [`open`](Self::open) runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the worker thread cannot be
    /// spawned.
    pub fn start() -> Result<Self> {
        Self::start_with(config::global().clone())
    }

    /// Starts a connection with an explicit configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if the thread name prefix contains a NUL byte
    /// - [`Error::OperationFailed`] if the worker thread cannot be spawned
    pub fn start_with(config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        let id = ConnectionId::next();
        let queue = Arc::new(CommandQueue::new());
        let inner = Arc::new(ConnectionInner {
            id,
            queue: Arc::clone(&queue),
            max_path_len: config.max_path_len,
            worker: OnceLock::new(),
        });

        let mut builder = thread::Builder::new().name(format!("{}-{id}", config.thread_name_prefix));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        // Engine handles are not `Send`; the worker is built on its own thread.
        let weak = Arc::downgrade(&inner);
        let handle = builder
            .spawn(move || Worker::new(id, weak, queue, config).run())
            .map_err(|e| Error::OperationFailed {
                operation: "spawn_worker".to_string(),
                cause: e.to_string(),
            })?;
        // Freshly created; nothing else can have set it.
        let _ = inner.worker.set(handle);

        tracing::info!(connection_id = %id, "connection started");
        Ok(Self { inner })
    }

    pub(crate) const fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &ConnectionInner {
        &self.inner
    }

    /// Returns the connection's identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns true while the worker loop is running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.inner.queue.is_closed()
    }

    /// Number of commands waiting for the worker.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Opens the database at `path`, creating it if needed.
    ///
    /// Replies `Ok`, or an engine error with the engine's text. Replies
    /// `AlreadyOpen` if a database is already open on this connection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::InvalidInput`] if `path` is empty, too long, or contains a
    ///   NUL byte
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn open(&self, token: Token, reply_to: &Mailbox, path: &str) -> Result<()> {
        ensure_reachable(reply_to)?;
        if path.is_empty() {
            return Err(Error::InvalidInput("path is empty".to_string()));
        }
        if path.len() > self.inner.max_path_len {
            return Err(Error::InvalidInput(format!(
                "path is {} bytes, maximum is {}",
                path.len(),
                self.inner.max_path_len
            )));
        }
        let path = to_c_string("path", path)?;
        self.inner.submit(RequestOp::Open { path }, token, reply_to)
    }

    /// Runs SQL that takes no parameters and returns no rows.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::InvalidInput`] if `sql` contains a NUL byte
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn exec(&self, token: Token, reply_to: &Mailbox, sql: &str) -> Result<()> {
        ensure_reachable(reply_to)?;
        let sql = to_c_string("sql", sql)?;
        self.inner.submit(RequestOp::Exec { sql }, token, reply_to)
    }

    /// Compiles a statement.
    ///
    /// Replies with a [`Statement`](super::Statement) on success. While the
    /// engine reports busy the worker retries with a growing backoff, up to
    /// the configured bound.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::InvalidInput`] if `sql` contains a NUL byte
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn prepare(&self, token: Token, reply_to: &Mailbox, sql: &str) -> Result<()> {
        ensure_reachable(reply_to)?;
        let sql = to_c_string("sql", sql)?;
        self.inner.submit(RequestOp::Prepare { sql }, token, reply_to)
    }

    /// Closes the database.
    ///
    /// The engine refuses while statements from this connection are still
    /// alive; the reply then carries its error and the database stays open.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDestination`] if `reply_to` is closed
    /// - [`Error::CommandPushFailed`] if the command cannot be queued
    pub fn close(&self, token: Token, reply_to: &Mailbox) -> Result<()> {
        ensure_reachable(reply_to)?;
        self.inner.submit(RequestOp::Close, token, reply_to)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

pub(super) fn ensure_reachable(reply_to: &Mailbox) -> Result<()> {
    if reply_to.is_closed() {
        Err(Error::InvalidDestination)
    } else {
        Ok(())
    }
}

fn to_c_string(what: &str, text: &str) -> Result<CString> {
    CString::new(text).map_err(|e| {
        Error::InvalidInput(format!("{what} contains a NUL byte at {}", e.nul_position()))
    })
}
