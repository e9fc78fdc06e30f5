//! The per-connection worker loop.

use super::{Command, CommandQueue, Request, RequestOp};
use crate::config::WorkerConfig;
use crate::engine::{BUSY, Database, PreparedStatement, StepOutcome};
use crate::handle::{Connection, ConnectionId, ConnectionInner, Statement, StatementId};
use crate::models::{Answer, Reply, ReplyError, Value};
use crate::observability::metrics::{
    record_command, record_connection_started, record_connection_stopped,
    record_prepare_busy_retry, record_undeliverable_reply,
};
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

type Outcome = Result<Answer, ReplyError>;

/// A prepared statement owned by the worker.
struct Registered {
    prepared: PreparedStatement,
    /// Set once a step returned done; cleared by bind.
    exhausted: bool,
}

/// Owns the engine handle and every prepared statement of one connection.
///
/// Runs on its own thread. Nothing here is shared: the queue is the only
/// way in.
pub(crate) struct Worker {
    id: ConnectionId,
    connection: Weak<ConnectionInner>,
    queue: Arc<CommandQueue<Command>>,
    config: WorkerConfig,
    // Declared before `db` so statements drop first.
    statements: HashMap<StatementId, Registered>,
    db: Option<Database>,
    next_statement: u64,
}

/// Closes the queue when the loop ends, including by panic.
struct ExitGuard {
    id: ConnectionId,
    queue: Arc<CommandQueue<Command>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.queue.close();
        record_connection_stopped();
        if thread::panicking() {
            tracing::error!(connection_id = %self.id, "connection worker stopped by panic");
        } else {
            tracing::info!(connection_id = %self.id, "connection stopped");
        }
    }
}

impl Worker {
    pub(crate) fn new(
        id: ConnectionId,
        connection: Weak<ConnectionInner>,
        queue: Arc<CommandQueue<Command>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            connection,
            queue,
            config,
            statements: HashMap::new(),
            db: None,
            next_statement: 1,
        }
    }

    /// Runs until a stop command is popped.
    ///
    /// Every request gets exactly one reply, errors included. Commands
    /// queued ahead of the stop still run.
    pub(crate) fn run(mut self) {
        let span = tracing::info_span!("connection_worker", connection_id = %self.id);
        let _entered = span.enter();
        let _exit = ExitGuard {
            id: self.id,
            queue: Arc::clone(&self.queue),
        };
        record_connection_started();
        tracing::debug!("worker loop started");

        loop {
            match self.queue.pop() {
                Command::Stop => break,
                Command::Finalize(statement) => self.finalize(statement),
                Command::Request(request) => self.execute(request),
            }
        }

        self.shutdown();
    }

    fn execute(&mut self, request: Request) {
        let Request {
            operation,
            token,
            reply_to,
        } = request;
        let name = operation.name();
        let start = Instant::now();

        let outcome = if self.db.is_none() && !matches!(operation, RequestOp::Open { .. }) {
            Err(ReplyError::NotOpen)
        } else {
            self.handle(operation)
        };

        let status = if outcome.is_ok() { "success" } else { "error" };
        record_command(name, status, start.elapsed());
        match &outcome {
            Ok(answer) => tracing::debug!(operation = name, answer = answer.kind(), "command executed"),
            Err(err) => tracing::debug!(operation = name, error = %err, "command failed"),
        }

        if let Err(undelivered) = reply_to.deliver(Reply::new(token, outcome)) {
            tracing::warn!(
                operation = name,
                mailbox = reply_to.id(),
                token = %undelivered.token,
                "reply mailbox closed, reply dropped"
            );
            record_undeliverable_reply(name);
            // A statement inside the reply is released here, which may
            // queue its finalize on this same worker.
            drop(undelivered);
        }
    }

    fn handle(&mut self, operation: RequestOp) -> Outcome {
        match operation {
            RequestOp::Open { path } => self.open(&path),
            RequestOp::Exec { sql } => {
                self.db()?.exec(&sql)?;
                Ok(Answer::Ok)
            },
            RequestOp::Prepare { sql } => self.prepare(&sql),
            RequestOp::Bind { statement, values } => self.bind(statement, &values),
            RequestOp::Step { statement } => self.step(statement),
            RequestOp::ColumnNames { statement } => {
                let registered = self.registered(statement)?;
                Ok(Answer::Columns(registered.prepared.column_names()))
            },
            RequestOp::Close => self.close(),
        }
    }

    fn db(&self) -> Result<&Database, ReplyError> {
        self.db.as_ref().ok_or(ReplyError::NotOpen)
    }

    fn registered(&mut self, statement: StatementId) -> Result<&mut Registered, ReplyError> {
        self.statements
            .get_mut(&statement)
            .ok_or(ReplyError::NoPreparedStatement)
    }

    fn open(&mut self, path: &CStr) -> Outcome {
        if self.db.is_some() {
            return Err(ReplyError::AlreadyOpen);
        }
        self.db = Some(Database::open(path)?);
        Ok(Answer::Ok)
    }

    fn prepare(&mut self, sql: &CStr) -> Outcome {
        let db = self.db()?;
        let mut retries = 0;
        let prepared = loop {
            match db.prepare(sql) {
                Err(err) if err.is_engine_code(BUSY) && retries < self.config.prepare_busy_retries => {
                    retries += 1;
                    record_prepare_busy_retry();
                    thread::sleep(self.config.prepare_backoff(retries));
                },
                result => break result?,
            }
        };
        if retries > 0 {
            tracing::debug!(retries, "prepare succeeded after busy retries");
        }

        // Blank SQL compiles to nothing.
        let prepared = prepared.ok_or(ReplyError::NoPreparedStatement)?;
        // The connection is gone only while its last owner is tearing down;
        // `prepared` is finalized on return.
        let inner = self.connection.upgrade().ok_or(ReplyError::NoConnection)?;

        let id = StatementId::new(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(
            id,
            Registered {
                prepared,
                exhausted: false,
            },
        );
        Ok(Answer::Statement(Statement::new(id, Connection::from_inner(inner))))
    }

    fn bind(&mut self, statement: StatementId, values: &[serde_json::Value]) -> Outcome {
        let registered = self.registered(statement)?;
        let expected = registered.prepared.parameter_count();
        if values.len() != expected {
            return Err(ReplyError::ArgsWrongLength {
                expected,
                actual: values.len(),
            });
        }

        registered.prepared.reset();
        registered.exhausted = false;
        for (index, raw) in values.iter().enumerate() {
            let value = Value::from_bind(raw).ok_or(ReplyError::WrongType { index })?;
            registered.prepared.bind(index + 1, &value)?;
        }
        Ok(Answer::Ok)
    }

    fn step(&mut self, statement: StatementId) -> Outcome {
        let registered = self.registered(statement)?;
        // The engine would restart a finished statement on the next step.
        if registered.exhausted {
            return Ok(Answer::Done);
        }
        match registered.prepared.step()? {
            StepOutcome::Row(row) => Ok(Answer::Row(row)),
            StepOutcome::Done => {
                registered.exhausted = true;
                Ok(Answer::Done)
            },
            StepOutcome::Busy => Ok(Answer::Busy),
        }
    }

    fn close(&mut self) -> Outcome {
        let db = self.db.take().ok_or(ReplyError::NotOpen)?;
        match db.close() {
            Ok(()) => Ok(Answer::Ok),
            Err((db, err)) => {
                self.db = Some(db);
                Err(err)
            },
        }
    }

    fn finalize(&mut self, statement: StatementId) {
        if self.statements.remove(&statement).is_none() {
            tracing::debug!(statement_id = %statement, "finalize for unknown statement");
        }
    }

    fn shutdown(&mut self) {
        if !self.statements.is_empty() {
            tracing::debug!(count = self.statements.len(), "finalizing remaining statements");
        }
        self.statements.clear();
        if let Some(db) = self.db.take()
            && let Err((db, err)) = db.close()
        {
            tracing::warn!(error = %err, "database close failed during shutdown");
            drop(db);
        }
    }
}
