//! Helpers shared by the integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use sqlite_courier::{Answer, Connection, Inbox, Mailbox, ReplyError, Statement, Token, WorkerConfig};
use std::path::Path;
use std::time::Duration;

/// Outcome carried by a reply.
pub type Outcome = Result<Answer, ReplyError>;

/// A connection plus one mailbox that collects its replies.
pub struct Session {
    pub conn: Connection,
    pub reply_to: Mailbox,
    pub inbox: Inbox,
}

impl Session {
    pub fn start() -> Self {
        Self::start_with(test_config())
    }

    pub fn start_with(config: WorkerConfig) -> Self {
        let conn = Connection::start_with(config).expect("worker should start");
        let (reply_to, inbox) = sqlite_courier::mailbox();
        Self {
            conn,
            reply_to,
            inbox,
        }
    }

    /// Starts a session and opens `path` on it.
    pub fn open(path: &Path) -> Self {
        let mut session = Self::start();
        let path = path.to_str().expect("utf-8 path");
        let outcome = session.call(|conn, token, to| conn.open(token, to, path));
        assert!(matches!(outcome, Ok(Answer::Ok)), "open failed: {outcome:?}");
        session
    }

    /// Queues one connection request and waits for its reply.
    pub fn call<F>(&mut self, request: F) -> Outcome
    where
        F: FnOnce(&Connection, Token, &Mailbox) -> sqlite_courier::Result<()>,
    {
        let token = Token::new();
        request(&self.conn, token, &self.reply_to).expect("request should be queued");
        self.reply_for(token)
    }

    /// Queues one statement request and waits for its reply.
    pub fn call_stmt<F>(&mut self, stmt: &Statement, request: F) -> Outcome
    where
        F: FnOnce(&Statement, Token, &Mailbox) -> sqlite_courier::Result<()>,
    {
        let token = Token::new();
        request(stmt, token, &self.reply_to).expect("request should be queued");
        self.reply_for(token)
    }

    pub fn exec(&mut self, sql: &str) -> Outcome {
        self.call(|conn, token, to| conn.exec(token, to, sql))
    }

    pub fn prepare(&mut self, sql: &str) -> Statement {
        let outcome = self.call(|conn, token, to| conn.prepare(token, to, sql));
        into_statement(outcome)
    }

    pub fn bind(&mut self, stmt: &Statement, values: serde_json::Value) -> Outcome {
        self.call_stmt(stmt, |s, token, to| s.bind(token, to, &values))
    }

    pub fn step(&mut self, stmt: &Statement) -> Outcome {
        self.call_stmt(stmt, |s, token, to| s.step(token, to))
    }

    /// Steps until done and returns every row.
    pub fn rows(&mut self, stmt: &Statement) -> Vec<Vec<sqlite_courier::Value>> {
        let mut rows = Vec::new();
        loop {
            match self.step(stmt) {
                Ok(Answer::Row(row)) => rows.push(row),
                Ok(Answer::Done) => return rows,
                other => panic!("unexpected step outcome: {other:?}"),
            }
        }
    }

    /// Waits for the next reply and checks it carries `token`.
    pub fn reply_for(&mut self, token: Token) -> Outcome {
        let reply = self.inbox.blocking_recv().expect("worker should reply");
        assert_eq!(reply.token, token, "replies arrived out of order");
        reply.outcome
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_thread_name_prefix("courier-test")
        .with_prepare_backoff_step(Duration::from_millis(1))
}

pub fn into_statement(outcome: Outcome) -> Statement {
    match outcome {
        Ok(Answer::Statement(stmt)) => stmt,
        other => panic!("expected a statement, got {other:?}"),
    }
}
