//! End-to-end tests for connections, statements and worker teardown.

// Integration tests use expect/unwrap/panic for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use common::{Session, into_statement, test_config};
use serde_json::json;
use sqlite_courier::{Answer, Connection, Error, ReplyError, Token, Value, mailbox};
use std::thread;

#[test]
fn test_insert_then_select_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = Session::open(&dir.path().join("fresh.db"));

    assert!(matches!(s.exec("create table t(a)"), Ok(Answer::Ok)));

    let insert = s.prepare("insert into t values (?)");
    assert!(matches!(s.bind(&insert, json!([1])), Ok(Answer::Ok)));
    assert!(matches!(s.step(&insert), Ok(Answer::Done)));

    let select = s.prepare("select a from t");
    match s.step(&select) {
        Ok(Answer::Row(row)) => assert_eq!(row, vec![Value::Integer(1)]),
        other => panic!("expected a row, got {other:?}"),
    }
    assert!(matches!(s.step(&select), Ok(Answer::Done)));
}

#[test]
fn test_done_is_idempotent() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table t(a)").unwrap();

    let insert = s.prepare("insert into t values (7)");
    for _ in 0..3 {
        assert!(matches!(s.step(&insert), Ok(Answer::Done)));
    }

    // Repeated steps after done did not run the insert again.
    let count = s.prepare("select count(*) from t");
    assert_eq!(s.rows(&count), vec![vec![Value::Integer(1)]]);
    assert!(matches!(s.step(&count), Ok(Answer::Done)));
}

#[test]
fn test_bind_resets_statement() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table t(a)").unwrap();

    let insert = s.prepare("insert into t values (?)");
    for n in 1..=3 {
        assert!(matches!(s.bind(&insert, json!([n])), Ok(Answer::Ok)));
        assert!(matches!(s.step(&insert), Ok(Answer::Done)));
    }

    let select = s.prepare("select a from t order by a");
    let rows = s.rows(&select);
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(1)],
            vec![Value::Integer(2)],
            vec![Value::Integer(3)]
        ]
    );
}

#[test]
fn test_bind_value_kinds() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table v(n, b, i, r, t, x)").unwrap();

    let insert = s.prepare("insert into v values (?, ?, ?, ?, ?, ?)");
    let outcome = s.bind(
        &insert,
        json!([null, true, -5, 0.25, "text", {"blob": "00ff"}]),
    );
    assert!(matches!(outcome, Ok(Answer::Ok)), "{outcome:?}");
    assert!(matches!(s.step(&insert), Ok(Answer::Done)));

    let select = s.prepare("select n, b, i, r, t, x from v");
    assert_eq!(
        s.rows(&select),
        vec![vec![
            Value::Null,
            Value::Integer(1),
            Value::Integer(-5),
            Value::Real(0.25),
            Value::Text("text".to_string()),
            Value::Blob(vec![0x00, 0xff]),
        ]]
    );
}

#[test]
fn test_bind_arity_mismatch_binds_nothing() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table t(a, b)").unwrap();

    let insert = s.prepare("insert into t values (?, ?)");
    assert!(matches!(s.bind(&insert, json!([10, 20])), Ok(Answer::Ok)));

    assert_eq!(
        s.bind(&insert, json!([1])).unwrap_err(),
        ReplyError::ArgsWrongLength {
            expected: 2,
            actual: 1
        }
    );
    assert_eq!(
        s.bind(&insert, json!([1, 2, 3])).unwrap_err(),
        ReplyError::ArgsWrongLength {
            expected: 2,
            actual: 3
        }
    );

    // The earlier bindings are untouched.
    assert!(matches!(s.step(&insert), Ok(Answer::Done)));
    let select = s.prepare("select a, b from t");
    assert_eq!(
        s.rows(&select),
        vec![vec![Value::Integer(10), Value::Integer(20)]]
    );
}

#[test]
fn test_bind_wrong_type_names_index() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let stmt = s.prepare("select ?, ?, ?");

    let outcome = s.bind(&stmt, json!([1, {"nested": true}, 3]));
    assert_eq!(outcome.unwrap_err(), ReplyError::WrongType { index: 1 });

    let outcome = s.bind(&stmt, json!([1, 2, [3]]));
    assert_eq!(outcome.unwrap_err(), ReplyError::WrongType { index: 2 });
}

#[test]
fn test_bind_requires_list() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let stmt = s.prepare("select ?");

    let result = stmt.bind(Token::new(), &s.reply_to, &json!(1));
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    // The rejected call produced no reply: the next reply belongs to step.
    assert!(matches!(s.step(&stmt), Ok(Answer::Row(_))));
}

#[test]
fn test_column_names_in_declaration_order() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let stmt = s.prepare("select 1 as zeta, 2 as alpha, 3 as mid");

    let outcome = s.call_stmt(&stmt, |st, token, to| st.column_names(token, to));
    match outcome {
        Ok(Answer::Columns(names)) => assert_eq!(names, vec!["zeta", "alpha", "mid"]),
        other => panic!("expected columns, got {other:?}"),
    }
}

#[test]
fn test_engine_errors_carry_text() {
    let mut s = Session::open(std::path::Path::new(":memory:"));

    match s.exec("insert into missing values (1)") {
        Err(ReplyError::Engine { message, .. }) => assert!(message.contains("no such table")),
        other => panic!("expected engine error, got {other:?}"),
    }
    match s.call(|conn, token, to| conn.prepare(token, to, "selec 1")) {
        Err(ReplyError::Engine { message, .. }) => assert!(message.contains("syntax error")),
        other => panic!("expected engine error, got {other:?}"),
    }

    // Errors are replies, not failures: the worker keeps going.
    assert!(matches!(s.exec("create table ok(a)"), Ok(Answer::Ok)));
}

#[test]
fn test_step_error_is_reported() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table u(a unique)").unwrap();
    s.exec("insert into u values (1)").unwrap();

    let insert = s.prepare("insert into u values (1)");
    assert!(matches!(s.step(&insert), Err(ReplyError::Engine { .. })));
}

#[test]
fn test_prepare_blank_sql() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let outcome = s.call(|conn, token, to| conn.prepare(token, to, "  -- nothing"));
    assert_eq!(outcome.unwrap_err(), ReplyError::NoPreparedStatement);
}

#[test]
fn test_not_open_before_open_and_after_close() {
    let mut s = Session::start();

    assert_eq!(s.exec("select 1").unwrap_err(), ReplyError::NotOpen);
    assert_eq!(
        s.call(|conn, token, to| conn.close(token, to)).unwrap_err(),
        ReplyError::NotOpen
    );

    let opened = s.call(|conn, token, to| conn.open(token, to, ":memory:"));
    assert!(matches!(opened, Ok(Answer::Ok)));
    let closed = s.call(|conn, token, to| conn.close(token, to));
    assert!(matches!(closed, Ok(Answer::Ok)));

    assert_eq!(s.exec("select 1").unwrap_err(), ReplyError::NotOpen);
    assert_eq!(
        s.call(|conn, token, to| conn.prepare(token, to, "select 1"))
            .unwrap_err(),
        ReplyError::NotOpen
    );
}

#[test]
fn test_open_twice_is_rejected() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let outcome = s.call(|conn, token, to| conn.open(token, to, ":memory:"));
    assert_eq!(outcome.unwrap_err(), ReplyError::AlreadyOpen);
}

#[test]
fn test_open_failure_reports_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("db.sqlite");
    let mut s = Session::start();

    let outcome = s.call(|conn, token, to| conn.open(token, to, path.to_str().unwrap()));
    assert!(matches!(outcome, Err(ReplyError::Engine { .. })), "{outcome:?}");

    // The failed open left no handle behind.
    assert_eq!(s.exec("select 1").unwrap_err(), ReplyError::NotOpen);
}

#[test]
fn test_close_refused_while_statement_alive() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    let stmt = s.prepare("select 1");

    let refused = s.call(|conn, token, to| conn.close(token, to));
    assert!(
        matches!(refused, Err(ref e) if e.is_engine_code(5)),
        "{refused:?}"
    );

    // Still open.
    assert!(matches!(s.exec("select 1"), Ok(Answer::Ok)));

    // The finalize queued by the drop runs before the close.
    drop(stmt);
    let closed = s.call(|conn, token, to| conn.close(token, to));
    assert!(matches!(closed, Ok(Answer::Ok)), "{closed:?}");
}

#[test]
fn test_statement_keeps_connection_alive() {
    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table t(a); insert into t values (1), (2)")
        .unwrap();
    let stmt = s.prepare("select a from t order by a");

    let conn_id = s.conn.id();
    let common::Session {
        conn,
        reply_to,
        mut inbox,
    } = s;
    drop(conn);

    assert!(stmt.connection().is_alive());
    assert_eq!(stmt.connection().id(), conn_id);

    let token = Token::new();
    stmt.step(token, &reply_to).unwrap();
    let reply = inbox.blocking_recv().unwrap();
    assert_eq!(reply.token, token);
    assert!(matches!(reply.outcome, Ok(Answer::Row(ref row)) if row == &[Value::Integer(1)]));

    // Releasing the statement is now the final release: stop, join, close.
    drop(stmt);
    drop(reply_to);
    assert!(inbox.blocking_recv().is_none());
}

#[test]
fn test_teardown_drains_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drain.db");
    let total = 200;

    {
        let mut s = Session::open(&path);
        s.exec("create table t(n)").unwrap();

        let tokens: Vec<Token> = (0..total)
            .map(|n| {
                let token = Token::new();
                s.conn
                    .exec(token, &s.reply_to, &format!("insert into t values ({n})"))
                    .unwrap();
                token
            })
            .collect();

        let common::Session {
            conn,
            reply_to,
            mut inbox,
        } = s;
        // Joins the worker after everything queued above has run.
        drop(conn);
        drop(reply_to);

        for token in tokens {
            let reply = inbox.try_recv().expect("queued command was replied");
            assert_eq!(reply.token, token);
            assert!(matches!(reply.outcome, Ok(Answer::Ok)));
        }
        // The stop command itself never replies.
        assert!(inbox.try_recv().is_none());
    }

    let mut check = Session::open(&path);
    let count = check.prepare("select count(*) from t");
    assert_eq!(check.rows(&count), vec![vec![Value::Integer(total)]]);
}

#[test]
fn test_fifo_across_producer_threads() {
    let producers: i64 = 6;
    let per_producer: i64 = 60;

    let mut s = Session::open(std::path::Path::new(":memory:"));
    s.exec("create table log(producer, seq)").unwrap();

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let conn = s.conn.clone();
            thread::spawn(move || {
                let (reply_to, mut inbox) = mailbox();
                let tokens: Vec<Token> = (0..per_producer)
                    .map(|i| {
                        let token = Token::new();
                        let sql = format!("insert into log values ({p}, {i})");
                        conn.exec(token, &reply_to, &sql).unwrap();
                        token
                    })
                    .collect();
                for token in tokens {
                    let reply = inbox.blocking_recv().unwrap();
                    assert_eq!(reply.token, token);
                    assert!(matches!(reply.outcome, Ok(Answer::Ok)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let select = s.prepare("select producer, seq from log order by rowid");
    let rows = s.rows(&select);
    assert_eq!(rows.len() as i64, producers * per_producer);

    let mut next = vec![0_i64; usize::try_from(producers).unwrap()];
    for row in rows {
        let producer = usize::try_from(row[0].as_i64().unwrap()).unwrap();
        let seq = row[1].as_i64().unwrap();
        assert_eq!(seq, next[producer], "producer {producer} reordered");
        next[producer] += 1;
    }
}

#[test]
fn test_closed_mailbox_is_rejected_synchronously() {
    let conn = Connection::start_with(test_config()).unwrap();
    let (reply_to, inbox) = mailbox();
    drop(inbox);

    assert!(matches!(
        conn.open(Token::new(), &reply_to, ":memory:"),
        Err(Error::InvalidDestination)
    ));
    assert_eq!(conn.queue_len(), 0);
}

#[test]
fn test_dropped_inbox_does_not_stall_worker() {
    let mut s = Session::open(std::path::Path::new(":memory:"));

    // A reply to a mailbox whose inbox is gone is dropped by the worker,
    // including a prepared statement, which is then finalized.
    let (lost_to, lost_inbox) = mailbox();
    s.conn.prepare(Token::new(), &lost_to, "select 1").unwrap();
    drop(lost_inbox);
    drop(lost_to);

    // Once the prepare has run, its statement is released and the finalize
    // is queued; the round trip below orders the close after it.
    assert!(matches!(s.exec("select 1"), Ok(Answer::Ok)));
    let closed = s.call(|conn, token, to| conn.close(token, to));
    assert!(matches!(closed, Ok(Answer::Ok)), "{closed:?}");
}

#[tokio::test]
async fn test_async_inbox() {
    let conn = Connection::start_with(test_config()).unwrap();
    let (reply_to, mut inbox) = mailbox();

    let open = Token::new();
    conn.open(open, &reply_to, ":memory:").unwrap();
    let exec = Token::new();
    conn.exec(exec, &reply_to, "create table t(a)").unwrap();

    let first = inbox.recv().await.unwrap();
    assert_eq!(first.token, open);
    assert!(matches!(first.outcome, Ok(Answer::Ok)));

    let second = inbox.recv().await.unwrap();
    assert_eq!(second.token, exec);
    assert!(matches!(second.outcome, Ok(Answer::Ok)));

    let stmt = {
        let token = Token::new();
        conn.prepare(token, &reply_to, "select a from t").unwrap();
        into_statement(inbox.recv().await.unwrap().outcome)
    };
    assert_eq!(stmt.connection().id(), conn.id());
}
