//! Statement lifecycle: prepare, bind validation, fallback, poisoning

mod common;

use common::*;
use maria_rs::constants::Command;
use maria_rs::{
    BatchOptions, Error, MySqlDialect, NoRowLocks, OracleModeDialect, Session, SqlType, Value,
};

fn open_session(
    caps: u64,
    classifier: SimpleClassifier,
) -> (Session<ScriptedTransport>, TransportHandle) {
    let (transport, handle) = ScriptedTransport::new(caps);
    let session = Session::new(
        transport,
        Box::new(classifier),
        Box::new(NoRowLocks),
        Box::new(MySqlDialect),
    );
    (session, handle)
}

#[test]
fn text_session_reports_fallback_and_skips_prepare() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("SELECT 1").unwrap();
    assert!(session.statement_uses_text_protocol(stmt).unwrap());
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn non_preparable_statement_falls_back_on_binary_session() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    // the classifier reports DDL as non-preparable
    let stmt = session.prepare("CREATE TABLE t (x INT)").unwrap();
    assert!(session.statement_uses_text_protocol(stmt).unwrap());
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn preparable_statement_prepares_once_and_reuses_handle() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    handle.push_packets(prepare_packets(42, 1, vec![int_column("N", false)]));

    let first = session.prepare("SELECT n FROM t WHERE id = ?").unwrap();
    let second = session.prepare("SELECT n FROM t WHERE id = ?").unwrap();
    assert_eq!(first, second);
    assert_eq!(handle.sent_count(), 1);
    assert_eq!(handle.sent_payload(0)[0], Command::StmtPrepare as u8);
    assert!(!session.statement_uses_text_protocol(first).unwrap());
}

#[test]
fn out_of_range_bind_fails_immediately() {
    let (mut session, _handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("SELECT * FROM t WHERE id = ?").unwrap();
    match session.bind(stmt, 2, Value::Int(1), SqlType::Int) {
        Err(Error::ParameterIndex { index: 2, count: 1 }) => {}
        other => panic!("expected ParameterIndex, got {:?}", other),
    }
    // the statement remains usable
    session.bind(stmt, 1, Value::Int(1), SqlType::Int).unwrap();
}

#[test]
fn unbound_ordinal_fails_dispatch() {
    let (mut session, _handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session
        .prepare("INSERT INTO t (a, b) VALUES (?, ?)")
        .unwrap();
    session.bind(stmt, 1, Value::Int(1), SqlType::Int).unwrap();
    match session.add_row(stmt) {
        Err(Error::MissingParameter { ordinal: 2 }) => {}
        other => panic!("expected MissingParameter, got {:?}", other),
    }
}

#[test]
fn unknown_statement_handle_is_rejected() {
    let (mut session, _handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    assert!(matches!(
        session.bind(99, 1, Value::Int(1), SqlType::Int),
        Err(Error::UnknownStatement(99))
    ));
    assert!(matches!(
        session.execute_batch(99, BatchOptions::new()),
        Err(Error::UnknownStatement(99))
    ));
}

#[test]
fn transport_timeout_poisons_session_until_reset() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = ? WHERE id = 1").unwrap();
    session.bind(stmt, 1, Value::Int(1), SqlType::Int).unwrap();
    session.add_row(stmt).unwrap();

    handle.push_fault(Error::Timeout);
    assert!(matches!(
        session.execute_batch(stmt, BatchOptions::new()),
        Err(Error::Timeout)
    ));
    assert!(session.must_reset());

    // every call fails until the owning pool resets the session
    assert!(matches!(
        session.bind(stmt, 1, Value::Int(2), SqlType::Int),
        Err(Error::SessionMustReset)
    ));
    assert!(matches!(
        session.execute_batch(stmt, BatchOptions::new()),
        Err(Error::SessionMustReset)
    ));

    session.reset_after_failure();
    assert!(!session.must_reset());
    session.bind(stmt, 1, Value::Int(2), SqlType::Int).unwrap();
}

#[test]
fn close_statement_releases_server_side_id() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    handle.push_packets(prepare_packets(7, 0, vec![]));
    let stmt = session.prepare("SELECT 1").unwrap();

    session.close_statement(stmt).unwrap();
    assert_eq!(handle.sent_count(), 2);
    let close = handle.sent_payload(1);
    assert_eq!(close[0], Command::StmtClose as u8);
    assert_eq!(u32::from_le_bytes(close[1..5].try_into().unwrap()), 7);

    assert!(matches!(
        session.bind(stmt, 1, Value::Int(1), SqlType::Int),
        Err(Error::UnknownStatement(_))
    ));
}

#[test]
fn oracle_dialect_changes_inlined_literals() {
    let (transport, handle) = ScriptedTransport::new(text_only_caps());
    let mut session = Session::new(
        transport,
        Box::new(SimpleClassifier::plain()),
        Box::new(NoRowLocks),
        Box::new(OracleModeDialect),
    );
    let stmt = session.prepare("INSERT INTO t (raw) VALUES (?)").unwrap();
    session
        .bind(stmt, 1, Value::from(&[0xDEu8, 0xAD][..]), SqlType::Bytes)
        .unwrap();
    session.add_row(stmt).unwrap();

    handle.push_packets(vec![ok_packet(1)]);
    session.execute_batch(stmt, BatchOptions::new()).unwrap();
    assert_eq!(
        handle.sent_sql(0),
        "INSERT INTO t (raw) VALUES (HEXTORAW('DEAD'))"
    );
}
