//! Batch dispatch strategies and failure semantics over a scripted session

mod common;

use common::*;
use maria_rs::constants::Command;
use maria_rs::{
    BatchOptions, CursorMode, Error, MySqlDialect, NoRowLocks, QueryOptions, RowOutcome, Session,
    SqlType, Value,
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

fn bind_rows(session: &mut Session<ScriptedTransport>, stmt: u32, values: &[i64]) {
    for v in values {
        session.bind(stmt, 1, Value::Int(*v), SqlType::Int).unwrap();
        session.add_row(stmt).unwrap();
    }
}

#[test]
fn abort_truncates_outcomes_before_failing_row() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = 0 WHERE id = ?").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3, 4, 5]);

    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![err_packet(1048, "Column 'a' cannot be null")]);

    match session.execute_batch(stmt, BatchOptions::new()) {
        Err(Error::Batch {
            row_index,
            outcomes,
            source,
        }) => {
            assert_eq!(row_index, 2);
            assert_eq!(outcomes.len(), 2);
            assert!(outcomes.iter().all(|o| matches!(o, RowOutcome::RowsAffected(1))));
            assert!(matches!(*source, Error::Server { code: 1048, .. }));
        }
        other => panic!("expected Batch error, got {:?}", other),
    }
}

#[test]
fn continue_on_error_yields_one_outcome_per_submitted_row() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = 0 WHERE id = ?").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3, 4, 5]);

    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![err_packet(1048, "Column 'a' cannot be null")]);
    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![ok_packet(1)]);

    let outcomes = session
        .execute_batch(stmt, BatchOptions::new().with_continue_on_error())
        .unwrap();
    assert_eq!(outcomes.len(), 5);
    assert!(matches!(outcomes[2], RowOutcome::Failed(ref f) if f.code == 1048));
    for (i, outcome) in outcomes.iter().enumerate() {
        if i != 2 {
            assert!(matches!(outcome, RowOutcome::RowsAffected(1)));
        }
    }
}

#[test]
fn bulk_strategy_sends_one_frame_with_per_row_outcomes() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::keyed("t", &["ID"]));
    handle.push_packets(prepare_packets(1, 1, vec![]));
    let stmt = session.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    handle.push_packets(vec![ok_packet(1), ok_packet(1), ok_packet(1)]);
    let outcomes = session.execute_batch(stmt, BatchOptions::new()).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(o, RowOutcome::RowsAffected(1))));

    // one prepare frame, then exactly one bulk frame
    assert_eq!(handle.sent_count(), 2);
    assert_eq!(handle.sent_payload(1)[0], Command::StmtBulkExecute as u8);
}

#[test]
fn bulk_abort_keeps_rows_processed_before_failure() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::keyed("t", &["ID"]));
    handle.push_packets(prepare_packets(1, 1, vec![]));
    let stmt = session.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    handle.push_packets(vec![ok_packet(1), err_packet(1062, "Duplicate entry")]);
    match session.execute_batch(stmt, BatchOptions::new()) {
        Err(Error::Batch {
            row_index, outcomes, ..
        }) => {
            assert_eq!(row_index, 1);
            assert_eq!(outcomes.len(), 1);
        }
        other => panic!("expected Batch error, got {:?}", other),
    }
}

#[test]
fn rewrite_folds_rows_and_reports_unknown_counts() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    handle.push_packets(vec![ok_packet(3)]);
    let outcomes = session
        .execute_batch(stmt, BatchOptions::new().with_rewrite())
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(o, RowOutcome::SuccessUnknownCount)));
    assert_eq!(
        handle.sent_sql(0),
        "INSERT INTO t (id) VALUES (1), (2), (3)"
    );
}

#[test]
fn rewrite_chunk_failure_replays_rows_individually() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    // the folded command fails; each row of the chunk replays alone
    handle.push_packets(vec![err_packet(1062, "Duplicate entry")]);
    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![err_packet(1062, "Duplicate entry")]);
    handle.push_packets(vec![ok_packet(1)]);

    let outcomes = session
        .execute_batch(
            stmt,
            BatchOptions::new().with_rewrite().with_continue_on_error(),
        )
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], RowOutcome::SuccessUnknownCount));
    assert!(matches!(outcomes[1], RowOutcome::Failed(ref f) if f.code == 1062));
    assert!(matches!(outcomes[2], RowOutcome::SuccessUnknownCount));
    assert_eq!(handle.sent_sql(2), "INSERT INTO t (id) VALUES (2)");
}

#[test]
fn rewrite_without_continue_fails_whole_chunk() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("INSERT INTO t (id) VALUES (?)").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    handle.push_packets(vec![err_packet(1062, "Duplicate entry")]);
    match session.execute_batch(stmt, BatchOptions::new().with_rewrite()) {
        Err(Error::Batch {
            row_index, outcomes, ..
        }) => {
            assert_eq!(row_index, 0);
            assert!(outcomes.is_empty());
        }
        other => panic!("expected Batch error, got {:?}", other),
    }
}

#[test]
fn multi_statement_sends_one_frame_per_chunk() {
    let caps = maria_rs::constants::capability::PROTOCOL_41
        | maria_rs::constants::capability::MULTI_STATEMENTS;
    let (mut session, handle) = open_session(caps, SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = 0 WHERE id = ?").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    handle.push_packets(vec![ok_packet(1), ok_packet(1), ok_packet(1)]);
    let outcomes = session.execute_batch(stmt, BatchOptions::new()).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(handle.sent_count(), 1);
    assert_eq!(
        handle.sent_sql(0),
        "UPDATE t SET a = 0 WHERE id = 1; UPDATE t SET a = 0 WHERE id = 2; UPDATE t SET a = 0 WHERE id = 3"
    );
}

#[test]
fn multi_statement_resubmits_tail_after_mid_frame_error() {
    let caps = maria_rs::constants::capability::PROTOCOL_41
        | maria_rs::constants::capability::MULTI_STATEMENTS;
    let (mut session, handle) = open_session(caps, SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = 0 WHERE id = ?").unwrap();
    bind_rows(&mut session, stmt, &[1, 2, 3]);

    // the server stops the frame at the failing statement
    handle.push_packets(vec![ok_packet(1), err_packet(1048, "Column 'a' cannot be null")]);
    handle.push_packets(vec![ok_packet(1)]);

    let outcomes = session
        .execute_batch(stmt, BatchOptions::new().with_continue_on_error())
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], RowOutcome::RowsAffected(1)));
    assert!(matches!(outcomes[1], RowOutcome::Failed(_)));
    assert!(matches!(outcomes[2], RowOutcome::RowsAffected(1)));
}

#[test]
fn empty_batch_dispatches_nothing() {
    let (mut session, handle) = open_session(text_only_caps(), SimpleClassifier::plain());
    let stmt = session.prepare("UPDATE t SET a = 0 WHERE id = ?").unwrap();
    let outcomes = session.execute_batch(stmt, BatchOptions::new()).unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn byte_array_batch_reads_back_in_insertion_order() {
    let (mut session, handle) = open_session(plain_binary_caps(), SimpleClassifier::plain());

    handle.push_packets(prepare_packets(1, 1, vec![]));
    let insert = session.prepare("INSERT INTO blobs (data) VALUES (?)").unwrap();

    session
        .bind(insert, 1, Value::from(&b""[..]), SqlType::Bytes)
        .unwrap();
    session.add_row(insert).unwrap();
    session
        .bind(insert, 1, Value::from(&b"hello"[..]), SqlType::Bytes)
        .unwrap();
    session.add_row(insert).unwrap();
    session.bind(insert, 1, Value::Null, SqlType::Bytes).unwrap();
    session.add_row(insert).unwrap();

    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![ok_packet(1)]);
    handle.push_packets(vec![ok_packet(1)]);
    let outcomes = session.execute_batch(insert, BatchOptions::new()).unwrap();
    assert_eq!(outcomes.len(), 3);

    let cols = vec![blob_column("DATA")];
    handle.push_packets(prepare_packets(2, 0, cols.clone()));
    let select = session.prepare("SELECT data FROM blobs ORDER BY id").unwrap();

    let rows = vec![
        vec![Value::from(&b""[..])],
        vec![Value::from(&b"hello"[..])],
        vec![Value::Null],
    ];
    handle.push_packets(resultset_packets(&cols, &rows, true, false, 0));
    let cursor = session
        .execute_query(
            select,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    assert!(session.cursor_next(cursor).unwrap());
    assert_eq!(session.get_raw(cursor, 0).unwrap().as_bytes().unwrap().len(), 0);
    assert!(session.cursor_next(cursor).unwrap());
    assert_eq!(session.get_raw(cursor, 0).unwrap().as_bytes().unwrap().len(), 5);
    assert!(session.cursor_next(cursor).unwrap());
    assert!(session.get_raw(cursor, 0).unwrap().is_null());
    assert!(!session.cursor_next(cursor).unwrap());
}
