//! Cursor navigation and mutation over a scripted session

mod common;

use common::*;
use maria_rs::{
    Concurrency, CursorMode, Error, MySqlDialect, NoRowLocks, QueryOptions, Session, SqlType,
    Value,
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

fn numbered_rows(n: i64) -> Vec<Vec<Value>> {
    (1..=n).map(|i| vec![Value::Int(i)]).collect()
}

#[test]
fn snapshot_walk_matches_absolute_jumps() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &numbered_rows(10), true, true, 0));

    let stmt = session.prepare("SELECT n FROM numbers ORDER BY n").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    let mut walked = Vec::new();
    while session.cursor_next(cursor).unwrap() {
        walked.push(session.get_value(cursor, 0, SqlType::BigInt).unwrap());
    }
    assert_eq!(walked.len(), 10);

    for (k, expected) in walked.iter().enumerate() {
        assert!(session.cursor_absolute(cursor, k as i64 + 1).unwrap());
        assert_eq!(&session.get_value(cursor, 0, SqlType::BigInt).unwrap(), expected);
    }

    // absolute(-1) lands where last() lands
    assert!(session.cursor_absolute(cursor, -1).unwrap());
    let from_absolute = session.get_raw(cursor, 0).unwrap();
    assert!(session.cursor_last(cursor).unwrap());
    assert_eq!(session.get_raw(cursor, 0).unwrap(), from_absolute);
    assert_eq!(from_absolute, Value::Int(10));
}

#[test]
fn empty_result_set_has_no_boundaries() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &[], true, true, 0));

    let stmt = session.prepare("SELECT n FROM empty_table").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    assert!(!session.cursor_next(cursor).unwrap());
    assert!(!session.cursor_first(cursor).unwrap());
    assert!(!session.cursor_last(cursor).unwrap());
    assert!(!session.cursor_absolute(cursor, 1).unwrap());
    assert!(!session.cursor_relative(cursor, 1).unwrap());
    assert!(!session.cursor_previous(cursor).unwrap());
    assert!(!session.cursor_is_before_first(cursor).unwrap());
    assert!(!session.cursor_is_after_last(cursor).unwrap());
}

#[test]
fn first_then_relative_back_leaves_cursor_before_first() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &numbered_rows(100), true, true, 0));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    assert!(session.cursor_first(cursor).unwrap());
    assert!(!session.cursor_relative(cursor, -1).unwrap());
    assert!(session.cursor_is_before_first(cursor).unwrap());
    assert!(!session.cursor_is_after_last(cursor).unwrap());
}

#[test]
fn forward_only_streams_through_fetch_windows() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    // the server opens a cursor: column block only, no rows
    handle.push_packets(resultset_packets(
        &cols,
        &[],
        true,
        true,
        maria_rs::constants::status::CURSOR_EXISTS,
    ));
    handle.push_packets(fetch_packets(&cols, &numbered_rows(2), false));
    handle.push_packets(fetch_packets(&cols, &[vec![Value::Int(3)]], true));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let cursor = session.execute_query(stmt, QueryOptions::new()).unwrap();

    let mut seen = Vec::new();
    while session.cursor_next(cursor).unwrap() {
        seen.push(session.get_raw(cursor, 0).unwrap());
    }
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert!(session.cursor_is_after_last(cursor).unwrap());

    // prepare, execute, two fetches
    assert_eq!(handle.sent_count(), 4);
    assert_eq!(handle.sent_payload(2)[0], 0x1c);

    match session.cursor_absolute(cursor, 1) {
        Err(Error::UnsupportedNavigation { mode, .. }) => assert_eq!(mode, "forward-only"),
        other => panic!("expected UnsupportedNavigation, got {:?}", other),
    }
}

#[test]
fn scroll_sensitive_refetches_on_navigation() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(
        &cols,
        &[],
        true,
        true,
        maria_rs::constants::status::CURSOR_EXISTS,
    ));
    // open-time snapshot drain
    handle.push_packets(fetch_packets(&cols, &numbered_rows(3), true));
    // navigation to row 2 re-fetches it, seeing an external update
    handle.push_packets(fetch_packets(&cols, &[vec![Value::Int(99)]], true));
    // row 3 was deleted externally: the re-fetch comes back empty
    handle.push_packets(fetch_packets(&cols, &[], true));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollSensitive),
        )
        .unwrap();

    assert!(session.cursor_absolute(cursor, 2).unwrap());
    assert_eq!(session.get_raw(cursor, 0).unwrap(), Value::Int(99));

    assert!(session.cursor_absolute(cursor, 3).unwrap());
    assert_eq!(session.get_raw(cursor, 0).unwrap(), Value::Null);
}

#[test]
fn updatable_without_key_degrades_to_read_only() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &numbered_rows(2), true, true, 0));

    let stmt = session.prepare("SELECT n FROM v_numbers").unwrap();
    // opening succeeds: the degrade is transparent, not an error
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new()
                .with_mode(CursorMode::ScrollInsensitive)
                .updatable(),
        )
        .unwrap();

    assert!(session.cursor_first(cursor).unwrap());
    match session.update_value(cursor, 0, Value::Int(9)) {
        Err(Error::NotSupported(_)) => {}
        other => panic!("expected NotSupported, got {:?}", other),
    }
}

#[test]
fn updatable_cursor_stages_and_commits_mutations() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::keyed("t", &["ID"]));
    let cols = vec![int_column("ID", true), text_column("NAME")];
    let rows = vec![
        vec![Value::Int(1), Value::Text("alice".into())],
        vec![Value::Int(2), Value::Text("bob".into())],
    ];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &rows, true, true, 0));

    let stmt = session.prepare("SELECT id, name FROM t").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new()
                .with_mode(CursorMode::ScrollInsensitive)
                .updatable(),
        )
        .unwrap();

    // update the second row
    assert!(session.cursor_absolute(cursor, 2).unwrap());
    session.update_value(cursor, 1, Value::Text("zed".into())).unwrap();
    handle.push_packets(vec![ok_packet(1)]);
    session.update_row(cursor).unwrap();
    assert_eq!(handle.sent_sql(2), "UPDATE `t` SET `NAME` = 'zed' WHERE `ID` = 2");
    assert_eq!(session.get_raw(cursor, 1).unwrap(), Value::Text("zed".into()));

    // insert through the staging row
    session.move_to_insert_row(cursor).unwrap();
    session.update_value(cursor, 0, Value::Int(3)).unwrap();
    session.update_value(cursor, 1, Value::Text("carol".into())).unwrap();
    handle.push_packets(vec![ok_packet(1)]);
    session.insert_row(cursor).unwrap();
    assert_eq!(
        handle.sent_sql(3),
        "INSERT INTO `t` (`ID`, `NAME`) VALUES (3, 'carol')"
    );
    session.move_to_current_row(cursor).unwrap();

    // delete the current row: position holds, reads serve pre-delete values
    handle.push_packets(vec![ok_packet(1)]);
    session.delete_row(cursor).unwrap();
    assert_eq!(handle.sent_sql(4), "DELETE FROM `t` WHERE `ID` = 2");
    assert_eq!(session.get_raw(cursor, 1).unwrap(), Value::Text("zed".into()));
}

#[test]
fn refresh_row_refetches_current_values_by_key() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::keyed("t", &["ID"]));
    let cols = vec![int_column("ID", true), text_column("NAME")];
    let rows = vec![vec![Value::Int(1), Value::Text("old".into())]];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &rows, true, true, 0));

    let stmt = session.prepare("SELECT id, name FROM t").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new()
                .with_mode(CursorMode::ScrollInsensitive)
                .updatable(),
        )
        .unwrap();

    assert!(session.cursor_first(cursor).unwrap());
    handle.push_packets(resultset_packets(
        &cols,
        &[vec![Value::Int(1), Value::Text("new".into())]],
        false,
        false,
        0,
    ));
    session.refresh_row(cursor).unwrap();
    assert_eq!(handle.sent_sql(2), "SELECT `ID`, `NAME` FROM `t` WHERE `ID` = 1");
    assert_eq!(session.get_raw(cursor, 1).unwrap(), Value::Text("new".into()));
}

#[test]
fn refresh_row_unsupported_on_read_only() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &numbered_rows(1), true, true, 0));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();
    assert!(session.cursor_first(cursor).unwrap());
    assert!(matches!(
        session.refresh_row(cursor),
        Err(Error::NotSupported(_))
    ));
}

#[test]
fn reexecution_invalidates_previous_cursor() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(&cols, &numbered_rows(2), true, true, 0));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let first = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    handle.push_packets(resultset_packets(&cols, &numbered_rows(2), true, true, 0));
    let second = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();
    assert_ne!(first, second);

    assert!(matches!(
        session.cursor_next(first),
        Err(Error::CursorClosed)
    ));
    assert!(session.cursor_next(second).unwrap());
}

#[test]
fn second_cursor_invalidates_unexhausted_forward_cursor() {
    let (mut session, handle) = open_session(full_caps(), SimpleClassifier::plain());
    let cols = vec![int_column("N", false)];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(
        &cols,
        &[],
        true,
        true,
        maria_rs::constants::status::CURSOR_EXISTS,
    ));
    handle.push_packets(fetch_packets(&cols, &numbered_rows(2), false));

    let stmt = session.prepare("SELECT n FROM numbers").unwrap();
    let forward = session.execute_query(stmt, QueryOptions::new()).unwrap();
    assert!(session.cursor_next(forward).unwrap());

    handle.push_packets(prepare_packets(2, 0, cols.clone()));
    // the reset of the first cursor's server cursor consumes one reply slot
    handle.push_packets(vec![ok_packet(0)]);
    handle.push_packets(resultset_packets(&cols, &numbered_rows(1), true, true, 0));

    let other = session.prepare("SELECT n FROM other").unwrap();
    let second = session
        .execute_query(
            other,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();

    assert!(matches!(
        session.cursor_next(forward),
        Err(Error::CursorClosed)
    ));
    assert!(session.cursor_next(second).unwrap());
}

#[test]
fn updatable_concurrency_is_visible_on_cursor() {
    let rows = vec![vec![Value::Int(1)]];
    let cursor = maria_rs::Cursor::new_snapshot(
        7,
        1,
        CursorMode::ScrollInsensitive,
        Concurrency::Updatable,
        10,
        vec![int_column("ID", true)],
        rows.into_iter().map(maria_rs::Row::new).collect(),
        None,
        Some(maria_rs::UpdateTarget {
            table: "t".to_string(),
            key_columns: vec!["ID".to_string()],
        }),
    );
    assert_eq!(cursor.concurrency(), Concurrency::Updatable);
    assert!(!cursor.degraded_to_read_only());
}
