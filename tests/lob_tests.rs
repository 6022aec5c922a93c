//! Large-object locator streaming over a scripted session

mod common;

use bytes::Bytes;
use common::*;
use maria_rs::constants::Command;
use maria_rs::protocol::{LobOpAck, LobPieceData};
use maria_rs::{
    CursorMode, Error, LobHandle, LobKind, LobLocator, MySqlDialect, NoRowLocks, QueryOptions,
    Session, Value,
};

fn locked_session(
    classifier: SimpleClassifier,
) -> (Session<ScriptedTransport>, TransportHandle) {
    let (transport, handle) = ScriptedTransport::new(full_caps());
    let session = Session::new(
        transport,
        Box::new(classifier),
        Box::new(AllRowsLocked),
        Box::new(MySqlDialect),
    );
    (session, handle)
}

fn source_bytes() -> Vec<u8> {
    (0..1000u32).map(|i| (i % 251) as u8).collect()
}

#[test]
fn truncate_then_read_back_single_byte_of_offset_view() {
    // a server-side LOB of 750 bytes, the offset-50 view of a 1000-byte source
    let source = source_bytes();
    let locator = LobLocator::new(
        Bytes::from_static(&[0x10, 0x20]),
        750,
        4096,
        LobKind::Blob,
        "docs",
        "id=7",
    );

    let (mut session, handle) = locked_session(SimpleClassifier::keyed("docs", &["ID"]));
    let cols = vec![blob_column("BODY")];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(
        &cols,
        &[vec![Value::Lob(LobHandle::locator(locator))]],
        true,
        true,
        0,
    ));

    let stmt = session.prepare("SELECT body FROM docs WHERE id = 7").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();
    assert!(session.cursor_next(cursor).unwrap());

    let mut lob = session.open_lob(cursor, 0).unwrap();
    assert_eq!(lob.len(), 750);

    handle.push_packets(vec![LobOpAck::encode(1).unwrap()]);
    let new_len = session.lob_truncate(&mut lob, 1).unwrap();
    assert_eq!(new_len, 1);
    assert_eq!(lob.len(), 1);
    let trim_frame = handle.sent_payload(2);
    assert_eq!(trim_frame[0], Command::LobPiece as u8);

    // a read past the truncated end returns only the remaining byte, which is
    // the source byte at offset 50
    handle.push_packets(vec![LobPieceData::encode(&source[50..51]).unwrap()]);
    let data = session.lob_read(&lob, 0, 10).unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0], source[50]);
}

#[test]
fn locator_mutation_requires_row_lock() {
    let (transport, handle) = ScriptedTransport::new(full_caps());
    let mut session = Session::new(
        transport,
        Box::new(SimpleClassifier::plain()),
        Box::new(NoRowLocks),
        Box::new(MySqlDialect),
    );

    let mut lob = LobHandle::locator(LobLocator::new(
        Bytes::from_static(&[1]),
        100,
        4096,
        LobKind::Blob,
        "docs",
        "id=1",
    ));
    match session.lob_write(&mut lob, 0, b"x") {
        Err(Error::RowNotLocked { table, key }) => {
            assert_eq!(table, "docs");
            assert_eq!(key, "id=1");
        }
        other => panic!("expected RowNotLocked, got {:?}", other),
    }
    assert!(matches!(
        session.lob_truncate(&mut lob, 1),
        Err(Error::RowNotLocked { .. })
    ));
    // the violation is caught before anything reaches the wire
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn locked_write_updates_locator_length() {
    let (mut session, handle) = locked_session(SimpleClassifier::plain());
    let mut lob = LobHandle::locator(LobLocator::new(
        Bytes::from_static(&[1]),
        100,
        4096,
        LobKind::Blob,
        "docs",
        "id=1",
    ));

    handle.push_packets(vec![LobOpAck::encode(105).unwrap()]);
    let new_len = session.lob_write(&mut lob, 100, b"tail!").unwrap();
    assert_eq!(new_len, 105);
    assert_eq!(lob.len(), 105);
}

#[test]
fn loaded_handle_reads_short_and_rejects_mutation() {
    let (mut session, _handle) = locked_session(SimpleClassifier::plain());
    let mut lob = LobHandle::loaded(LobKind::Blob, Bytes::from_static(b"hello world"));

    assert_eq!(session.lob_read(&lob, 6, 100).unwrap().as_ref(), b"world");
    assert_eq!(session.lob_read(&lob, 50, 10).unwrap().len(), 0);
    assert!(matches!(
        session.lob_write(&mut lob, 0, b"x"),
        Err(Error::LobNotLocator("write"))
    ));
}

#[test]
fn handles_are_independent_copies_keyed_to_their_origin() {
    let (mut session, handle) = locked_session(SimpleClassifier::plain());
    let cols = vec![blob_column("BODY")];
    handle.push_packets(prepare_packets(1, 0, cols.clone()));
    handle.push_packets(resultset_packets(
        &cols,
        &[vec![Value::from(&b"payload"[..])]],
        true,
        true,
        0,
    ));

    let stmt = session.prepare("SELECT body FROM docs").unwrap();
    let cursor = session
        .execute_query(
            stmt,
            QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
        )
        .unwrap();
    assert!(session.cursor_next(cursor).unwrap());

    let first = session.open_lob(cursor, 0).unwrap();
    let second = session.open_lob(cursor, 0).unwrap();
    let origin = first.origin().unwrap();
    assert_eq!((origin.cursor_id, origin.row, origin.column), (cursor, 0, 0));
    assert_eq!(second.origin().unwrap().row, 0);

    // closing the cursor leaves the handles fully readable: they hold a
    // lookup key, not a reference into the cursor's buffers
    session.close_cursor(cursor).unwrap();
    assert_eq!(session.lob_read(&first, 0, 100).unwrap().as_ref(), b"payload");
    assert_eq!(session.lob_read(&second, 0, 100).unwrap().as_ref(), b"payload");
}
