//! Shared test harness: a scripted transport and reply builders
//!
//! The scripted transport plays back pre-encoded server replies in order and
//! records every request frame, so tests can drive a full session without a
//! server and then assert on the exact wire traffic.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;

use maria_rs::buffer::WriteBuffer;
use maria_rs::constants::{capability, column_flags, status, FieldType};
use maria_rs::protocol::command::encode_err_packet;
use maria_rs::protocol::resultset::{
    write_binary_row, write_column_definition, write_text_row, TerminalPacket,
};
use maria_rs::protocol::{ExecOutcome, PrepareResponse};
use maria_rs::{
    ColumnInfo, Error, Result, SessionTransport, StatementClassifier, StatementInfo,
    StatementKind, Value,
};

/// Default frame limit for scripted sessions
pub const TEST_MAX_FRAME: usize = 16 * 1024;

struct Inner {
    replies: VecDeque<std::result::Result<Bytes, Error>>,
    sent: Vec<Bytes>,
    max_frame: usize,
}

/// Scripted transport: replays queued replies, records sent frames
pub struct ScriptedTransport {
    inner: Rc<RefCell<Inner>>,
    caps: u64,
}

/// Test-side handle onto a scripted transport's queue and log
#[derive(Clone)]
pub struct TransportHandle {
    inner: Rc<RefCell<Inner>>,
}

impl ScriptedTransport {
    /// Create a transport advertising the given capability bits
    pub fn new(caps: u64) -> (Self, TransportHandle) {
        let inner = Rc::new(RefCell::new(Inner {
            replies: VecDeque::new(),
            sent: Vec::new(),
            max_frame: TEST_MAX_FRAME,
        }));
        (
            Self {
                inner: inner.clone(),
                caps,
            },
            TransportHandle { inner },
        )
    }

    /// Override the advertised frame limit
    pub fn with_max_frame(self, max_frame: usize) -> Self {
        self.inner.borrow_mut().max_frame = max_frame;
        self
    }
}

impl SessionTransport for ScriptedTransport {
    fn send(&mut self, frame: Bytes) -> Result<Bytes> {
        let mut inner = self.inner.borrow_mut();
        inner.sent.push(frame);
        match inner.replies.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(err)) => Err(err),
            // commands without a scripted reply (close/reset/long-data)
            None => Ok(Bytes::new()),
        }
    }

    fn negotiated_capabilities(&self) -> u64 {
        self.caps
    }

    fn max_frame_size(&self) -> usize {
        self.inner.borrow().max_frame
    }
}

impl TransportHandle {
    /// Queue one reply made of the given packets
    pub fn push_packets(&self, packets: Vec<Bytes>) {
        let reply = frame_reply(&packets);
        self.inner.borrow_mut().replies.push_back(Ok(reply));
    }

    /// Queue a transport-level fault (timeout, cancel)
    pub fn push_fault(&self, err: Error) {
        self.inner.borrow_mut().replies.push_back(Err(err));
    }

    /// Number of frames sent so far
    pub fn sent_count(&self) -> usize {
        self.inner.borrow().sent.len()
    }

    /// Raw payload of sent frame `index` (header stripped)
    pub fn sent_payload(&self, index: usize) -> Vec<u8> {
        let inner = self.inner.borrow();
        inner.sent[index][4..].to_vec()
    }

    /// SQL text of sent frame `index`, assuming a text command
    pub fn sent_sql(&self, index: usize) -> String {
        let payload = self.sent_payload(index);
        String::from_utf8_lossy(&payload[1..]).into_owned()
    }
}

/// Frame reply packets the way the server would (header + sequence per packet)
pub fn frame_reply(packets: &[Bytes]) -> Bytes {
    let mut buf = WriteBuffer::new();
    for (seq, packet) in packets.iter().enumerate() {
        buf.write_u24_le(packet.len() as u32).unwrap();
        buf.write_u8(seq as u8).unwrap();
        buf.write_bytes(packet).unwrap();
    }
    buf.freeze()
}

// =============================================================================
// Packet builders
// =============================================================================

/// An OK packet reporting `rows_affected`
pub fn ok_packet(rows_affected: u64) -> Bytes {
    ExecOutcome {
        rows_affected,
        last_insert_id: 0,
        status: 0,
        warnings: 0,
    }
    .encode()
    .unwrap()
}

/// An ERR packet
pub fn err_packet(code: u16, message: &str) -> Bytes {
    encode_err_packet(code, "HY000", message).unwrap()
}

/// An EOF packet with the given status flags
pub fn eof_packet(status_flags: u16) -> Bytes {
    TerminalPacket::encode_eof(0, status_flags).unwrap()
}

/// The packets of a complete result set
pub fn resultset_packets(
    columns: &[ColumnInfo],
    rows: &[Vec<Value>],
    binary: bool,
    lob_locators: bool,
    terminal_status: u16,
) -> Vec<Bytes> {
    let mut packets = Vec::new();
    let mut head = WriteBuffer::new();
    head.write_lenenc_int(columns.len() as u64).unwrap();
    packets.push(head.freeze());
    for col in columns {
        packets.push(write_column_definition(col).unwrap());
    }
    packets.push(eof_packet(0));
    for row in rows {
        if binary {
            packets.push(write_binary_row(row, columns, lob_locators).unwrap());
        } else {
            packets.push(write_text_row(row).unwrap());
        }
    }
    packets.push(eof_packet(terminal_status));
    packets
}

/// The packets of a prepare reply
pub fn prepare_packets(statement_id: u32, param_count: u16, columns: Vec<ColumnInfo>) -> Vec<Bytes> {
    PrepareResponse {
        statement_id,
        param_count,
        columns,
        warnings: 0,
    }
    .encode()
    .unwrap()
}

/// The packets of a fetch reply: a row window plus its terminator
pub fn fetch_packets(columns: &[ColumnInfo], rows: &[Vec<Value>], last: bool) -> Vec<Bytes> {
    let mut packets = Vec::new();
    for row in rows {
        packets.push(write_binary_row(row, columns, false).unwrap());
    }
    packets.push(eof_packet(if last { status::LAST_ROW_SENT } else { 0 }));
    packets
}

// =============================================================================
// Column shorthands
// =============================================================================

/// An INT column, optionally flagged as the primary key
pub fn int_column(name: &str, key: bool) -> ColumnInfo {
    let mut col = ColumnInfo::new(name, FieldType::Long);
    if key {
        col.flags |= column_flags::PRI_KEY;
    }
    col
}

/// A VARCHAR column
pub fn text_column(name: &str) -> ColumnInfo {
    ColumnInfo::new(name, FieldType::VarString)
}

/// A BLOB column (binary collation)
pub fn blob_column(name: &str) -> ColumnInfo {
    let mut col = ColumnInfo::new(name, FieldType::Blob);
    col.flags |= column_flags::BINARY;
    col
}

// =============================================================================
// Capability presets
// =============================================================================

/// Everything the engine can drive
pub fn full_caps() -> u64 {
    capability::PROTOCOL_41
        | capability::MULTI_STATEMENTS
        | capability::DEPRECATE_EOF
        | capability::BINARY_PROTOCOL
        | capability::STMT_BULK_OPERATIONS
        | capability::SCROLLABLE_CURSORS
        | capability::LOB_LOCATORS
}

/// Text protocol only
pub fn text_only_caps() -> u64 {
    capability::PROTOCOL_41
}

/// Binary protocol without bulk or scroll support
pub fn plain_binary_caps() -> u64 {
    capability::PROTOCOL_41 | capability::BINARY_PROTOCOL
}

// =============================================================================
// Classifier stub
// =============================================================================

/// A small stand-in for the external SQL analyzer
///
/// Counts `?` placeholders outside quoted runs, keys the statement kind off
/// the first keyword, and reports the configured base table and key columns
/// for every statement it sees.
pub struct SimpleClassifier {
    /// Base table reported for keyed-mutation resolution
    pub single_table: Option<String>,
    /// Key columns reported alongside the table
    pub key_columns: Vec<String>,
}

impl SimpleClassifier {
    /// A classifier that reports no keyed-mutation target
    pub fn plain() -> Self {
        Self {
            single_table: None,
            key_columns: Vec::new(),
        }
    }

    /// A classifier resolving every statement to `table` keyed by `keys`
    pub fn keyed(table: &str, keys: &[&str]) -> Self {
        Self {
            single_table: Some(table.to_string()),
            key_columns: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl StatementClassifier for SimpleClassifier {
    fn classify(&self, sql: &str) -> StatementInfo {
        let mut placeholders = 0;
        let mut quote: Option<char> = None;
        for ch in sql.chars() {
            match quote {
                Some(q) => {
                    if ch == q {
                        quote = None;
                    }
                }
                None => match ch {
                    '\'' | '"' | '`' => quote = Some(ch),
                    '?' => placeholders += 1,
                    _ => {}
                },
            }
        }
        let upper = sql.trim_start().to_ascii_uppercase();
        let kind = if upper.starts_with("SELECT") {
            StatementKind::Dql
        } else if upper.starts_with("INSERT")
            || upper.starts_with("UPDATE")
            || upper.starts_with("DELETE")
        {
            StatementKind::Dml
        } else if upper.starts_with("CALL") {
            StatementKind::Call
        } else {
            StatementKind::Ddl
        };
        StatementInfo {
            placeholder_count: placeholders,
            rewritable: upper.starts_with("INSERT") && upper.contains("VALUES"),
            kind,
            preparable: kind != StatementKind::Ddl,
            single_table: self.single_table.clone(),
            key_columns: self.key_columns.clone(),
        }
    }
}

/// A lock context that reports every row as locked
#[derive(Debug, Default)]
pub struct AllRowsLocked;

impl maria_rs::RowLockContext for AllRowsLocked {
    fn is_row_locked(&self, _table: &str, _key: &str) -> bool {
        true
    }
}
