//! Cursor fetch request and reply
//!
//! Pulls rows from an open server-side cursor. The plain form fetches the
//! next window of up to `num_rows` rows; the scroll form carries an explicit
//! orientation and offset for scroll-sensitive navigation and `refresh_row`.
//! The reply is a block of row packets followed by an EOF terminator whose
//! status flags say whether the cursor is exhausted.

use bytes::Bytes;

use crate::buffer::WriteBuffer;
use crate::constants::{packet_header, status, Command, FetchOrientation};
use crate::error::{Error, Result};
use crate::protocol::command::parse_err_packet;
use crate::protocol::frame::write_command_frame;
use crate::protocol::resultset::{decode_binary_row, RowCodecOptions, TerminalPacket};
use crate::row::Row;
use crate::statement::ColumnInfo;

/// Fetch request against an open server cursor
#[derive(Debug)]
pub struct FetchMessage {
    /// Prepared statement id owning the cursor
    statement_id: u32,
    /// Maximum rows to return in this window
    num_rows: u32,
    /// Scroll orientation; `None` is the plain next-window form
    orientation: Option<FetchOrientation>,
    /// Position or offset for Absolute/Relative orientations
    offset: i64,
}

impl FetchMessage {
    /// Create a plain next-window fetch
    pub fn new(statement_id: u32, num_rows: u32) -> Self {
        Self {
            statement_id,
            num_rows,
            orientation: None,
            offset: 0,
        }
    }

    /// Create a scroll-orientation fetch
    pub fn with_orientation(
        statement_id: u32,
        num_rows: u32,
        orientation: FetchOrientation,
        offset: i64,
    ) -> Self {
        Self {
            statement_id,
            num_rows,
            orientation: Some(orientation),
            offset,
        }
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtFetch as u8)?;
        buf.write_u32_le(self.statement_id)?;
        buf.write_u32_le(self.num_rows)?;
        if let Some(orientation) = self.orientation {
            buf.write_u8(orientation as u8)?;
            buf.write_u64_le(self.offset as u64)?;
        }
        write_command_frame(buf.as_slice())
    }
}

/// Decoded fetch reply: one window of rows plus the terminator flags
#[derive(Debug)]
pub struct FetchReply {
    /// Rows in this window (binary format)
    pub rows: Vec<Row>,
    /// Server status flags from the terminator
    pub status: u16,
    /// Warning count from the terminator
    pub warnings: u16,
}

impl FetchReply {
    /// Whether the server reported the cursor exhausted
    pub fn last_row_sent(&self) -> bool {
        self.status & status::LAST_ROW_SENT != 0
    }

    /// Parse the fetch reply packets against the cursor's column metadata
    pub fn parse(
        packets: &[Bytes],
        columns: &[ColumnInfo],
        options: &RowCodecOptions,
    ) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut rows = Vec::new();
        for payload in packets {
            if payload.first() == Some(&packet_header::ERR) {
                return Err(parse_err_packet(payload.clone())?);
            }
            if payload.first() == Some(&packet_header::EOF) && payload.len() < 9 {
                match TerminalPacket::parse(payload.clone())? {
                    Some(TerminalPacket::Eof { warnings, status }) => {
                        return Ok(Self {
                            rows,
                            status,
                            warnings,
                        })
                    }
                    _ => return Err(Error::Protocol("malformed fetch terminator".to_string())),
                }
            }
            let values = decode_binary_row(payload.clone(), columns, options)?;
            rows.push(Row::with_names(values, names.clone()));
        }
        Err(Error::Protocol("fetch reply missing terminator".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FieldType;
    use crate::protocol::resultset::write_binary_row;
    use crate::row::Value;

    #[test]
    fn test_plain_fetch_request_layout() {
        let frame = FetchMessage::new(7, 50).build_request().unwrap();
        let payload = &frame[4..];
        assert_eq!(payload[0], Command::StmtFetch as u8);
        assert_eq!(u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]), 7);
        assert_eq!(u32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]), 50);
        assert_eq!(payload.len(), 9);
    }

    #[test]
    fn test_scroll_fetch_request_layout() {
        let frame = FetchMessage::with_orientation(7, 1, FetchOrientation::Absolute, -3)
            .build_request()
            .unwrap();
        let payload = &frame[4..];
        assert_eq!(payload[9], FetchOrientation::Absolute as u8);
        assert_eq!(
            i64::from_le_bytes(payload[10..18].try_into().unwrap()),
            -3
        );
    }

    #[test]
    fn test_fetch_reply_window_and_exhaustion() {
        let cols = vec![ColumnInfo::new("N", FieldType::Long)];
        let packets = vec![
            write_binary_row(&[Value::Int(1)], &cols, false).unwrap(),
            write_binary_row(&[Value::Int(2)], &cols, false).unwrap(),
            TerminalPacket::encode_eof(0, status::LAST_ROW_SENT).unwrap(),
        ];
        let reply = FetchReply::parse(&packets, &cols, &RowCodecOptions::default()).unwrap();
        assert_eq!(reply.rows.len(), 2);
        assert!(reply.last_row_sent());
        assert_eq!(reply.rows[1].get(0).and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn test_fetch_reply_err_surfaces() {
        let cols = vec![ColumnInfo::new("N", FieldType::Long)];
        let packets = vec![
            crate::protocol::command::encode_err_packet(1317, "70100", "Query execution was interrupted")
                .unwrap(),
        ];
        let err = FetchReply::parse(&packets, &cols, &RowCodecOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Server { code: 1317, .. }));
    }

    #[test]
    fn test_fetch_reply_requires_terminator() {
        let cols = vec![ColumnInfo::new("N", FieldType::Long)];
        let packets = vec![write_binary_row(&[Value::Int(1)], &cols, false).unwrap()];
        assert!(FetchReply::parse(&packets, &cols, &RowCodecOptions::default()).is_err());
    }
}
