//! Result-set decoding
//!
//! A result set travels as: a column-count packet, one column-definition
//! packet per column, the row packets, and an EOF terminator carrying the
//! server status flags. Rows are length-encoded cells on the text path and
//! null-bitmap-prefixed typed values on the binary path.
//!
//! Large-object columns: on sessions that negotiated locator support, a LOB
//! cell's payload starts with a marker byte: `0x00` followed by the inline
//! content, or `0x01` followed by the locator (token, size, chunk size, and
//! the owning table/key used for row-lock checks). Without locator support
//! the payload is the plain inline content.

use bytes::Bytes;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{column_flags, packet_header, FieldType};
use crate::error::{Error, Result};
use crate::protocol::command::{parse_err_packet, ExecOutcome};
use crate::row::{Row, Value};
use crate::statement::ColumnInfo;
use crate::types::{
    DateTimeValue, Decimal, DecodePolicy, IntervalDayTime, LobHandle, LobKind, LobLocator,
};

/// Options threaded through row decoding
#[derive(Debug, Clone, Copy)]
pub struct RowCodecOptions {
    /// Binary (prepared) rows vs text rows
    pub binary: bool,
    /// Whether LOB cells carry the locator marker byte
    pub lob_locators: bool,
    /// Limits for nested value decoding
    pub policy: DecodePolicy,
}

impl Default for RowCodecOptions {
    fn default() -> Self {
        Self {
            binary: true,
            lob_locators: false,
            policy: DecodePolicy::default(),
        }
    }
}

/// Terminal packet of a result set or command reply
#[derive(Debug, Clone)]
pub enum TerminalPacket {
    /// OK packet (command reply)
    Ok(ExecOutcome),
    /// EOF packet (result-set terminator)
    Eof {
        /// Warning count
        warnings: u16,
        /// Server status flags
        status: u16,
    },
}

impl TerminalPacket {
    /// Classify and parse a reply packet; server errors surface as `Err`
    pub fn parse(payload: Bytes) -> Result<Option<TerminalPacket>> {
        if payload.is_empty() {
            return Err(Error::Protocol("empty reply packet".to_string()));
        }
        match payload[0] {
            packet_header::ERR => Err(parse_err_packet(payload)?),
            packet_header::EOF if payload.len() < 9 => {
                let mut buf = ReadBuffer::new(payload);
                buf.skip(1)?;
                let warnings = buf.read_u16_le()?;
                let status = buf.read_u16_le()?;
                Ok(Some(TerminalPacket::Eof { warnings, status }))
            }
            packet_header::OK => Ok(Some(TerminalPacket::Ok(ExecOutcome::parse(payload)?))),
            _ => Ok(None),
        }
    }

    /// Encode an EOF terminator (used by loopback tests)
    pub fn encode_eof(warnings: u16, status: u16) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(packet_header::EOF)?;
        buf.write_u16_le(warnings)?;
        buf.write_u16_le(status)?;
        Ok(buf.freeze())
    }
}

/// Parse a column-definition packet
pub fn parse_column_definition(payload: Bytes) -> Result<ColumnInfo> {
    let mut buf = ReadBuffer::new(payload);
    let _catalog = buf.read_lenenc_string()?;
    let _schema = buf.read_lenenc_string()?;
    let table = buf.read_lenenc_string()?;
    let _org_table = buf.read_lenenc_string()?;
    let name = buf.read_lenenc_string()?;
    let _org_name = buf.read_lenenc_string()?;
    let _fixed_len = buf.read_lenenc_int()?; // always 0x0c
    let _charset = buf.read_u16_le()?;
    let length = buf.read_u32_le()?;
    let type_tag = buf.read_u8()?;
    let flags = buf.read_u16_le()?;
    let decimals = buf.read_u8()?;
    let field_type = FieldType::from_tag(type_tag).ok_or(Error::InvalidTypeTag(type_tag))?;
    Ok(ColumnInfo {
        name,
        table,
        field_type,
        length,
        decimals,
        flags,
    })
}

/// Encode a column-definition packet (used by loopback tests)
pub fn write_column_definition(col: &ColumnInfo) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_lenenc_string("def")?;
    buf.write_lenenc_string("")?; // schema
    buf.write_lenenc_string(&col.table)?;
    buf.write_lenenc_string(&col.table)?; // org_table
    buf.write_lenenc_string(&col.name)?;
    buf.write_lenenc_string(&col.name)?; // org_name
    buf.write_lenenc_int(0x0c)?;
    buf.write_u16_le(0x2d)?; // utf8mb4
    buf.write_u32_le(col.length)?;
    buf.write_u8(col.field_type as u8)?;
    buf.write_u16_le(col.flags)?;
    buf.write_u8(col.decimals)?;
    buf.write_u16_le(0)?; // filler
    Ok(buf.freeze())
}

/// A decoded result set
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Column metadata
    pub columns: Vec<ColumnInfo>,
    /// Decoded rows
    pub rows: Vec<Row>,
    /// Status flags from the terminator
    pub status: u16,
    /// Warning count from the terminator
    pub warnings: u16,
}

impl ResultSet {
    /// Parse one result set from the reply packets, starting at `*pos`
    ///
    /// On return `*pos` indexes the packet after this result set, so the
    /// multi-statement strategy can parse replies back to back.
    pub fn parse_at(
        packets: &[Bytes],
        pos: &mut usize,
        options: &RowCodecOptions,
    ) -> Result<ResultSet> {
        let head = packets
            .get(*pos)
            .ok_or_else(|| Error::Protocol("missing column-count packet".to_string()))?;
        let mut buf = ReadBuffer::new(head.clone());
        let column_count = buf.read_lenenc_int()? as usize;
        *pos += 1;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let payload = packets
                .get(*pos)
                .ok_or_else(|| Error::Protocol("missing column definition".to_string()))?;
            columns.push(parse_column_definition(payload.clone())?);
            *pos += 1;
        }
        // column block terminator
        if let Some(payload) = packets.get(*pos) {
            if payload.first() == Some(&packet_header::EOF) && payload.len() < 9 {
                *pos += 1;
            }
        }

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut rows = Vec::new();
        loop {
            let payload = packets
                .get(*pos)
                .ok_or_else(|| Error::Protocol("result set missing terminator".to_string()))?;
            *pos += 1;
            // binary rows share the 0x00 header with OK packets; inside the
            // row block only EOF/ERR terminate
            if payload.first() == Some(&packet_header::EOF) && payload.len() < 9 {
                match TerminalPacket::parse(payload.clone())? {
                    Some(TerminalPacket::Eof { warnings, status }) => {
                        return Ok(ResultSet {
                            columns,
                            rows,
                            status,
                            warnings,
                        })
                    }
                    _ => return Err(Error::Protocol("malformed result terminator".to_string())),
                }
            }
            if payload.first() == Some(&packet_header::ERR) {
                return Err(parse_err_packet(payload.clone())?);
            }
            let values = if options.binary {
                decode_binary_row(payload.clone(), &columns, options)?
            } else {
                decode_text_row(payload.clone(), &columns, options)?
            };
            rows.push(Row::with_names(values, names.clone()));
        }
    }
}

// =============================================================================
// Binary rows
// =============================================================================

/// Decode a binary row payload into values
pub fn decode_binary_row(
    payload: Bytes,
    columns: &[ColumnInfo],
    options: &RowCodecOptions,
) -> Result<Vec<Value>> {
    let mut buf = ReadBuffer::new(payload);
    let header = buf.read_u8()?;
    if header != 0 {
        return Err(Error::Protocol(format!(
            "binary row header {:#04x}, expected 0x00",
            header
        )));
    }
    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let bitmap = buf.read_bytes(bitmap_len)?;
    let is_null = |idx: usize| {
        let bit = idx + 2;
        bitmap[bit / 8] & (1 << (bit % 8)) != 0
    };

    let mut values = Vec::with_capacity(columns.len());
    for (idx, col) in columns.iter().enumerate() {
        if is_null(idx) {
            values.push(Value::Null);
            continue;
        }
        values.push(decode_binary_value(&mut buf, col, options)?);
    }
    Ok(values)
}

fn decode_binary_value(
    buf: &mut ReadBuffer,
    col: &ColumnInfo,
    options: &RowCodecOptions,
) -> Result<Value> {
    let unsigned = col.flags & column_flags::UNSIGNED != 0;
    Ok(match col.field_type {
        FieldType::Tiny => {
            let v = buf.read_u8()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i8 as i64)
            }
        }
        FieldType::Short | FieldType::Year => {
            let v = buf.read_u16_le()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i16 as i64)
            }
        }
        FieldType::Long | FieldType::Int24 => {
            let v = buf.read_u32_le()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i32 as i64)
            }
        }
        FieldType::LongLong => {
            let v = buf.read_u64_le()?;
            if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(v as i64)
            }
        }
        FieldType::Float => Value::Float(buf.read_f32_le()?),
        FieldType::Double => Value::Double(buf.read_f64_le()?),
        FieldType::Decimal | FieldType::NewDecimal => {
            Value::Decimal(Decimal::parse(&buf.read_lenenc_string()?)?)
        }
        FieldType::Date | FieldType::DateTime | FieldType::Timestamp => {
            Value::DateTime(DateTimeValue::decode(buf)?)
        }
        FieldType::Time => Value::IntervalDayTime(IntervalDayTime::decode(buf)?),
        FieldType::Varchar | FieldType::VarString | FieldType::String | FieldType::Enum
        | FieldType::Set | FieldType::Json => Value::Text(buf.read_lenenc_string()?),
        FieldType::Bit | FieldType::Geometry => Value::Bytes(buf.read_lenenc_bytes()?),
        FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob => {
            decode_lob_cell(buf, col, options)?
        }
        FieldType::Null => Value::Null,
    })
}

fn decode_lob_cell(buf: &mut ReadBuffer, col: &ColumnInfo, options: &RowCodecOptions) -> Result<Value> {
    let payload = buf.read_lenenc_bytes()?;
    let kind = if col.flags & column_flags::BINARY != 0 {
        LobKind::Blob
    } else {
        LobKind::Clob
    };
    if !options.lob_locators {
        return Ok(match kind {
            LobKind::Blob => Value::Bytes(payload),
            LobKind::Clob => Value::Text(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| Error::Protocol(format!("invalid UTF-8 in text cell: {}", e)))?,
            ),
        });
    }

    let mut cell = ReadBuffer::new(payload);
    match cell.read_u8()? {
        0x00 => {
            let data = cell.read_bytes(cell.remaining())?;
            Ok(Value::Lob(LobHandle::loaded(kind, data)))
        }
        0x01 => {
            let token = cell.read_lenenc_bytes()?;
            let size = cell.read_u64_le()?;
            let chunk = cell.read_u32_le()?;
            let table = cell.read_lenenc_string()?;
            let key = cell.read_lenenc_string()?;
            Ok(Value::Lob(LobHandle::locator(LobLocator::new(
                token, size, chunk, kind, table, key,
            ))))
        }
        other => Err(Error::Protocol(format!(
            "invalid LOB cell marker {:#04x}",
            other
        ))),
    }
}

/// Encode a binary row payload (used by loopback tests)
pub fn write_binary_row(values: &[Value], columns: &[ColumnInfo], lob_locators: bool) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(0)?;
    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let bitmap_pos = buf.len();
    buf.write_bytes(&vec![0u8; bitmap_len])?;
    for (idx, value) in values.iter().enumerate() {
        if value.is_null() {
            buf.set_bitmap_bit(bitmap_pos, idx + 2)?;
            continue;
        }
        write_binary_value(&mut buf, value, &columns[idx], lob_locators)?;
    }
    Ok(buf.freeze())
}

fn write_binary_value(
    buf: &mut WriteBuffer,
    value: &Value,
    col: &ColumnInfo,
    lob_locators: bool,
) -> Result<()> {
    match (col.field_type, value) {
        (FieldType::Tiny, Value::Int(v)) => buf.write_u8(*v as u8),
        (FieldType::Tiny, Value::UInt(v)) => buf.write_u8(*v as u8),
        (FieldType::Short | FieldType::Year, Value::Int(v)) => buf.write_u16_le(*v as u16),
        (FieldType::Short | FieldType::Year, Value::UInt(v)) => buf.write_u16_le(*v as u16),
        (FieldType::Long | FieldType::Int24, Value::Int(v)) => buf.write_u32_le(*v as u32),
        (FieldType::Long | FieldType::Int24, Value::UInt(v)) => buf.write_u32_le(*v as u32),
        (FieldType::LongLong, Value::Int(v)) => buf.write_u64_le(*v as u64),
        (FieldType::LongLong, Value::UInt(v)) => buf.write_u64_le(*v),
        (FieldType::Float, Value::Float(v)) => buf.write_f32_le(*v),
        (FieldType::Double, Value::Double(v)) => buf.write_f64_le(*v),
        (FieldType::Decimal | FieldType::NewDecimal, Value::Decimal(d)) => {
            buf.write_lenenc_string(&d.to_string())
        }
        (FieldType::Date | FieldType::DateTime | FieldType::Timestamp, Value::DateTime(dt)) => {
            dt.encode(buf)
        }
        (FieldType::Time, Value::IntervalDayTime(iv)) => iv.encode(buf),
        (
            FieldType::Varchar | FieldType::VarString | FieldType::String | FieldType::Enum
            | FieldType::Set | FieldType::Json,
            Value::Text(s),
        ) => buf.write_lenenc_string(s),
        (FieldType::Bit | FieldType::Geometry, Value::Bytes(b)) => buf.write_lenenc_bytes(b),
        (
            FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob,
            value,
        ) => write_lob_cell(buf, value, lob_locators),
        (ft, v) => Err(Error::Internal(format!(
            "cannot encode {} as column type {:?}",
            v.type_name(),
            ft
        ))),
    }
}

fn write_lob_cell(buf: &mut WriteBuffer, value: &Value, lob_locators: bool) -> Result<()> {
    let mut cell = WriteBuffer::new();
    match value {
        Value::Bytes(b) => {
            if lob_locators {
                cell.write_u8(0x00)?;
            }
            cell.write_bytes(b)?;
        }
        Value::Text(s) => {
            if lob_locators {
                cell.write_u8(0x00)?;
            }
            cell.write_bytes(s.as_bytes())?;
        }
        Value::Lob(lob) => match lob.content() {
            crate::types::LobContent::Loaded { .. } => {
                if lob_locators {
                    cell.write_u8(0x00)?;
                }
                cell.write_bytes(&lob.read_loaded(0, lob.len())?)?;
            }
            crate::types::LobContent::Locator(loc) => {
                if !lob_locators {
                    return Err(Error::Internal(
                        "locator cell on a session without locator support".to_string(),
                    ));
                }
                cell.write_u8(0x01)?;
                cell.write_lenenc_bytes(loc.token())?;
                cell.write_u64_le(loc.size())?;
                cell.write_u32_le(loc.chunk_size())?;
                cell.write_lenenc_string(loc.table())?;
                cell.write_lenenc_string(loc.key())?;
            }
        },
        other => {
            return Err(Error::Internal(format!(
                "cannot encode {} as LOB cell",
                other.type_name()
            )))
        }
    }
    buf.write_lenenc_bytes(cell.as_slice())
}

// =============================================================================
// Text rows
// =============================================================================

/// Decode a text row payload into values
pub fn decode_text_row(
    payload: Bytes,
    columns: &[ColumnInfo],
    _options: &RowCodecOptions,
) -> Result<Vec<Value>> {
    let mut buf = ReadBuffer::new(payload);
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        if buf.peek_u8()? == packet_header::NULL_CELL {
            buf.skip(1)?;
            values.push(Value::Null);
            continue;
        }
        let text = buf.read_lenenc_string()?;
        values.push(text_cell_to_value(text, col)?);
    }
    Ok(values)
}

fn text_cell_to_value(text: String, col: &ColumnInfo) -> Result<Value> {
    let unsigned = col.flags & column_flags::UNSIGNED != 0;
    Ok(match col.field_type {
        FieldType::Tiny | FieldType::Short | FieldType::Int24 | FieldType::Long
        | FieldType::LongLong | FieldType::Year => {
            if unsigned {
                Value::UInt(text.parse().map_err(|_| {
                    Error::format("UNSIGNED INTEGER", text.clone(), "not numeric")
                })?)
            } else {
                Value::Int(text.parse().map_err(|_| {
                    Error::format("INTEGER", text.clone(), "not numeric")
                })?)
            }
        }
        FieldType::Float => Value::Float(
            text.parse()
                .map_err(|_| Error::format("FLOAT", text.clone(), "not numeric"))?,
        ),
        FieldType::Double => Value::Double(
            text.parse()
                .map_err(|_| Error::format("DOUBLE", text.clone(), "not numeric"))?,
        ),
        FieldType::Decimal | FieldType::NewDecimal => Value::Decimal(Decimal::parse(&text)?),
        FieldType::Date | FieldType::DateTime | FieldType::Timestamp => {
            Value::DateTime(DateTimeValue::parse(&text)?)
        }
        FieldType::Time => Value::IntervalDayTime(IntervalDayTime::parse(&text)?),
        FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob
            if col.flags & column_flags::BINARY != 0 =>
        {
            Value::Bytes(Bytes::from(text.into_bytes()))
        }
        _ => Value::Text(text),
    })
}

/// Encode a text row payload (used by loopback tests)
pub fn write_text_row(values: &[Value]) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    for value in values {
        match value {
            Value::Null => buf.write_u8(packet_header::NULL_CELL)?,
            Value::Bytes(b) => buf.write_lenenc_bytes(b)?,
            other => buf.write_lenenc_string(&other.to_string())?,
        }
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::status;

    fn columns() -> Vec<ColumnInfo> {
        let mut id = ColumnInfo::new("ID", FieldType::Long);
        id.flags = column_flags::PRI_KEY;
        let name = ColumnInfo::new("NAME", FieldType::VarString);
        let mut score = ColumnInfo::new("SCORE", FieldType::Double);
        score.decimals = 2;
        vec![id, name, score]
    }

    fn packets_for(rows: &[Vec<Value>], binary: bool) -> Vec<Bytes> {
        let cols = columns();
        let mut packets = Vec::new();
        let mut head = WriteBuffer::new();
        head.write_lenenc_int(cols.len() as u64).unwrap();
        packets.push(head.freeze());
        for col in &cols {
            packets.push(write_column_definition(col).unwrap());
        }
        packets.push(TerminalPacket::encode_eof(0, 0).unwrap());
        for row in rows {
            if binary {
                packets.push(write_binary_row(row, &cols, false).unwrap());
            } else {
                packets.push(write_text_row(row).unwrap());
            }
        }
        packets.push(TerminalPacket::encode_eof(0, status::LAST_ROW_SENT).unwrap());
        packets
    }

    #[test]
    fn test_column_definition_roundtrip() {
        let mut col = ColumnInfo::new("AMOUNT", FieldType::NewDecimal);
        col.table = "orders".to_string();
        col.length = 12;
        col.decimals = 2;
        col.flags = column_flags::NOT_NULL;
        let payload = write_column_definition(&col).unwrap();
        let parsed = parse_column_definition(payload).unwrap();
        assert_eq!(parsed.name, "AMOUNT");
        assert_eq!(parsed.table, "orders");
        assert_eq!(parsed.field_type, FieldType::NewDecimal);
        assert_eq!(parsed.length, 12);
        assert_eq!(parsed.decimals, 2);
        assert_eq!(parsed.flags, column_flags::NOT_NULL);
    }

    #[test]
    fn test_binary_resultset_roundtrip() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("alice".into()), Value::Double(9.5)],
            vec![Value::Int(2), Value::Null, Value::Double(-1.25)],
        ];
        let packets = packets_for(&rows, true);
        let mut pos = 0;
        let rs = ResultSet::parse_at(&packets, &mut pos, &RowCodecOptions::default()).unwrap();
        assert_eq!(pos, packets.len());
        assert_eq!(rs.rows.len(), 2);
        assert_eq!(rs.rows[0].get(1).and_then(Value::as_str), Some("alice"));
        assert!(rs.rows[1].is_null(1));
        assert_eq!(rs.status & status::LAST_ROW_SENT, status::LAST_ROW_SENT);
    }

    #[test]
    fn test_text_resultset_roundtrip() {
        let rows = vec![vec![Value::Int(7), Value::Text("bob".into()), Value::Double(0.5)]];
        let packets = packets_for(&rows, false);
        let options = RowCodecOptions {
            binary: false,
            ..Default::default()
        };
        let mut pos = 0;
        let rs = ResultSet::parse_at(&packets, &mut pos, &options).unwrap();
        assert_eq!(rs.rows[0].get(0).and_then(Value::as_i64), Some(7));
        assert_eq!(rs.rows[0].get(2).and_then(Value::as_f64), Some(0.5));
    }

    #[test]
    fn test_err_packet_inside_rows_surfaces() {
        let mut packets = packets_for(&[], true);
        // replace terminator with an ERR packet
        let last = packets.len() - 1;
        packets[last] =
            crate::protocol::command::encode_err_packet(1146, "42S02", "no such table").unwrap();
        let mut pos = 0;
        let err = ResultSet::parse_at(&packets, &mut pos, &RowCodecOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Server { code: 1146, .. }));
    }

    #[test]
    fn test_lob_cell_inline_and_locator() {
        let mut col = ColumnInfo::new("DOC", FieldType::Blob);
        col.flags = column_flags::BINARY;
        let cols = vec![col];

        // inline marker form
        let inline = vec![Value::Lob(LobHandle::loaded(
            LobKind::Blob,
            Bytes::from_static(b"abc"),
        ))];
        let payload = write_binary_row(&inline, &cols, true).unwrap();
        let options = RowCodecOptions {
            lob_locators: true,
            ..Default::default()
        };
        let values = decode_binary_row(payload, &cols, &options).unwrap();
        match &values[0] {
            Value::Lob(lob) => assert_eq!(lob.read_loaded(0, 3).unwrap().as_ref(), b"abc"),
            other => panic!("expected Lob, got {:?}", other),
        }

        // locator form
        let locator = vec![Value::Lob(LobHandle::locator(LobLocator::new(
            Bytes::from_static(&[9, 9]),
            750,
            4096,
            LobKind::Blob,
            "docs",
            "id=7",
        )))];
        let payload = write_binary_row(&locator, &cols, true).unwrap();
        let values = decode_binary_row(payload, &cols, &options).unwrap();
        match &values[0] {
            Value::Lob(lob) => {
                let loc = lob.as_locator().expect("locator-backed");
                assert_eq!(loc.size(), 750);
                assert_eq!(loc.table(), "docs");
            }
            other => panic!("expected Lob, got {:?}", other),
        }
    }

    #[test]
    fn test_lob_cell_without_locator_support_is_plain_bytes() {
        let mut col = ColumnInfo::new("DOC", FieldType::Blob);
        col.flags = column_flags::BINARY;
        let cols = vec![col];
        let row = vec![Value::Bytes(Bytes::from_static(b"raw"))];
        let payload = write_binary_row(&row, &cols, false).unwrap();
        let values = decode_binary_row(payload, &cols, &RowCodecOptions::default()).unwrap();
        assert_eq!(values[0], Value::Bytes(Bytes::from_static(b"raw")));
    }
}
