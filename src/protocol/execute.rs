//! Binary execute, bulk execute, and long-data streaming requests
//!
//! The binary execute command carries one parameter row: a null bitmap, the
//! wire type tag per parameter (from the session dialect), and the encoded
//! values. The bulk command carries many rows behind a single uniform type
//! header, each value prefixed by an indicator byte. Long-data streams one
//! oversized parameter in pieces ahead of the execute.

use bytes::Bytes;
use tracing::trace;

use crate::buffer::WriteBuffer;
use crate::constants::{bulk_flags, bulk_indicator, cursor_type, Command, FieldType};
use crate::dialect::DialectRules;
use crate::error::{Error, Result};
use crate::protocol::frame::write_command_frame;
use crate::row::Value;

/// Options for the binary execute command
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Cursor-type flags
    pub cursor_flags: u8,
    /// Rows the server should prefetch into the cursor reply, when cursored
    pub prefetch_rows: u32,
}

impl ExecuteOptions {
    /// Stream the whole result back with the reply (snapshot execution)
    pub fn for_snapshot() -> Self {
        Self {
            cursor_flags: cursor_type::NO_CURSOR,
            prefetch_rows: 0,
        }
    }

    /// Open a read-only server cursor; rows come via fetch
    pub fn for_cursor() -> Self {
        Self {
            cursor_flags: cursor_type::READ_ONLY,
            prefetch_rows: 0,
        }
    }

    /// Open a scrollable server cursor for sensitive navigation
    pub fn for_scrollable() -> Self {
        Self {
            cursor_flags: cursor_type::READ_ONLY | cursor_type::SCROLLABLE,
            prefetch_rows: 0,
        }
    }

    /// Open an updatable scrollable cursor
    pub fn for_updatable() -> Self {
        Self {
            cursor_flags: cursor_type::FOR_UPDATE | cursor_type::SCROLLABLE,
            prefetch_rows: 0,
        }
    }
}

/// Binary execute request for one parameter row
#[derive(Debug)]
pub struct ExecuteMessage<'a> {
    statement_id: u32,
    params: &'a [Value],
    options: ExecuteOptions,
}

impl<'a> ExecuteMessage<'a> {
    /// Create an execute request
    pub fn new(statement_id: u32, params: &'a [Value], options: ExecuteOptions) -> Self {
        Self {
            statement_id,
            params,
            options,
        }
    }

    /// Build the framed request
    pub fn build_request(&self, dialect: &dyn DialectRules) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtExecute as u8)?;
        buf.write_u32_le(self.statement_id)?;
        buf.write_u8(self.options.cursor_flags)?;
        buf.write_u32_le(1)?; // iteration count

        if !self.params.is_empty() {
            let bitmap_len = (self.params.len() + 7) / 8;
            let bitmap_pos = buf.len();
            buf.write_bytes(&vec![0u8; bitmap_len])?;
            for (idx, value) in self.params.iter().enumerate() {
                if value.is_null() {
                    buf.set_bitmap_bit(bitmap_pos, idx)?;
                }
            }
            buf.write_u8(1)?; // new params bound
            for value in self.params {
                let tag = dialect.bind_type_tag(value);
                buf.write_u8(tag as u8)?;
                buf.write_u8(if matches!(value, Value::UInt(_)) { 0x80 } else { 0 })?;
            }
            for value in self.params {
                if !value.is_null() {
                    encode_param_value(&mut buf, value, dialect)?;
                }
            }
        }
        trace!(
            statement_id = self.statement_id,
            params = self.params.len(),
            cursor_flags = self.options.cursor_flags,
            "built execute request"
        );
        write_command_frame(buf.as_slice())
    }
}

/// Encode one bound value in the binary parameter format
pub fn encode_param_value(
    buf: &mut WriteBuffer,
    value: &Value,
    dialect: &dyn DialectRules,
) -> Result<()> {
    match (dialect.bind_type_tag(value), value) {
        (_, Value::Null) => Ok(()),
        (FieldType::LongLong, Value::Int(v)) => buf.write_u64_le(*v as u64),
        (FieldType::LongLong, Value::UInt(v)) => buf.write_u64_le(*v),
        (FieldType::NewDecimal, Value::UInt(v)) => buf.write_lenenc_string(&v.to_string()),
        (FieldType::Float, Value::Float(v)) => buf.write_f32_le(*v),
        (FieldType::Double, Value::Double(v)) => buf.write_f64_le(*v),
        (FieldType::NewDecimal, Value::Decimal(d)) => buf.write_lenenc_string(&d.to_string()),
        (_, Value::Text(s)) => buf.write_lenenc_string(s),
        (_, Value::Bytes(b)) => buf.write_lenenc_bytes(b),
        (FieldType::DateTime, Value::DateTime(dt)) => dt.encode(buf),
        (FieldType::Time, Value::IntervalDayTime(iv)) => iv.encode(buf),
        (_, Value::IntervalYearMonth(iv)) => buf.write_lenenc_string(&iv.to_string()),
        (_, Value::Struct(s)) => {
            let mut nested = WriteBuffer::new();
            s.encode(&mut nested)?;
            buf.write_lenenc_bytes(nested.as_slice())
        }
        (_, Value::Array(a)) => {
            let mut nested = WriteBuffer::new();
            a.encode(&mut nested)?;
            buf.write_lenenc_bytes(nested.as_slice())
        }
        (_, Value::Lob(lob)) => {
            // streamed LOBs go through long-data; inline ones travel here
            let data = lob.read_loaded(0, lob.len())?;
            buf.write_lenenc_bytes(&data)
        }
        (tag, v) => Err(Error::Internal(format!(
            "no binary encoding for {} as {:?}",
            v.type_name(),
            tag
        ))),
    }
}

/// Bulk execute request: many parameter rows in one frame
#[derive(Debug)]
pub struct BulkExecuteMessage<'a> {
    statement_id: u32,
    rows: &'a [Vec<Value>],
}

impl<'a> BulkExecuteMessage<'a> {
    /// Create a bulk request
    pub fn new(statement_id: u32, rows: &'a [Vec<Value>]) -> Self {
        Self { statement_id, rows }
    }

    /// Uniform wire type per parameter position, if the rows agree
    ///
    /// The bulk command sends one type header for all rows; rows with
    /// mismatched value types cannot go through this path. NULLs are
    /// type-neutral.
    pub fn uniform_types(
        rows: &[Vec<Value>],
        dialect: &dyn DialectRules,
    ) -> Option<Vec<FieldType>> {
        let first = rows.first()?;
        let mut types: Vec<Option<FieldType>> = vec![None; first.len()];
        for row in rows {
            if row.len() != first.len() {
                return None;
            }
            for (idx, value) in row.iter().enumerate() {
                if value.is_null() {
                    continue;
                }
                let tag = dialect.bind_type_tag(value);
                match types[idx] {
                    None => types[idx] = Some(tag),
                    Some(existing) if existing == tag => {}
                    Some(_) => return None,
                }
            }
        }
        Some(types.into_iter().map(|t| t.unwrap_or(FieldType::Null)).collect())
    }

    /// Build the framed request
    pub fn build_request(&self, dialect: &dyn DialectRules) -> Result<Bytes> {
        let types = Self::uniform_types(self.rows, dialect).ok_or_else(|| {
            Error::Internal("bulk execute requires uniform parameter types".to_string())
        })?;

        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtBulkExecute as u8)?;
        buf.write_u32_le(self.statement_id)?;
        buf.write_u16_le(bulk_flags::SEND_TYPES | bulk_flags::UNIT_RESULTS)?;
        for tag in &types {
            buf.write_u8(*tag as u8)?;
            buf.write_u8(0)?;
        }
        for row in self.rows {
            for value in row {
                if value.is_null() {
                    buf.write_u8(bulk_indicator::NULL)?;
                } else {
                    buf.write_u8(bulk_indicator::NONE)?;
                    encode_param_value(&mut buf, value, dialect)?;
                }
            }
        }
        trace!(
            statement_id = self.statement_id,
            rows = self.rows.len(),
            "built bulk execute request"
        );
        write_command_frame(buf.as_slice())
    }
}

/// Piecewise parameter streaming ahead of execute
#[derive(Debug)]
pub struct LongDataMessage<'a> {
    statement_id: u32,
    param_index: u16,
    chunk: &'a [u8],
}

impl<'a> LongDataMessage<'a> {
    /// Create a long-data piece for the given parameter ordinal (0-based)
    pub fn new(statement_id: u32, param_index: u16, chunk: &'a [u8]) -> Self {
        Self {
            statement_id,
            param_index,
            chunk,
        }
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtSendLongData as u8)?;
        buf.write_u32_le(self.statement_id)?;
        buf.write_u16_le(self.param_index)?;
        buf.write_bytes(self.chunk)?;
        write_command_frame(buf.as_slice())
    }
}

/// Close a prepared statement, releasing its server resources
#[derive(Debug)]
pub struct StmtCloseMessage {
    statement_id: u32,
}

impl StmtCloseMessage {
    /// Create a close request
    pub fn new(statement_id: u32) -> Self {
        Self { statement_id }
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtClose as u8)?;
        buf.write_u32_le(self.statement_id)?;
        write_command_frame(buf.as_slice())
    }
}
