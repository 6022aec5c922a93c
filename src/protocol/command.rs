//! Text-protocol command building and outcome parsing
//!
//! The text path serves sessions without the binary sub-protocol, templates
//! the prepared path cannot express (the documented fallback), the rewrite
//! batch strategy, and generated keyed DML. Parameter values are inlined as
//! dialect-quoted SQL literals at the template's placeholder positions.

use bytes::Bytes;
use tracing::trace;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{packet_header, status, Command};
use crate::dialect::DialectRules;
use crate::error::{Error, Result};
use crate::protocol::frame::write_command_frame;
use crate::row::Value;

/// A text-protocol query command
#[derive(Debug)]
pub struct QueryMessage {
    sql: String,
}

impl QueryMessage {
    /// Create a command for SQL that carries no placeholders
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// Create a command by inlining parameter literals at `?` placeholders
    ///
    /// Placeholders inside quoted runs (single, double, or backtick) are left
    /// untouched. The number of values must match the number of live
    /// placeholders.
    pub fn with_inlined_params(
        template: &str,
        params: &[Value],
        dialect: &dyn DialectRules,
    ) -> Result<Self> {
        let mut sql = String::with_capacity(template.len() + params.len() * 8);
        let mut next_param = 0usize;
        let mut quote: Option<char> = None;

        for ch in template.chars() {
            match quote {
                Some(q) => {
                    sql.push(ch);
                    if ch == q {
                        quote = None;
                    }
                }
                None => match ch {
                    '\'' | '"' | '`' => {
                        quote = Some(ch);
                        sql.push(ch);
                    }
                    '?' => {
                        let value = params.get(next_param).ok_or(Error::MissingParameter {
                            ordinal: next_param + 1,
                        })?;
                        sql.push_str(&render_literal(value, dialect)?);
                        next_param += 1;
                    }
                    _ => sql.push(ch),
                },
            }
        }
        if next_param != params.len() {
            return Err(Error::Internal(format!(
                "{} values bound but template has {} placeholders",
                params.len(),
                next_param
            )));
        }
        trace!(inlined = next_param, "built text command");
        Ok(Self { sql })
    }

    /// The final SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::Query as u8)?;
        buf.write_bytes(self.sql.as_bytes())?;
        write_command_frame(buf.as_slice())
    }
}

/// Render a value as a SQL literal in the session dialect
pub fn render_literal(value: &Value, dialect: &dyn DialectRules) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Text(s) => dialect.quote_string_literal(s),
        Value::Bytes(b) => dialect.bytes_literal(b),
        Value::DateTime(dt) => dialect.quote_string_literal(&dt.to_string()),
        Value::IntervalYearMonth(iv) => {
            format!("INTERVAL {} YEAR TO MONTH", dialect.quote_string_literal(&iv.to_string()))
        }
        Value::IntervalDayTime(iv) => {
            format!("INTERVAL {} DAY TO SECOND", dialect.quote_string_literal(&iv.to_string()))
        }
        Value::Struct(_) | Value::Array(_) => {
            return Err(Error::NotSupported(
                "composite values require the binary protocol".to_string(),
            ))
        }
        Value::Lob(lob) => match lob.content() {
            crate::types::LobContent::Loaded { .. } => {
                let data = lob.read_loaded(0, lob.len())?;
                match lob.kind() {
                    crate::types::LobKind::Clob => {
                        dialect.quote_string_literal(&String::from_utf8_lossy(&data))
                    }
                    crate::types::LobKind::Blob => dialect.bytes_literal(&data),
                }
            }
            crate::types::LobContent::Locator(_) => {
                return Err(Error::NotSupported(
                    "locator-backed LOBs cannot be inlined as literals".to_string(),
                ))
            }
        },
    })
}

/// Result of a non-query command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected by the statement
    pub rows_affected: u64,
    /// Last generated key, when the statement produced one
    pub last_insert_id: u64,
    /// Server status flags
    pub status: u16,
    /// Warning count
    pub warnings: u16,
}

impl ExecOutcome {
    /// Whether more reply packets follow this one (multi-statement frames)
    pub fn more_results(&self) -> bool {
        self.status & status::MORE_RESULTS_EXISTS != 0
    }

    /// Whether the server opened a cursor instead of streaming rows
    pub fn cursor_exists(&self) -> bool {
        self.status & status::CURSOR_EXISTS != 0
    }

    /// Parse an OK packet payload (first byte already known to be OK)
    pub fn parse(payload: Bytes) -> Result<Self> {
        let mut buf = ReadBuffer::new(payload);
        let header = buf.read_u8()?;
        if header != packet_header::OK && header != packet_header::EOF {
            return Err(Error::Protocol(format!(
                "expected OK packet, got header {:#04x}",
                header
            )));
        }
        let rows_affected = buf.read_lenenc_int()?;
        let last_insert_id = buf.read_lenenc_int()?;
        let status = buf.read_u16_le()?;
        let warnings = buf.read_u16_le()?;
        Ok(Self {
            rows_affected,
            last_insert_id,
            status,
            warnings,
        })
    }

    /// Encode an OK packet payload (used by loopback tests)
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(packet_header::OK)?;
        buf.write_lenenc_int(self.rows_affected)?;
        buf.write_lenenc_int(self.last_insert_id)?;
        buf.write_u16_le(self.status)?;
        buf.write_u16_le(self.warnings)?;
        Ok(buf.freeze())
    }
}

/// Parse an ERR packet payload into a server error
pub fn parse_err_packet(payload: Bytes) -> Result<Error> {
    let mut buf = ReadBuffer::new(payload);
    let header = buf.read_u8()?;
    if header != packet_header::ERR {
        return Err(Error::Protocol(format!(
            "expected ERR packet, got header {:#04x}",
            header
        )));
    }
    let code = buf.read_u16_le()?;
    // '#' marker then 5-byte sqlstate
    let sqlstate = if buf.remaining() > 0 && buf.peek_u8()? == b'#' {
        buf.skip(1)?;
        String::from_utf8_lossy(&buf.read_bytes(5)?).into_owned()
    } else {
        "HY000".to_string()
    };
    let message = buf.read_eof_string()?;
    Ok(Error::Server {
        code,
        sqlstate,
        message,
    })
}

/// Encode an ERR packet payload (used by loopback tests)
pub fn encode_err_packet(code: u16, sqlstate: &str, message: &str) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    buf.write_u8(packet_header::ERR)?;
    buf.write_u16_le(code)?;
    buf.write_u8(b'#')?;
    buf.write_bytes(sqlstate.as_bytes())?;
    buf.write_bytes(message.as_bytes())?;
    Ok(buf.freeze())
}
