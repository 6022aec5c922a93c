//! Statement prepare request and response
//!
//! The prepare round trip assigns a server-side statement id and describes
//! the statement's parameters and result columns.

use bytes::Bytes;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{packet_header, Command};
use crate::error::{Error, Result};
use crate::protocol::command::parse_err_packet;
use crate::protocol::frame::write_command_frame;
use crate::protocol::resultset::{parse_column_definition, write_column_definition};
use crate::statement::ColumnInfo;

/// Prepare request
#[derive(Debug)]
pub struct PrepareMessage<'a> {
    sql: &'a str,
}

impl<'a> PrepareMessage<'a> {
    /// Create a prepare request for the given SQL
    pub fn new(sql: &'a str) -> Self {
        Self { sql }
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::StmtPrepare as u8)?;
        buf.write_bytes(self.sql.as_bytes())?;
        write_command_frame(buf.as_slice())
    }
}

/// Decoded prepare response
#[derive(Debug, Clone)]
pub struct PrepareResponse {
    /// Server-assigned statement id
    pub statement_id: u32,
    /// Number of parameters the server counted
    pub param_count: u16,
    /// Result column metadata (empty for non-queries)
    pub columns: Vec<ColumnInfo>,
    /// Warning count
    pub warnings: u16,
}

impl PrepareResponse {
    /// Parse the prepare reply packets
    ///
    /// Layout: header packet, `param_count` parameter-definition packets with
    /// an EOF, then `column_count` column-definition packets with an EOF.
    pub fn parse(packets: &[Bytes]) -> Result<Self> {
        let head = packets
            .first()
            .ok_or_else(|| Error::Protocol("empty prepare reply".to_string()))?;
        if head.first() == Some(&packet_header::ERR) {
            return Err(parse_err_packet(head.clone())?);
        }
        let mut buf = ReadBuffer::new(head.clone());
        let status = buf.read_u8()?;
        if status != 0 {
            return Err(Error::Protocol(format!(
                "prepare reply status {:#04x}, expected 0x00",
                status
            )));
        }
        let statement_id = buf.read_u32_le()?;
        let column_count = buf.read_u16_le()?;
        let param_count = buf.read_u16_le()?;
        buf.skip(1)?; // filler
        let warnings = buf.read_u16_le()?;

        let mut pos = 1;
        // parameter definitions are advisory; skip them
        if param_count > 0 {
            pos += param_count as usize;
            pos += 1; // EOF
        }
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let payload = packets
                .get(pos)
                .ok_or_else(|| Error::Protocol("prepare reply missing column definition".to_string()))?;
            columns.push(parse_column_definition(payload.clone())?);
            pos += 1;
        }
        Ok(Self {
            statement_id,
            param_count,
            columns,
            warnings,
        })
    }

    /// Encode the prepare reply packets (used by loopback tests)
    pub fn encode(&self) -> Result<Vec<Bytes>> {
        let mut packets = Vec::new();
        let mut head = WriteBuffer::new();
        head.write_u8(0)?;
        head.write_u32_le(self.statement_id)?;
        head.write_u16_le(self.columns.len() as u16)?;
        head.write_u16_le(self.param_count)?;
        head.write_u8(0)?;
        head.write_u16_le(self.warnings)?;
        packets.push(head.freeze());
        if self.param_count > 0 {
            for _ in 0..self.param_count {
                // anonymous parameter definition
                packets.push(write_column_definition(&ColumnInfo::new(
                    "?",
                    crate::constants::FieldType::Null,
                ))?);
            }
            packets.push(crate::protocol::resultset::TerminalPacket::encode_eof(0, 0)?);
        }
        for col in &self.columns {
            packets.push(write_column_definition(col)?);
        }
        Ok(packets)
    }
}
