//! Large-object piece messages
//!
//! Locator-backed LOB content moves in pieces: each operation carries the
//! opaque locator token plus an operation code, offset, and amount. Reads
//! come back as a single piece of at most the requested length (a read past
//! the current end returns the available remainder); writes, trims, and
//! frees are acknowledged with the LOB's resulting length.

use bytes::Bytes;
use tracing::trace;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::{lob_op, packet_header, Command};
use crate::error::{Error, Result};
use crate::protocol::command::parse_err_packet;
use crate::protocol::frame::write_command_frame;
use crate::types::LobLocator;

/// One large-object piece operation
#[derive(Debug)]
pub struct LobOpMessage<'a> {
    /// Locator the operation targets
    locator: &'a LobLocator,
    /// Operation code
    operation: u8,
    /// Byte offset the operation starts at
    offset: u64,
    /// Bytes to read, or the new length for a trim
    amount: u64,
    /// Piece content for a write
    write_data: Option<&'a [u8]>,
}

impl<'a> LobOpMessage<'a> {
    /// Read `amount` bytes starting at `offset`
    pub fn read(locator: &'a LobLocator, offset: u64, amount: u64) -> Self {
        Self {
            locator,
            operation: lob_op::READ,
            offset,
            amount,
            write_data: None,
        }
    }

    /// Write a piece in place starting at `offset`
    pub fn write(locator: &'a LobLocator, offset: u64, data: &'a [u8]) -> Self {
        Self {
            locator,
            operation: lob_op::WRITE,
            offset,
            amount: data.len() as u64,
            write_data: Some(data),
        }
    }

    /// Truncate the LOB to `new_length` bytes
    pub fn trim(locator: &'a LobLocator, new_length: u64) -> Self {
        Self {
            locator,
            operation: lob_op::TRIM,
            offset: 0,
            amount: new_length,
            write_data: None,
        }
    }

    /// Query the current length
    pub fn get_length(locator: &'a LobLocator) -> Self {
        Self {
            locator,
            operation: lob_op::GET_LENGTH,
            offset: 0,
            amount: 0,
            write_data: None,
        }
    }

    /// Release the locator's server-side resources
    pub fn free(locator: &'a LobLocator) -> Self {
        Self {
            locator,
            operation: lob_op::FREE,
            offset: 0,
            amount: 0,
            write_data: None,
        }
    }

    /// Build the framed request
    pub fn build_request(&self) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(Command::LobPiece as u8)?;
        buf.write_u8(self.operation)?;
        buf.write_lenenc_bytes(self.locator.token())?;
        buf.write_u64_le(self.offset)?;
        buf.write_u64_le(self.amount)?;
        if let Some(data) = self.write_data {
            buf.write_lenenc_bytes(data)?;
        }
        trace!(
            operation = self.operation,
            offset = self.offset,
            amount = self.amount,
            "built LOB piece request"
        );
        write_command_frame(buf.as_slice())
    }
}

/// Reply to a LOB read: one piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobPieceData {
    /// Piece content; shorter than requested when the read ran past the end
    pub data: Bytes,
}

impl LobPieceData {
    /// Parse the read reply packet
    pub fn parse(packets: &[Bytes]) -> Result<Self> {
        let payload = first_packet(packets)?;
        let mut buf = ReadBuffer::new(payload);
        expect_ok_header(&mut buf)?;
        let data = buf.read_lenenc_bytes()?;
        Ok(Self { data })
    }

    /// Encode the read reply packet (used by loopback tests)
    pub fn encode(data: &[u8]) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(packet_header::OK)?;
        buf.write_lenenc_bytes(data)?;
        Ok(buf.freeze())
    }
}

/// Acknowledgement of a write, trim, length query, or free
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobOpAck {
    /// LOB length after the operation
    pub length: u64,
}

impl LobOpAck {
    /// Parse the acknowledgement packet
    pub fn parse(packets: &[Bytes]) -> Result<Self> {
        let payload = first_packet(packets)?;
        let mut buf = ReadBuffer::new(payload);
        expect_ok_header(&mut buf)?;
        let length = buf.read_u64_le()?;
        Ok(Self { length })
    }

    /// Encode the acknowledgement packet (used by loopback tests)
    pub fn encode(length: u64) -> Result<Bytes> {
        let mut buf = WriteBuffer::new();
        buf.write_u8(packet_header::OK)?;
        buf.write_u64_le(length)?;
        Ok(buf.freeze())
    }
}

fn first_packet(packets: &[Bytes]) -> Result<Bytes> {
    let payload = packets
        .first()
        .ok_or_else(|| Error::Protocol("empty LOB reply".to_string()))?;
    if payload.first() == Some(&packet_header::ERR) {
        return Err(parse_err_packet(payload.clone())?);
    }
    Ok(payload.clone())
}

fn expect_ok_header(buf: &mut ReadBuffer) -> Result<()> {
    let header = buf.read_u8()?;
    if header != packet_header::OK {
        return Err(Error::Protocol(format!(
            "expected LOB reply header {:#04x}, got {:#04x}",
            packet_header::OK,
            header
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LobKind;

    fn locator() -> LobLocator {
        LobLocator::new(
            Bytes::from_static(&[0xAA, 0xBB]),
            750,
            4096,
            LobKind::Blob,
            "docs",
            "id=7",
        )
    }

    #[test]
    fn test_read_request_layout() {
        let loc = locator();
        let frame = LobOpMessage::read(&loc, 100, 64).build_request().unwrap();
        let payload = &frame[4..];
        assert_eq!(payload[0], Command::LobPiece as u8);
        assert_eq!(payload[1], lob_op::READ);
        // lenenc token: length 2 then the bytes
        assert_eq!(&payload[2..5], &[0x02, 0xAA, 0xBB]);
        assert_eq!(u64::from_le_bytes(payload[5..13].try_into().unwrap()), 100);
        assert_eq!(u64::from_le_bytes(payload[13..21].try_into().unwrap()), 64);
    }

    #[test]
    fn test_write_request_carries_data() {
        let loc = locator();
        let frame = LobOpMessage::write(&loc, 8, b"piece").build_request().unwrap();
        let payload = &frame[4..];
        assert_eq!(payload[1], lob_op::WRITE);
        assert_eq!(&payload[payload.len() - 5..], b"piece");
    }

    #[test]
    fn test_trim_request_amount_is_new_length() {
        let loc = locator();
        let frame = LobOpMessage::trim(&loc, 1).build_request().unwrap();
        let payload = &frame[4..];
        assert_eq!(payload[1], lob_op::TRIM);
        assert_eq!(u64::from_le_bytes(payload[13..21].try_into().unwrap()), 1);
    }

    #[test]
    fn test_piece_data_roundtrip() {
        let encoded = LobPieceData::encode(b"hello").unwrap();
        let piece = LobPieceData::parse(&[encoded]).unwrap();
        assert_eq!(piece.data.as_ref(), b"hello");
    }

    #[test]
    fn test_ack_roundtrip() {
        let encoded = LobOpAck::encode(749).unwrap();
        let ack = LobOpAck::parse(&[encoded]).unwrap();
        assert_eq!(ack.length, 749);
    }

    #[test]
    fn test_err_reply_surfaces() {
        let encoded =
            crate::protocol::command::encode_err_packet(1205, "HY000", "Lock wait timeout").unwrap();
        let err = LobOpAck::parse(&[encoded]).unwrap_err();
        assert!(matches!(err, Error::Server { code: 1205, .. }));
    }
}
