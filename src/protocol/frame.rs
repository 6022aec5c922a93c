//! Wire packet framing
//!
//! Every message travels in packets of a 3-byte little-endian payload length,
//! a sequence byte, and the payload. A payload of exactly the maximum packet
//! size is continued in the next packet; a terminating packet is any packet
//! shorter than the maximum (possibly empty).

use bytes::Bytes;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::constants::MAX_PACKET_PAYLOAD;
use crate::error::{Error, Result};

/// Frame a command payload into one or more wire packets
///
/// Sequence numbering starts at 0 for each new command.
pub fn write_command_frame(payload: &[u8]) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    let mut seq: u8 = 0;
    let mut offset = 0;
    loop {
        let chunk = (payload.len() - offset).min(MAX_PACKET_PAYLOAD);
        buf.write_u24_le(chunk as u32)?;
        buf.write_u8(seq)?;
        buf.write_bytes(&payload[offset..offset + chunk])?;
        offset += chunk;
        seq = seq.wrapping_add(1);
        // a maximal packet promises a continuation, even an empty one
        if chunk < MAX_PACKET_PAYLOAD {
            break;
        }
    }
    Ok(buf.freeze())
}

/// Slice a transport reply into logical packet payloads
///
/// Continuation packets (maximal-length payloads) are reassembled into one
/// logical payload.
pub fn read_reply_packets(reply: Bytes) -> Result<Vec<Bytes>> {
    let mut buf = ReadBuffer::new(reply);
    let mut packets = Vec::new();
    let mut pending: Option<Vec<u8>> = None;

    while buf.remaining() > 0 {
        if buf.remaining() < 4 {
            return Err(Error::Protocol(format!(
                "truncated packet header: {} bytes left",
                buf.remaining()
            )));
        }
        let len = buf.read_u24_le()? as usize;
        let _seq = buf.read_u8()?;
        let payload = buf.read_bytes(len)?;

        if len == MAX_PACKET_PAYLOAD {
            pending.get_or_insert_with(Vec::new).extend_from_slice(&payload);
            continue;
        }
        match pending.take() {
            Some(mut acc) => {
                acc.extend_from_slice(&payload);
                packets.push(Bytes::from(acc));
            }
            None => packets.push(payload),
        }
    }
    if pending.is_some() {
        return Err(Error::Protocol(
            "reply ended inside a continued packet".to_string(),
        ));
    }
    Ok(packets)
}
