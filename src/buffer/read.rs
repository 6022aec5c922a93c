//! Read buffer for decoding wire protocol data
//!
//! Provides methods for reading the protocol's primitive vocabulary from a
//! byte buffer: fixed-width little-endian integers, length-encoded integers,
//! length-encoded byte strings, and null-terminated strings.

use bytes::Bytes;

use crate::error::{Error, Result};

/// A buffer for reading wire protocol data
#[derive(Debug)]
pub struct ReadBuffer {
    /// The underlying byte data
    data: Bytes,
    /// Current read position
    pos: usize,
}

impl ReadBuffer {
    /// Create a new ReadBuffer from bytes
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a new ReadBuffer from a byte slice
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            pos: 0,
        }
    }

    /// Get the current position in the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to be read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if there are at least `n` bytes remaining
    #[inline]
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Peek the next byte without advancing
    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.data[self.pos])
    }

    /// Skip `n` bytes in the buffer
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.pos += n;
        Ok(())
    }

    /// Get a slice of the remaining bytes (without advancing position)
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::BufferUnderflow {
                needed: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Raw byte reads
    // =========================================================================

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Read raw bytes and return them as a zero-copy `Bytes` slice
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.ensure_remaining(n)?;
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Read raw bytes into a Vec
    pub fn read_bytes_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.read_bytes(n)?.to_vec())
    }

    // =========================================================================
    // Little-endian integer reads (wire byte order)
    // =========================================================================

    /// Read a 16-bit unsigned integer, little-endian
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        let v = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    /// Read a 24-bit unsigned integer, little-endian
    pub fn read_u24_le(&mut self) -> Result<u32> {
        self.ensure_remaining(3)?;
        let v = u32::from_le_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            0,
        ]);
        self.pos += 3;
        Ok(v)
    }

    /// Read a 32-bit unsigned integer, little-endian
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure_remaining(4)?;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(b))
    }

    /// Read a 64-bit unsigned integer, little-endian
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.ensure_remaining(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(b))
    }

    /// Read a 32-bit float, little-endian
    pub fn read_f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    /// Read a 64-bit float, little-endian
    pub fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    // =========================================================================
    // Length-encoded reads
    // =========================================================================

    /// Read a length-encoded integer
    ///
    /// Encoding:
    /// - `0x00..=0xfa`: the value itself
    /// - `0xfc`: 2-byte little-endian value follows
    /// - `0xfd`: 3-byte little-endian value follows
    /// - `0xfe`: 8-byte little-endian value follows
    ///
    /// `0xfb` is the NULL marker and is rejected here; callers that can see
    /// NULL cells must check with [`ReadBuffer::peek_u8`] first.
    pub fn read_lenenc_int(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        match first {
            0xfb => Err(Error::Protocol(
                "unexpected NULL marker in length-encoded integer".to_string(),
            )),
            0xfc => Ok(self.read_u16_le()? as u64),
            0xfd => Ok(self.read_u24_le()? as u64),
            0xfe => self.read_u64_le(),
            0xff => Err(Error::Protocol(
                "unexpected ERR header in length-encoded integer".to_string(),
            )),
            v => Ok(v as u64),
        }
    }

    /// Read a length-encoded byte string
    pub fn read_lenenc_bytes(&mut self) -> Result<Bytes> {
        let len = self.read_lenenc_int()? as usize;
        self.read_bytes(len)
    }

    /// Read a length-encoded UTF-8 string
    pub fn read_lenenc_string(&mut self) -> Result<String> {
        let bytes = self.read_lenenc_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in wire string: {}", e)))
    }

    /// Read a null-terminated UTF-8 string
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.data.len() {
            return Err(Error::BufferUnderflow {
                needed: 1,
                available: 0,
            });
        }
        let s = String::from_utf8(self.data[start..self.pos].to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in wire string: {}", e)))?;
        self.pos += 1; // terminator
        Ok(s)
    }

    /// Read the rest of the buffer as a UTF-8 string (EOF-terminated)
    pub fn read_eof_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes(self.remaining())?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in wire string: {}", e)))
    }
}
