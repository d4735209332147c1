//! Primitive field codec
//!
//! - Integers: little-endian
//! - Strings and byte blobs: u32 LE length prefix, then the raw bytes
//! - Enums: one byte

use super::errors::{WireError, WireResult};

/// Append-only field writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write an unsigned value as int64; values above `i64::MAX` are rejected.
    pub fn write_u64_as_i64(&mut self, field: &'static str, value: u64) -> WireResult<()> {
        let value = i64::try_from(value).map_err(|_| WireError::OutOfRange(field))?;
        self.write_i64(value);
        Ok(())
    }

    pub fn write_bytes(&mut self, field: &'static str, value: &[u8]) -> WireResult<()> {
        let len = u32::try_from(value.len()).map_err(|_| WireError::OutOfRange(field))?;
        self.write_u32(len);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    pub fn write_string(&mut self, field: &'static str, value: &str) -> WireResult<()> {
        self.write_bytes(field, value.as_bytes())
    }

    /// Consume the writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded message.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> WireResult<&'a [u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WireError::Truncated { needed, remaining });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> WireResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> WireResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read an int64 that must be non-negative.
    pub fn read_i64_as_u64(&mut self, field: &'static str) -> WireResult<u64> {
        let value = self.read_i64()?;
        u64::try_from(value).map_err(|_| WireError::Negative { field, value })
    }

    pub fn read_bytes(&mut self) -> WireResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self, field: &'static str) -> WireResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8(field))
    }

    /// Fail if anything is left unread.
    pub fn finish(self) -> WireResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}
