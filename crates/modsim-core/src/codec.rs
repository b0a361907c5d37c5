//! Cursor-style byte codec used by the frame and PDU modules.

use crate::{DecodeError, EncodeError};

/// Borrowing cursor over received bytes. All multi-byte reads are
/// big-endian, as everywhere in the protocol.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }
}

/// Writer over a caller-owned buffer. Multi-byte writes are big-endian.
#[derive(Debug)]
pub struct Sink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Sink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn len(&self) -> usize {
        self.pos
    }

    pub const fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        let slot = self
            .buf
            .get_mut(self.pos)
            .ok_or(EncodeError::BufferTooSmall)?;
        *slot = value;
        self.pos += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.put_slice(&value.to_be_bytes())
    }

    pub fn put_slice(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let end = self
            .pos
            .checked_add(data.len())
            .filter(|end| *end <= self.buf.len())
            .ok_or(EncodeError::BufferTooSmall)?;
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cursor, Sink};
    use crate::{DecodeError, EncodeError};

    #[test]
    fn cursor_walks_input() {
        let mut c = Cursor::new(&[0x01, 0x12, 0x34, 0xAA, 0xBB]);
        assert_eq!(c.u8().unwrap(), 0x01);
        assert_eq!(c.u16().unwrap(), 0x1234);
        assert_eq!(c.take(2).unwrap(), &[0xAA, 0xBB]);
        assert!(c.is_empty());
        assert_eq!(c.u8().unwrap_err(), DecodeError::UnexpectedEof);
    }

    #[test]
    fn sink_respects_bounds() {
        let mut buf = [0u8; 3];
        let mut s = Sink::new(&mut buf);
        s.put_u8(0x7F).unwrap();
        s.put_u16(0xBEEF).unwrap();
        assert_eq!(s.bytes(), &[0x7F, 0xBE, 0xEF]);
        assert_eq!(s.put_u8(0).unwrap_err(), EncodeError::BufferTooSmall);
    }
}
