use crate::codec::Cursor;
use crate::pdu::{
    FunctionCode, MAX_READ_BITS, MAX_READ_WORDS, MAX_WRITE_BITS, MAX_WRITE_WORDS,
};
use crate::DecodeError;

/// Payload of a decoded request, normalized across function codes so the
/// handler can execute through the dispatch descriptors instead of
/// matching on every function separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBody<'a> {
    /// FC 01/02/03/04.
    Read { start: u16, count: u16 },
    /// FC 05. On the wire the value is 0xFF00 or 0x0000.
    WriteSingleBit { address: u16, value: bool },
    /// FC 06.
    WriteSingleWord { address: u16, value: u16 },
    /// FC 15. Bits packed LSB-first within each byte.
    WriteBits {
        start: u16,
        count: u16,
        packed: &'a [u8],
    },
    /// FC 16. Word values as received, two big-endian bytes each.
    WriteWords { start: u16, bytes: &'a [u8] },
}

/// A request PDU after function-code validation and payload parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub function: FunctionCode,
    pub body: RequestBody<'a>,
}

fn check_quantity(quantity: u16, max: u16) -> Result<(), DecodeError> {
    if quantity == 0 || quantity > max {
        return Err(DecodeError::InvalidValue);
    }
    Ok(())
}

impl<'a> Request<'a> {
    /// Decodes a request PDU. The whole PDU must be consumed; trailing
    /// bytes indicate a framing problem and fail the decode.
    pub fn decode(pdu: &'a [u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(pdu);
        let raw = cursor.u8()?;
        let function =
            FunctionCode::from_u8(raw).ok_or(DecodeError::UnsupportedFunction(raw))?;

        let body = match function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                let start = cursor.u16()?;
                let count = cursor.u16()?;
                check_quantity(count, MAX_READ_BITS)?;
                RequestBody::Read { start, count }
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                let start = cursor.u16()?;
                let count = cursor.u16()?;
                check_quantity(count, MAX_READ_WORDS)?;
                RequestBody::Read { start, count }
            }
            FunctionCode::WriteSingleCoil => {
                let address = cursor.u16()?;
                let value = match cursor.u16()? {
                    0xFF00 => true,
                    0x0000 => false,
                    _ => return Err(DecodeError::InvalidValue),
                };
                RequestBody::WriteSingleBit { address, value }
            }
            FunctionCode::WriteSingleRegister => {
                let address = cursor.u16()?;
                let value = cursor.u16()?;
                RequestBody::WriteSingleWord { address, value }
            }
            FunctionCode::WriteMultipleCoils => {
                let start = cursor.u16()?;
                let count = cursor.u16()?;
                check_quantity(count, MAX_WRITE_BITS)?;
                let byte_count = usize::from(cursor.u8()?);
                if byte_count != usize::from(count).div_ceil(8) {
                    return Err(DecodeError::InvalidLength);
                }
                let packed = cursor.take(byte_count)?;
                RequestBody::WriteBits {
                    start,
                    count,
                    packed,
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                let start = cursor.u16()?;
                let count = cursor.u16()?;
                check_quantity(count, MAX_WRITE_WORDS)?;
                let byte_count = usize::from(cursor.u8()?);
                if byte_count != usize::from(count) * 2 {
                    return Err(DecodeError::InvalidLength);
                }
                let bytes = cursor.take(byte_count)?;
                RequestBody::WriteWords { start, bytes }
            }
        };

        if !cursor.is_empty() {
            return Err(DecodeError::InvalidLength);
        }

        Ok(Self { function, body })
    }
}

impl<'a> RequestBody<'a> {
    /// Bit at `index` of a packed FC15 payload, LSB-first.
    pub fn packed_bit(packed: &[u8], index: usize) -> Option<bool> {
        let byte = packed.get(index / 8)?;
        Some((byte >> (index % 8)) & 1 != 0)
    }

    /// Word at `index` of an FC16 payload.
    pub fn payload_word(bytes: &[u8], index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let pair = bytes.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([pair[0], pair[1]]))
    }
}
