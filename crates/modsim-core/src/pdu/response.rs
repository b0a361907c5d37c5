//! Success-response builders. The handler writes responses directly into a
//! caller-owned buffer through these; exception responses live in
//! [`crate::pdu::exception`].

use crate::codec::Sink;
use crate::pdu::FunctionCode;
use crate::EncodeError;

/// FC 01/02 response: byte count, then bits packed LSB-first.
pub fn bit_read(
    sink: &mut Sink<'_>,
    function: FunctionCode,
    values: &[bool],
) -> Result<(), EncodeError> {
    let byte_count = values.len().div_ceil(8);
    let byte_count_u8: u8 = byte_count
        .try_into()
        .map_err(|_| EncodeError::ValueOutOfRange)?;

    sink.put_u8(function.as_u8())?;
    sink.put_u8(byte_count_u8)?;

    let mut packed = [0u8; 250];
    for (i, value) in values.iter().enumerate() {
        if *value {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    sink.put_slice(&packed[..byte_count])?;
    Ok(())
}

/// FC 03/04 response: byte count, then big-endian words.
pub fn word_read(
    sink: &mut Sink<'_>,
    function: FunctionCode,
    values: &[u16],
) -> Result<(), EncodeError> {
    let byte_count: u8 = (values.len() * 2)
        .try_into()
        .map_err(|_| EncodeError::ValueOutOfRange)?;

    sink.put_u8(function.as_u8())?;
    sink.put_u8(byte_count)?;
    for value in values {
        sink.put_u16(*value)?;
    }
    Ok(())
}

/// FC 05/06/15/16 response: echo of address and value (single writes) or
/// address and quantity (multiple writes).
pub fn write_echo(
    sink: &mut Sink<'_>,
    function: FunctionCode,
    address: u16,
    value_or_count: u16,
) -> Result<(), EncodeError> {
    sink.put_u8(function.as_u8())?;
    sink.put_u16(address)?;
    sink.put_u16(value_or_count)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{bit_read, word_read, write_echo};
    use crate::codec::Sink;
    use crate::pdu::FunctionCode;

    #[test]
    fn bit_read_packs_lsb_first() {
        let mut buf = [0u8; 8];
        let mut sink = Sink::new(&mut buf);
        bit_read(
            &mut sink,
            FunctionCode::ReadCoils,
            &[true, false, true, true, false, false, true, false, true],
        )
        .unwrap();
        assert_eq!(sink.bytes(), &[0x01, 0x02, 0b0100_1101, 0b0000_0001]);
    }

    #[test]
    fn word_read_emits_big_endian() {
        let mut buf = [0u8; 16];
        let mut sink = Sink::new(&mut buf);
        word_read(
            &mut sink,
            FunctionCode::ReadHoldingRegisters,
            &[0x022B, 0x0000, 0x0064],
        )
        .unwrap();
        assert_eq!(
            sink.bytes(),
            &[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]
        );
    }

    #[test]
    fn write_echo_repeats_address_and_value() {
        let mut buf = [0u8; 8];
        let mut sink = Sink::new(&mut buf);
        write_echo(&mut sink, FunctionCode::WriteSingleCoil, 0x00AC, 0xFF00).unwrap();
        assert_eq!(sink.bytes(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
    }
}
