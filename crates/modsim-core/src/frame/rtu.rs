//! Modbus RTU framing: unit id + PDU + CRC16 trailer.

use crate::codec::Sink;
use crate::{DecodeError, EncodeError};

/// Smallest complete frame: unit id + one-byte PDU + CRC.
pub const MIN_FRAME_LEN: usize = 4;
/// Largest frame the protocol allows: unit id + 253-byte PDU + CRC.
pub const MAX_FRAME_LEN: usize = 256;

/// CRC16 with polynomial 0xA001 and initial value 0xFFFF, transmitted
/// little-endian after the PDU.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            let carry = crc & 0x0001;
            crc >>= 1;
            if carry != 0 {
                crc ^= 0xA001;
            }
        }
    }
    crc
}

pub fn encode(sink: &mut Sink<'_>, unit_id: u8, pdu: &[u8]) -> Result<(), EncodeError> {
    if pdu.is_empty() || pdu.len() > MAX_FRAME_LEN - 3 {
        return Err(EncodeError::InvalidLength);
    }

    let start = sink.len();
    sink.put_u8(unit_id)?;
    sink.put_slice(pdu)?;
    let crc = crc16(&sink.bytes()[start..]);
    sink.put_slice(&crc.to_le_bytes())?;
    Ok(())
}

/// Splits a complete frame into unit id and PDU, verifying the CRC.
pub fn decode(frame: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(DecodeError::InvalidLength);
    }

    let (body, trailer) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    if crc16(body) != received {
        return Err(DecodeError::CrcMismatch);
    }

    Ok((body[0], &body[1..]))
}

#[cfg(test)]
mod tests {
    use super::{crc16, decode, encode};
    use crate::codec::Sink;
    use crate::DecodeError;

    #[test]
    fn crc16_reference_vector() {
        // Unit 1, FC03, start 0, quantity 10.
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
    }

    #[test]
    fn frame_roundtrip() {
        let mut buf = [0u8; 32];
        let mut sink = Sink::new(&mut buf);
        encode(&mut sink, 0x11, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();

        let (unit_id, pdu) = decode(sink.bytes()).unwrap();
        assert_eq!(unit_id, 0x11);
        assert_eq!(pdu, &[0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn rejects_corrupted_frame() {
        let mut buf = [0u8; 32];
        let mut sink = Sink::new(&mut buf);
        encode(&mut sink, 0x11, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();

        let mut corrupted = sink.bytes().to_vec();
        corrupted[2] ^= 0x01;
        assert_eq!(decode(&corrupted).unwrap_err(), DecodeError::CrcMismatch);
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(decode(&[0x01, 0x03, 0x00]).unwrap_err(), DecodeError::InvalidLength);
    }
}
