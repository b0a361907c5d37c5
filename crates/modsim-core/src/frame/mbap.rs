//! MBAP header handling for Modbus TCP.

use crate::codec::{Cursor, Sink};
use crate::{DecodeError, EncodeError};

pub const HEADER_LEN: usize = 7;
/// Largest PDU a TCP frame may carry.
pub const MAX_PDU_LEN: usize = 253;

/// The 7-byte header in front of every Modbus TCP PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    /// Always zero for Modbus.
    pub protocol_id: u16,
    /// Number of bytes following the length field: unit id + PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Builds a header for a PDU of `pdu_len` bytes.
    pub fn for_pdu(transaction_id: u16, unit_id: u8, pdu_len: usize) -> Result<Self, EncodeError> {
        if pdu_len == 0 || pdu_len > MAX_PDU_LEN {
            return Err(EncodeError::InvalidLength);
        }
        Ok(Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_len as u16 + 1,
            unit_id,
        })
    }

    /// Length of the PDU announced by this header.
    pub fn pdu_len(&self) -> usize {
        usize::from(self.length).saturating_sub(1)
    }

    pub fn encode(&self, sink: &mut Sink<'_>) -> Result<(), EncodeError> {
        sink.put_u16(self.transaction_id)?;
        sink.put_u16(self.protocol_id)?;
        sink.put_u16(self.length)?;
        sink.put_u8(self.unit_id)?;
        Ok(())
    }

    pub fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let transaction_id = cursor.u16()?;
        let protocol_id = cursor.u16()?;
        let length = cursor.u16()?;
        let unit_id = cursor.u8()?;

        if protocol_id != 0 {
            return Err(DecodeError::InvalidValue);
        }
        if length < 2 || usize::from(length) - 1 > MAX_PDU_LEN {
            return Err(DecodeError::InvalidLength);
        }

        Ok(Self {
            transaction_id,
            protocol_id,
            length,
            unit_id,
        })
    }
}

/// Writes a complete TCP frame: header followed by the PDU.
pub fn encode(
    sink: &mut Sink<'_>,
    transaction_id: u16,
    unit_id: u8,
    pdu: &[u8],
) -> Result<(), EncodeError> {
    MbapHeader::for_pdu(transaction_id, unit_id, pdu.len())?.encode(sink)?;
    sink.put_slice(pdu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{encode, MbapHeader, HEADER_LEN};
    use crate::codec::{Cursor, Sink};
    use crate::DecodeError;

    #[test]
    fn header_roundtrip() {
        let mut buf = [0u8; 16];
        let mut sink = Sink::new(&mut buf);
        encode(&mut sink, 7, 2, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();
        assert_eq!(sink.len(), HEADER_LEN + 5);

        let mut cursor = Cursor::new(sink.bytes());
        let header = MbapHeader::decode(&mut cursor).unwrap();
        assert_eq!(header.transaction_id, 7);
        assert_eq!(header.unit_id, 2);
        assert_eq!(header.pdu_len(), 5);
        assert_eq!(cursor.take(5).unwrap(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn rejects_nonzero_protocol_id() {
        let bytes = [0x00, 0x07, 0x00, 0x01, 0x00, 0x02, 0x01];
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(
            MbapHeader::decode(&mut cursor).unwrap_err(),
            DecodeError::InvalidValue
        );
    }

    #[test]
    fn rejects_empty_pdu_length() {
        let bytes = [0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x01];
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(
            MbapHeader::decode(&mut cursor).unwrap_err(),
            DecodeError::InvalidLength
        );
    }
}
