use core::fmt;

/// Errors raised while encoding a frame or PDU into an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    BufferTooSmall,
    ValueOutOfRange,
    InvalidLength,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("output buffer too small"),
            Self::ValueOutOfRange => f.write_str("value out of range"),
            Self::InvalidLength => f.write_str("invalid length"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors raised while decoding a frame or PDU from received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    UnsupportedFunction(u8),
    InvalidLength,
    InvalidValue,
    CrcMismatch,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::UnsupportedFunction(code) => write!(f, "unsupported function code 0x{code:02X}"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::InvalidValue => f.write_str("invalid value"),
            Self::CrcMismatch => f.write_str("crc mismatch"),
        }
    }
}

impl std::error::Error for DecodeError {}
