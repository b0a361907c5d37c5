//! Transport framing: RTU (CRC-delimited) and MBAP (length-prefixed).

pub mod mbap;
pub mod rtu;
