use crate::codec::Sink;
use crate::EncodeError;

/// Exception codes the simulator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
}

impl ExceptionCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::SlaveDeviceFailure => 0x04,
        }
    }
}

/// An exception PDU: the offending function code with its high bit set,
/// followed by the exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    /// Function code as received, without the exception bit.
    pub function: u8,
    pub code: ExceptionCode,
}

impl ExceptionResponse {
    pub fn encode(&self, sink: &mut Sink<'_>) -> Result<(), EncodeError> {
        sink.put_u8(self.function | 0x80)?;
        sink.put_u8(self.code.as_u8())?;
        Ok(())
    }
}
