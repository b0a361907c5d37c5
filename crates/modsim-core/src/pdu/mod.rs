//! PDU model: the supported function codes, decoded requests, response
//! builders and exception responses.

pub mod exception;
pub mod function;
pub mod request;
pub mod response;

pub use exception::{ExceptionCode, ExceptionResponse};
pub use function::{Access, FunctionCode, FunctionDescriptor, PointKind};
pub use request::{Request, RequestBody};

/// Per-request quantity ceilings fixed by the protocol.
pub const MAX_READ_BITS: u16 = 2000;
pub const MAX_READ_WORDS: u16 = 125;
pub const MAX_WRITE_BITS: u16 = 1968;
pub const MAX_WRITE_WORDS: u16 = 123;
