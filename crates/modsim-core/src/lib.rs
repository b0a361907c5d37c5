//! Wire-level Modbus protocol support for the slave simulator.
//!
//! `modsim-core` covers the byte-exact parts of the protocol: the cursor
//! codec, RTU and MBAP framing, and the PDU request/response/exception
//! model for the common read/write function codes. It performs no I/O and
//! holds no state; the engine crate builds the simulator on top of it.

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod pdu;

pub use error::{DecodeError, EncodeError};

/// The four Modbus address spaces of a slave device.
///
/// Coils and discrete inputs hold single bits; holding and input registers
/// hold 16-bit unsigned words. Discrete inputs and input registers are
/// read-only from the protocol side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterSpace {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegisterSpace {
    /// True for the single-bit spaces.
    pub const fn is_bit(self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete input",
            Self::HoldingRegister => "holding register",
            Self::InputRegister => "input register",
        }
    }
}

impl core::fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
