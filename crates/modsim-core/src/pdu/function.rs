use crate::RegisterSpace;

/// The function codes the simulator serves. The set is closed: any other
/// code on the wire is answered with an IllegalFunction exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

/// Whether a function reads from or writes to its address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Whether a function addresses single bits or 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Bit,
    Word,
}

/// Tagged operation descriptor for a function code: which address space it
/// touches, in which direction, at what granularity. The handler dispatches
/// on these instead of branching per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub space: RegisterSpace,
    pub access: Access,
    pub kind: PointKind,
}

impl FunctionCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
        }
    }

    /// Returns `None` for any code outside the supported set, including
    /// codes with the exception bit set.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// The fixed dispatch entry for this function code.
    pub const fn descriptor(self) -> FunctionDescriptor {
        use RegisterSpace::{Coil, DiscreteInput, HoldingRegister, InputRegister};
        match self {
            Self::ReadCoils => FunctionDescriptor {
                space: Coil,
                access: Access::Read,
                kind: PointKind::Bit,
            },
            Self::ReadDiscreteInputs => FunctionDescriptor {
                space: DiscreteInput,
                access: Access::Read,
                kind: PointKind::Bit,
            },
            Self::ReadHoldingRegisters => FunctionDescriptor {
                space: HoldingRegister,
                access: Access::Read,
                kind: PointKind::Word,
            },
            Self::ReadInputRegisters => FunctionDescriptor {
                space: InputRegister,
                access: Access::Read,
                kind: PointKind::Word,
            },
            Self::WriteSingleCoil | Self::WriteMultipleCoils => FunctionDescriptor {
                space: Coil,
                access: Access::Write,
                kind: PointKind::Bit,
            },
            Self::WriteSingleRegister | Self::WriteMultipleRegisters => FunctionDescriptor {
                space: HoldingRegister,
                access: Access::Write,
                kind: PointKind::Word,
            },
        }
    }

    pub const fn is_write(self) -> bool {
        matches!(self.descriptor().access, Access::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::{Access, FunctionCode, PointKind};
    use crate::RegisterSpace;

    #[test]
    fn codes_roundtrip() {
        for code in [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10] {
            let function = FunctionCode::from_u8(code).unwrap();
            assert_eq!(function.as_u8(), code);
        }
    }

    #[test]
    fn unsupported_codes_rejected() {
        assert!(FunctionCode::from_u8(0x07).is_none());
        assert!(FunctionCode::from_u8(0x16).is_none());
        assert!(FunctionCode::from_u8(0x83).is_none());
        assert!(FunctionCode::from_u8(0x00).is_none());
    }

    #[test]
    fn descriptors_pair_functions_with_spaces() {
        let d = FunctionCode::ReadDiscreteInputs.descriptor();
        assert_eq!(d.space, RegisterSpace::DiscreteInput);
        assert_eq!(d.access, Access::Read);
        assert_eq!(d.kind, PointKind::Bit);

        let d = FunctionCode::WriteMultipleRegisters.descriptor();
        assert_eq!(d.space, RegisterSpace::HoldingRegister);
        assert_eq!(d.access, Access::Write);
        assert_eq!(d.kind, PointKind::Word);

        assert!(!FunctionCode::ReadCoils.is_write());
        assert!(FunctionCode::WriteSingleCoil.is_write());
    }
}
