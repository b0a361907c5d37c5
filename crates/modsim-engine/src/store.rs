//! Per-device register storage: the four address spaces behind one lock.

use modsim_core::pdu::{MAX_READ_BITS, MAX_READ_WORDS};
use modsim_core::RegisterSpace;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Address or range outside the configured region.
    #[error("illegal register address")]
    IllegalAddress,
    /// Quantity of zero or above the per-request protocol maximum.
    #[error("illegal register count")]
    IllegalValue,
}

/// Region sizes fixed at construction. Out-of-range addresses stay invalid
/// for the lifetime of the device; regions never grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSizes {
    pub coils: usize,
    pub discrete_inputs: usize,
    pub holding_registers: usize,
    pub input_registers: usize,
}

impl RegionSizes {
    pub fn uniform(size: usize) -> Self {
        Self {
            coils: size,
            discrete_inputs: size,
            holding_registers: size,
            input_registers: size,
        }
    }

    pub fn for_space(&self, space: RegisterSpace) -> usize {
        match space {
            RegisterSpace::Coil => self.coils,
            RegisterSpace::DiscreteInput => self.discrete_inputs,
            RegisterSpace::HoldingRegister => self.holding_registers,
            RegisterSpace::InputRegister => self.input_registers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Regions {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

impl Regions {
    fn bits(&self, space: RegisterSpace) -> Result<&Vec<bool>, StoreError> {
        match space {
            RegisterSpace::Coil => Ok(&self.coils),
            RegisterSpace::DiscreteInput => Ok(&self.discrete_inputs),
            _ => Err(StoreError::IllegalAddress),
        }
    }

    fn bits_mut(&mut self, space: RegisterSpace) -> Result<&mut Vec<bool>, StoreError> {
        match space {
            RegisterSpace::Coil => Ok(&mut self.coils),
            RegisterSpace::DiscreteInput => Ok(&mut self.discrete_inputs),
            _ => Err(StoreError::IllegalAddress),
        }
    }

    fn words(&self, space: RegisterSpace) -> Result<&Vec<u16>, StoreError> {
        match space {
            RegisterSpace::HoldingRegister => Ok(&self.holding_registers),
            RegisterSpace::InputRegister => Ok(&self.input_registers),
            _ => Err(StoreError::IllegalAddress),
        }
    }

    fn words_mut(&mut self, space: RegisterSpace) -> Result<&mut Vec<u16>, StoreError> {
        match space {
            RegisterSpace::HoldingRegister => Ok(&mut self.holding_registers),
            RegisterSpace::InputRegister => Ok(&mut self.input_registers),
            _ => Err(StoreError::IllegalAddress),
        }
    }
}

/// Validates a full request range against a region before anything is
/// touched; writes are all-or-nothing.
fn span(start: u16, count: usize, len: usize, max: usize) -> Result<std::ops::Range<usize>, StoreError> {
    if count == 0 || count > max {
        return Err(StoreError::IllegalValue);
    }
    let start = usize::from(start);
    let end = start.checked_add(count).ok_or(StoreError::IllegalAddress)?;
    if end > len {
        return Err(StoreError::IllegalAddress);
    }
    Ok(start..end)
}

/// Thread-safe storage for one simulated device. Protocol workers and the
/// editing surface go through the same lock, so edits and traffic never
/// race; no caller holds the lock across I/O.
#[derive(Debug)]
pub struct RegisterStore {
    regions: RwLock<Regions>,
}

impl RegisterStore {
    pub fn new(sizes: &RegionSizes) -> Self {
        Self {
            regions: RwLock::new(Regions {
                coils: vec![false; sizes.coils],
                discrete_inputs: vec![false; sizes.discrete_inputs],
                holding_registers: vec![0; sizes.holding_registers],
                input_registers: vec![0; sizes.input_registers],
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Regions> {
        self.regions.read().expect("register store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Regions> {
        self.regions.write().expect("register store lock poisoned")
    }

    pub fn read_bits(
        &self,
        space: RegisterSpace,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, StoreError> {
        let regions = self.read();
        let bits = regions.bits(space)?;
        let range = span(start, usize::from(count), bits.len(), usize::from(MAX_READ_BITS))?;
        Ok(bits[range].to_vec())
    }

    pub fn write_bits(
        &self,
        space: RegisterSpace,
        start: u16,
        values: &[bool],
    ) -> Result<(), StoreError> {
        let mut regions = self.write();
        let bits = regions.bits_mut(space)?;
        let range = span(start, values.len(), bits.len(), usize::from(MAX_READ_BITS))?;
        bits[range].copy_from_slice(values);
        Ok(())
    }

    pub fn read_words(
        &self,
        space: RegisterSpace,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, StoreError> {
        let regions = self.read();
        let words = regions.words(space)?;
        let range = span(start, usize::from(count), words.len(), usize::from(MAX_READ_WORDS))?;
        Ok(words[range].to_vec())
    }

    pub fn write_words(
        &self,
        space: RegisterSpace,
        start: u16,
        values: &[u16],
    ) -> Result<(), StoreError> {
        let mut regions = self.write();
        let words = regions.words_mut(space)?;
        let range = span(start, values.len(), words.len(), usize::from(MAX_READ_WORDS))?;
        words[range].copy_from_slice(values);
        Ok(())
    }

    // Single-point access for the editing surface.

    pub fn bit(&self, space: RegisterSpace, address: u16) -> Result<bool, StoreError> {
        let regions = self.read();
        regions
            .bits(space)?
            .get(usize::from(address))
            .copied()
            .ok_or(StoreError::IllegalAddress)
    }

    pub fn set_bit(&self, space: RegisterSpace, address: u16, value: bool) -> Result<(), StoreError> {
        let mut regions = self.write();
        let slot = regions
            .bits_mut(space)?
            .get_mut(usize::from(address))
            .ok_or(StoreError::IllegalAddress)?;
        *slot = value;
        Ok(())
    }

    pub fn word(&self, space: RegisterSpace, address: u16) -> Result<u16, StoreError> {
        let regions = self.read();
        regions
            .words(space)?
            .get(usize::from(address))
            .copied()
            .ok_or(StoreError::IllegalAddress)
    }

    pub fn set_word(&self, space: RegisterSpace, address: u16, value: u16) -> Result<(), StoreError> {
        let mut regions = self.write();
        let slot = regions
            .words_mut(space)?
            .get_mut(usize::from(address))
            .ok_or(StoreError::IllegalAddress)?;
        *slot = value;
        Ok(())
    }

    /// Copy of a bit region for display purposes.
    pub fn snapshot_bits(&self, space: RegisterSpace) -> Result<Vec<bool>, StoreError> {
        Ok(self.read().bits(space)?.clone())
    }

    /// Copy of a word region for display purposes.
    pub fn snapshot_words(&self, space: RegisterSpace) -> Result<Vec<u16>, StoreError> {
        Ok(self.read().words(space)?.clone())
    }
}
