//! A simulated slave device: identity, register storage and the typed
//! field layer on top of it.

use crate::convert::{self, ConversionError, ConversionRule, RuleTable, Value};
use crate::store::{RegionSizes, RegisterStore, StoreError};
use thiserror::Error;

/// Free-form identification strings reported at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub product: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("field '{0}' is read-only")]
    ReadOnly(String),
}

/// One slave on the bus. The store is shared between protocol workers and
/// the editing surface; field access goes through the conversion rules.
#[derive(Debug)]
pub struct SlaveDevice {
    unit_id: u8,
    identity: DeviceIdentity,
    store: RegisterStore,
    rules: RuleTable,
}

impl SlaveDevice {
    pub fn new(unit_id: u8, identity: DeviceIdentity, sizes: &RegionSizes) -> Self {
        Self {
            unit_id,
            identity,
            store: RegisterStore::new(sizes),
            rules: RuleTable::new(),
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: ConversionRule) -> Result<(), FieldError> {
        if rule.end() > 0x1_0000 {
            return Err(StoreError::IllegalAddress.into());
        }
        self.rules.insert(rule)?;
        Ok(())
    }

    fn rule(&self, name: &str) -> Result<&ConversionRule, FieldError> {
        self.rules
            .get(name)
            .ok_or_else(|| ConversionError::UnknownField(name.to_string()).into())
    }

    /// Reads a named field and decodes it to a typed value.
    pub fn read_field(&self, name: &str) -> Result<Value, FieldError> {
        let rule = self.rule(name)?;
        if rule.space.is_bit() {
            let bit = self.store.bit(rule.space, rule.start)?;
            return Ok(Value::Bit(bit));
        }
        let words = self
            .store
            .read_words(rule.space, rule.start, rule.word_span() as u16)?;
        Ok(convert::decode(rule, &words)?)
    }

    /// Encodes a typed value and writes the whole span in one store call.
    pub fn write_field(&self, name: &str, value: &Value) -> Result<(), FieldError> {
        let rule = self.rule(name)?;
        if !rule.writable {
            return Err(FieldError::ReadOnly(name.to_string()));
        }
        self.write_field_unchecked(name, value)
    }

    /// Same as [`write_field`](Self::write_field) but ignores the writable
    /// flag; used when applying configured initial values.
    pub fn write_field_unchecked(&self, name: &str, value: &Value) -> Result<(), FieldError> {
        let rule = self.rule(name)?;
        if rule.space.is_bit() {
            let Value::Bit(bit) = value else {
                return Err(ConversionError::TypeMismatch { expected: "bool" }.into());
            };
            self.store.set_bit(rule.space, rule.start, *bit)?;
            return Ok(());
        }
        let words = convert::encode(rule, value)?;
        self.store.write_words(rule.space, rule.start, &words)?;
        Ok(())
    }
}
