//! Simulation configuration: JSON in, validated device and transport
//! descriptions out.

use crate::convert::{ByteOrder, DataType, Value, WordOrder};
use crate::serial::SerialSettings;
use modsim_core::RegisterSpace;
use serde::Deserialize;
use thiserror::Error;

/// Highest addressable slave unit id; 248..=255 are reserved.
pub const MAX_UNIT_ID: u8 = 247;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no devices configured")]
    NoDevices,
    #[error("no transports configured")]
    NoTransports,
    #[error("unit id {0} is outside 1..={MAX_UNIT_ID}")]
    InvalidUnitId(u8),
    #[error("unit id {0} is configured twice")]
    DuplicateUnitId(u8),
    #[error("baud rate must be nonzero")]
    InvalidBaudRate,
    #[error("{0} data bits is not a valid serial setting")]
    InvalidDataBits(u8),
    #[error("{0} stop bits is not a valid serial setting")]
    InvalidStopBits(u8),
    #[error("unit {unit_id}: the {region} region must hold between 1 and 65536 points")]
    InvalidRegionSize { unit_id: u8, region: &'static str },
    #[error("field '{field}' on unit {unit_id}: string fields need a length")]
    MissingLength { unit_id: u8, field: String },
    #[error("field '{field}' on unit {unit_id}: only bool fields fit a bit space")]
    BitSpaceNeedsBool { unit_id: u8, field: String },
    #[error("field '{field}' on unit {unit_id}: {reason}")]
    InvalidField {
        unit_id: u8,
        field: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub transports: Vec<TransportConfig>,
    pub devices: Vec<DeviceConfig>,
}

impl SimulationConfig {
    /// Parses and validates a configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if self.transports.is_empty() {
            return Err(ConfigError::NoTransports);
        }
        for transport in &self.transports {
            transport.validate()?;
        }

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.unit_id == 0 || device.unit_id > MAX_UNIT_ID {
                return Err(ConfigError::InvalidUnitId(device.unit_id));
            }
            if !seen.insert(device.unit_id) {
                return Err(ConfigError::DuplicateUnitId(device.unit_id));
            }
            device.regions.validate(device.unit_id)?;
            for field in &device.fields {
                field.validate(device.unit_id)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Tcp(TcpConfig),
    Serial(SerialConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Even,
    Odd,
}

impl TransportConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Tcp(_) => Ok(()),
            Self::Serial(serial) => serial.validate(),
        }
    }
}

impl SerialConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::InvalidDataBits(self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConfigError::InvalidStopBits(self.stop_bits));
        }
        Ok(())
    }

    /// Serial link parameters for the listener.
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            path: self.path.clone(),
            baud_rate: self.baud_rate,
            parity: match self.parity {
                ParityConfig::None => tokio_serial::Parity::None,
                ParityConfig::Even => tokio_serial::Parity::Even,
                ParityConfig::Odd => tokio_serial::Parity::Odd,
            },
            data_bits: match self.data_bits {
                5 => tokio_serial::DataBits::Five,
                6 => tokio_serial::DataBits::Six,
                7 => tokio_serial::DataBits::Seven,
                _ => tokio_serial::DataBits::Eight,
            },
            stop_bits: match self.stop_bits {
                2 => tokio_serial::StopBits::Two,
                _ => tokio_serial::StopBits::One,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub unit_id: u8,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub regions: RegionsConfig,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub version: String,
}

/// Region sizes in points. Every region defaults to the full 16-bit
/// address range; addresses past a region's end are illegal for the
/// lifetime of the device.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionsConfig {
    #[serde(default = "full_region")]
    pub coils: usize,
    #[serde(default = "full_region")]
    pub discrete_inputs: usize,
    #[serde(default = "full_region")]
    pub holding_registers: usize,
    #[serde(default = "full_region")]
    pub input_registers: usize,
}

fn full_region() -> usize {
    0x1_0000
}

impl RegionsConfig {
    fn validate(&self, unit_id: u8) -> Result<(), ConfigError> {
        let regions = [
            ("coils", self.coils),
            ("discrete_inputs", self.discrete_inputs),
            ("holding_registers", self.holding_registers),
            ("input_registers", self.input_registers),
        ];
        for (region, size) in regions {
            if size == 0 || size > full_region() {
                return Err(ConfigError::InvalidRegionSize { unit_id, region });
            }
        }
        Ok(())
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            coils: full_region(),
            discrete_inputs: full_region(),
            holding_registers: full_region(),
            input_registers: full_region(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceConfig {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl From<SpaceConfig> for RegisterSpace {
    fn from(space: SpaceConfig) -> Self {
        match space {
            SpaceConfig::Coil => Self::Coil,
            SpaceConfig::DiscreteInput => Self::DiscreteInput,
            SpaceConfig::HoldingRegister => Self::HoldingRegister,
            SpaceConfig::InputRegister => Self::InputRegister,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeConfig {
    Bool,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Double64,
    String,
}

/// Typed initial value as it appears in JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    Bool(bool),
    Uint(u64),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&InitialValue> for Value {
    fn from(initial: &InitialValue) -> Self {
        match initial {
            InitialValue::Bool(v) => Self::Bit(*v),
            InitialValue::Uint(v) => Self::Uint(*v),
            InitialValue::Int(v) => Self::Int(*v),
            InitialValue::Float(v) => Self::Float(*v),
            InitialValue::Text(v) => Self::Text(v.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    pub space: SpaceConfig,
    pub address: u16,
    #[serde(rename = "type")]
    pub data_type: TypeConfig,
    /// Capacity in bytes, string fields only.
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default = "default_order")]
    pub word_order: WordOrder,
    #[serde(default = "default_order_bytes")]
    pub byte_order: ByteOrder,
    #[serde(default = "default_writable")]
    pub writable: bool,
    #[serde(default)]
    pub initial: Option<InitialValue>,
}

fn default_order() -> WordOrder {
    WordOrder::Big
}

fn default_order_bytes() -> ByteOrder {
    ByteOrder::Big
}

fn default_writable() -> bool {
    true
}

impl FieldConfig {
    fn validate(&self, unit_id: u8) -> Result<(), ConfigError> {
        let space = RegisterSpace::from(self.space);
        if space.is_bit() && self.data_type != TypeConfig::Bool {
            return Err(ConfigError::BitSpaceNeedsBool {
                unit_id,
                field: self.name.clone(),
            });
        }
        if self.data_type == TypeConfig::String && self.length.unwrap_or(0) == 0 {
            return Err(ConfigError::MissingLength {
                unit_id,
                field: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn resolved_type(&self) -> DataType {
        match self.data_type {
            TypeConfig::Bool => DataType::Bool,
            TypeConfig::Int16 => DataType::Int16,
            TypeConfig::Uint16 => DataType::Uint16,
            TypeConfig::Int32 => DataType::Int32,
            TypeConfig::Uint32 => DataType::Uint32,
            TypeConfig::Int64 => DataType::Int64,
            TypeConfig::Uint64 => DataType::Uint64,
            TypeConfig::Float32 => DataType::Float32,
            TypeConfig::Double64 => DataType::Float64,
            TypeConfig::String => DataType::Ascii {
                bytes: self.length.unwrap_or(0),
            },
        }
    }
}
