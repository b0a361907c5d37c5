//! Modbus slave simulation engine.
//!
//! Builds simulated slave devices from configuration and serves them over
//! Modbus TCP and serial RTU. Register storage, typed field conversion
//! and request handling live here; the wire protocol lives in
//! `modsim-core`.

#![forbid(unsafe_code)]

pub mod config;
pub mod convert;
pub mod device;
pub mod handler;
pub mod serial;
pub mod simulation;
pub mod store;
pub mod tcp;

use modsim_core::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors from the transport layer: socket and serial port I/O plus
/// framing faults that end a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to open serial port '{path}': {reason}")]
    SerialOpen { path: String, reason: String },
}

pub use config::{ConfigError, SimulationConfig};
pub use convert::{ConversionError, ConversionRule, DataType, Value};
pub use device::{DeviceIdentity, FieldError, SlaveDevice};
pub use handler::{Channel, Outcome, SlaveHandler};
pub use simulation::Simulation;
pub use store::{RegionSizes, RegisterStore, StoreError};
