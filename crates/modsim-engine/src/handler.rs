//! Protocol-level request handling, shared by both transports.
//!
//! Transports strip framing and hand the bare PDU here; the handler
//! resolves the target device, executes against its store and writes the
//! response PDU into a caller-owned buffer.

use crate::device::SlaveDevice;
use crate::store::StoreError;
use modsim_core::codec::Sink;
use modsim_core::pdu::{
    response, Access, ExceptionCode, ExceptionResponse, PointKind, Request, RequestBody,
};
use modsim_core::{DecodeError, EncodeError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Which framing the request arrived on. Broadcast semantics exist only on
/// the serial side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Network,
    Serial,
}

/// What the transport should do with the response buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Send the first `n` bytes of the response buffer.
    Respond(usize),
    /// Send nothing at all.
    Silent,
}

/// The broadcast unit id on serial links.
pub const BROADCAST_UNIT: u8 = 0;

/// Routes PDUs to simulated devices by unit id.
#[derive(Debug, Default)]
pub struct SlaveHandler {
    devices: HashMap<u8, Arc<SlaveDevice>>,
}

impl SlaveHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device, replacing any previous one on the same unit id.
    pub fn add(&mut self, device: Arc<SlaveDevice>) -> Option<Arc<SlaveDevice>> {
        self.devices.insert(device.unit_id(), device)
    }

    pub fn device(&self, unit_id: u8) -> Option<&Arc<SlaveDevice>> {
        self.devices.get(&unit_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<SlaveDevice>> {
        self.devices.values()
    }

    /// Handles one request PDU, writing the response into `out`.
    ///
    /// Every addressed request gets a response, valid or not; only serial
    /// broadcasts stay silent.
    pub fn handle(&self, channel: Channel, unit_id: u8, pdu: &[u8], out: &mut [u8]) -> Outcome {
        let function_byte = pdu.first().copied().unwrap_or(0) & 0x7F;

        if channel == Channel::Serial && unit_id == BROADCAST_UNIT {
            self.handle_broadcast(pdu);
            return Outcome::Silent;
        }

        let Some(device) = self.devices.get(&unit_id) else {
            debug!(unit_id, "request for unknown unit id");
            return exception(out, function_byte, ExceptionCode::SlaveDeviceFailure);
        };

        let request = match Request::decode(pdu) {
            Ok(request) => request,
            Err(err) => {
                debug!(unit_id, error = %err, "rejecting malformed request");
                return exception(out, function_byte, map_decode_error(err));
            }
        };

        trace!(
            unit_id,
            function = request.function.as_u8(),
            "executing request"
        );

        let mut sink = Sink::new(out);
        match execute(device, &request, &mut sink) {
            Ok(()) => Outcome::Respond(sink.len()),
            Err(ExecuteError::Store(err)) => {
                debug!(unit_id, error = %err, "request rejected by store");
                exception(out, function_byte, map_store_error(err))
            }
            Err(ExecuteError::Encode(err)) => {
                warn!(unit_id, error = %err, "response buffer too small");
                exception(out, function_byte, ExceptionCode::SlaveDeviceFailure)
            }
        }
    }

    /// Broadcasts execute writes on every device and never answer. Reads
    /// and malformed frames are dropped without effect.
    fn handle_broadcast(&self, pdu: &[u8]) {
        let request = match Request::decode(pdu) {
            Ok(request) if request.function.is_write() => request,
            Ok(request) => {
                trace!(function = request.function.as_u8(), "ignoring broadcast read");
                return;
            }
            Err(err) => {
                trace!(error = %err, "dropping malformed broadcast");
                return;
            }
        };

        for device in self.devices.values() {
            let mut scratch = [0u8; 8];
            let mut sink = Sink::new(&mut scratch);
            if let Err(err) = execute(device, &request, &mut sink) {
                debug!(
                    unit_id = device.unit_id(),
                    error = %err,
                    "broadcast write failed on device"
                );
            }
        }
    }
}

#[derive(Debug)]
enum ExecuteError {
    Store(StoreError),
    Encode(EncodeError),
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => err.fmt(f),
            Self::Encode(err) => err.fmt(f),
        }
    }
}

impl From<StoreError> for ExecuteError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<EncodeError> for ExecuteError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

/// Executes a decoded request against one device. Dispatch is driven by
/// the function descriptor, not by per-function branches.
fn execute(
    device: &SlaveDevice,
    request: &Request<'_>,
    sink: &mut Sink<'_>,
) -> Result<(), ExecuteError> {
    let descriptor = request.function.descriptor();
    let store = device.store();

    match (&request.body, descriptor.access, descriptor.kind) {
        (RequestBody::Read { start, count }, Access::Read, PointKind::Bit) => {
            let bits = store.read_bits(descriptor.space, *start, *count)?;
            response::bit_read(sink, request.function, &bits)?;
        }
        (RequestBody::Read { start, count }, Access::Read, PointKind::Word) => {
            let words = store.read_words(descriptor.space, *start, *count)?;
            response::word_read(sink, request.function, &words)?;
        }
        (RequestBody::WriteSingleBit { address, value }, Access::Write, PointKind::Bit) => {
            store.write_bits(descriptor.space, *address, &[*value])?;
            let echo = if *value { 0xFF00 } else { 0x0000 };
            response::write_echo(sink, request.function, *address, echo)?;
        }
        (RequestBody::WriteSingleWord { address, value }, Access::Write, PointKind::Word) => {
            store.write_words(descriptor.space, *address, &[*value])?;
            response::write_echo(sink, request.function, *address, *value)?;
        }
        (RequestBody::WriteBits { start, count, packed }, Access::Write, PointKind::Bit) => {
            // Decoding guarantees the payload covers `count` bits.
            let bits: Vec<bool> = (0..usize::from(*count))
                .map(|index| RequestBody::packed_bit(packed, index).unwrap_or(false))
                .collect();
            store.write_bits(descriptor.space, *start, &bits)?;
            response::write_echo(sink, request.function, *start, *count)?;
        }
        (RequestBody::WriteWords { start, bytes }, Access::Write, PointKind::Word) => {
            let count = bytes.len() / 2;
            let words: Vec<u16> = (0..count)
                .map(|index| RequestBody::payload_word(bytes, index).unwrap_or(0))
                .collect();
            store.write_words(descriptor.space, *start, &words)?;
            response::write_echo(sink, request.function, *start, count as u16)?;
        }
        // Decoding ties each body shape to its function code, so a
        // mismatched pairing cannot be constructed from the wire.
        _ => return Err(StoreError::IllegalValue.into()),
    }
    Ok(())
}

fn map_decode_error(err: DecodeError) -> ExceptionCode {
    match err {
        DecodeError::UnsupportedFunction(_) => ExceptionCode::IllegalFunction,
        DecodeError::UnexpectedEof
        | DecodeError::InvalidLength
        | DecodeError::InvalidValue => ExceptionCode::IllegalDataValue,
        DecodeError::CrcMismatch => ExceptionCode::SlaveDeviceFailure,
    }
}

fn map_store_error(err: StoreError) -> ExceptionCode {
    match err {
        StoreError::IllegalAddress => ExceptionCode::IllegalDataAddress,
        StoreError::IllegalValue => ExceptionCode::IllegalDataValue,
    }
}

fn exception(out: &mut [u8], function: u8, code: ExceptionCode) -> Outcome {
    let mut sink = Sink::new(out);
    match (ExceptionResponse { function, code }).encode(&mut sink) {
        Ok(()) => Outcome::Respond(sink.len()),
        Err(_) => Outcome::Silent,
    }
}
