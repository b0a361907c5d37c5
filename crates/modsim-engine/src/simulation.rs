//! Top-level simulation context: owns the devices, the transports and
//! the shutdown signal.

use crate::config::{ConfigError, DeviceConfig, SimulationConfig, TransportConfig};
use crate::convert::{ConversionRule, Value};
use crate::device::{DeviceIdentity, SlaveDevice};
use crate::handler::SlaveHandler;
use crate::serial::SerialSlaveListener;
use crate::store::RegionSizes;
use crate::tcp::TcpSlaveListener;
use crate::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A configured simulation. Devices exist from construction; transports
/// come up on [`start`](Self::start) and go down on [`stop`](Self::stop).
pub struct Simulation {
    handler: Arc<SlaveHandler>,
    transports: Vec<TransportConfig>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<Result<(), TransportError>>>,
    tcp_addrs: Vec<SocketAddr>,
}

impl Simulation {
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let mut handler = SlaveHandler::new();
        for device_config in &config.devices {
            let device = build_device(device_config)?;
            info!(
                unit_id = device.unit_id(),
                vendor = %device.identity().vendor,
                product = %device.identity().product,
                version = %device.identity().version,
                "device ready"
            );
            handler.add(Arc::new(device));
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            handler: Arc::new(handler),
            transports: config.transports.clone(),
            shutdown,
            workers: Vec::new(),
            tcp_addrs: Vec::new(),
        })
    }

    pub fn handler(&self) -> &Arc<SlaveHandler> {
        &self.handler
    }

    pub fn device(&self, unit_id: u8) -> Option<&Arc<SlaveDevice>> {
        self.handler.device(unit_id)
    }

    /// Addresses the TCP listeners are bound to, available after
    /// [`start`](Self::start).
    pub fn tcp_addrs(&self) -> &[SocketAddr] {
        &self.tcp_addrs
    }

    /// Binds every configured transport and spawns its worker. TCP binds
    /// happen here so bind failures surface before any traffic.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        for transport in &self.transports {
            match transport {
                TransportConfig::Tcp(tcp) => {
                    let listener = TcpSlaveListener::bind(
                        tcp.bind.as_str(),
                        Arc::clone(&self.handler),
                        self.shutdown.subscribe(),
                    )
                    .await?;
                    let addr = listener.local_addr()?;
                    info!(%addr, "modbus tcp listener up");
                    self.tcp_addrs.push(addr);
                    self.workers.push(tokio::spawn(listener.run()));
                }
                TransportConfig::Serial(serial) => {
                    let settings = serial.settings();
                    info!(path = %settings.path, baud_rate = settings.baud_rate, "serial listener up");
                    let listener = SerialSlaveListener::new(
                        settings,
                        Arc::clone(&self.handler),
                        self.shutdown.subscribe(),
                    );
                    self.workers.push(tokio::spawn(listener.run()));
                }
            }
        }
        Ok(())
    }

    /// Signals shutdown and waits for every worker. Listeners stop
    /// accepting first; connections drain on the same signal, so any
    /// operation already past its transport read completes.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers.drain(..) {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "transport worker ended with error"),
                Err(err) => warn!(error = %err, "transport worker panicked"),
            }
        }
        self.tcp_addrs.clear();
        info!("simulation stopped");
    }
}

fn build_device(config: &DeviceConfig) -> Result<SlaveDevice, ConfigError> {
    let sizes = RegionSizes {
        coils: config.regions.coils,
        discrete_inputs: config.regions.discrete_inputs,
        holding_registers: config.regions.holding_registers,
        input_registers: config.regions.input_registers,
    };
    let identity = DeviceIdentity {
        vendor: config.identity.vendor.clone(),
        product: config.identity.product.clone(),
        version: config.identity.version.clone(),
    };
    let mut device = SlaveDevice::new(config.unit_id, identity, &sizes);

    for field in &config.fields {
        let rule = ConversionRule {
            name: field.name.clone(),
            space: field.space.into(),
            start: field.address,
            data_type: field.resolved_type(),
            word_order: field.word_order,
            byte_order: field.byte_order,
            writable: field.writable,
        };
        let region_len = sizes.for_space(rule.space) as u32;
        if rule.end() > region_len {
            return Err(ConfigError::InvalidField {
                unit_id: config.unit_id,
                field: field.name.clone(),
                reason: format!(
                    "span {}..{} extends past the {} region end ({region_len})",
                    rule.start,
                    rule.end(),
                    rule.space
                ),
            });
        }
        device
            .add_rule(rule)
            .map_err(|err| ConfigError::InvalidField {
                unit_id: config.unit_id,
                field: field.name.clone(),
                reason: err.to_string(),
            })?;

        if let Some(initial) = &field.initial {
            let value = Value::from(initial);
            device
                .write_field_unchecked(&field.name, &value)
                .map_err(|err| ConfigError::InvalidField {
                    unit_id: config.unit_id,
                    field: field.name.clone(),
                    reason: err.to_string(),
                })?;
        }
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::Simulation;
    use crate::config::SimulationConfig;
    use crate::convert::Value;
    use modsim_core::RegisterSpace;

    const CONFIG: &str = r#"{
        "transports": [{"type": "tcp", "bind": "127.0.0.1:0"}],
        "devices": [{
            "unit_id": 17,
            "regions": {"holding_registers": 128},
            "fields": [
                {"name": "speed", "space": "holding_register", "address": 10,
                 "type": "float32", "initial": 3.14},
                {"name": "label", "space": "holding_register", "address": 20,
                 "type": "string", "length": 8, "initial": "pump"}
            ]
        }]
    }"#;

    #[test]
    fn initial_values_land_in_registers() {
        let config = SimulationConfig::from_json(CONFIG).unwrap();
        let simulation = Simulation::from_config(&config).unwrap();

        let device = simulation.device(17).unwrap();
        assert_eq!(
            device
                .store()
                .read_words(RegisterSpace::HoldingRegister, 10, 2)
                .unwrap(),
            vec![0x4048, 0xF5C3]
        );
        assert_eq!(
            device.read_field("label").unwrap(),
            Value::Text("pump".into())
        );
    }

    #[test]
    fn field_outside_region_fails_construction() {
        let config = SimulationConfig::from_json(
            r#"{
                "transports": [{"type": "tcp", "bind": "127.0.0.1:0"}],
                "devices": [{
                    "unit_id": 1,
                    "regions": {"holding_registers": 16},
                    "fields": [{"name": "far", "space": "holding_register",
                                "address": 15, "type": "uint32"}]
                }]
            }"#,
        )
        .unwrap();
        assert!(Simulation::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn start_binds_and_stop_joins() {
        let config = SimulationConfig::from_json(CONFIG).unwrap();
        let mut simulation = Simulation::from_config(&config).unwrap();

        simulation.start().await.unwrap();
        assert_eq!(simulation.tcp_addrs().len(), 1);

        simulation.stop().await;
        assert!(simulation.tcp_addrs().is_empty());
    }
}
