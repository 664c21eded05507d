//! Subcommand implementations.
//!
//! Every command is a blocking function taking an initialized [`Ljm`] and
//! the loaded configuration, so the binary can run it on a blocking thread
//! and tests can run it against the simulator.

pub mod i2c;
pub mod info;
pub mod stream;
pub mod stream_out;

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use daq_driver_labjack::mock::{SimConfig, SimulatedLjm};
use daq_driver_labjack::{ConnectionType, DeviceType, Ljm};
use tracing::info;

use crate::config::AppConfig;

/// Initialize the library: the simulator when asked for, LJM otherwise.
pub fn connect(config: &AppConfig) -> Result<Ljm> {
    if config.device.simulate {
        info!("Using simulated LabJack device");
        let sim = SimulatedLjm::with_config(simulator_config(config));
        return Ljm::new(sim, config.library.clone()).context("Failed to initialize simulator");
    }
    native(config)
}

#[cfg(feature = "hardware")]
fn native(config: &AppConfig) -> Result<Ljm> {
    Ljm::native(config.library.clone()).context("Failed to initialize the LJM library")
}

#[cfg(not(feature = "hardware"))]
fn native(_config: &AppConfig) -> Result<Ljm> {
    anyhow::bail!(
        "built without the `hardware` feature; rebuild with --features hardware or pass --simulate"
    )
}

/// Simulated device answering to the configured target, in real time.
pub fn simulator_config(config: &AppConfig) -> SimConfig {
    let device = &config.device;
    let mut sim = match device.device_type {
        DeviceType::T4 => SimConfig::t4_usb(),
        _ => SimConfig::default(),
    };
    if device.device_type == DeviceType::T8 {
        sim.device_type = DeviceType::T8;
    }
    if matches!(
        device.connection_type,
        ConnectionType::Usb | ConnectionType::Ethernet | ConnectionType::Wifi
    ) {
        sim.connection_type = device.connection_type;
    }
    if let Ok(ip) = device.identifier.parse::<Ipv4Addr>() {
        sim.ip_address = ip;
    } else if let Ok(serial) = device.identifier.parse::<i32>() {
        sim.serial_number = serial;
    }
    sim.realistic()
}
