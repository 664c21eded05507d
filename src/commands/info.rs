//! `info`: open the device and report what it is.

use std::fmt;

use anyhow::{Context, Result};
use daq_driver_labjack::{HandleInfo, Ljm, LjmError, OpenTarget};
use tracing::info;

/// Identity of an opened device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    /// Handle info from the library
    pub info: HandleInfo,
    /// `FIRMWARE_VERSION`
    pub firmware_version: f64,
    /// `PRODUCT_ID`
    pub product_id: f64,
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device type: {}", self.info.device_type)?;
        writeln!(f, "Connection type: {}", self.info.connection_type)?;
        writeln!(f, "Serial number: {}", self.info.serial_number)?;
        writeln!(f, "IP address: {}", self.info.ip_address)?;
        writeln!(f, "Port: {}", self.info.port)?;
        writeln!(f, "Max bytes per MB: {}", self.info.max_bytes_per_mb)?;
        writeln!(f, "Product ID: {}", self.product_id)?;
        write!(f, "Firmware version: {:.4}", self.firmware_version)
    }
}

/// Open `target`, read its identity registers, close it.
pub fn run(ljm: &Ljm, target: &OpenTarget) -> Result<DeviceReport> {
    let report = ljm
        .with_device(target, |device| {
            let values = device.read_named(&["PRODUCT_ID", "FIRMWARE_VERSION"], &[1, 1])?;
            Ok::<_, LjmError>(DeviceReport {
                info: device.info().clone(),
                product_id: values[0][0],
                firmware_version: values[1][0],
            })
        })
        .with_context(|| format!("Failed to query {}", target))?;

    info!(
        serial = report.info.serial_number,
        firmware = report.firmware_version,
        "Queried device"
    );
    Ok(report)
}
