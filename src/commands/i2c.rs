//! `i2c-eeprom`: read, write and read back bytes of an I2C EEPROM.

use std::fmt;

use anyhow::{ensure, Context, Result};
use daq_driver_labjack::{Eeprom, Ljm, LjmError, OpenTarget};
use rand::Rng;
use tracing::info;

use crate::config::I2cSettings;

/// Bytes seen during the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromReport {
    /// Memory offset used
    pub offset: u8,
    /// Contents before writing
    pub before: Vec<u8>,
    /// Bytes written
    pub written: Vec<u8>,
    /// Contents after writing
    pub after: Vec<u8>,
}

impl EepromReport {
    /// Whether the read-back matches what was written.
    pub fn verified(&self) -> bool {
        self.after == self.written
    }
}

impl fmt::Display for EepromReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Read  @{}: {:?}", self.offset, self.before)?;
        writeln!(f, "Wrote @{}: {:?}", self.offset, self.written)?;
        write!(f, "Read  @{}: {:?}", self.offset, self.after)
    }
}

/// Round trip with random data.
pub fn run(ljm: &Ljm, target: &OpenTarget, settings: &I2cSettings) -> Result<EepromReport> {
    let mut rng = rand::thread_rng();
    let data: Vec<u8> = (0..settings.length).map(|_| rng.gen()).collect();
    run_with_data(ljm, target, settings, &data)
}

/// Read `data.len()` bytes at the configured offset, write `data` there,
/// and read it back.
pub fn run_with_data(
    ljm: &Ljm,
    target: &OpenTarget,
    settings: &I2cSettings,
    data: &[u8],
) -> Result<EepromReport> {
    let report = ljm
        .with_device(target, |device| {
            let bus = device.i2c(settings.bus_config(device.device_type()))?;
            let eeprom = Eeprom::new(bus);

            let before = eeprom.read(settings.offset, data.len())?;
            eeprom.write_page(settings.offset, data)?;
            let after = eeprom.read(settings.offset, data.len())?;
            Ok::<_, LjmError>(EepromReport {
                offset: settings.offset,
                before,
                written: data.to_vec(),
                after,
            })
        })
        .with_context(|| {
            format!(
                "EEPROM round trip with slave 0x{:02X} on {} failed",
                settings.slave_address, target
            )
        })?;

    ensure!(
        report.verified(),
        "EEPROM read-back {:?} does not match written {:?}",
        report.after,
        report.written
    );
    info!(offset = report.offset, bytes = data.len(), "EEPROM round trip verified");
    Ok(report)
}
