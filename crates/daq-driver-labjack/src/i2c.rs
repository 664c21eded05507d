//! I2C master through the device's I2C registers.
//!
//! The device runs the bus itself; a transaction is set up by writing the
//! pin, speed, option and byte-count registers, loading `I2C_DATA_TX`, and
//! writing `I2C_GO`. Received bytes are then read from `I2C_DATA_RX` and
//! `I2C_ACKS` tells whether the slave answered.

use bitflags::bitflags;
use tracing::debug;

use crate::backend::Frame;
use crate::device::{Device, DeviceType};
use crate::error::{LjmError, Result};
use crate::registers::I2C_MAX_BYTES;

bitflags! {
    /// `I2C_OPTIONS` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct I2cOptions: u16 {
        /// Reset the bus before the transaction
        const RESET_BUS = 0b001;
        /// Repeated start between TX and RX instead of stop/start
        const RESTART_WITHOUT_STOP = 0b010;
        /// Do not allow the slave to stretch the clock
        const DISABLE_CLOCK_STRETCHING = 0b100;
    }
}

/// Speed throttle giving roughly 100 kHz.
pub const DEFAULT_SPEED_THROTTLE: u16 = 65516;

/// Bus settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cConfig {
    /// DIO number of the data line
    pub sda_dionum: u8,
    /// DIO number of the clock line
    pub scl_dionum: u8,
    /// Clock throttle; 65516 ≈ 100 kHz, 0 = 65536 (slowest)
    pub speed_throttle: u16,
    /// Transaction options
    pub options: I2cOptions,
    /// 7-bit slave address
    pub slave_address: u8,
}

impl I2cConfig {
    /// Default pins for a device family: FIO5/FIO4 on the T4 (FIO0-3 are
    /// analog there), FIO1/FIO0 otherwise.
    pub fn for_device(device_type: DeviceType, slave_address: u8) -> Self {
        let (sda_dionum, scl_dionum) = match device_type {
            DeviceType::T4 => (5, 4),
            _ => (1, 0),
        };
        Self {
            sda_dionum,
            scl_dionum,
            speed_throttle: DEFAULT_SPEED_THROTTLE,
            options: I2cOptions::empty(),
            slave_address,
        }
    }

    /// Validate the slave address.
    pub fn validate(&self) -> Result<()> {
        if self.slave_address > 0x7F {
            return Err(LjmError::InvalidParameter {
                message: format!("I2C slave address 0x{:02X} is not 7-bit", self.slave_address),
            });
        }
        if self.sda_dionum == self.scl_dionum {
            return Err(LjmError::InvalidParameter {
                message: format!("SDA and SCL both on DIO{}", self.sda_dionum),
            });
        }
        Ok(())
    }
}

/// A configured I2C bus on a device.
#[derive(Debug)]
pub struct I2cBus<'d> {
    device: &'d Device,
    config: I2cConfig,
}

impl Device {
    /// Configure the I2C engine and return a handle to it.
    pub fn i2c(&self, config: I2cConfig) -> Result<I2cBus<'_>> {
        config.validate()?;
        self.write_named(
            &[
                "I2C_SDA_DIONUM",
                "I2C_SCL_DIONUM",
                "I2C_SPEED_THROTTLE",
                "I2C_OPTIONS",
                "I2C_SLAVE_ADDRESS",
            ],
            &[1, 1, 1, 1, 1],
            &[
                f64::from(config.sda_dionum),
                f64::from(config.scl_dionum),
                f64::from(config.speed_throttle),
                f64::from(config.options.bits()),
                f64::from(config.slave_address),
            ],
        )?;
        debug!(
            handle = self.handle(),
            sda = config.sda_dionum,
            scl = config.scl_dionum,
            slave = config.slave_address,
            "Configured I2C bus"
        );
        Ok(I2cBus {
            device: self,
            config,
        })
    }
}

impl I2cBus<'_> {
    /// Bus settings.
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Send `tx`, then receive `rx_len` bytes.
    pub fn transaction(&self, tx: &[u8], rx_len: usize) -> Result<Vec<u8>> {
        if tx.len() > I2C_MAX_BYTES || rx_len > I2C_MAX_BYTES {
            return Err(LjmError::InvalidParameter {
                message: format!(
                    "I2C transfer of {} TX / {} RX bytes exceeds {} bytes",
                    tx.len(),
                    rx_len,
                    I2C_MAX_BYTES
                ),
            });
        }

        let mut frames = vec![
            Frame::write_value("I2C_NUM_BYTES_TX", tx.len() as f64),
            Frame::write_value("I2C_NUM_BYTES_RX", rx_len as f64),
        ];
        if !tx.is_empty() {
            frames.push(Frame::write(
                "I2C_DATA_TX",
                tx.iter().map(|b| f64::from(*b)).collect(),
            ));
        }
        frames.push(Frame::write_value("I2C_GO", 1.0));
        self.device.access(&frames)?.into_values()?;

        let mut frames = vec![Frame::read("I2C_ACKS", 1)];
        if rx_len > 0 {
            frames.push(Frame::read("I2C_DATA_RX", rx_len));
        }
        let mut values = self.device.access(&frames)?.into_values()?.into_iter();

        let acks = values
            .next()
            .and_then(|v| v.first().copied())
            .unwrap_or(0.0);
        if acks == 0.0 {
            return Err(LjmError::NoAcknowledge {
                slave_address: self.config.slave_address,
            });
        }

        let rx: Vec<u8> = values
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        debug!(
            slave = self.config.slave_address,
            tx = tx.len(),
            rx = rx.len(),
            acks,
            "I2C transaction"
        );
        Ok(rx)
    }

    /// Send bytes.
    pub fn write(&self, tx: &[u8]) -> Result<()> {
        self.transaction(tx, 0).map(|_| ())
    }

    /// Receive bytes.
    pub fn read(&self, rx_len: usize) -> Result<Vec<u8>> {
        self.transaction(&[], rx_len)
    }
}

/// Page size of 24C-series EEPROMs such as the LJTick-DAC's.
pub const EEPROM_PAGE_SIZE: usize = 16;

/// Slave address of the EEPROM on an LJTick-DAC.
pub const EEPROM_ADDRESS: u8 = 0x50;

/// A byte-addressed I2C EEPROM.
///
/// The first byte of every transfer sets the memory pointer. Writes wrap at
/// page boundaries on the chip, so a write must stay inside one page.
#[derive(Debug)]
pub struct Eeprom<'d> {
    bus: I2cBus<'d>,
    page_size: usize,
}

impl<'d> Eeprom<'d> {
    /// Wrap a bus configured for the EEPROM's address.
    pub fn new(bus: I2cBus<'d>) -> Self {
        Self {
            bus,
            page_size: EEPROM_PAGE_SIZE,
        }
    }

    /// Use a different page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Read `len` bytes starting at `offset`.
    pub fn read(&self, offset: u8, len: usize) -> Result<Vec<u8>> {
        self.bus.transaction(&[offset], len)
    }

    /// Write `data` at `offset`, within a single page.
    pub fn write_page(&self, offset: u8, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(LjmError::InvalidParameter {
                message: "nothing to write".to_string(),
            });
        }
        let start_in_page = usize::from(offset) % self.page_size;
        if start_in_page + data.len() > self.page_size {
            return Err(LjmError::InvalidParameter {
                message: format!(
                    "{} bytes at offset {} cross a {}-byte page boundary",
                    data.len(),
                    offset,
                    self.page_size
                ),
            });
        }
        let mut tx = Vec::with_capacity(data.len() + 1);
        tx.push(offset);
        tx.extend_from_slice(data);
        self.bus.write(&tx)
    }

    /// The underlying bus.
    pub fn bus(&self) -> &I2cBus<'d> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pins_by_device_type() {
        let t4 = I2cConfig::for_device(DeviceType::T4, EEPROM_ADDRESS);
        assert_eq!((t4.sda_dionum, t4.scl_dionum), (5, 4));
        let t7 = I2cConfig::for_device(DeviceType::T7, EEPROM_ADDRESS);
        assert_eq!((t7.sda_dionum, t7.scl_dionum), (1, 0));
        assert_eq!(t7.speed_throttle, 65516);
        assert_eq!(t7.slave_address, 80);
    }

    #[test]
    fn test_options_bits() {
        let opts = I2cOptions::RESET_BUS | I2cOptions::DISABLE_CLOCK_STRETCHING;
        assert_eq!(opts.bits(), 5);
        assert_eq!(I2cOptions::default().bits(), 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = I2cConfig::for_device(DeviceType::T7, 0x80);
        assert!(config.validate().is_err());
        config.slave_address = 0x50;
        assert!(config.validate().is_ok());
        config.scl_dionum = config.sda_dionum;
        assert!(config.validate().is_err());
    }
}
