//! Configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the reference two-channel acquisition)
//! 2. A TOML file (`labjack-daq.toml` unless another path is given)
//! 3. Environment variables prefixed with `LABJACK_DAQ_`, using `__` to
//!    separate nesting levels
//!
//! # Example
//! ```no_run
//! use labjack_daq::config::AppConfig;
//!
//! // LABJACK_DAQ_STREAM__SCAN_RATE=10000 overrides [stream] scan_rate
//! let config = AppConfig::load(None)?;
//! config.validate()?;
//! println!("Streaming {:?}", config.stream.channels);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;
use std::time::Duration;

use daq_driver_labjack::{
    ConnectionType, DeviceType, I2cConfig, I2cOptions, LibraryConfig, LjmError, OpenTarget,
    OutputStreamConfig, StopCondition, StreamConfig, Waveform, MAX_STREAM_OUT_INDEX,
    MAX_WAVEFORM_SAMPLES,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::logging::OutputFormat;

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "labjack-daq.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LABJACK_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Settings applied to the LJM library itself
    pub library: LibraryConfig,
    /// Log output of this program
    pub logging: LoggingSettings,
    /// Which device to open
    pub device: DeviceSettings,
    /// Input stream (`stream` command)
    pub stream: StreamSettings,
    /// Periodic output (`stream-out` command)
    pub stream_out: StreamOutSettings,
    /// I2C EEPROM round trip (`i2c-eeprom` command)
    pub i2c: I2cSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

/// Device selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Device family
    pub device_type: DeviceType,
    /// Transport
    pub connection_type: ConnectionType,
    /// Serial number, IP address, device name or "ANY"
    pub identifier: String,
    /// Use the in-process simulator instead of the LJM library
    pub simulate: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Any,
            connection_type: ConnectionType::Any,
            identifier: "ANY".to_string(),
            simulate: false,
        }
    }
}

impl DeviceSettings {
    /// What to pass to open.
    pub fn target(&self) -> OpenTarget {
        OpenTarget::new(
            self.device_type,
            self.connection_type,
            self.identifier.clone(),
        )
    }
}

/// Input stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Channel names in scan order
    pub channels: Vec<String>,
    /// Scans per second
    pub scan_rate: f64,
    /// Scans per read; unset fills one packet
    pub scans_per_read: Option<u32>,
    /// Number of reads (ignored when `duration_secs` is set)
    pub reads: u64,
    /// Stream for this long instead of a fixed number of reads
    pub duration_secs: Option<f64>,
    /// Measure differentially instead of against GND
    pub differential: bool,
    /// Input range in volts for all channels
    pub range: Option<f64>,
    /// Settling time in microseconds (0 = automatic)
    pub settling_us: Option<f64>,
    /// Resolution index (0 = default)
    pub resolution_index: Option<u32>,
    /// Consecutive backlog growth before a warning
    pub backlog_window: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channels: vec!["AIN0".to_string(), "AIN2".to_string()],
            scan_rate: 25_000.0,
            scans_per_read: None,
            reads: 100,
            duration_secs: None,
            differential: false,
            range: None,
            settling_us: None,
            resolution_index: None,
            backlog_window: 5,
        }
    }
}

impl StreamSettings {
    /// Driver-level stream configuration.
    pub fn to_stream_config(&self) -> Result<StreamConfig, LjmError> {
        let mut builder = StreamConfig::builder()
            .channels(self.channels.as_slice())
            .scan_rate(self.scan_rate);
        if let Some(n) = self.scans_per_read {
            builder = builder.scans_per_read(n);
        }
        if self.differential {
            builder = builder.differential();
        }
        if let Some(range) = self.range {
            builder = builder.range(range);
        }
        if let Some(us) = self.settling_us {
            builder = builder.settling_us(us);
        }
        if let Some(index) = self.resolution_index {
            builder = builder.resolution_index(index);
        }
        builder.build()
    }

    /// When the read loop ends.
    ///
    /// Fails for a duration that is negative, NaN or too large for
    /// [`Duration`].
    pub fn stop_condition(&self) -> Result<StopCondition, LjmError> {
        match self.duration_secs {
            Some(secs) => seconds("stream duration_secs", secs).map(StopCondition::Duration),
            None => Ok(StopCondition::Reads(self.reads)),
        }
    }
}

/// Waveform shapes for stream-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    /// Linear ramp from `low` towards `high`
    Ramp,
    /// Sine between `low` and `high`
    Sine,
}

/// Periodic stream-out configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOutSettings {
    /// Stream-out channel (0-3)
    pub index: u8,
    /// Register driven by the output
    pub target: String,
    /// Samples per second
    pub scan_rate: f64,
    /// Scans per read; unset uses half the scan rate
    pub scans_per_read: Option<u32>,
    /// Waveform shape
    pub waveform: WaveformKind,
    /// Samples in one period
    pub samples: usize,
    /// Lowest output value
    pub low: f64,
    /// Highest output value
    pub high: f64,
    /// How long to keep the output running
    pub duration_secs: f64,
}

impl Default for StreamOutSettings {
    fn default() -> Self {
        Self {
            index: 0,
            target: "DAC0".to_string(),
            scan_rate: 1_000.0,
            scans_per_read: None,
            waveform: WaveformKind::Ramp,
            samples: 512,
            low: 0.0,
            high: 2.5,
            duration_secs: 5.0,
        }
    }
}

impl StreamOutSettings {
    /// Driver-level output configuration.
    pub fn to_output_config(&self) -> Result<OutputStreamConfig, LjmError> {
        let waveform = match self.waveform {
            WaveformKind::Ramp => Waveform::linear_ramp(self.low, self.high, self.samples)?,
            WaveformKind::Sine => {
                let amplitude = (self.high - self.low) / 2.0;
                Waveform::sine(amplitude, self.low + amplitude, self.samples)?
            }
        };
        let mut config = OutputStreamConfig::new(self.target.clone(), self.scan_rate, waveform)
            .with_index(self.index);
        config.scans_per_read = self.scans_per_read;
        Ok(config)
    }

    /// How long to run.
    pub fn duration(&self) -> Result<Duration, LjmError> {
        seconds("stream_out duration_secs", self.duration_secs)
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, LjmError> {
    Duration::try_from_secs_f64(secs).map_err(|e| LjmError::InvalidParameter {
        message: format!("Invalid {} {}: {}", field, secs, e),
    })
}

/// I2C EEPROM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cSettings {
    /// 7-bit slave address
    pub slave_address: u8,
    /// SDA line; unset picks the device default
    pub sda_dionum: Option<u8>,
    /// SCL line; unset picks the device default
    pub scl_dionum: Option<u8>,
    /// Clock throttle
    pub speed_throttle: u16,
    /// Raw `I2C_OPTIONS` bits
    pub options: u16,
    /// Memory offset of the round trip
    pub offset: u8,
    /// Bytes to write and read back
    pub length: usize,
}

impl Default for I2cSettings {
    fn default() -> Self {
        Self {
            slave_address: daq_driver_labjack::EEPROM_ADDRESS,
            sda_dionum: None,
            scl_dionum: None,
            speed_throttle: daq_driver_labjack::i2c::DEFAULT_SPEED_THROTTLE,
            options: 0,
            offset: 0,
            length: 4,
        }
    }
}

impl I2cSettings {
    /// Bus configuration for a device family.
    pub fn bus_config(&self, device_type: DeviceType) -> I2cConfig {
        let mut config = I2cConfig::for_device(device_type, self.slave_address);
        if let Some(sda) = self.sda_dionum {
            config.sda_dionum = sda;
        }
        if let Some(scl) = self.scl_dionum {
            config.scl_dionum = scl;
        }
        config.speed_throttle = self.speed_throttle;
        config.options = I2cOptions::from_bits_truncate(self.options);
        config
    }
}

impl AppConfig {
    /// Build the provider chain without extracting.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load defaults, then the TOML file, then environment overrides.
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        if self.device.identifier.trim().is_empty() {
            return Err("Device identifier must not be empty (use \"ANY\")".to_string());
        }

        let stream = &self.stream;
        if stream.channels.is_empty() {
            return Err("At least one stream channel is required".to_string());
        }
        if !(stream.scan_rate.is_finite() && stream.scan_rate > 0.0) {
            return Err(format!("Invalid stream scan_rate {}", stream.scan_rate));
        }
        match stream.duration_secs {
            Some(secs) if !(secs.is_finite() && secs > 0.0) => {
                return Err(format!("Invalid stream duration_secs {}", secs));
            }
            None if stream.reads == 0 => {
                return Err("Stream reads must be greater than 0".to_string());
            }
            _ => {}
        }
        stream.stop_condition().map_err(|e| e.to_string())?;
        if stream.scans_per_read == Some(0) {
            return Err("Stream scans_per_read must be greater than 0".to_string());
        }

        let out = &self.stream_out;
        if out.index > MAX_STREAM_OUT_INDEX {
            return Err(format!(
                "Invalid stream_out index {}. Must be 0-{}",
                out.index, MAX_STREAM_OUT_INDEX
            ));
        }
        if out.samples == 0 || out.samples > MAX_WAVEFORM_SAMPLES {
            return Err(format!(
                "Invalid stream_out samples {}. Must be 1-{}",
                out.samples, MAX_WAVEFORM_SAMPLES
            ));
        }
        if !(out.scan_rate.is_finite() && out.scan_rate > 0.0) {
            return Err(format!("Invalid stream_out scan_rate {}", out.scan_rate));
        }
        if !(out.duration_secs.is_finite() && out.duration_secs >= 0.0) {
            return Err(format!(
                "Invalid stream_out duration_secs {}",
                out.duration_secs
            ));
        }
        out.duration().map_err(|e| e.to_string())?;

        let i2c = &self.i2c;
        if i2c.slave_address > 0x7F {
            return Err(format!(
                "Invalid i2c slave_address 0x{:02X}. Must be a 7-bit address",
                i2c.slave_address
            ));
        }
        if i2c.length == 0 || i2c.length > daq_driver_labjack::EEPROM_PAGE_SIZE {
            return Err(format!(
                "Invalid i2c length {}. Must be 1-{}",
                i2c.length,
                daq_driver_labjack::EEPROM_PAGE_SIZE
            ));
        }

        Ok(())
    }
}
