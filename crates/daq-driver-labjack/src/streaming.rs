//! Hardware-paced input streaming.
//!
//! A stream samples a fixed scan list at a fixed rate; the device buffers
//! scans and LJM hands them out in batches of `scans_per_read`. This module
//! provides:
//!
//! - [`StreamConfig`] - scan list, rate and analog front-end settings
//! - [`StreamSession`] - a running stream, borrowed from its [`Device`]
//! - [`StreamBatch`] - one read worth of scans with skip and backlog data
//!
//! # Session lifecycle
//!
//! ```text
//! Idle --start_input_stream--> Started --read_batch--> Started ...
//!                                 |
//!                         stop / drop / error
//!                                 v
//!                              Stopped
//! ```
//!
//! The scan list and rate cannot change while a session exists; stop it and
//! start a new one instead.
//!
//! # Example
//!
//! ```
//! use daq_driver_labjack::{LibraryConfig, Ljm, StreamConfig};
//! use daq_driver_labjack::mock::SimulatedLjm;
//!
//! # fn main() -> Result<(), daq_driver_labjack::LjmError> {
//! let ljm = Ljm::new(SimulatedLjm::new(), LibraryConfig::default())?;
//! let mut device = ljm.open_any()?;
//!
//! let config = StreamConfig::builder()
//!     .channels(&["AIN0", "AIN2"])
//!     .scan_rate(25_000.0)
//!     .build()?;
//!
//! let mut session = device.start_input_stream(&config)?;
//! let batch = session.read_batch()?;
//! assert_eq!(batch.n_scans(), 126);
//! session.stop()?;
//! # drop(session);
//! device.close()
//! # }
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::backend::RawBatch;
use crate::device::Device;
use crate::error::{LjmError, Result};
use crate::registers::is_stream_out_address;
use crate::timing::StreamClock;

/// Largest number of samples LJM reliably fits into one stream packet.
pub const MAX_SAMPLES_PER_PACKET: usize = 252;

/// Value LJM writes into the slots of a scan the device skipped.
pub const SKIPPED_SAMPLE: f64 = ljm_sys::LJM_DUMMY_VALUE;

/// Stream configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Register names of the scan list, in scan order
    pub channels: Vec<String>,
    /// Requested scans per second
    pub scan_rate: f64,
    /// Scans returned per read; derived from the packet size if unset
    pub scans_per_read: Option<u32>,
    /// Measure inputs against ground (`AIN_ALL_NEGATIVE_CH` = GND)
    pub single_ended: bool,
    /// Input range in volts (`AIN_ALL_RANGE`)
    pub range: Option<f64>,
    /// Settling time in microseconds (`STREAM_SETTLING_US`, 0 = auto)
    pub settling_us: Option<f64>,
    /// Resolution index (`STREAM_RESOLUTION_INDEX`, 0 = default)
    pub resolution_index: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: vec!["AIN0".to_string()],
            scan_rate: 1000.0,
            scans_per_read: None,
            single_ended: true,
            range: None,
            settling_us: None,
            resolution_index: None,
        }
    }
}

impl StreamConfig {
    /// Create a new builder.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(LjmError::InvalidParameter {
                message: "At least one channel is required".to_string(),
            });
        }
        if !self.scan_rate.is_finite() || self.scan_rate <= 0.0 {
            return Err(LjmError::InvalidParameter {
                message: format!("Invalid scan rate: {}", self.scan_rate),
            });
        }
        if self.scans_per_read == Some(0) {
            return Err(LjmError::InvalidParameter {
                message: "scans_per_read must be greater than 0".to_string(),
            });
        }
        if let Some(range) = self.range {
            if !range.is_finite() || range <= 0.0 {
                return Err(LjmError::InvalidParameter {
                    message: format!("Invalid input range: {}", range),
                });
            }
        }
        if let Some(settling) = self.settling_us {
            if !settling.is_finite() || settling < 0.0 {
                return Err(LjmError::InvalidParameter {
                    message: format!("Invalid settling time: {}", settling),
                });
            }
        }
        Ok(())
    }

    /// Scans per read actually requested from the device.
    pub fn effective_scans_per_read(&self) -> u32 {
        match self.scans_per_read {
            Some(n) => n,
            None => (MAX_SAMPLES_PER_PACKET / self.channels.len().max(1)).max(1) as u32,
        }
    }

    /// Front-end registers to write before starting, as `(name, value)`.
    pub fn setup_registers(&self) -> Vec<(&'static str, f64)> {
        let mut regs = Vec::new();
        if self.single_ended {
            regs.push(("AIN_ALL_NEGATIVE_CH", f64::from(ljm_sys::LJM_GND)));
        }
        if let Some(range) = self.range {
            regs.push(("AIN_ALL_RANGE", range));
        }
        if let Some(settling) = self.settling_us {
            regs.push(("STREAM_SETTLING_US", settling));
        }
        if let Some(index) = self.resolution_index {
            regs.push(("STREAM_RESOLUTION_INDEX", f64::from(index)));
        }
        regs
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Set the scan list.
    pub fn channels<S: AsRef<str>>(mut self, channels: &[S]) -> Self {
        self.config.channels = channels.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Set the requested scan rate in Hz.
    pub fn scan_rate(mut self, rate: f64) -> Self {
        self.config.scan_rate = rate;
        self
    }

    /// Set the scans returned per read.
    pub fn scans_per_read(mut self, scans: u32) -> Self {
        self.config.scans_per_read = Some(scans);
        self
    }

    /// Measure differentially instead of against ground.
    pub fn differential(mut self) -> Self {
        self.config.single_ended = false;
        self
    }

    /// Set the input range in volts.
    pub fn range(mut self, volts: f64) -> Self {
        self.config.range = Some(volts);
        self
    }

    /// Set the settling time in microseconds.
    pub fn settling_us(mut self, us: f64) -> Self {
        self.config.settling_us = Some(us);
        self
    }

    /// Set the resolution index.
    pub fn resolution_index(mut self, index: u32) -> Self {
        self.config.resolution_index = Some(index);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<StreamConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// One stream read.
///
/// `samples` is row-major: scan 0 channel 0, scan 0 channel 1, ..., scan 1
/// channel 0, ... Slots of skipped scans are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamBatch {
    /// Samples, one per (scan, channel) pair
    pub samples: Vec<Option<f64>>,
    /// Number of channels per scan
    pub channel_count: usize,
    /// Scans in this batch the device could not fill
    pub skipped_scans: u32,
    /// Scans waiting in the device buffer after this read
    pub device_backlog: u32,
    /// Scans waiting in the LJM buffer after this read
    pub client_backlog: u32,
    /// Read number within the session, from 0
    pub sequence: u64,
}

impl StreamBatch {
    /// Convert a raw read, replacing skipped-scan markers with `None`.
    pub fn from_raw(raw: RawBatch, channel_count: usize, sequence: u64) -> Result<Self> {
        if channel_count == 0 || raw.data.len() % channel_count != 0 {
            return Err(LjmError::MalformedBatch {
                samples: raw.data.len(),
                channels: channel_count,
            });
        }

        let samples: Vec<Option<f64>> = raw
            .data
            .into_iter()
            .map(|v| if v == SKIPPED_SAMPLE { None } else { Some(v) })
            .collect();
        let skipped_scans = samples
            .chunks(channel_count)
            .filter(|scan| scan.iter().any(Option::is_none))
            .count() as u32;

        Ok(Self {
            samples,
            channel_count,
            skipped_scans,
            device_backlog: raw.device_backlog,
            client_backlog: raw.client_backlog,
            sequence,
        })
    }

    /// Number of scans in the batch, skipped ones included.
    pub fn n_scans(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.samples.len() / self.channel_count
        }
    }

    /// Iterate over scans.
    pub fn scans(&self) -> impl Iterator<Item = &[Option<f64>]> {
        self.samples.chunks(self.channel_count.max(1))
    }

    /// First scan, if the batch is not empty.
    pub fn first_scan(&self) -> Option<&[Option<f64>]> {
        self.scans().next()
    }

    /// Samples of one channel, by scan-list position.
    pub fn channel_data(&self, channel: usize) -> Vec<Option<f64>> {
        if channel >= self.channel_count {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channel_count)
            .copied()
            .collect()
    }

    /// Split into one vector per channel.
    pub fn deinterleave(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.channel_count)
            .map(|ch| self.channel_data(ch))
            .collect()
    }

    /// Whether every scan was filled.
    pub fn is_complete(&self) -> bool {
        self.skipped_scans == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Started,
    Stopped,
}

/// A running input stream.
///
/// Holds the device mutably for its lifetime. Dropping the session stops
/// the stream; a session that failed part way through is therefore cleaned
/// up before its device can be closed.
#[derive(Debug)]
pub struct StreamSession<'d> {
    device: &'d mut Device,
    channels: Vec<String>,
    input_channels: usize,
    scans_per_read: u32,
    requested_scan_rate: f64,
    actual_scan_rate: f64,
    reads: u64,
    started_at: Instant,
    state: SessionState,
}

impl Device {
    /// Start streaming the configured scan list.
    ///
    /// Writes the analog front-end registers, resolves the scan list, and
    /// starts the stream. The returned session reports the scan rate the
    /// device actually uses.
    pub fn start_input_stream(&mut self, config: &StreamConfig) -> Result<StreamSession<'_>> {
        config.validate()?;
        if self.is_streaming() {
            return Err(LjmError::StreamAlreadyRunning {
                handle: self.handle(),
            });
        }

        let names: Vec<&str> = config.channels.iter().map(String::as_str).collect();
        let scan_list = self.resolve_addresses(&names)?;
        let input_channels = scan_list
            .iter()
            .filter(|a| !is_stream_out_address(**a))
            .count();
        if input_channels == 0 {
            return Err(LjmError::InvalidParameter {
                message: "scan list has no input channels".to_string(),
            });
        }

        StreamClock::for_device(self.device_type()).validate(config.scan_rate, input_channels)?;

        let scans_per_read = config.effective_scans_per_read();
        let samples_per_read = scans_per_read as usize * input_channels;
        if samples_per_read > MAX_SAMPLES_PER_PACKET {
            warn!(
                scans_per_read,
                channels = input_channels,
                samples_per_read,
                max = MAX_SAMPLES_PER_PACKET,
                "Reads span more than one packet"
            );
        }

        let setup = config.setup_registers();
        if !setup.is_empty() {
            let (reg_names, values): (Vec<&str>, Vec<f64>) = setup.into_iter().unzip();
            let counts = vec![1; reg_names.len()];
            self.write_named(&reg_names, &counts, &values)?;
        }

        let actual = self.begin_stream(scans_per_read, &scan_list, config.scan_rate)?;
        if !(actual.is_finite() && actual > 0.0) {
            self.end_stream()?;
            return Err(LjmError::InvalidParameter {
                message: format!("device reported scan rate {}", actual),
            });
        }

        info!(
            handle = self.handle(),
            channels = ?config.channels,
            scans_per_read,
            requested_rate = config.scan_rate,
            actual_rate = actual,
            "Started input stream"
        );

        Ok(StreamSession {
            device: self,
            channels: config.channels.clone(),
            input_channels,
            scans_per_read,
            requested_scan_rate: config.scan_rate,
            actual_scan_rate: actual,
            reads: 0,
            started_at: Instant::now(),
            state: SessionState::Started,
        })
    }
}

impl StreamSession<'_> {
    /// Block until the next batch is available and return it.
    pub fn read_batch(&mut self) -> Result<StreamBatch> {
        if self.state != SessionState::Started {
            return Err(LjmError::StreamNotRunning {
                handle: self.device.handle(),
            });
        }
        let raw = self.device.backend().stream_read(self.device.handle())?;
        let batch = StreamBatch::from_raw(raw, self.input_channels, self.reads)?;
        self.reads += 1;

        trace!(
            sequence = batch.sequence,
            scans = batch.n_scans(),
            skipped = batch.skipped_scans,
            device_backlog = batch.device_backlog,
            client_backlog = batch.client_backlog,
            "Stream batch"
        );
        Ok(batch)
    }

    /// Stop the stream. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        self.state = SessionState::Stopped;
        let result = self.device.end_stream();
        debug!(
            handle = self.device.handle(),
            reads = self.reads,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "Input stream stopped"
        );
        result
    }

    /// Whether the stream is still running.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Started
    }

    /// Scan rate the device reported at start.
    pub fn actual_scan_rate(&self) -> f64 {
        self.actual_scan_rate
    }

    /// Scan rate that was asked for.
    pub fn requested_scan_rate(&self) -> f64 {
        self.requested_scan_rate
    }

    /// Scan-list names.
    pub fn channel_names(&self) -> &[String] {
        &self.channels
    }

    /// Input channels per scan.
    pub fn channel_count(&self) -> usize {
        self.input_channels
    }

    /// Scans per read.
    pub fn scans_per_read(&self) -> u32 {
        self.scans_per_read
    }

    /// Reads completed so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Time since the stream started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The device, for register access while streaming.
    pub fn device(&self) -> &Device {
        self.device
    }
}

impl Drop for StreamSession<'_> {
    fn drop(&mut self) {
        if self.state == SessionState::Started {
            if let Err(e) = self.stop() {
                error!(error = %e, "Error stopping stream on drop");
            }
        }
    }
}
