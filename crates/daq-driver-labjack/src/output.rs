//! Periodic stream-out.
//!
//! A waveform is loaded once into one of the device's four stream-out
//! buffers and replayed cyclically into a target register (usually a DAC)
//! at the stream scan rate. Nothing needs to be read while it runs; the
//! session only has to be held open and stopped at the end.

use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::device::Device;
use crate::error::{LjmError, Result};
use crate::reader::CancelToken;

/// Highest stream-out index.
pub const MAX_STREAM_OUT_INDEX: u8 = 3;

/// Largest waveform, in samples, a stream-out buffer can hold.
pub const MAX_WAVEFORM_SAMPLES: usize = 4096;

/// Values replayed by a stream-out channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    values: Vec<f64>,
}

impl Waveform {
    /// Use explicit values.
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(LjmError::InvalidParameter {
                message: "waveform is empty".to_string(),
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(LjmError::InvalidParameter {
                message: format!("waveform contains non-finite value {}", bad),
            });
        }
        Ok(Self { values })
    }

    /// Ramp from `start` towards `end` in `samples` steps.
    ///
    /// `end` itself is not included, so the ramp repeats without a
    /// duplicated sample at the wrap.
    pub fn linear_ramp(start: f64, end: f64, samples: usize) -> Result<Self> {
        let n = samples as f64;
        Self::from_values(
            (0..samples)
                .map(|i| start + (end - start) * i as f64 / n)
                .collect(),
        )
    }

    /// One period of a sine wave.
    pub fn sine(amplitude: f64, offset: f64, samples: usize) -> Result<Self> {
        let n = samples as f64;
        Self::from_values(
            (0..samples)
                .map(|i| offset + amplitude * (TAU * i as f64 / n).sin())
                .collect(),
        )
    }

    /// Sample values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; empty waveforms are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time for one full cycle at `scan_rate`.
    pub fn period(&self, scan_rate: f64) -> Duration {
        Duration::from_secs_f64(self.values.len() as f64 / scan_rate)
    }
}

/// Stream-out configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputStreamConfig {
    /// Stream-out channel, 0 to 3
    pub index: u8,
    /// Register the waveform drives (e.g. `DAC0`)
    pub target: String,
    /// Requested scans per second
    pub scan_rate: f64,
    /// Scans per read for the stream engine; defaults to half a second
    pub scans_per_read: Option<u32>,
    /// Waveform to replay
    pub waveform: Waveform,
}

impl OutputStreamConfig {
    /// Replay `waveform` into `target` through stream-out 0.
    pub fn new(target: impl Into<String>, scan_rate: f64, waveform: Waveform) -> Self {
        Self {
            index: 0,
            target: target.into(),
            scan_rate,
            scans_per_read: None,
            waveform,
        }
    }

    /// Use stream-out `index`.
    pub fn with_index(mut self, index: u8) -> Self {
        self.index = index;
        self
    }

    /// Validate index, rate and buffer size.
    pub fn validate(&self) -> Result<()> {
        if self.index > MAX_STREAM_OUT_INDEX {
            return Err(LjmError::InvalidIndex {
                what: "stream-out",
                index: u32::from(self.index),
                max: u32::from(MAX_STREAM_OUT_INDEX),
            });
        }
        if self.waveform.len() > MAX_WAVEFORM_SAMPLES {
            return Err(LjmError::BufferTooLarge {
                len: self.waveform.len(),
                max: MAX_WAVEFORM_SAMPLES,
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
        Ok(())
    }

    /// Scans per read handed to the stream engine.
    pub fn effective_scans_per_read(&self) -> u32 {
        self.scans_per_read
            .unwrap_or_else(|| ((self.scan_rate / 2.0) as u32).max(1))
    }
}

/// A running periodic output.
///
/// Dropping the session stops the stream.
#[derive(Debug)]
pub struct OutputSession<'d> {
    device: &'d mut Device,
    index: u8,
    target_address: i32,
    actual_scan_rate: f64,
    started_at: Instant,
    running: bool,
}

impl Device {
    /// Load a waveform and start replaying it.
    pub fn start_periodic_output(
        &mut self,
        config: &OutputStreamConfig,
    ) -> Result<OutputSession<'_>> {
        config.validate()?;
        if self.is_streaming() {
            return Err(LjmError::StreamAlreadyRunning {
                handle: self.handle(),
            });
        }

        let target_address = self.backend().name_to_address(&config.target)?.address;
        let stream_channel = format!("STREAM_OUT{}", config.index);
        let scan_list = self.resolve_addresses(&[stream_channel.as_str()])?;

        self.backend().periodic_stream_out(
            self.handle(),
            config.index,
            target_address,
            config.scan_rate,
            config.waveform.values(),
        )?;

        let scans_per_read = config.effective_scans_per_read();
        let actual = self.begin_stream(scans_per_read, &scan_list, config.scan_rate)?;

        info!(
            handle = self.handle(),
            index = config.index,
            target = %config.target,
            samples = config.waveform.len(),
            requested_rate = config.scan_rate,
            actual_rate = actual,
            "Started periodic stream-out"
        );

        Ok(OutputSession {
            device: self,
            index: config.index,
            target_address,
            actual_scan_rate: actual,
            started_at: Instant::now(),
            running: true,
        })
    }
}

impl OutputSession<'_> {
    /// Keep the output running for `duration`, or until `cancel` fires.
    ///
    /// Returns the time actually held.
    pub fn hold(&self, duration: Duration, cancel: Option<&CancelToken>) -> Duration {
        let start = Instant::now();
        let slice = Duration::from_millis(50);
        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration || cancel.is_some_and(CancelToken::is_cancelled) {
                return elapsed;
            }
            thread::sleep(slice.min(duration - elapsed));
        }
    }

    /// Stop the output. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        let result = self.device.end_stream();
        info!(
            handle = self.device.handle(),
            index = self.index,
            ran_ms = self.started_at.elapsed().as_millis() as u64,
            "Stopped periodic stream-out"
        );
        result
    }

    /// Stream-out channel in use.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Address of the driven register.
    pub fn target_address(&self) -> i32 {
        self.target_address
    }

    /// Scan rate the device reported at start.
    pub fn actual_scan_rate(&self) -> f64 {
        self.actual_scan_rate
    }

    /// Whether the output is still running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The device, for register access while the output runs.
    pub fn device(&self) -> &Device {
        self.device
    }
}

impl Drop for OutputSession<'_> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                error!(error = %e, "Error stopping stream-out on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ramp_matches_dac_example() {
        let ramp = Waveform::linear_ramp(0.0, 2.5, 512).unwrap();
        assert_eq!(ramp.len(), 512);
        assert_eq!(ramp.values()[0], 0.0);
        assert_eq!(ramp.values()[256], 1.25);
        assert!(ramp.values()[511] < 2.5);
        assert_eq!(ramp.period(1000.0), Duration::from_millis(512));
    }

    #[test]
    fn test_waveform_rejects_bad_values() {
        assert!(Waveform::from_values(Vec::new()).is_err());
        assert!(Waveform::from_values(vec![1.0, f64::NAN]).is_err());
        assert!(Waveform::linear_ramp(0.0, 1.0, 0).is_err());
    }

    #[test]
    fn test_sine_waveform() {
        let sine = Waveform::sine(1.0, 2.5, 4).unwrap();
        let v = sine.values();
        assert!((v[0] - 2.5).abs() < 1e-12);
        assert!((v[1] - 3.5).abs() < 1e-12);
        assert!((v[3] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_config_validation() {
        let ramp = Waveform::linear_ramp(0.0, 2.5, 512).unwrap();
        let config = OutputStreamConfig::new("DAC0", 1000.0, ramp.clone());
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_scans_per_read(), 500);

        let bad_index = config.clone().with_index(4);
        assert!(matches!(
            bad_index.validate(),
            Err(LjmError::InvalidIndex { index: 4, max: 3, .. })
        ));

        let big = Waveform::from_values(vec![0.0; MAX_WAVEFORM_SAMPLES + 1]).unwrap();
        let too_large = OutputStreamConfig::new("DAC0", 1000.0, big);
        assert!(matches!(
            too_large.validate(),
            Err(LjmError::BufferTooLarge { len: 4097, max: 4096 })
        ));
    }
}
