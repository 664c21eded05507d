//! `stream-out`: replay a waveform on an output register for a while.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use daq_driver_labjack::{CancelToken, Ljm, LjmError, OpenTarget};
use tracing::info;

use crate::config::StreamOutSettings;

/// What ran.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutReport {
    /// Stream-out channel used
    pub index: u8,
    /// Register driven
    pub target: String,
    /// Samples in one period
    pub samples: usize,
    /// Scan rate the device used
    pub actual_scan_rate: f64,
    /// How long the output ran
    pub held: Duration,
}

impl fmt::Display for StreamOutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STREAM_OUT{} drove {} with {} samples at {} Hz for {:.3} s",
            self.index,
            self.target,
            self.samples,
            self.actual_scan_rate,
            self.held.as_secs_f64()
        )
    }
}

/// Load the waveform, run it for the configured time (or until `cancel`),
/// then stop the output and close the device.
pub fn run(
    ljm: &Ljm,
    target: &OpenTarget,
    settings: &StreamOutSettings,
    cancel: CancelToken,
) -> Result<StreamOutReport> {
    let config = settings
        .to_output_config()
        .context("Invalid stream-out configuration")?;
    let duration = settings
        .duration()
        .context("Invalid stream-out duration")?;

    ljm.with_device(target, |device| {
        let mut session = device.start_periodic_output(&config)?;
        info!(
            index = session.index(),
            target = %config.target,
            rate = session.actual_scan_rate(),
            seconds = settings.duration_secs,
            "Streaming waveform"
        );
        let held = session.hold(duration, Some(&cancel));
        let report = StreamOutReport {
            index: session.index(),
            target: config.target.clone(),
            samples: config.waveform.len(),
            actual_scan_rate: session.actual_scan_rate(),
            held,
        };
        session.stop()?;
        Ok::<_, LjmError>(report)
    })
    .with_context(|| format!("Stream-out on {} failed", target))
}
