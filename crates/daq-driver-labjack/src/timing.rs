//! Stream clock model.
//!
//! T-series devices pace stream scans from a fixed core clock divided by an
//! integer. A requested scan rate is rounded to the nearest achievable
//! divisor, so the rate the device reports back from a stream start is the
//! one to use for all timing arithmetic, never the requested one.
//!
//! ```text
//! actual_rate = base_clock_hz / round(base_clock_hz / requested_rate)
//! ```
//!
//! [`StreamClock`] holds the per-family limits; the simulator uses it to
//! produce realistic actual rates and callers can use it to pre-validate a
//! configuration before touching hardware.

use tracing::debug;

use crate::device::DeviceType;
use crate::error::{LjmError, Result};

/// Stream timing limits for one device family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamClock {
    /// Core clock the scan interval is derived from, in Hz
    pub base_clock_hz: f64,
    /// Highest sample rate (scan rate × channels) the device sustains
    pub max_sample_rate: f64,
    /// Lowest scan rate the divisor can express
    pub min_scan_rate: f64,
    /// Divisor range of the scan-interval counter
    pub divisor_range: (u32, u32),
}

impl Default for StreamClock {
    fn default() -> Self {
        Self::for_device(DeviceType::T7)
    }
}

impl StreamClock {
    /// Limits for a device family. Unknown families get the T7's.
    pub fn for_device(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::T4 => Self {
                base_clock_hz: 80_000_000.0,
                max_sample_rate: 50_000.0,
                min_scan_rate: 0.1,
                divisor_range: (1, u32::MAX),
            },
            DeviceType::T8 => Self {
                base_clock_hz: 40_000_000.0,
                max_sample_rate: 320_000.0,
                min_scan_rate: 0.1,
                divisor_range: (1, u32::MAX),
            },
            _ => Self {
                base_clock_hz: 80_000_000.0,
                max_sample_rate: 100_000.0,
                min_scan_rate: 0.1,
                divisor_range: (1, u32::MAX),
            },
        }
    }

    /// Closest achievable scan rate to `requested`.
    pub fn nearest_scan_rate(&self, requested: f64) -> f64 {
        let divisor = (self.base_clock_hz / requested)
            .round()
            .clamp(f64::from(self.divisor_range.0), f64::from(self.divisor_range.1));
        self.base_clock_hz / divisor
    }

    /// Highest scan rate for `channels` channels.
    pub fn max_scan_rate(&self, channels: usize) -> f64 {
        self.max_sample_rate / channels.max(1) as f64
    }

    /// Check that `scan_rate` over `channels` channels is achievable.
    pub fn validate(&self, scan_rate: f64, channels: usize) -> Result<()> {
        if !scan_rate.is_finite() || scan_rate <= 0.0 {
            return Err(LjmError::InvalidParameter {
                message: format!("scan rate must be positive, got {}", scan_rate),
            });
        }
        if channels == 0 {
            return Err(LjmError::InvalidParameter {
                message: "scan list is empty".to_string(),
            });
        }
        if scan_rate < self.min_scan_rate {
            return Err(LjmError::InvalidParameter {
                message: format!(
                    "scan rate {} Hz below minimum {} Hz",
                    scan_rate, self.min_scan_rate
                ),
            });
        }
        let sample_rate = scan_rate * channels as f64;
        if sample_rate > self.max_sample_rate {
            return Err(LjmError::InvalidParameter {
                message: format!(
                    "{} channels at {} Hz is {} samples/s, above the device limit of {}",
                    channels, scan_rate, sample_rate, self.max_sample_rate
                ),
            });
        }
        debug!(scan_rate, channels, sample_rate, "Validated stream timing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_rates_survive_quantization() {
        let clock = StreamClock::for_device(DeviceType::T7);
        assert_eq!(clock.nearest_scan_rate(25_000.0), 25_000.0);
        assert_eq!(clock.nearest_scan_rate(1_000.0), 1_000.0);
    }

    #[test]
    fn test_odd_rate_is_quantized() {
        let clock = StreamClock::for_device(DeviceType::T7);
        let actual = clock.nearest_scan_rate(33_333.0);
        // 80 MHz / 2400
        assert!((actual - 33_333.333).abs() < 0.01);
        assert_ne!(actual, 33_333.0);
    }

    #[test]
    fn test_validate_limits() {
        let clock = StreamClock::for_device(DeviceType::T7);
        assert!(clock.validate(25_000.0, 2).is_ok());
        assert!(clock.validate(60_000.0, 2).is_err());
        assert!(clock.validate(0.0, 1).is_err());
        assert!(clock.validate(f64::NAN, 1).is_err());
        assert!(clock.validate(1_000.0, 0).is_err());
        assert_eq!(clock.max_scan_rate(4), 25_000.0);
    }

    #[test]
    fn test_t4_is_slower() {
        let t4 = StreamClock::for_device(DeviceType::T4);
        assert!(t4.validate(30_000.0, 2).is_err());
        assert!(t4.validate(25_000.0, 2).is_ok());
    }
}
