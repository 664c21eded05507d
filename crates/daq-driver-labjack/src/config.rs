//! Library-wide LJM settings.
//!
//! LJM keeps logging and timeout settings in process-global state. Here
//! they are an explicit [`LibraryConfig`] handed to [`Ljm::new`](crate::Ljm::new),
//! which writes each configured value once at startup.

use serde::{Deserialize, Serialize};

/// LJM internal log verbosity (`LJM_LOG_LEVEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LjmLogLevel {
    /// Every packet
    Stream,
    /// Trace
    Trace,
    /// Debug
    Debug,
    /// Info
    Info,
    /// Packet summaries
    Pedantic,
    /// Warnings
    Warning,
    /// User-level messages
    User,
    /// Errors
    Error,
    /// Fatal errors only
    Fatal,
}

impl LjmLogLevel {
    /// Value written to `LJM_LOG_LEVEL`.
    pub fn as_raw(self) -> f64 {
        match self {
            Self::Stream => 1.0,
            Self::Trace => 2.0,
            Self::Debug => 4.0,
            Self::Info => 6.0,
            Self::Pedantic => 8.0,
            Self::Warning => 10.0,
            Self::User => 12.0,
            Self::Error => 14.0,
            Self::Fatal => 16.0,
        }
    }
}

/// When LJM writes its internal log (`LJM_LOG_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LjmLogMode {
    /// Never log
    Never,
    /// Log continuously to the log file
    Continuous,
    /// Keep a ring buffer and flush it on error
    OnError,
}

impl LjmLogMode {
    /// Value written to `LJM_LOG_MODE`.
    pub fn as_raw(self) -> f64 {
        match self {
            Self::Never => 1.0,
            Self::Continuous => 2.0,
            Self::OnError => 3.0,
        }
    }
}

/// Settings applied to the LJM library before any device is opened.
///
/// Unset fields keep the library's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Internal log verbosity
    pub log_level: Option<LjmLogLevel>,
    /// Internal log mode
    pub log_mode: Option<LjmLogMode>,
    /// Timeout for opening a TCP device, in milliseconds
    pub open_tcp_timeout_ms: Option<u32>,
    /// Timeout for a command/response round trip, in milliseconds
    pub send_receive_timeout_ms: Option<u32>,
    /// Timeout for a single stream read, in milliseconds (0 waits forever)
    pub stream_receive_timeout_ms: Option<u32>,
}

impl LibraryConfig {
    /// `(parameter, value)` pairs to write, in a fixed order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let mut entries = Vec::new();
        if let Some(mode) = self.log_mode {
            entries.push((ljm_sys::LJM_LOG_MODE, mode.as_raw()));
        }
        if let Some(level) = self.log_level {
            entries.push((ljm_sys::LJM_LOG_LEVEL, level.as_raw()));
        }
        if let Some(ms) = self.open_tcp_timeout_ms {
            entries.push((ljm_sys::LJM_OPEN_TCP_DEVICE_TIMEOUT_MS, f64::from(ms)));
        }
        if let Some(ms) = self.send_receive_timeout_ms {
            entries.push((ljm_sys::LJM_SEND_RECEIVE_TIMEOUT_MS, f64::from(ms)));
        }
        if let Some(ms) = self.stream_receive_timeout_ms {
            entries.push((ljm_sys::LJM_STREAM_RECEIVE_TIMEOUT_MS, f64::from(ms)));
        }
        entries
    }
}
