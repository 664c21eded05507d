//! Error types for LJM operations.
//!
//! [`LjmError`] is the taxonomy callers match on. Raw library status codes
//! ([`ErrorCode`]) are folded into it by [`LjmError::from_code`]; codes that
//! have no dedicated variant surface as [`LjmError::Library`].

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::codes::ErrorCode;

/// Result type alias for LJM operations.
pub type Result<T> = std::result::Result<T, LjmError>;

/// Errors that can occur when working with LabJack devices.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LjmError {
    /// Device could not be found, opened, or reached.
    #[error("Connection error: {code}: {message}")]
    Connection { code: ErrorCode, message: String },

    /// A register name the library does not know.
    #[error("Unknown register name '{name}'")]
    UnknownName { name: String },

    /// Index outside its allowed range (e.g. stream-out index).
    #[error("Invalid {what} index {index}: must be at most {max}")]
    InvalidIndex {
        what: &'static str,
        index: u32,
        max: u32,
    },

    /// Invalid argument or configuration.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Bulk register access where at least one entry failed.
    #[error("{} of {} register operations failed: {}", count_failed(.entries), .entries.len(), FailedList(.entries))]
    PartialFailure { entries: Vec<FrameStatus> },

    /// A stream is already running on this handle.
    #[error("Stream already running on handle {handle}")]
    StreamAlreadyRunning { handle: i32 },

    /// Stream operation without a running stream.
    #[error("No stream running on handle {handle}")]
    StreamNotRunning { handle: i32 },

    /// LJM could not stop a running stream.
    #[error("Unable to stop stream on handle {handle}")]
    StreamStopFailed { handle: i32 },

    /// LJM's stream buffer filled before it was drained.
    #[error("LJM stream buffer full: data is not being read fast enough")]
    BufferFull,

    /// Device reported it is busy.
    #[error("Device busy: {message}")]
    DeviceBusy { message: String },

    /// Output waveform larger than the device buffer.
    #[error("Stream-out buffer of {len} samples exceeds device limit of {max}")]
    BufferTooLarge { len: usize, max: usize },

    /// Handle is not open (closed or never valid).
    #[error("Invalid or closed handle {handle}")]
    InvalidHandle { handle: i32 },

    /// Stream data that does not divide into whole scans.
    #[error("Stream batch of {samples} samples is not a multiple of {channels} channels")]
    MalformedBatch { samples: usize, channels: usize },

    /// I2C slave did not acknowledge.
    #[error("I2C slave 0x{slave_address:02X} did not acknowledge")]
    NoAcknowledge { slave_address: u8 },

    /// Any other library status code.
    #[error("LJM library error: {code}")]
    Library { code: ErrorCode },
}

/// Per-entry status carried by [`LjmError::PartialFailure`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStatus {
    /// Register name of the entry
    pub name: String,
    /// Error for this entry, `None` if it succeeded
    pub error: Option<ErrorCode>,
}

impl FrameStatus {
    /// Whether this entry succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn count_failed(entries: &[FrameStatus]) -> usize {
    entries.iter().filter(|e| !e.is_ok()).count()
}

struct FailedList<'a>(&'a [FrameStatus]);

impl fmt::Display for FailedList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.0 {
            if let Some(code) = entry.error {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{} ({})", entry.name, code)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl LjmError {
    /// Map a raw library status onto the taxonomy.
    ///
    /// `handle` is used for handle and stream-state codes, `context` names
    /// the thing being operated on (register name, identifier) for messages.
    pub fn from_code(code: ErrorCode, handle: i32, context: &str) -> Self {
        match code {
            ErrorCode::DEVICE_NOT_FOUND
            | ErrorCode::DEVICE_ALREADY_OPEN
            | ErrorCode::COULD_NOT_CLAIM_DEVICE
            | ErrorCode::CANNOT_CONNECT
            | ErrorCode::SOCKET_LEVEL_ERROR
            | ErrorCode::CANNOT_OPEN_DEVICE
            | ErrorCode::CANNOT_DISCONNECT
            | ErrorCode::WINSOCK_FAILURE
            | ErrorCode::DEVICE_RECONNECT_FAILED
            | ErrorCode::NO_COMMAND_BYTES_SENT
            | ErrorCode::INCORRECT_NUM_COMMAND_BYTES_SENT
            | ErrorCode::NO_RESPONSE_BYTES_RECEIVED
            | ErrorCode::INCORRECT_NUM_RESPONSE_BYTES_RECEIVED
            | ErrorCode::MBE10_GATEWAY_PATH_UNAVAILABLE
            | ErrorCode::MBE11_GATEWAY_TARGET_NO_RESPONSE => Self::Connection {
                code,
                message: context.to_string(),
            },
            ErrorCode::INVALID_NAME | ErrorCode::RESERVED_NAME => Self::UnknownName {
                name: context.to_string(),
            },
            ErrorCode::INVALID_INDEX => Self::InvalidParameter {
                message: format!("invalid index for {}", context),
            },
            ErrorCode::INVALID_PARAMETER
            | ErrorCode::INVALID_ADDRESS
            | ErrorCode::INVALID_DEVICE_TYPE
            | ErrorCode::INVALID_CONNECTION_TYPE
            | ErrorCode::INVALID_NUM_VALUES
            | ErrorCode::INVALID_LENGTH
            | ErrorCode::UNPARSABLE_DEVICE_TYPE
            | ErrorCode::UNPARSABLE_CONNECTION_TYPE
            | ErrorCode::UNPARSABLE_IDENTIFIER
            | ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS
            | ErrorCode::MBE3_ILLEGAL_DATA_VALUE => Self::InvalidParameter {
                message: format!("{}: {}", context, code),
            },
            ErrorCode::INVALID_HANDLE | ErrorCode::DEVICE_NOT_OPEN => {
                Self::InvalidHandle { handle }
            }
            ErrorCode::STREAM_NOT_RUNNING | ErrorCode::STREAM_NOT_INITIALIZED => {
                Self::StreamNotRunning { handle }
            }
            ErrorCode::UNABLE_TO_STOP_STREAM => Self::StreamStopFailed { handle },
            ErrorCode::LJM_BUFFER_FULL => Self::BufferFull,
            ErrorCode::MBE6_SLAVE_DEVICE_BUSY | ErrorCode::MBE5_ACKNOWLEDGE => Self::DeviceBusy {
                message: format!("{}: {}", context, code),
            },
            _ => Self::Library { code },
        }
    }

    /// Conditions worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BufferFull | Self::DeviceBusy { .. })
    }

    /// Errors caused by how the API was called rather than by the device.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownName { .. }
                | Self::InvalidIndex { .. }
                | Self::InvalidParameter { .. }
                | Self::BufferTooLarge { .. }
                | Self::StreamAlreadyRunning { .. }
                | Self::StreamNotRunning { .. }
        )
    }

    /// Underlying library code, when the error came from one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Connection { code, .. } | Self::Library { code } => Some(*code),
            Self::BufferFull => Some(ErrorCode::LJM_BUFFER_FULL),
            Self::StreamNotRunning { .. } => Some(ErrorCode::STREAM_NOT_RUNNING),
            Self::StreamStopFailed { .. } => Some(ErrorCode::UNABLE_TO_STOP_STREAM),
            Self::InvalidHandle { .. } => Some(ErrorCode::INVALID_HANDLE),
            Self::UnknownName { .. } => Some(ErrorCode::INVALID_NAME),
            _ => None,
        }
    }

    /// Entries of a partial failure that did not succeed.
    pub fn failed(&self) -> Vec<&FrameStatus> {
        match self {
            Self::PartialFailure { entries } => entries.iter().filter(|e| !e.is_ok()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Turn a raw status into a `Result`, logging warnings.
///
/// Warning-range codes mean the call did its work, so they are not errors.
pub(crate) fn check(status: i32, handle: i32, context: &str) -> Result<()> {
    let code = ErrorCode(status);
    if code.is_success() {
        return Ok(());
    }
    if code.is_warning() {
        warn!(%code, context, "LJM returned a warning");
        return Ok(());
    }
    Err(LjmError::from_code(code, handle, context))
}
