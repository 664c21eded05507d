//! The LJM API surface the driver is written against.
//!
//! [`LjmBackend`] is the seam between the driver and the vendor library.
//! [`NativeBackend`](crate::native::NativeBackend) forwards to `LabJackM`
//! through `ljm-sys`; [`SimulatedLjm`](crate::mock::SimulatedLjm) keeps
//! everything in process for tests and dry runs.
//!
//! Backends are thin: they do not track stream state or enforce ordering.
//! That discipline lives in [`Device`](crate::Device) and
//! [`StreamSession`](crate::StreamSession).

use crate::codes::ErrorCode;
use crate::device::{ConnectionType, DeviceType, HandleInfo};
use crate::error::Result;
use crate::registers::RegisterAddress;

/// Raw integer handle returned by the library.
pub type RawHandle = i32;

/// Direction of a register frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read values from the device
    Read,
    /// Write values to the device
    Write,
}

/// One entry of a bulk named-register access (an `eNames` frame).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Register name
    pub name: String,
    /// Read or write
    pub direction: Direction,
    /// Number of consecutive values (array registers such as `I2C_DATA_TX`)
    pub count: usize,
    /// Values to write; empty for reads
    pub values: Vec<f64>,
}

impl Frame {
    /// Read `count` values starting at `name`.
    pub fn read(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Read,
            count,
            values: Vec::new(),
        }
    }

    /// Write `values` starting at `name`.
    pub fn write(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Write,
            count: values.len(),
            values,
        }
    }

    /// Write a single value.
    pub fn write_value(name: impl Into<String>, value: f64) -> Self {
        Self::write(name, vec![value])
    }
}

/// Result of one frame: values read (empty for writes) or the entry's error.
pub type FrameResult = std::result::Result<Vec<f64>, ErrorCode>;

/// One `eStreamRead` worth of data, exactly as the library returns it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawBatch {
    /// Row-major samples; skipped scans hold the dummy value
    pub data: Vec<f64>,
    /// Scans buffered on the device
    pub device_backlog: u32,
    /// Scans buffered inside the library, not yet delivered
    pub client_backlog: u32,
}

/// Operations the vendor library exposes.
///
/// All calls are blocking. Implementations must be safe to share between
/// threads, but callers never issue concurrent calls on the same handle.
pub trait LjmBackend: Send + Sync {
    /// Set a library-wide configuration value (`LJM_WriteLibraryConfigS`).
    fn write_library_config(&self, parameter: &str, value: f64) -> Result<()>;

    /// Open a device.
    fn open(
        &self,
        device_type: DeviceType,
        connection_type: ConnectionType,
        identifier: &str,
    ) -> Result<RawHandle>;

    /// Close a handle.
    fn close(&self, handle: RawHandle) -> Result<()>;

    /// Describe an open handle.
    fn handle_info(&self, handle: RawHandle) -> Result<HandleInfo>;

    /// Resolve a register name to its Modbus address and data type.
    fn name_to_address(&self, name: &str) -> Result<RegisterAddress>;

    /// Execute a batch of named reads and writes.
    ///
    /// The outer `Result` fails only when nothing could be attempted (bad
    /// handle, transport down). Otherwise one [`FrameResult`] per frame is
    /// returned, in order.
    fn access_names(&self, handle: RawHandle, frames: &[Frame]) -> Result<Vec<FrameResult>>;

    /// Start stream mode; returns the scan rate the device actually uses.
    fn stream_start(
        &self,
        handle: RawHandle,
        scans_per_read: u32,
        scan_list: &[i32],
        scan_rate: f64,
    ) -> Result<f64>;

    /// Block until the next `scans_per_read` scans are available.
    fn stream_read(&self, handle: RawHandle) -> Result<RawBatch>;

    /// Stop stream mode.
    fn stream_stop(&self, handle: RawHandle) -> Result<()>;

    /// Load a waveform into stream-out `index` targeting `target_address`.
    fn periodic_stream_out(
        &self,
        handle: RawHandle,
        index: u8,
        target_address: i32,
        scan_rate: f64,
        values: &[f64],
    ) -> Result<()>;
}

/// Keep the input columns of row-major `data` laid out over a whole scan
/// list, where `inputs[i]` marks address `i` as an input.
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub(crate) fn input_columns(data: Vec<f64>, inputs: &[bool]) -> Vec<f64> {
    if inputs.iter().all(|input| *input) {
        return data;
    }
    data.chunks(inputs.len().max(1))
        .flat_map(|scan| {
            scan.iter()
                .zip(inputs)
                .filter(|(_, input)| **input)
                .map(|(value, _)| *value)
        })
        .collect()
}
