//! Safe Rust driver for LabJack T-series devices through LJM.
//!
//! This crate wraps the vendor `LabJackM` library (raw bindings in
//! `ljm-sys`) with typed errors, RAII cleanup and a simulator. Everything
//! the device does is reached through named Modbus registers plus the
//! stream engine; this crate adds the client-side discipline around them.
//!
//! # Architecture
//!
//! ## Library and devices
//! - [`Ljm`] - initialized library; applies [`LibraryConfig`] once
//! - [`Device`] - one open handle; stops its stream before closing
//! - [`OpenTarget`] / [`DeviceType`] / [`ConnectionType`] - what to open
//!
//! ## Registers
//! - [`Device::read_named`] / [`Device::write_named`] - bulk access
//! - [`BulkOutcome`] - per-entry results of a bulk call
//!
//! ## Streaming
//! - [`StreamConfig`] / [`StreamSession`] / [`StreamBatch`] - input streams
//! - [`ReadLoop`] / [`RunSummary`] - read loop with skip and backlog tracking
//! - [`OutputStreamConfig`] / [`OutputSession`] / [`Waveform`] - stream-out
//! - [`StreamClock`] - scan-rate quantization and limits
//!
//! ## I2C
//! - [`I2cBus`] / [`I2cConfig`] / [`Eeprom`]
//!
//! ## Backends
//! - [`LjmBackend`] - the seam to the vendor library
//! - `NativeBackend` - the real library (feature `hardware`)
//! - [`mock::SimulatedLjm`] - in-process simulator
//!
//! # Release order
//!
//! A stream session borrows its device mutably, so the compiler rules out
//! closing a handle under a running session. Dropping a session stops the
//! stream; dropping a device stops whatever is still running and then
//! closes it. On error paths `?` unwinds through exactly that sequence.
//!
//! # Example
//!
//! ```
//! use daq_driver_labjack::{LibraryConfig, Ljm, LjmError, OpenTarget, ReadLoop, StopCondition,
//!     StreamConfig};
//! use daq_driver_labjack::mock::SimulatedLjm;
//!
//! # fn main() -> Result<(), LjmError> {
//! let ljm = Ljm::new(SimulatedLjm::new(), LibraryConfig::default())?;
//! let config = StreamConfig::builder()
//!     .channels(&["AIN0", "AIN2"])
//!     .scan_rate(25_000.0)
//!     .build()?;
//!
//! let summary = ljm.with_device(&OpenTarget::any(), |device| {
//!     let mut session = device.start_input_stream(&config)?;
//!     ReadLoop::new(StopCondition::Reads(100)).run(&mut session, |_batch| Ok::<_, LjmError>(()))
//! })?;
//! assert_eq!(summary.total_scans, 12_600);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codes;
pub mod config;
pub mod device;
pub mod error;
pub mod i2c;
pub mod library;
pub mod mock;
#[cfg(feature = "hardware")]
pub mod native;
pub mod output;
pub mod reader;
pub mod registers;
pub mod streaming;
pub mod timing;

pub use backend::{Direction, Frame, FrameResult, LjmBackend, RawBatch, RawHandle};
pub use codes::ErrorCode;
pub use config::{LibraryConfig, LjmLogLevel, LjmLogMode};
pub use device::{ConnectionType, Device, DeviceType, HandleInfo, OpenTarget};
pub use error::{FrameStatus, LjmError, Result};
pub use i2c::{Eeprom, I2cBus, I2cConfig, I2cOptions, EEPROM_ADDRESS, EEPROM_PAGE_SIZE};
pub use library::Ljm;
#[cfg(feature = "hardware")]
pub use native::NativeBackend;
pub use output::{OutputSession, OutputStreamConfig, Waveform, MAX_STREAM_OUT_INDEX, MAX_WAVEFORM_SAMPLES};
pub use reader::{
    BacklogMonitor, CancelToken, ReadLoop, RunSummary, StopCondition, StopReason, StreamWarning,
};
pub use registers::{BulkOutcome, DataType, EntryOutcome, RegisterAddress};
pub use streaming::{StreamBatch, StreamConfig, StreamSession, MAX_SAMPLES_PER_PACKET};
pub use timing::StreamClock;
