//! Named register access.
//!
//! T-series devices expose everything (analog inputs, DACs, I2C engine,
//! stream configuration) as Modbus registers with symbolic names. This
//! module provides:
//!
//! - [`RegisterAddress`] / [`DataType`] - result of name resolution
//! - [`lookup`] - the register table for the names this crate uses
//! - [`BulkOutcome`] - per-entry results of a bulk access
//! - register read/write methods on [`Device`]
//!
//! Nothing is cached: every call goes to the device.

use tracing::{debug, trace};

use crate::backend::{Frame, FrameResult};
use crate::device::Device;
use crate::error::{FrameStatus, LjmError, Result};

/// Register data type as reported by name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 16-bit unsigned, one register
    Uint16,
    /// 32-bit unsigned, two registers
    Uint32,
    /// 32-bit signed, two registers
    Int32,
    /// 32-bit IEEE float, two registers
    Float32,
    /// Byte array (I2C/SPI buffers)
    Byte,
    /// Fixed-length string
    String,
}

impl DataType {
    /// Convert from the library's numeric type code.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            ljm_sys::LJM_UINT16 => Some(Self::Uint16),
            ljm_sys::LJM_UINT32 => Some(Self::Uint32),
            ljm_sys::LJM_INT32 => Some(Self::Int32),
            ljm_sys::LJM_FLOAT32 => Some(Self::Float32),
            ljm_sys::LJM_BYTE => Some(Self::Byte),
            ljm_sys::LJM_STRING => Some(Self::String),
            _ => None,
        }
    }

    /// Number of 16-bit Modbus registers one value occupies.
    pub fn registers(self) -> u32 {
        match self {
            Self::Uint16 | Self::Byte => 1,
            Self::Uint32 | Self::Int32 | Self::Float32 => 2,
            Self::String => 25,
        }
    }
}

/// A resolved register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAddress {
    /// Modbus start address
    pub address: i32,
    /// Value type
    pub data_type: DataType,
}

/// Whether a register can be read, written, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read only
    Read,
    /// Write only
    Write,
    /// Read and write
    ReadWrite,
}

impl Access {
    /// Whether reads are allowed.
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether writes are allowed.
    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Entry of the register table.
///
/// `pattern` may contain a single `#` standing for a channel number in
/// `0..count`; addresses then advance by `stride` per channel.
#[derive(Debug, Clone, Copy)]
pub struct RegisterDef {
    /// Name, possibly with a `#` placeholder
    pub pattern: &'static str,
    /// Address of channel 0 (or of the register itself)
    pub address: i32,
    /// Address step between channels
    pub stride: i32,
    /// Number of channels matched by `#`
    pub count: i32,
    /// Value type
    pub data_type: DataType,
    /// Allowed directions
    pub access: Access,
    /// Maximum consecutive values (array registers)
    pub len: usize,
}

const fn reg(pattern: &'static str, address: i32, data_type: DataType, access: Access) -> RegisterDef {
    RegisterDef {
        pattern,
        address,
        stride: 0,
        count: 1,
        data_type,
        access,
        len: 1,
    }
}

const fn family(
    pattern: &'static str,
    address: i32,
    stride: i32,
    count: i32,
    data_type: DataType,
    access: Access,
) -> RegisterDef {
    RegisterDef {
        pattern,
        address,
        stride,
        count,
        data_type,
        access,
        len: 1,
    }
}

const fn bytes(pattern: &'static str, address: i32, access: Access, len: usize) -> RegisterDef {
    RegisterDef {
        pattern,
        address,
        stride: 0,
        count: 1,
        data_type: DataType::Byte,
        access,
        len,
    }
}

/// Largest I2C transfer, in bytes, in either direction.
pub const I2C_MAX_BYTES: usize = 32;

/// First stream-out scan address (`STREAM_OUT0`).
pub const STREAM_OUT_BASE_ADDRESS: i32 = 4800;

use Access::{Read as R, ReadWrite as RW, Write as W};
use DataType::{Float32, Uint16, Uint32};

/// Registers known to this crate (T7 map; the T4 and T8 share these).
pub static REGISTERS: &[RegisterDef] = &[
    family("AIN#", 0, 2, 14, Float32, R),
    family("DAC#", 1000, 2, 2, Float32, RW),
    family("FIO#", 2000, 1, 8, Uint16, RW),
    family("EIO#", 2008, 1, 8, Uint16, RW),
    reg("STREAM_SCANRATE_HZ", 4002, Float32, RW),
    reg("STREAM_SETTLING_US", 4008, Float32, RW),
    reg("STREAM_RESOLUTION_INDEX", 4010, Uint32, RW),
    family("STREAM_OUT#_TARGET", 4040, 2, 4, Uint32, RW),
    family("STREAM_OUT#_BUFFER_SIZE", 4050, 2, 4, Uint32, RW),
    family("STREAM_OUT#_ENABLE", 4090, 2, 4, Uint32, RW),
    family("STREAM_OUT#", STREAM_OUT_BASE_ADDRESS, 1, 4, Uint16, R),
    reg("I2C_SDA_DIONUM", 5100, Uint16, RW),
    reg("I2C_SCL_DIONUM", 5101, Uint16, RW),
    reg("I2C_SPEED_THROTTLE", 5102, Uint16, RW),
    reg("I2C_OPTIONS", 5103, Uint16, RW),
    reg("I2C_SLAVE_ADDRESS", 5104, Uint16, RW),
    reg("I2C_NUM_BYTES_TX", 5108, Uint16, RW),
    reg("I2C_NUM_BYTES_RX", 5109, Uint16, RW),
    reg("I2C_GO", 5110, Uint16, W),
    reg("I2C_ACKS", 5114, Uint32, R),
    bytes("I2C_DATA_TX", 5120, W, I2C_MAX_BYTES),
    bytes("I2C_DATA_RX", 5160, R, I2C_MAX_BYTES),
    reg("AIN_ALL_RANGE", 43900, Float32, RW),
    reg("AIN_ALL_NEGATIVE_CH", 43902, Uint16, RW),
    reg("AIN_ALL_RESOLUTION_INDEX", 43903, Uint16, RW),
    reg("PRODUCT_ID", 60000, Float32, R),
    reg("FIRMWARE_VERSION", 60004, Float32, R),
    reg("SERIAL_NUMBER", 60028, Uint32, R),
];

/// Find the table entry and resolved address for `name`.
pub fn lookup_def(name: &str) -> Option<(&'static RegisterDef, RegisterAddress)> {
    REGISTERS.iter().find_map(|def| {
        let address = match def.pattern.split_once('#') {
            Some((prefix, suffix)) => {
                let channel = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
                if channel.is_empty() || !channel.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let n: i32 = channel.parse().ok()?;
                if n >= def.count {
                    return None;
                }
                def.address + n * def.stride
            }
            None if def.pattern == name => def.address,
            None => return None,
        };
        Some((
            def,
            RegisterAddress {
                address,
                data_type: def.data_type,
            },
        ))
    })
}

/// Resolve `name` against the register table.
pub fn lookup(name: &str) -> Option<RegisterAddress> {
    lookup_def(name).map(|(_, addr)| addr)
}

/// Whether a scan-list address is a stream-out channel rather than an input.
pub fn is_stream_out_address(address: i32) -> bool {
    (STREAM_OUT_BASE_ADDRESS..STREAM_OUT_BASE_ADDRESS + 4).contains(&address)
}

/// Result of one entry of a bulk access.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
    /// Register name
    pub name: String,
    /// Values read (empty for writes), or the entry's error
    pub result: FrameResult,
}

/// Per-entry results of a bulk named access.
///
/// Every entry must be inspected; a bulk call can partly succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    entries: Vec<EntryOutcome>,
}

impl BulkOutcome {
    /// All entries, in request order.
    pub fn entries(&self) -> &[EntryOutcome] {
        &self.entries
    }

    /// Whether every entry succeeded.
    pub fn all_ok(&self) -> bool {
        self.entries.iter().all(|e| e.result.is_ok())
    }

    /// Entries that failed.
    pub fn failed(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| e.result.is_err())
    }

    /// Status of every entry, for error reporting.
    pub fn statuses(&self) -> Vec<FrameStatus> {
        self.entries
            .iter()
            .map(|e| FrameStatus {
                name: e.name.clone(),
                error: e.result.as_ref().err().copied(),
            })
            .collect()
    }

    /// Values of every entry, or [`LjmError::PartialFailure`] if any failed.
    pub fn into_values(self) -> Result<Vec<Vec<f64>>> {
        if !self.all_ok() {
            return Err(LjmError::PartialFailure {
                entries: self.statuses(),
            });
        }
        Ok(self
            .entries
            .into_iter()
            .map(|e| e.result.unwrap_or_default())
            .collect())
    }
}

impl Device {
    /// Resolve register names to addresses.
    ///
    /// Fails with [`LjmError::UnknownName`] on the first unrecognized name.
    pub fn resolve_addresses(&self, names: &[&str]) -> Result<Vec<i32>> {
        names
            .iter()
            .map(|name| self.backend().name_to_address(name).map(|r| r.address))
            .collect()
    }

    /// Execute a batch of reads and writes and report each entry.
    pub fn access(&self, frames: &[Frame]) -> Result<BulkOutcome> {
        if frames.is_empty() {
            return Ok(BulkOutcome {
                entries: Vec::new(),
            });
        }
        for frame in frames {
            if frame.values.len() != frame.count && !frame.values.is_empty() {
                return Err(LjmError::InvalidParameter {
                    message: format!(
                        "frame '{}' has {} values but count {}",
                        frame.name,
                        frame.values.len(),
                        frame.count
                    ),
                });
            }
        }

        let results = self.backend().access_names(self.handle(), frames)?;
        if results.len() != frames.len() {
            return Err(LjmError::InvalidParameter {
                message: format!(
                    "backend returned {} results for {} frames",
                    results.len(),
                    frames.len()
                ),
            });
        }

        let entries: Vec<EntryOutcome> = frames
            .iter()
            .zip(results)
            .map(|(frame, result)| EntryOutcome {
                name: frame.name.clone(),
                result,
            })
            .collect();

        let outcome = BulkOutcome { entries };
        trace!(
            handle = self.handle(),
            frames = frames.len(),
            failed = outcome.failed().count(),
            "Bulk register access"
        );
        Ok(outcome)
    }

    /// Read `counts[i]` values starting at each `names[i]`.
    pub fn read_named(&self, names: &[&str], counts: &[usize]) -> Result<Vec<Vec<f64>>> {
        if names.len() != counts.len() {
            return Err(LjmError::InvalidParameter {
                message: format!("{} names but {} counts", names.len(), counts.len()),
            });
        }
        let frames: Vec<Frame> = names
            .iter()
            .zip(counts)
            .map(|(name, &count)| Frame::read(*name, count))
            .collect();
        self.access(&frames)?.into_values()
    }

    /// Write values to several registers.
    ///
    /// `values` is flat: the first `counts[0]` values go to `names[0]`, the
    /// next `counts[1]` to `names[1]`, and so on.
    pub fn write_named(&self, names: &[&str], counts: &[usize], values: &[f64]) -> Result<()> {
        if names.len() != counts.len() {
            return Err(LjmError::InvalidParameter {
                message: format!("{} names but {} counts", names.len(), counts.len()),
            });
        }
        let total: usize = counts.iter().sum();
        if total != values.len() {
            return Err(LjmError::InvalidParameter {
                message: format!("counts sum to {} but {} values given", total, values.len()),
            });
        }

        let mut offset = 0;
        let frames: Vec<Frame> = names
            .iter()
            .zip(counts)
            .map(|(name, &count)| {
                let frame = Frame::write(*name, values[offset..offset + count].to_vec());
                offset += count;
                frame
            })
            .collect();
        self.access(&frames)?.into_values().map(|_| ())
    }

    /// Read a single value.
    pub fn read_name(&self, name: &str) -> Result<f64> {
        let values = self.access(&[Frame::read(name, 1)])?.into_values()?;
        values
            .into_iter()
            .next()
            .and_then(|v| v.into_iter().next())
            .ok_or_else(|| LjmError::InvalidParameter {
                message: format!("no value returned for '{}'", name),
            })
    }

    /// Write a single value.
    pub fn write_name(&self, name: &str, value: f64) -> Result<()> {
        debug!(handle = self.handle(), name, value, "Write register");
        self.access(&[Frame::write_value(name, value)])?
            .into_values()
            .map(|_| ())
    }
}
