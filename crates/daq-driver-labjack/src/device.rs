//! Device handles.
//!
//! [`Device`] owns one open LJM handle. It is the only way to reach
//! register, stream and I2C operations, and it guarantees release order:
//! a running stream is always stopped before the handle is closed, whether
//! the device is closed explicitly or dropped on an error path.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{LjmBackend, RawHandle};
use crate::error::{LjmError, Result};

/// LabJack device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    /// Any device
    #[default]
    Any,
    /// T4
    T4,
    /// T7 (incl. T7-Pro)
    T7,
    /// T8
    T8,
    /// Any T-series device
    TSeries,
    /// Digit
    Digit,
}

impl DeviceType {
    /// Library code for this type.
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Any => ljm_sys::LJM_dtANY,
            Self::T4 => ljm_sys::LJM_dtT4,
            Self::T7 => ljm_sys::LJM_dtT7,
            Self::T8 => ljm_sys::LJM_dtT8,
            Self::TSeries => ljm_sys::LJM_dtTSERIES,
            Self::Digit => ljm_sys::LJM_dtDIGIT,
        }
    }

    /// Convert from a library code.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            ljm_sys::LJM_dtANY => Some(Self::Any),
            ljm_sys::LJM_dtT4 => Some(Self::T4),
            ljm_sys::LJM_dtT7 => Some(Self::T7),
            ljm_sys::LJM_dtT8 => Some(Self::T8),
            ljm_sys::LJM_dtTSERIES => Some(Self::TSeries),
            ljm_sys::LJM_dtDIGIT => Some(Self::Digit),
            _ => None,
        }
    }

    /// Name as accepted by `LJM_OpenS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::T4 => "T4",
            Self::T7 => "T7",
            Self::T8 => "T8",
            Self::TSeries => "TSERIES",
            Self::Digit => "DIGIT",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = LjmError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper
            .strip_prefix("LJM_DT")
            .or_else(|| upper.strip_prefix("DT"))
            .unwrap_or(&upper);
        match name {
            "ANY" | "0" => Ok(Self::Any),
            "T4" | "4" => Ok(Self::T4),
            "T7" | "7" => Ok(Self::T7),
            "T8" | "8" => Ok(Self::T8),
            "TSERIES" | "84" => Ok(Self::TSeries),
            "DIGIT" | "200" => Ok(Self::Digit),
            _ => Err(LjmError::InvalidParameter {
                message: format!("unknown device type '{}'", s),
            }),
        }
    }
}

/// Transport used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    /// Any transport
    #[default]
    Any,
    /// USB
    Usb,
    /// TCP on any network interface
    Tcp,
    /// Wired Ethernet (TCP)
    Ethernet,
    /// WiFi (TCP)
    Wifi,
    /// UDP on any network interface
    NetworkUdp,
    /// Wired Ethernet (UDP)
    EthernetUdp,
    /// WiFi (UDP)
    WifiUdp,
    /// TCP or UDP on any network interface
    NetworkAny,
    /// TCP or UDP over Ethernet
    EthernetAny,
    /// TCP or UDP over WiFi
    WifiAny,
}

impl ConnectionType {
    const ALL: [(Self, i32, &'static str); 11] = [
        (Self::Any, ljm_sys::LJM_ctANY, "ANY"),
        (Self::Usb, ljm_sys::LJM_ctUSB, "USB"),
        (Self::Tcp, ljm_sys::LJM_ctTCP, "TCP"),
        (Self::Ethernet, ljm_sys::LJM_ctETHERNET, "ETHERNET"),
        (Self::Wifi, ljm_sys::LJM_ctWIFI, "WIFI"),
        (Self::NetworkUdp, ljm_sys::LJM_ctNETWORK_UDP, "NETWORK_UDP"),
        (Self::EthernetUdp, ljm_sys::LJM_ctETHERNET_UDP, "ETHERNET_UDP"),
        (Self::WifiUdp, ljm_sys::LJM_ctWIFI_UDP, "WIFI_UDP"),
        (Self::NetworkAny, ljm_sys::LJM_ctNETWORK_ANY, "NETWORK_ANY"),
        (Self::EthernetAny, ljm_sys::LJM_ctETHERNET_ANY, "ETHERNET_ANY"),
        (Self::WifiAny, ljm_sys::LJM_ctWIFI_ANY, "WIFI_ANY"),
    ];

    /// Library code for this type.
    pub fn as_raw(self) -> i32 {
        Self::ALL
            .iter()
            .find(|(ct, _, _)| *ct == self)
            .map(|(_, raw, _)| *raw)
            .unwrap_or(ljm_sys::LJM_ctANY)
    }

    /// Convert from a library code.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, r, _)| *r == raw)
            .map(|(ct, _, _)| *ct)
    }

    /// Name as accepted by `LJM_OpenS`.
    pub fn as_str(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(ct, _, _)| *ct == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("ANY")
    }

    /// Whether the transport is a network connection.
    pub fn is_network(self) -> bool {
        !matches!(self, Self::Any | Self::Usb)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = LjmError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        let name = upper
            .strip_prefix("LJM_CT")
            .or_else(|| upper.strip_prefix("CT"))
            .unwrap_or(&upper);
        Self::ALL
            .iter()
            .find(|(_, raw, n)| *n == name || raw.to_string() == name)
            .map(|(ct, _, _)| *ct)
            .ok_or_else(|| LjmError::InvalidParameter {
                message: format!("unknown connection type '{}'", s),
            })
    }
}

/// What to open: the three arguments of `LJM_Open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenTarget {
    /// Device family
    pub device_type: DeviceType,
    /// Transport
    pub connection_type: ConnectionType,
    /// Serial number, IP address, device name, or `ANY`
    pub identifier: String,
}

impl OpenTarget {
    /// First device found on any transport.
    pub fn any() -> Self {
        Self::default()
    }

    /// A specific device family, connection and identifier.
    pub fn new(
        device_type: DeviceType,
        connection_type: ConnectionType,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            device_type,
            connection_type,
            identifier: identifier.into(),
        }
    }
}

impl Default for OpenTarget {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Any,
            connection_type: ConnectionType::Any,
            identifier: "ANY".to_string(),
        }
    }
}

impl fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.device_type, self.connection_type, self.identifier
        )
    }
}

/// Result of `LJM_GetHandleInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    /// Device family actually opened
    pub device_type: DeviceType,
    /// Transport actually used
    pub connection_type: ConnectionType,
    /// Serial number
    pub serial_number: i32,
    /// IPv4 address (unspecified for USB)
    pub ip_address: Ipv4Addr,
    /// TCP/UDP port (0 for USB)
    pub port: u16,
    /// Largest packet, in bytes, the connection can carry
    pub max_bytes_per_mb: u32,
}

impl HandleInfo {
    /// Build from the raw integers the library returns.
    pub fn from_raw(
        device_type: i32,
        connection_type: i32,
        serial_number: i32,
        ip_address: i32,
        port: i32,
        max_bytes_per_mb: i32,
    ) -> Result<Self> {
        let device_type =
            DeviceType::from_raw(device_type).ok_or_else(|| LjmError::InvalidParameter {
                message: format!("unknown device type code {}", device_type),
            })?;
        let connection_type =
            ConnectionType::from_raw(connection_type).ok_or_else(|| LjmError::InvalidParameter {
                message: format!("unknown connection type code {}", connection_type),
            })?;
        Ok(Self {
            device_type,
            connection_type,
            serial_number,
            ip_address: Ipv4Addr::from(ip_address as u32),
            port: u16::try_from(port).unwrap_or(0),
            max_bytes_per_mb: u32::try_from(max_bytes_per_mb).unwrap_or(0),
        })
    }
}

impl fmt::Display for HandleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} over {}, serial {}, {}:{}, max {} bytes per packet",
            self.device_type,
            self.connection_type,
            self.serial_number,
            self.ip_address,
            self.port,
            self.max_bytes_per_mb
        )
    }
}

/// An open LabJack device.
///
/// Dropping a `Device` stops any running stream and closes the handle. Use
/// [`Device::close`] to observe the close result instead of logging it.
///
/// Register operations take `&self`; starting a stream takes `&mut self`
/// and hands back a session that borrows the device, so the handle cannot
/// be closed while a session exists.
pub struct Device {
    backend: Arc<dyn LjmBackend>,
    handle: RawHandle,
    info: HandleInfo,
    stream_active: bool,
    closed: bool,
}

impl Device {
    /// Wrap a freshly opened handle. Closes it again if it cannot be queried.
    pub(crate) fn from_handle(backend: Arc<dyn LjmBackend>, handle: RawHandle) -> Result<Self> {
        let info = match backend.handle_info(handle) {
            Ok(info) => info,
            Err(e) => {
                if let Err(close_err) = backend.close(handle) {
                    warn!(handle, error = %close_err, "Failed to close handle after info error");
                }
                return Err(e);
            }
        };
        info!(
            handle,
            device_type = %info.device_type,
            connection = %info.connection_type,
            serial = info.serial_number,
            ip = %info.ip_address,
            "Opened LabJack device"
        );
        Ok(Self {
            backend,
            handle,
            info,
            stream_active: false,
            closed: false,
        })
    }

    /// Raw library handle.
    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    /// Information captured when the handle was opened.
    pub fn info(&self) -> &HandleInfo {
        &self.info
    }

    /// Device family.
    pub fn device_type(&self) -> DeviceType {
        self.info.device_type
    }

    /// Whether a stream (input or output) is running on this handle.
    pub fn is_streaming(&self) -> bool {
        self.stream_active
    }

    pub(crate) fn backend(&self) -> &dyn LjmBackend {
        self.backend.as_ref()
    }

    /// Start the stream engine and mark the handle as streaming.
    ///
    /// If the start call fails, a best-effort stop is issued so no
    /// half-started stream is left behind.
    pub(crate) fn begin_stream(
        &mut self,
        scans_per_read: u32,
        scan_list: &[i32],
        scan_rate: f64,
    ) -> Result<f64> {
        if self.stream_active {
            return Err(LjmError::StreamAlreadyRunning {
                handle: self.handle,
            });
        }
        match self
            .backend
            .stream_start(self.handle, scans_per_read, scan_list, scan_rate)
        {
            Ok(actual) => {
                self.stream_active = true;
                Ok(actual)
            }
            Err(e) => {
                if !matches!(e, LjmError::StreamAlreadyRunning { .. }) {
                    match self.backend.stream_stop(self.handle) {
                        Ok(()) | Err(LjmError::StreamNotRunning { .. }) => {}
                        Err(stop_err) => {
                            warn!(handle = self.handle, error = %stop_err, "Stop after failed start")
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Stop the stream if this handle started one. Stops exactly once.
    pub(crate) fn end_stream(&mut self) -> Result<()> {
        if !self.stream_active {
            return Ok(());
        }
        self.stream_active = false;
        match self.backend.stream_stop(self.handle) {
            Ok(()) | Err(LjmError::StreamNotRunning { .. }) => {
                debug!(handle = self.handle, "Stream stopped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stop any stream running on this handle.
    ///
    /// Safe to call when nothing is running: a "not running" answer from
    /// the library is treated as success, so calling this twice in a row
    /// never fails.
    pub fn stop_stream(&mut self) -> Result<()> {
        self.stream_active = false;
        match self.backend.stream_stop(self.handle) {
            Ok(()) => {
                debug!(handle = self.handle, "Stream stopped");
                Ok(())
            }
            Err(LjmError::StreamNotRunning { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop any running stream, then close the handle.
    ///
    /// Both steps are attempted; the stop error wins if both fail.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let stopped = self.end_stream();
        let closed = self.backend.close(self.handle);
        match &closed {
            Ok(()) => debug!(handle = self.handle, "Closed LabJack device"),
            Err(e) => warn!(handle = self.handle, error = %e, "Error closing LabJack device"),
        }
        stopped.and(closed)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle)
            .field("info", &self.info)
            .field("stream_active", &self.stream_active)
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(handle = self.handle, error = %e, "Cleanup failed while dropping device");
        }
    }
}
