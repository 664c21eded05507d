//! Low-level FFI bindings for the LabJack LJM library (`LabJackM`).
//!
//! LJM is the vendor library that talks to T-series devices (T4, T7, T8)
//! over USB, Ethernet and WiFi. It exposes named Modbus registers, stream
//! mode, and a small set of library configuration knobs. This crate only
//! declares the subset of the C API used by `daq-driver-labjack`.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-labjack` crate instead.
//!
//! # Features
//!
//! - `ljm-sdk`: link against the installed `LabJackM` library.
//!   Without this feature every function is a stub that panics when called,
//!   which keeps the workspace buildable on machines without the vendor
//!   installer.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(clippy::all)]

use std::os::raw::{c_char, c_double, c_int, c_uint};

// Device types (LJM_dt*)
pub const LJM_dtANY: c_int = 0;
pub const LJM_dtT4: c_int = 4;
pub const LJM_dtT7: c_int = 7;
pub const LJM_dtT8: c_int = 8;
pub const LJM_dtTSERIES: c_int = 84;
pub const LJM_dtDIGIT: c_int = 200;

// Connection types (LJM_ct*)
pub const LJM_ctANY: c_int = 0;
pub const LJM_ctUSB: c_int = 1;
pub const LJM_ctTCP: c_int = 2;
pub const LJM_ctETHERNET: c_int = 3;
pub const LJM_ctWIFI: c_int = 4;
pub const LJM_ctNETWORK_UDP: c_int = 5;
pub const LJM_ctETHERNET_UDP: c_int = 6;
pub const LJM_ctWIFI_UDP: c_int = 7;
pub const LJM_ctNETWORK_ANY: c_int = 8;
pub const LJM_ctETHERNET_ANY: c_int = 9;
pub const LJM_ctWIFI_ANY: c_int = 10;

// Register data types
pub const LJM_UINT16: c_int = 0;
pub const LJM_UINT32: c_int = 1;
pub const LJM_INT32: c_int = 2;
pub const LJM_FLOAT32: c_int = 3;
pub const LJM_STRING: c_int = 98;
pub const LJM_BYTE: c_int = 99;

// eNames frame direction
pub const LJM_READ: c_int = 0;
pub const LJM_WRITE: c_int = 1;

/// Negative channel number meaning "single-ended" (ground).
pub const LJM_GND: c_int = 199;

/// Value LJM writes into stream data for scans the device skipped.
pub const LJM_DUMMY_VALUE: c_double = -9999.0;

/// Size of the buffer `LJM_ErrorToString` writes into.
pub const LJM_MAX_NAME_SIZE: usize = 256;

// Library configuration parameter names (for LJM_WriteLibraryConfigS)
pub const LJM_LOG_LEVEL: &str = "LJM_LOG_LEVEL";
pub const LJM_LOG_MODE: &str = "LJM_LOG_MODE";
pub const LJM_OPEN_TCP_DEVICE_TIMEOUT_MS: &str = "LJM_OPEN_TCP_DEVICE_TIMEOUT_MS";
pub const LJM_SEND_RECEIVE_TIMEOUT_MS: &str = "LJM_SEND_RECEIVE_TIMEOUT_MS";
pub const LJM_STREAM_RECEIVE_TIMEOUT_MS: &str = "LJM_STREAM_RECEIVE_TIMEOUT_MS";

#[cfg(feature = "ljm-sdk")]
#[link(name = "LabJackM")]
extern "C" {
    pub fn LJM_Open(
        DeviceType: c_int,
        ConnectionType: c_int,
        Identifier: *const c_char,
        Handle: *mut c_int,
    ) -> c_int;

    pub fn LJM_Close(Handle: c_int) -> c_int;

    pub fn LJM_GetHandleInfo(
        Handle: c_int,
        DeviceType: *mut c_int,
        ConnectionType: *mut c_int,
        SerialNumber: *mut c_int,
        IPAddress: *mut c_int,
        Port: *mut c_int,
        MaxBytesPerMB: *mut c_int,
    ) -> c_int;

    pub fn LJM_NameToAddress(Name: *const c_char, Address: *mut c_int, Type: *mut c_int) -> c_int;

    pub fn LJM_eNames(
        Handle: c_int,
        NumFrames: c_int,
        aNames: *const *const c_char,
        aWrites: *const c_int,
        aNumValues: *const c_int,
        aValues: *mut c_double,
        ErrorAddress: *mut c_int,
    ) -> c_int;

    pub fn LJM_eStreamStart(
        Handle: c_int,
        ScansPerRead: c_int,
        NumAddresses: c_int,
        aScanList: *const c_int,
        ScanRate: *mut c_double,
    ) -> c_int;

    pub fn LJM_eStreamRead(
        Handle: c_int,
        aData: *mut c_double,
        DeviceScanBacklog: *mut c_int,
        LJMScanBacklog: *mut c_int,
    ) -> c_int;

    pub fn LJM_eStreamStop(Handle: c_int) -> c_int;

    pub fn LJM_PeriodicStreamOut(
        Handle: c_int,
        StreamOutIndex: c_int,
        TargetAddr: c_int,
        ScanRate: c_double,
        NumValues: c_int,
        aWriteData: *const c_double,
    ) -> c_int;

    pub fn LJM_WriteLibraryConfigS(Parameter: *const c_char, Value: c_double) -> c_int;

    pub fn LJM_ErrorToString(ErrorCode: c_int, ErrorString: *mut c_char);

    pub fn LJM_NumberToIP(Number: c_uint, IPv4String: *mut c_char) -> c_int;
}

#[cfg(not(feature = "ljm-sdk"))]
pub use stubs::*;

// Panic stubs: linking succeeds without LabJackM, but any call panics.
#[cfg(not(feature = "ljm-sdk"))]
mod stubs {
    use super::*;

    const LJM_SDK_PANIC_MSG: &str = "LJM function called but the ljm-sdk feature is not enabled. \
        Enable ljm-sdk (or `hardware` in daq-driver-labjack) to use the real LabJackM library.";

    #[no_mangle]
    pub unsafe extern "C" fn LJM_Open(
        _device_type: c_int,
        _connection_type: c_int,
        _identifier: *const c_char,
        _handle: *mut c_int,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_Close(_handle: c_int) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_GetHandleInfo(
        _handle: c_int,
        _device_type: *mut c_int,
        _connection_type: *mut c_int,
        _serial_number: *mut c_int,
        _ip_address: *mut c_int,
        _port: *mut c_int,
        _max_bytes_per_mb: *mut c_int,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_NameToAddress(
        _name: *const c_char,
        _address: *mut c_int,
        _type: *mut c_int,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_eNames(
        _handle: c_int,
        _num_frames: c_int,
        _names: *const *const c_char,
        _writes: *const c_int,
        _num_values: *const c_int,
        _values: *mut c_double,
        _error_address: *mut c_int,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_eStreamStart(
        _handle: c_int,
        _scans_per_read: c_int,
        _num_addresses: c_int,
        _scan_list: *const c_int,
        _scan_rate: *mut c_double,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_eStreamRead(
        _handle: c_int,
        _data: *mut c_double,
        _device_scan_backlog: *mut c_int,
        _ljm_scan_backlog: *mut c_int,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_eStreamStop(_handle: c_int) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_PeriodicStreamOut(
        _handle: c_int,
        _stream_out_index: c_int,
        _target_addr: c_int,
        _scan_rate: c_double,
        _num_values: c_int,
        _write_data: *const c_double,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_WriteLibraryConfigS(
        _parameter: *const c_char,
        _value: c_double,
    ) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_ErrorToString(_error_code: c_int, _error_string: *mut c_char) {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }

    #[no_mangle]
    pub unsafe extern "C" fn LJM_NumberToIP(_number: c_uint, _ipv4_string: *mut c_char) -> c_int {
        panic!("{}", LJM_SDK_PANIC_MSG);
    }
}
