//! [`LjmBackend`] over the installed `LabJackM` library.

use std::collections::HashMap;
use std::ffi::{c_char, CStr, CString};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::{
    input_columns, Direction, Frame, FrameResult, LjmBackend, RawBatch, RawHandle,
};
use crate::codes::ErrorCode;
use crate::device::{ConnectionType, DeviceType, HandleInfo};
use crate::error::{check, LjmError, Result};
use crate::registers::{is_stream_out_address, DataType, RegisterAddress};

/// Read buffer geometry of a running stream.
#[derive(Debug, Clone)]
struct StreamShape {
    scans_per_read: usize,
    /// One entry per scan-list address, `true` for inputs
    inputs: Vec<bool>,
}

/// Calls straight into `LabJackM`.
#[derive(Debug, Default)]
pub struct NativeBackend {
    streams: Mutex<HashMap<RawHandle, StreamShape>>,
}

impl NativeBackend {
    /// Create a backend. The library itself needs no initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Human readable text for a status code.
    pub fn error_string(code: ErrorCode) -> String {
        let mut buf = vec![0 as c_char; ljm_sys::LJM_MAX_NAME_SIZE];
        // SAFETY: buf holds LJM_MAX_NAME_SIZE bytes, the documented maximum.
        unsafe { ljm_sys::LJM_ErrorToString(code.0, buf.as_mut_ptr()) };
        // SAFETY: LJM always NUL-terminates within the buffer.
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| LjmError::InvalidParameter {
        message: format!("'{}' contains a NUL byte", s.escape_default()),
    })
}

impl LjmBackend for NativeBackend {
    fn write_library_config(&self, parameter: &str, value: f64) -> Result<()> {
        let name = c_string(parameter)?;
        // SAFETY: name is a valid NUL-terminated string for the call.
        let status = unsafe { ljm_sys::LJM_WriteLibraryConfigS(name.as_ptr(), value) };
        check(status, 0, parameter)
    }

    fn open(
        &self,
        device_type: DeviceType,
        connection_type: ConnectionType,
        identifier: &str,
    ) -> Result<RawHandle> {
        let ident = c_string(identifier)?;
        let mut handle = 0;
        // SAFETY: ident outlives the call and handle is a valid out pointer.
        let status = unsafe {
            ljm_sys::LJM_Open(
                device_type.as_raw(),
                connection_type.as_raw(),
                ident.as_ptr(),
                &mut handle,
            )
        };
        if status != 0 && !ErrorCode(status).is_warning() {
            debug!(
                code = status,
                text = %Self::error_string(ErrorCode(status)),
                "LJM_Open failed"
            );
        }
        check(status, 0, identifier)?;
        Ok(handle)
    }

    fn close(&self, handle: RawHandle) -> Result<()> {
        self.streams.lock().remove(&handle);
        // SAFETY: plain integer argument.
        let status = unsafe { ljm_sys::LJM_Close(handle) };
        check(status, handle, "close")
    }

    fn handle_info(&self, handle: RawHandle) -> Result<HandleInfo> {
        let (mut dt, mut ct, mut serial, mut ip, mut port, mut max_bytes) = (0, 0, 0, 0, 0, 0);
        // SAFETY: all out pointers refer to live locals.
        let status = unsafe {
            ljm_sys::LJM_GetHandleInfo(
                handle,
                &mut dt,
                &mut ct,
                &mut serial,
                &mut ip,
                &mut port,
                &mut max_bytes,
            )
        };
        check(status, handle, "handle info")?;
        HandleInfo::from_raw(dt, ct, serial, ip, port, max_bytes)
    }

    fn name_to_address(&self, name: &str) -> Result<RegisterAddress> {
        let c_name = c_string(name)?;
        let (mut address, mut data_type) = (0, 0);
        // SAFETY: c_name is NUL-terminated; out pointers refer to live locals.
        let status =
            unsafe { ljm_sys::LJM_NameToAddress(c_name.as_ptr(), &mut address, &mut data_type) };
        check(status, 0, name)?;
        let data_type = DataType::from_raw(data_type).ok_or_else(|| LjmError::InvalidParameter {
            message: format!("'{}' has unknown data type {}", name, data_type),
        })?;
        Ok(RegisterAddress { address, data_type })
    }

    fn access_names(&self, handle: RawHandle, frames: &[Frame]) -> Result<Vec<FrameResult>> {
        // Names that do not resolve fail on their own; the rest still run.
        let mut results: Vec<Option<FrameResult>> = vec![None; frames.len()];
        let mut runnable = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            match self.name_to_address(&frame.name) {
                Ok(addr) => runnable.push((i, addr.address)),
                Err(_) => results[i] = Some(Err(ErrorCode::INVALID_NAME)),
            }
        }

        if !runnable.is_empty() {
            let names: Vec<CString> = runnable
                .iter()
                .map(|(i, _)| c_string(&frames[*i].name))
                .collect::<Result<_>>()?;
            let name_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();
            let writes: Vec<i32> = runnable
                .iter()
                .map(|(i, _)| match frames[*i].direction {
                    Direction::Read => ljm_sys::LJM_READ,
                    Direction::Write => ljm_sys::LJM_WRITE,
                })
                .collect();
            let counts: Vec<i32> = runnable
                .iter()
                .map(|(i, _)| frames[*i].count as i32)
                .collect();
            let mut values: Vec<f64> = runnable
                .iter()
                .flat_map(|(i, _)| {
                    let frame = &frames[*i];
                    match frame.direction {
                        Direction::Write => frame.values.clone(),
                        Direction::Read => vec![0.0; frame.count],
                    }
                })
                .collect();
            let mut error_address = -1;

            // SAFETY: every array has one entry per runnable frame, values
            // holds the sum of counts, and all buffers outlive the call.
            let status = unsafe {
                ljm_sys::LJM_eNames(
                    handle,
                    runnable.len() as i32,
                    name_ptrs.as_ptr(),
                    writes.as_ptr(),
                    counts.as_ptr(),
                    values.as_mut_ptr(),
                    &mut error_address,
                )
            };

            let code = ErrorCode(status);
            if code.is_success() || code.is_warning() {
                check(status, handle, "eNames")?;
                let mut offset = 0;
                for (i, _) in &runnable {
                    let frame = &frames[*i];
                    let slice = &values[offset..offset + frame.count];
                    offset += frame.count;
                    results[*i] = Some(Ok(match frame.direction {
                        Direction::Read => slice.to_vec(),
                        Direction::Write => Vec::new(),
                    }));
                }
            } else {
                match LjmError::from_code(code, handle, "eNames") {
                    err @ (LjmError::Connection { .. } | LjmError::InvalidHandle { .. }) => {
                        return Err(err)
                    }
                    _ => {}
                }
                // Frames before the failing address completed; the failing
                // frame and everything after it did not.
                let failed_at = runnable
                    .iter()
                    .position(|(_, addr)| *addr == error_address)
                    .unwrap_or(0);
                trace!(status, error_address, failed_at, "eNames partial failure");
                let mut offset = 0;
                for (pos, (i, _)) in runnable.iter().enumerate() {
                    let frame = &frames[*i];
                    let slice = &values[offset..offset + frame.count];
                    offset += frame.count;
                    results[*i] = Some(if pos < failed_at {
                        Ok(match frame.direction {
                            Direction::Read => slice.to_vec(),
                            Direction::Write => Vec::new(),
                        })
                    } else {
                        Err(code)
                    });
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or(Err(ErrorCode::UNKNOWN_ERROR)))
            .collect())
    }

    fn stream_start(
        &self,
        handle: RawHandle,
        scans_per_read: u32,
        scan_list: &[i32],
        scan_rate: f64,
    ) -> Result<f64> {
        let mut rate = scan_rate;
        // SAFETY: scan_list is valid for its length; rate is a live local.
        let status = unsafe {
            ljm_sys::LJM_eStreamStart(
                handle,
                scans_per_read as i32,
                scan_list.len() as i32,
                scan_list.as_ptr(),
                &mut rate,
            )
        };
        if status == ErrorCode::COULD_NOT_START_STREAM.0 && self.streams.lock().contains_key(&handle) {
            return Err(LjmError::StreamAlreadyRunning { handle });
        }
        check(status, handle, "stream start")?;

        let inputs = scan_list
            .iter()
            .map(|a| !is_stream_out_address(*a))
            .collect();
        self.streams.lock().insert(
            handle,
            StreamShape {
                scans_per_read: scans_per_read as usize,
                inputs,
            },
        );
        Ok(rate)
    }

    fn stream_read(&self, handle: RawHandle) -> Result<RawBatch> {
        let shape = self
            .streams
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(LjmError::StreamNotRunning { handle })?;
        let mut data = vec![0.0; shape.scans_per_read * shape.inputs.len()];
        let (mut device_backlog, mut client_backlog) = (0, 0);
        // SAFETY: data holds scans_per_read * scan-list length values, the
        // largest block LJM writes for this stream; backlogs are live locals.
        let status = unsafe {
            ljm_sys::LJM_eStreamRead(
                handle,
                data.as_mut_ptr(),
                &mut device_backlog,
                &mut client_backlog,
            )
        };
        check(status, handle, "stream read")?;
        Ok(RawBatch {
            data: input_columns(data, &shape.inputs),
            device_backlog: device_backlog.max(0) as u32,
            client_backlog: client_backlog.max(0) as u32,
        })
    }

    fn stream_stop(&self, handle: RawHandle) -> Result<()> {
        self.streams.lock().remove(&handle);
        // SAFETY: plain integer argument.
        let status = unsafe { ljm_sys::LJM_eStreamStop(handle) };
        check(status, handle, "stream stop")
    }

    fn periodic_stream_out(
        &self,
        handle: RawHandle,
        index: u8,
        target_address: i32,
        scan_rate: f64,
        values: &[f64],
    ) -> Result<()> {
        // SAFETY: values is valid for its length for the duration of the call.
        let status = unsafe {
            ljm_sys::LJM_PeriodicStreamOut(
                handle,
                i32::from(index),
                target_address,
                scan_rate,
                values.len() as i32,
                values.as_ptr(),
            )
        };
        check(status, handle, "periodic stream-out")
    }
}
