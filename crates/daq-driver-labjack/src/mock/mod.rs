//! In-process LJM simulator.
//!
//! [`SimulatedLjm`] implements [`LjmBackend`] without hardware. It models a
//! single T-series device reachable through any number of handles:
//!
//! - the register table, with generated analog inputs and stored outputs
//! - stream mode with clock quantization, skipped-scan and backlog injection
//! - periodic stream-out buffers
//! - an I2C bus with an EEPROM at `0x50`
//!
//! Every call is recorded and can be made to fail through a [`FaultPlan`],
//! which is how cleanup ordering is tested. The simulator is cheap to clone;
//! clones share state, so a test can keep one clone for inspection after
//! handing another to [`Ljm::new`](crate::Ljm::new).
//!
//! # Modes
//!
//! - **Instant**: stream reads return immediately (unit tests)
//! - **Realistic**: stream reads block until the scans would exist at the
//!   actual scan rate, and late readers see a growing backlog

mod eeprom;
mod faults;
mod rng;

pub use eeprom::EepromChip;
pub use faults::{Call, Fault, FaultPlan, Operation};
pub use rng::SimRng;

use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::backend::{Direction, Frame, FrameResult, LjmBackend, RawBatch, RawHandle};
use crate::codes::ErrorCode;
use crate::device::{ConnectionType, DeviceType, HandleInfo};
use crate::error::{LjmError, Result};
use crate::i2c::EEPROM_ADDRESS;
use crate::registers::{self, RegisterAddress, RegisterDef, STREAM_OUT_BASE_ADDRESS};
use crate::streaming::SKIPPED_SAMPLE;
use crate::timing::StreamClock;

/// Stream pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimMode {
    /// No delays
    #[default]
    Instant,
    /// Reads block in real time
    Realistic,
}

/// Skip the first `scans` scans of every `every`th read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipPattern {
    /// Read period (1 = every read)
    pub every: u64,
    /// Scans skipped in an affected read
    pub scans: u32,
}

/// Backlog added per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BacklogProfile {
    /// Device-side backlog growth per read
    pub device_per_read: u32,
    /// LJM-side backlog growth per read
    pub client_per_read: u32,
}

/// Simulated device and behaviour.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Device family reported
    pub device_type: DeviceType,
    /// Transport reported
    pub connection_type: ConnectionType,
    /// Serial number
    pub serial_number: i32,
    /// IP address (network transports)
    pub ip_address: Ipv4Addr,
    /// Port (network transports)
    pub port: u16,
    /// Packet size
    pub max_bytes_per_mb: u32,
    /// Stream pacing
    pub mode: SimMode,
    /// RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Noise amplitude on analog inputs, in volts
    pub noise: f64,
    /// Skipped-scan injection
    pub skip: Option<SkipPattern>,
    /// Backlog growth injection
    pub backlog: BacklogProfile,
    /// LJM buffer size in scans; reads fail with `LJM_BUFFER_FULL` beyond it
    pub buffer_capacity_scans: u32,
    /// Whether an EEPROM answers at `0x50`
    pub eeprom: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::T7,
            connection_type: ConnectionType::Ethernet,
            serial_number: 470_010_000,
            ip_address: Ipv4Addr::new(192, 168, 1, 175),
            port: 502,
            max_bytes_per_mb: 1040,
            mode: SimMode::Instant,
            seed: None,
            noise: 0.001,
            skip: None,
            backlog: BacklogProfile::default(),
            buffer_capacity_scans: 1_000_000,
            eeprom: true,
        }
    }
}

impl SimConfig {
    /// A T4 on USB.
    pub fn t4_usb() -> Self {
        Self {
            device_type: DeviceType::T4,
            connection_type: ConnectionType::Usb,
            serial_number: 440_010_000,
            ip_address: Ipv4Addr::UNSPECIFIED,
            port: 0,
            max_bytes_per_mb: 64,
            ..Self::default()
        }
    }

    /// Block stream reads in real time.
    pub fn realistic(mut self) -> Self {
        self.mode = SimMode::Realistic;
        self
    }

    /// Fix the RNG seed.
    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Skip `scans` scans on every `every`th read.
    pub fn with_skips(mut self, every: u64, scans: u32) -> Self {
        self.skip = Some(SkipPattern { every, scans });
        self
    }

    /// Grow backlogs on every read.
    pub fn with_backlog(mut self, device_per_read: u32, client_per_read: u32) -> Self {
        self.backlog = BacklogProfile {
            device_per_read,
            client_per_read,
        };
        self
    }
}

#[derive(Debug)]
struct SimStream {
    scans_per_read: usize,
    inputs: Vec<i32>,
    outputs: Vec<usize>,
    scan_rate: f64,
    started: Instant,
    reads: u64,
    scans_emitted: u64,
    device_backlog: u32,
    client_backlog: u32,
}

#[derive(Debug, Clone)]
struct StreamOut {
    target: i32,
    values: Vec<f64>,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: RawHandle,
    handles: HashSet<RawHandle>,
    streams: HashMap<RawHandle, SimStream>,
    registers: HashMap<i32, f64>,
    i2c_tx: Vec<u8>,
    i2c_rx: Vec<u8>,
    i2c_acks: u32,
    eeprom: Option<EepromChip>,
    stream_outs: [Option<StreamOut>; 4],
    library_config: HashMap<String, f64>,
    faults: FaultPlan,
    calls: Vec<Call>,
}

impl SimState {
    fn check_handle(&self, handle: RawHandle) -> Result<()> {
        if self.handles.contains(&handle) {
            Ok(())
        } else {
            Err(LjmError::from_code(ErrorCode::INVALID_HANDLE, handle, "handle"))
        }
    }
}

struct Shared {
    config: SimConfig,
    state: Mutex<SimState>,
    rng: SimRng,
}

/// Simulated LJM library. See the [module docs](self).
#[derive(Clone)]
pub struct SimulatedLjm {
    shared: Arc<Shared>,
}

impl Default for SimulatedLjm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLjm {
    /// A T7 on Ethernet at 192.168.1.175.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Simulate a specific device.
    pub fn with_config(config: SimConfig) -> Self {
        let state = SimState {
            next_handle: 1,
            eeprom: config.eeprom.then(EepromChip::default),
            ..SimState::default()
        };
        Self {
            shared: Arc::new(Shared {
                rng: SimRng::new(config.seed),
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Install a fault plan, replacing any previous one.
    pub fn with_faults(self, plan: FaultPlan) -> Self {
        self.set_faults(plan);
        self
    }

    /// Replace the fault plan; call counters restart.
    pub fn set_faults(&self, plan: FaultPlan) {
        self.shared.state.lock().faults = plan;
    }

    /// Simulated device settings.
    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.shared.state.lock().calls.clone()
    }

    /// Operations recorded so far.
    pub fn operations(&self) -> Vec<Operation> {
        self.shared
            .state
            .lock()
            .calls
            .iter()
            .map(Call::operation)
            .collect()
    }

    /// Number of recorded calls of `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        self.shared
            .state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.shared.state.lock().calls.clear();
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> usize {
        self.shared.state.lock().handles.len()
    }

    /// Whether `handle` has a running stream.
    pub fn is_streaming(&self, handle: RawHandle) -> bool {
        self.shared.state.lock().streams.contains_key(&handle)
    }

    /// Value written for a library setting.
    pub fn library_config(&self, parameter: &str) -> Option<f64> {
        self.shared
            .state
            .lock()
            .library_config
            .get(parameter)
            .copied()
    }

    /// Stored value of a writable register.
    pub fn register(&self, name: &str) -> Option<f64> {
        let addr = registers::lookup(name)?.address;
        self.shared.state.lock().registers.get(&addr).copied()
    }

    /// EEPROM memory, if the bus has one.
    pub fn eeprom_contents(&self) -> Option<Vec<u8>> {
        self.shared
            .state
            .lock()
            .eeprom
            .as_ref()
            .map(|chip| chip.contents().to_vec())
    }

    /// Waveform loaded into stream-out `index`.
    pub fn stream_out_buffer(&self, index: usize) -> Option<Vec<f64>> {
        self.shared
            .state
            .lock()
            .stream_outs
            .get(index)
            .and_then(|s| s.as_ref().map(|s| s.values.clone()))
    }

    /// Record `call`, then apply any matching fault.
    fn enter(&self, call: Call, handle: RawHandle, context: &str) -> Result<MutexGuard<'_, SimState>> {
        let mut state = self.shared.state.lock();
        let operation = call.operation();
        trace!(?call, "Simulated LJM call");
        state.calls.push(call);
        if let Some(code) = state.faults.check(operation) {
            debug!(?operation, %code, "Injected fault");
            return Err(LjmError::from_code(code, handle, context));
        }
        Ok(state)
    }

    fn analog_value(&self, channel: i32, t: f64) -> f64 {
        0.5 * f64::from(channel) + (TAU * 10.0 * t).sin() + self.shared.rng.noise(self.shared.config.noise)
    }

    fn read_register(
        &self,
        state: &SimState,
        handle: RawHandle,
        def: &RegisterDef,
        addr: RegisterAddress,
        count: usize,
    ) -> std::result::Result<Vec<f64>, ErrorCode> {
        if !def.access.readable() {
            return Err(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS);
        }
        if count == 0 || count > def.len {
            return Err(ErrorCode::INVALID_NUM_VALUES);
        }
        let cfg = &self.shared.config;
        let value = match def.pattern {
            "AIN#" => self.analog_value((addr.address - def.address) / def.stride, 0.0),
            "I2C_DATA_RX" => {
                let mut bytes: Vec<f64> = state.i2c_rx.iter().map(|b| f64::from(*b)).collect();
                bytes.resize(count, 0.0);
                return Ok(bytes);
            }
            "I2C_ACKS" => f64::from(state.i2c_acks),
            "PRODUCT_ID" => f64::from(cfg.device_type.as_raw()),
            "SERIAL_NUMBER" => f64::from(cfg.serial_number),
            "FIRMWARE_VERSION" => 1.0300,
            _ => self
                .stream_out_value(state, handle, addr.address)
                .or_else(|| state.registers.get(&addr.address).copied())
                .unwrap_or(0.0),
        };
        Ok(vec![value])
    }

    /// Current waveform sample if a running stream drives `address`.
    fn stream_out_value(&self, state: &SimState, handle: RawHandle, address: i32) -> Option<f64> {
        let stream = state.streams.get(&handle)?;
        stream.outputs.iter().find_map(|&idx| {
            let out = state.stream_outs[idx].as_ref()?;
            if out.target != address || out.values.is_empty() {
                return None;
            }
            let n = (stream.started.elapsed().as_secs_f64() * stream.scan_rate) as usize;
            Some(out.values[n % out.values.len()])
        })
    }

    fn write_register(
        &self,
        state: &mut SimState,
        def: &RegisterDef,
        addr: RegisterAddress,
        values: &[f64],
    ) -> std::result::Result<(), ErrorCode> {
        if !def.access.writable() {
            return Err(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS);
        }
        if values.is_empty() || values.len() > def.len {
            return Err(ErrorCode::INVALID_NUM_VALUES);
        }
        match def.pattern {
            "I2C_DATA_TX" => {
                if values.iter().any(|v| !(0.0..=255.0).contains(v)) {
                    return Err(ErrorCode::MBE3_ILLEGAL_DATA_VALUE);
                }
                state.i2c_tx = values.iter().map(|v| *v as u8).collect();
            }
            "I2C_GO" => self.run_i2c(state),
            _ => {
                state.registers.insert(addr.address, values[0]);
            }
        }
        Ok(())
    }

    fn run_i2c(&self, state: &mut SimState) {
        let reg = |name: &str| {
            registers::lookup(name)
                .and_then(|a| state.registers.get(&a.address).copied())
                .unwrap_or(0.0)
        };
        let slave = reg("I2C_SLAVE_ADDRESS") as u8;
        let tx_len = (reg("I2C_NUM_BYTES_TX") as usize).min(registers::I2C_MAX_BYTES);
        let rx_len = (reg("I2C_NUM_BYTES_RX") as usize).min(registers::I2C_MAX_BYTES);
        let pins_ok = reg("I2C_SDA_DIONUM") != reg("I2C_SCL_DIONUM");

        let mut tx = state.i2c_tx.clone();
        tx.resize(tx_len, 0);

        match state.eeprom.as_mut() {
            Some(chip) if pins_ok && slave == EEPROM_ADDRESS => {
                state.i2c_rx = chip.transact(&tx, rx_len);
                // One ACK bit for the address byte plus one per TX byte.
                state.i2c_acks = ((1u64 << (tx_len + 1).min(32)) - 1) as u32;
            }
            _ => {
                state.i2c_rx = vec![0; rx_len];
                state.i2c_acks = 0;
            }
        }
        trace!(slave, tx_len, rx_len, acks = state.i2c_acks, "Simulated I2C transaction");
    }
}

/// Table entry covering `address`, if any.
fn def_for_address(address: i32) -> Option<&'static RegisterDef> {
    registers::REGISTERS.iter().find(|def| {
        if def.stride == 0 {
            address == def.address
        } else {
            let last = def.address + def.stride * (def.count - 1);
            (def.address..=last).contains(&address) && (address - def.address) % def.stride == 0
        }
    })
}

fn connection_reaches(actual: ConnectionType, requested: ConnectionType) -> bool {
    use ConnectionType::*;
    let wifi = |ct: ConnectionType| matches!(ct, Wifi | WifiUdp | WifiAny);
    match requested {
        Any => true,
        Usb => actual == Usb,
        Tcp | NetworkUdp | NetworkAny => actual.is_network(),
        other => actual.is_network() && wifi(other) == wifi(actual),
    }
}

impl LjmBackend for SimulatedLjm {
    fn write_library_config(&self, parameter: &str, value: f64) -> Result<()> {
        let mut state = self.enter(
            Call::WriteLibraryConfig {
                parameter: parameter.to_string(),
                value,
            },
            0,
            parameter,
        )?;
        if !parameter.starts_with("LJM_") {
            return Err(LjmError::from_code(ErrorCode::INVALID_CONFIG_NAME, 0, parameter));
        }
        state.library_config.insert(parameter.to_string(), value);
        Ok(())
    }

    fn open(
        &self,
        device_type: DeviceType,
        connection_type: ConnectionType,
        identifier: &str,
    ) -> Result<RawHandle> {
        let mut state = self.enter(
            Call::Open {
                identifier: identifier.to_string(),
            },
            0,
            identifier,
        )?;
        let cfg = &self.shared.config;

        let type_ok = match device_type {
            DeviceType::Any => true,
            DeviceType::TSeries => matches!(cfg.device_type, DeviceType::T4 | DeviceType::T7 | DeviceType::T8),
            other => other == cfg.device_type,
        };
        let ident = identifier.trim();
        let ident_ok = ident.eq_ignore_ascii_case("ANY")
            || ident.eq_ignore_ascii_case("LJM_idANY")
            || ident == cfg.serial_number.to_string()
            || (cfg.connection_type.is_network() && ident == cfg.ip_address.to_string());

        if !(type_ok && ident_ok && connection_reaches(cfg.connection_type, connection_type)) {
            return Err(LjmError::from_code(ErrorCode::DEVICE_NOT_FOUND, 0, identifier));
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(handle);
        debug!(handle, "Simulated device opened");
        Ok(handle)
    }

    fn close(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.enter(Call::Close { handle }, handle, "close")?;
        state.check_handle(handle)?;
        state.handles.remove(&handle);
        state.streams.remove(&handle);
        Ok(())
    }

    fn handle_info(&self, handle: RawHandle) -> Result<HandleInfo> {
        let state = self.enter(Call::HandleInfo { handle }, handle, "handle info")?;
        state.check_handle(handle)?;
        let cfg = &self.shared.config;
        Ok(HandleInfo {
            device_type: cfg.device_type,
            connection_type: cfg.connection_type,
            serial_number: cfg.serial_number,
            ip_address: cfg.ip_address,
            port: cfg.port,
            max_bytes_per_mb: cfg.max_bytes_per_mb,
        })
    }

    fn name_to_address(&self, name: &str) -> Result<RegisterAddress> {
        let _state = self.enter(
            Call::NameToAddress {
                name: name.to_string(),
            },
            0,
            name,
        )?;
        registers::lookup(name)
            .ok_or_else(|| LjmError::from_code(ErrorCode::INVALID_NAME, 0, name))
    }

    fn access_names(&self, handle: RawHandle, frames: &[Frame]) -> Result<Vec<FrameResult>> {
        let mut state = self.enter(
            Call::AccessNames {
                handle,
                names: frames.iter().map(|f| f.name.clone()).collect(),
            },
            handle,
            "eNames",
        )?;
        state.check_handle(handle)?;

        // Unknown names fail alone; the first device-side failure also
        // fails every frame after it.
        let mut aborted: Option<ErrorCode> = None;
        let results: Vec<FrameResult> = frames
            .iter()
            .map(|frame| -> FrameResult {
                let (def, addr) = registers::lookup_def(&frame.name).ok_or(ErrorCode::INVALID_NAME)?;
                if let Some(code) = aborted {
                    return Err(code);
                }
                let result = match frame.direction {
                    Direction::Read => self.read_register(&state, handle, def, addr, frame.count),
                    Direction::Write => self
                        .write_register(&mut state, def, addr, &frame.values)
                        .map(|()| Vec::new()),
                };
                if let Err(code) = result {
                    aborted = Some(code);
                }
                result
            })
            .collect();
        Ok(results)
    }

    fn stream_start(
        &self,
        handle: RawHandle,
        scans_per_read: u32,
        scan_list: &[i32],
        scan_rate: f64,
    ) -> Result<f64> {
        let mut state = self.enter(
            Call::StreamStart { handle, scan_rate },
            handle,
            "stream start",
        )?;
        state.check_handle(handle)?;
        if state.streams.contains_key(&handle) {
            return Err(LjmError::StreamAlreadyRunning { handle });
        }
        if scans_per_read == 0 || scan_list.is_empty() {
            return Err(LjmError::from_code(ErrorCode::INVALID_PARAMETER, handle, "stream start"));
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for &address in scan_list {
            if registers::is_stream_out_address(address) {
                let idx = (address - STREAM_OUT_BASE_ADDRESS) as usize;
                if state.stream_outs[idx].is_none() {
                    return Err(LjmError::InvalidParameter {
                        message: format!("STREAM_OUT{} has no buffer loaded", idx),
                    });
                }
                outputs.push(idx);
            } else if def_for_address(address).is_some() {
                inputs.push(address);
            } else {
                return Err(LjmError::from_code(ErrorCode::INVALID_ADDRESS, handle, "scan list"));
            }
        }

        let clock = StreamClock::for_device(self.shared.config.device_type);
        clock.validate(scan_rate, inputs.len().max(1))?;
        let actual = clock.nearest_scan_rate(scan_rate);

        state.streams.insert(
            handle,
            SimStream {
                scans_per_read: scans_per_read as usize,
                inputs,
                outputs,
                scan_rate: actual,
                started: Instant::now(),
                reads: 0,
                scans_emitted: 0,
                device_backlog: 0,
                client_backlog: 0,
            },
        );
        debug!(handle, requested = scan_rate, actual, "Simulated stream started");
        Ok(actual)
    }

    fn stream_read(&self, handle: RawHandle) -> Result<RawBatch> {
        let due = {
            let state = self.enter(Call::StreamRead { handle }, handle, "stream read")?;
            state.check_handle(handle)?;
            let stream = state
                .streams
                .get(&handle)
                .ok_or_else(|| LjmError::from_code(ErrorCode::STREAM_NOT_RUNNING, handle, "stream read"))?;
            let scans_due = (stream.reads + 1) * stream.scans_per_read as u64;
            stream.started + Duration::from_secs_f64(scans_due as f64 / stream.scan_rate)
        };

        if self.shared.config.mode == SimMode::Realistic {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        let mut state = self.shared.state.lock();
        let cfg = &self.shared.config;
        let stream = state
            .streams
            .get_mut(&handle)
            .ok_or_else(|| LjmError::from_code(ErrorCode::STREAM_NOT_RUNNING, handle, "stream read"))?;

        let read_no = stream.reads + 1;
        let skipped = match cfg.skip {
            Some(p) if p.every > 0 && read_no % p.every == 0 => {
                (p.scans as usize).min(stream.scans_per_read)
            }
            _ => 0,
        };

        let mut data = Vec::with_capacity(stream.scans_per_read * stream.inputs.len());
        for i in 0..stream.scans_per_read {
            let t = (stream.scans_emitted + i as u64) as f64 / stream.scan_rate;
            for &address in &stream.inputs {
                if i < skipped {
                    data.push(SKIPPED_SAMPLE);
                } else if address < 1000 {
                    data.push(self.analog_value(address / 2, t));
                } else {
                    data.push(0.0);
                }
            }
        }

        stream.reads = read_no;
        stream.scans_emitted += stream.scans_per_read as u64;
        stream.device_backlog = stream.device_backlog.saturating_add(cfg.backlog.device_per_read);
        stream.client_backlog = stream.client_backlog.saturating_add(cfg.backlog.client_per_read);

        let lag = if cfg.mode == SimMode::Realistic {
            let produced = (stream.started.elapsed().as_secs_f64() * stream.scan_rate) as u64;
            produced.saturating_sub(stream.scans_emitted) as u32
        } else {
            0
        };
        let client_backlog = stream.client_backlog.saturating_add(lag);

        if client_backlog > cfg.buffer_capacity_scans {
            return Err(LjmError::from_code(ErrorCode::LJM_BUFFER_FULL, handle, "stream read"));
        }

        Ok(RawBatch {
            data,
            device_backlog: stream.device_backlog,
            client_backlog,
        })
    }

    fn stream_stop(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.enter(Call::StreamStop { handle }, handle, "stream stop")?;
        state.check_handle(handle)?;
        match state.streams.remove(&handle) {
            Some(stream) => {
                debug!(handle, reads = stream.reads, "Simulated stream stopped");
                Ok(())
            }
            None => Err(LjmError::from_code(
                ErrorCode::STREAM_NOT_RUNNING,
                handle,
                "stream stop",
            )),
        }
    }

    fn periodic_stream_out(
        &self,
        handle: RawHandle,
        index: u8,
        target_address: i32,
        scan_rate: f64,
        values: &[f64],
    ) -> Result<()> {
        let mut state = self.enter(
            Call::PeriodicStreamOut { handle, index },
            handle,
            "periodic stream-out",
        )?;
        state.check_handle(handle)?;
        if state.streams.contains_key(&handle) {
            return Err(LjmError::StreamAlreadyRunning { handle });
        }
        let idx = usize::from(index);
        if idx >= state.stream_outs.len() {
            return Err(LjmError::from_code(ErrorCode::INVALID_INDEX, handle, "stream-out"));
        }
        if values.is_empty() || !(scan_rate > 0.0) {
            return Err(LjmError::from_code(ErrorCode::INVALID_PARAMETER, handle, "stream-out"));
        }

        let target_ok = def_for_address(target_address).is_some_and(|d| d.access.writable());
        if !target_ok {
            return Err(LjmError::from_code(ErrorCode::INVALID_ADDRESS, handle, "stream-out target"));
        }

        let n = values.len();
        let buffer_bytes = (n * 2).next_power_of_two();
        for (suffix, value) in [
            ("TARGET", f64::from(target_address)),
            ("BUFFER_SIZE", buffer_bytes as f64),
            ("ENABLE", 1.0),
        ] {
            if let Some(addr) = registers::lookup(&format!("STREAM_OUT{}_{}", index, suffix)) {
                state.registers.insert(addr.address, value);
            }
        }
        state.stream_outs[idx] = Some(StreamOut {
            target: target_address,
            values: values.to_vec(),
        });
        debug!(handle, index, target_address, samples = n, "Simulated stream-out loaded");
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedLjm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedLjm")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_matching() {
        let sim = SimulatedLjm::new();
        assert!(sim.open(DeviceType::Any, ConnectionType::Any, "ANY").is_ok());
        assert!(sim
            .open(DeviceType::T7, ConnectionType::Ethernet, "192.168.1.175")
            .is_ok());
        assert!(sim
            .open(DeviceType::TSeries, ConnectionType::Tcp, "470010000")
            .is_ok());
        assert!(matches!(
            sim.open(DeviceType::T4, ConnectionType::Any, "ANY"),
            Err(LjmError::Connection { .. })
        ));
        assert!(matches!(
            sim.open(DeviceType::T7, ConnectionType::Usb, "ANY"),
            Err(LjmError::Connection { .. })
        ));
        assert_eq!(sim.open_handles(), 3);
    }

    #[test]
    fn test_closed_handle_is_invalid() {
        let sim = SimulatedLjm::new();
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        sim.close(h).unwrap();
        assert_eq!(sim.close(h), Err(LjmError::InvalidHandle { handle: h }));
        assert!(matches!(
            sim.access_names(h, &[Frame::read("AIN0", 1)]),
            Err(LjmError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_access_names_per_entry() {
        let sim = SimulatedLjm::new();
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        let results = sim
            .access_names(
                h,
                &[
                    Frame::write_value("DAC0", 1.5),
                    Frame::read("BOGUS", 1),
                    Frame::read("DAC0", 1),
                    Frame::write_value("AIN0", 1.0),
                    Frame::read("DAC0", 1),
                ],
            )
            .unwrap();
        assert_eq!(results[0], Ok(vec![]));
        assert_eq!(results[1], Err(ErrorCode::INVALID_NAME));
        assert_eq!(results[2], Ok(vec![1.5]));
        assert_eq!(results[3], Err(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS));
        assert_eq!(results[4], Err(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS));
    }

    #[test]
    fn test_stream_lifecycle() {
        let sim = SimulatedLjm::new();
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        let actual = sim.stream_start(h, 126, &[0, 4], 25_000.0).unwrap();
        assert_eq!(actual, 25_000.0);
        assert!(matches!(
            sim.stream_start(h, 126, &[0], 1000.0),
            Err(LjmError::StreamAlreadyRunning { .. })
        ));
        let batch = sim.stream_read(h).unwrap();
        assert_eq!(batch.data.len(), 252);
        sim.stream_stop(h).unwrap();
        assert_eq!(
            sim.stream_stop(h),
            Err(LjmError::StreamNotRunning { handle: h })
        );
    }

    #[test]
    fn test_skip_and_backlog_injection() {
        let sim = SimulatedLjm::with_config(SimConfig::default().with_skips(2, 3).with_backlog(1, 10));
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        sim.stream_start(h, 10, &[0], 1000.0).unwrap();
        let first = sim.stream_read(h).unwrap();
        assert!(first.data.iter().all(|v| *v != SKIPPED_SAMPLE));
        let second = sim.stream_read(h).unwrap();
        assert_eq!(
            second.data.iter().filter(|v| **v == SKIPPED_SAMPLE).count(),
            3
        );
        assert_eq!(second.device_backlog, 2);
        assert_eq!(second.client_backlog, 20);
    }

    #[test]
    fn test_buffer_full() {
        let config = SimConfig {
            buffer_capacity_scans: 15,
            ..SimConfig::default().with_backlog(0, 10)
        };
        let sim = SimulatedLjm::with_config(config);
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        sim.stream_start(h, 10, &[0], 1000.0).unwrap();
        assert!(sim.stream_read(h).is_ok());
        assert_eq!(sim.stream_read(h), Err(LjmError::BufferFull));
    }

    #[test]
    fn test_i2c_eeprom_transaction() {
        let sim = SimulatedLjm::new();
        let h = sim.open(DeviceType::Any, ConnectionType::Any, "ANY").unwrap();
        let setup = [
            Frame::write_value("I2C_SDA_DIONUM", 1.0),
            Frame::write_value("I2C_SCL_DIONUM", 0.0),
            Frame::write_value("I2C_SLAVE_ADDRESS", 80.0),
            Frame::write_value("I2C_NUM_BYTES_TX", 3.0),
            Frame::write_value("I2C_NUM_BYTES_RX", 0.0),
            Frame::write("I2C_DATA_TX", vec![0.0, 7.0, 9.0]),
            Frame::write_value("I2C_GO", 1.0),
        ];
        assert!(sim.access_names(h, &setup).unwrap().iter().all(std::result::Result::is_ok));
        let contents = sim.eeprom_contents().unwrap();
        assert_eq!(&contents[..3], &[7, 9, 0xFF]);
    }
}
