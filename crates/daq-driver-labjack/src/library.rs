//! Entry point: an initialized LJM library.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::LjmBackend;
use crate::config::LibraryConfig;
use crate::device::{ConnectionType, Device, DeviceType, OpenTarget};
use crate::error::{LjmError, Result};
use crate::registers::RegisterAddress;

/// An initialized LJM library.
///
/// Construction applies the [`LibraryConfig`]; devices opened through this
/// value share the backend.
///
/// # Example
///
/// ```
/// use daq_driver_labjack::{LibraryConfig, Ljm, OpenTarget};
/// use daq_driver_labjack::mock::SimulatedLjm;
///
/// let ljm = Ljm::new(SimulatedLjm::new(), LibraryConfig::default())?;
/// let device = ljm.open(&OpenTarget::any())?;
/// let serial = device.read_name("SERIAL_NUMBER")?;
/// assert!(serial > 0.0);
/// device.close()?;
/// # Ok::<(), daq_driver_labjack::LjmError>(())
/// ```
#[derive(Clone)]
pub struct Ljm {
    backend: Arc<dyn LjmBackend>,
    config: LibraryConfig,
}

impl Ljm {
    /// Wrap a backend and apply `config` to it.
    pub fn new(backend: impl LjmBackend + 'static, config: LibraryConfig) -> Result<Self> {
        Self::with_backend(Arc::new(backend), config)
    }

    /// Like [`Ljm::new`] for an already shared backend.
    pub fn with_backend(backend: Arc<dyn LjmBackend>, config: LibraryConfig) -> Result<Self> {
        for (parameter, value) in config.entries() {
            debug!(parameter, value, "Writing LJM library config");
            backend.write_library_config(parameter, value)?;
        }
        Ok(Self { backend, config })
    }

    /// The installed `LabJackM` library.
    #[cfg(feature = "hardware")]
    pub fn native(config: LibraryConfig) -> Result<Self> {
        Self::new(crate::native::NativeBackend::new(), config)
    }

    /// Settings this library was initialized with.
    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Open a device.
    pub fn open(&self, target: &OpenTarget) -> Result<Device> {
        info!(target = %target, "Opening LabJack device");
        let handle = self
            .backend
            .open(target.device_type, target.connection_type, &target.identifier)
            .map_err(|e| match e {
                LjmError::Connection { code, .. } => LjmError::Connection {
                    code,
                    message: format!("could not open {}", target),
                },
                other => other,
            })?;
        Device::from_handle(Arc::clone(&self.backend), handle)
    }

    /// Open the first device of any type on any transport.
    pub fn open_any(&self) -> Result<Device> {
        self.open(&OpenTarget::new(DeviceType::Any, ConnectionType::Any, "ANY"))
    }

    /// Open a device, run `f`, and always close the device afterwards.
    ///
    /// Any stream `f` left running is stopped before the close. An error
    /// from `f` takes precedence over a cleanup error, which is logged.
    pub fn with_device<T, E, F>(&self, target: &OpenTarget, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Device) -> std::result::Result<T, E>,
        E: From<LjmError>,
    {
        let mut device = self.open(target)?;
        let outcome = f(&mut device);
        match (outcome, device.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Cleanup failed after error");
                Err(e)
            }
        }
    }

    /// Resolve register names to addresses without a device.
    pub fn resolve_addresses(&self, names: &[&str]) -> Result<Vec<RegisterAddress>> {
        names
            .iter()
            .map(|name| self.backend.name_to_address(name))
            .collect()
    }
}

impl fmt::Debug for Ljm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ljm").field("config", &self.config).finish()
    }
}
