//! Environment overrides. Kept in their own test binary because they
//! mutate the process environment.

use std::io::Write;

use daq_driver_labjack::DeviceType;
use labjack_daq::config::{AppConfig, ENV_PREFIX};
use tempfile::NamedTempFile;

#[test]
fn test_environment_overrides_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[device]
device_type = "T7"
identifier = "470010000"

[stream]
scan_rate = 10000.0
reads = 20
"#,
    )
    .unwrap();
    file.flush().unwrap();

    std::env::set_var(format!("{}STREAM__SCAN_RATE", ENV_PREFIX), "5000");
    std::env::set_var(format!("{}DEVICE__DEVICE_TYPE", ENV_PREFIX), "T4");
    std::env::set_var(format!("{}LOGGING__LEVEL", ENV_PREFIX), "warn");

    let result = AppConfig::load(Some(file.path()));

    std::env::remove_var(format!("{}STREAM__SCAN_RATE", ENV_PREFIX));
    std::env::remove_var(format!("{}DEVICE__DEVICE_TYPE", ENV_PREFIX));
    std::env::remove_var(format!("{}LOGGING__LEVEL", ENV_PREFIX));

    let config = result.unwrap();
    assert_eq!(config.stream.scan_rate, 5000.0);
    assert_eq!(config.device.device_type, DeviceType::T4);
    assert_eq!(config.logging.level, "warn");
    // Not overridden
    assert_eq!(config.stream.reads, 20);
    assert_eq!(config.device.identifier, "470010000");
}
