//! Subcommands run end to end against the simulator.

use std::time::Duration;

use daq_driver_labjack::mock::{Operation, SimulatedLjm};
use daq_driver_labjack::{
    CancelToken, ConnectionType, DeviceType, LibraryConfig, Ljm, StopReason,
};
use labjack_daq::commands::{self, i2c, info, stream, stream_out};
use labjack_daq::config::AppConfig;

/// Simulated configuration with a short stream.
fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.device.simulate = true;
    config.stream.scan_rate = 10_000.0;
    config.stream.scans_per_read = Some(500);
    config.stream.reads = 4;
    config.stream_out.duration_secs = 0.05;
    config
}

/// Simulator for `config` that the test can inspect afterwards.
fn simulator(config: &AppConfig) -> (SimulatedLjm, Ljm) {
    let sim = SimulatedLjm::with_config(commands::simulator_config(config));
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();
    (sim, ljm)
}

#[test]
fn test_connect_with_simulate() {
    let config = test_config();
    let ljm = commands::connect(&config).unwrap();
    let report = info::run(&ljm, &config.device.target()).unwrap();
    assert_eq!(report.info.device_type, DeviceType::T7);
}

#[cfg(not(feature = "hardware"))]
#[test]
fn test_connect_without_hardware_feature_fails() {
    let mut config = test_config();
    config.device.simulate = false;
    let err = commands::connect(&config).unwrap_err();
    assert!(err.to_string().contains("hardware"));
}

#[test]
fn test_simulator_follows_target() {
    let mut config = test_config();
    config.device.device_type = DeviceType::T4;
    config.device.connection_type = ConnectionType::Usb;
    config.device.identifier = "440012345".to_string();

    let (_sim, ljm) = simulator(&config);
    let report = info::run(&ljm, &config.device.target()).unwrap();

    assert_eq!(report.info.device_type, DeviceType::T4);
    assert_eq!(report.info.connection_type, ConnectionType::Usb);
    assert_eq!(report.info.serial_number, 440_012_345);
    assert_eq!(report.product_id, 4.0);
}

#[test]
fn test_info_reports_identity_and_closes() {
    let mut config = test_config();
    config.device.identifier = "192.168.1.42".to_string();
    let (sim, ljm) = simulator(&config);

    let report = info::run(&ljm, &config.device.target()).unwrap();

    assert_eq!(report.info.ip_address.to_string(), "192.168.1.42");
    assert_eq!(report.product_id, 7.0);
    assert!(report.firmware_version > 0.0);
    let printed = report.to_string();
    assert!(printed.contains("Serial number: 470010000"));
    assert!(printed.contains("Firmware version:"));
    assert_eq!(sim.count(Operation::Close), 1);
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_info_wrong_device_fails() {
    let mut config = test_config();
    config.device.device_type = DeviceType::T4;
    let sim = SimulatedLjm::new();
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();

    let err = info::run(&ljm, &config.device.target()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to query"));
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_stream_summary() {
    let config = test_config();
    let (sim, ljm) = simulator(&config);

    let summary = stream::run(
        &ljm,
        &config.device.target(),
        &config.stream,
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(summary.reads, 4);
    assert_eq!(summary.total_scans, 2000);
    assert_eq!(summary.channel_count, 2);
    assert_eq!(summary.skipped_scans, 0);
    assert_eq!(summary.stop_reason, StopReason::ReadsCompleted);
    assert!(summary.warnings.is_empty());

    assert_eq!(sim.count(Operation::StreamRead), 4);
    assert_eq!(sim.count(Operation::StreamStop), 1);
    assert_eq!(sim.count(Operation::Close), 1);
    assert!(!sim.is_streaming(1));
}

/// Skipped scans reach the log as warnings, not errors.
#[test]
#[tracing_test::traced_test]
fn test_stream_logs_skipped_scans() {
    let config = test_config();
    let sim = SimulatedLjm::with_config(commands::simulator_config(&config).with_skips(2, 5));
    let ljm = Ljm::new(sim, LibraryConfig::default()).unwrap();

    let summary = stream::run(
        &ljm,
        &config.device.target(),
        &config.stream,
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(summary.skipped_scans, 10);
    assert_eq!(summary.warnings.len(), 2);
    assert!(logs_contain("Device skipped scans"));
}

/// Every read is reported at the default level with both backlogs.
#[test]
#[tracing_test::traced_test]
fn test_stream_reports_each_read_at_info() {
    let config = test_config();
    let (_sim, ljm) = simulator(&config);

    stream::run(
        &ljm,
        &config.device.target(),
        &config.stream,
        CancelToken::new(),
    )
    .unwrap();

    logs_assert(|lines: &[&str]| {
        let reads: Vec<_> = lines
            .iter()
            .filter(|line| line.contains("Stream read") && !line.contains("loop finished"))
            .collect();
        if reads.len() != 4 {
            return Err(format!("expected 4 read lines, got {}", reads.len()));
        }
        for line in reads {
            if !line.contains("INFO")
                || !line.contains("device_backlog")
                || !line.contains("ljm_backlog")
            {
                return Err(format!("unexpected read line: {}", line));
            }
        }
        Ok(())
    });
}

#[test]
fn test_stream_for_duration() {
    let mut config = test_config();
    config.stream.duration_secs = Some(0.12);
    let (_sim, ljm) = simulator(&config);

    let summary = stream::run(
        &ljm,
        &config.device.target(),
        &config.stream,
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::DurationElapsed);
    assert!(summary.reads >= 2, "reads = {}", summary.reads);
    assert!(summary.elapsed >= Duration::from_millis(100));
}

/// A token cancelled before the first read (Ctrl-C during open) still stops
/// and closes.
#[test]
fn test_stream_cancelled_before_start() {
    let config = test_config();
    let (sim, ljm) = simulator(&config);
    let cancel = CancelToken::new();
    cancel.cancel();

    let summary = stream::run(&ljm, &config.device.target(), &config.stream, cancel).unwrap();

    assert_eq!(summary.reads, 0);
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(sim.count(Operation::StreamRead), 0);
    assert_eq!(sim.count(Operation::StreamStop), 1);
    assert_eq!(sim.count(Operation::Close), 1);
}

#[test]
fn test_stream_unknown_channel_fails_cleanly() {
    let mut config = test_config();
    config.stream.channels = vec!["AIN0".to_string(), "NOT_A_CHANNEL".to_string()];
    let (sim, ljm) = simulator(&config);

    let err = stream::run(
        &ljm,
        &config.device.target(),
        &config.stream,
        CancelToken::new(),
    )
    .unwrap_err();

    assert!(format!("{:#}", err).contains("NOT_A_CHANNEL"));
    assert_eq!(sim.count(Operation::StreamStart), 0);
    assert_eq!(sim.open_handles(), 0);
}

/// Settings that skipped validation are still refused without opening.
#[test]
fn test_unrepresentable_durations_fail_before_open() {
    let mut config = test_config();
    config.stream.duration_secs = Some(1e30);
    config.stream_out.duration_secs = 1e30;
    let (sim, ljm) = simulator(&config);
    let target = config.device.target();

    let err = stream::run(&ljm, &target, &config.stream, CancelToken::new()).unwrap_err();
    assert!(format!("{:#}", err).contains("duration"));
    let err = stream_out::run(&ljm, &target, &config.stream_out, CancelToken::new()).unwrap_err();
    assert!(format!("{:#}", err).contains("duration"));

    assert_eq!(sim.count(Operation::Open), 0);
}

#[test]
fn test_stream_out_holds_then_stops() {
    let config = test_config();
    let (sim, ljm) = simulator(&config);

    let report = stream_out::run(
        &ljm,
        &config.device.target(),
        &config.stream_out,
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(report.index, 0);
    assert_eq!(report.target, "DAC0");
    assert_eq!(report.samples, 512);
    assert!(report.held >= Duration::from_millis(50));
    assert!(report.to_string().starts_with("STREAM_OUT0 drove DAC0"));

    let buffer = sim.stream_out_buffer(0).unwrap();
    assert_eq!(buffer.len(), 512);
    assert_eq!(sim.count(Operation::StreamStop), 1);
    assert_eq!(sim.count(Operation::Close), 1);
    assert!(!sim.is_streaming(1));
}

#[test]
fn test_stream_out_cancelled_returns_early() {
    let mut config = test_config();
    config.stream_out.duration_secs = 30.0;
    let (sim, ljm) = simulator(&config);
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = stream_out::run(&ljm, &config.device.target(), &config.stream_out, cancel)
        .unwrap();

    assert!(report.held < Duration::from_secs(5));
    assert_eq!(sim.count(Operation::StreamStop), 1);
}

#[test]
fn test_eeprom_round_trip() {
    let mut config = test_config();
    config.i2c.offset = 8;
    let (sim, ljm) = simulator(&config);

    let report = i2c::run_with_data(
        &ljm,
        &config.device.target(),
        &config.i2c,
        &[0xDE, 0xAD, 0xBE, 0xEF],
    )
    .unwrap();

    assert!(report.verified());
    assert_eq!(report.offset, 8);
    assert_eq!(report.after, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(&sim.eeprom_contents().unwrap()[8..12], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(sim.count(Operation::Close), 1);
}

#[test]
fn test_eeprom_random_round_trip() {
    let config = test_config();
    let (_sim, ljm) = simulator(&config);

    let report = i2c::run(&ljm, &config.device.target(), &config.i2c).unwrap();
    assert!(report.verified());
    assert_eq!(report.written.len(), config.i2c.length);
}

#[test]
fn test_eeprom_missing_slave_fails() {
    let mut config = test_config();
    config.i2c.slave_address = 0x20;
    let (sim, ljm) = simulator(&config);

    let err = i2c::run(&ljm, &config.device.target(), &config.i2c).unwrap_err();
    assert!(format!("{:#}", err).contains("0x20"));
    assert_eq!(sim.open_handles(), 0);
}
