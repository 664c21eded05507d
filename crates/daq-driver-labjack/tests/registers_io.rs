//! Register, I2C and stream-out tests against the simulator.

use std::time::Duration;

use daq_driver_labjack::mock::{Call, FaultPlan, Operation, SimConfig, SimulatedLjm};
use daq_driver_labjack::{
    ConnectionType, DeviceType, Eeprom, ErrorCode, Frame, I2cConfig, LibraryConfig, Ljm,
    LjmError, LjmLogLevel, LjmLogMode, OpenTarget, OutputStreamConfig, Waveform, EEPROM_ADDRESS,
    MAX_WAVEFORM_SAMPLES,
};

fn ljm(sim: &SimulatedLjm) -> Ljm {
    Ljm::new(sim.clone(), LibraryConfig::default()).unwrap()
}

// =============================================================================
// Library and open
// =============================================================================

/// Library settings are written once, before any device is opened.
#[test]
fn test_library_config_applied() {
    let sim = SimulatedLjm::new();
    let config = LibraryConfig {
        log_level: Some(LjmLogLevel::Stream),
        log_mode: Some(LjmLogMode::Continuous),
        ..LibraryConfig::default()
    };
    let ljm = Ljm::new(sim.clone(), config.clone()).unwrap();

    assert_eq!(sim.library_config("LJM_LOG_LEVEL"), Some(1.0));
    assert_eq!(sim.library_config("LJM_LOG_MODE"), Some(2.0));
    assert_eq!(ljm.config(), &config);
    assert_eq!(sim.count(Operation::Open), 0);
}

#[test]
fn test_open_by_ip_reports_handle_info() {
    let sim = SimulatedLjm::new();
    let target = OpenTarget::new(DeviceType::T7, ConnectionType::Ethernet, "192.168.1.175");
    let device = ljm(&sim).open(&target).unwrap();

    let info = device.info();
    assert_eq!(info.device_type, DeviceType::T7);
    assert_eq!(info.connection_type, ConnectionType::Ethernet);
    assert_eq!(info.serial_number, 470_010_000);
    assert_eq!(info.port, 502);
    assert_eq!(info.max_bytes_per_mb, 1040);
    device.close().unwrap();
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_open_wrong_device_type_fails() {
    let sim = SimulatedLjm::new();
    let target = OpenTarget::new(DeviceType::T4, ConnectionType::Any, "ANY");
    let err = ljm(&sim).open(&target).unwrap_err();
    match err {
        LjmError::Connection { code, message } => {
            assert_eq!(code, ErrorCode::DEVICE_NOT_FOUND);
            assert!(message.contains("T4"));
        }
        other => panic!("expected connection error, got {:?}", other),
    }
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_with_device_closes_on_error() {
    let sim = SimulatedLjm::new();
    let err = ljm(&sim)
        .with_device(&OpenTarget::any(), |device| device.read_name("NOT_A_REGISTER"))
        .unwrap_err();
    assert!(matches!(err, LjmError::PartialFailure { .. }));
    assert_eq!(sim.count(Operation::Close), 1);
}

// =============================================================================
// Bulk register access
// =============================================================================

#[test]
fn test_bulk_read_and_write() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();

    device
        .write_named(&["DAC0", "DAC1", "FIO3"], &[1, 1, 1], &[1.5, 2.5, 1.0])
        .unwrap();
    let values = device
        .read_named(&["DAC0", "DAC1", "FIO3", "SERIAL_NUMBER"], &[1, 1, 1, 1])
        .unwrap();
    assert_eq!(values[0], vec![1.5]);
    assert_eq!(values[1], vec![2.5]);
    assert_eq!(values[2], vec![1.0]);
    assert_eq!(values[3], vec![470_010_000.0]);

    // One eNames call per bulk operation.
    assert_eq!(sim.count(Operation::AccessNames), 2);
}

/// A bad entry fails alone; the entries around it still report.
#[test]
fn test_partial_failure_reports_each_entry() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();

    let outcome = device
        .access(&[
            Frame::write_value("DAC0", 1.0),
            Frame::read("BOGUS_REGISTER", 1),
            Frame::read("DAC0", 1),
        ])
        .unwrap();
    assert!(!outcome.all_ok());
    assert_eq!(outcome.failed().count(), 1);
    assert_eq!(outcome.entries()[2].result, Ok(vec![1.0]));

    let err = outcome.into_values().unwrap_err();
    let failed = err.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "BOGUS_REGISTER");
    assert_eq!(failed[0].error, Some(ErrorCode::INVALID_NAME));
}

/// A device-side failure fails that entry and everything after it.
#[test]
fn test_write_to_read_only_register_aborts_rest() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();

    let err = device
        .write_named(&["DAC0", "SERIAL_NUMBER", "DAC1"], &[1, 1, 1], &[1.0, 2.0, 3.0])
        .unwrap_err();
    let LjmError::PartialFailure { entries } = err else {
        panic!("expected partial failure");
    };
    assert!(entries[0].is_ok());
    assert_eq!(entries[1].error, Some(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS));
    assert_eq!(entries[2].error, Some(ErrorCode::MBE2_ILLEGAL_DATA_ADDRESS));
    assert_eq!(sim.register("DAC0"), Some(1.0));
    assert_eq!(sim.register("DAC1"), None);
}

#[test]
fn test_mismatched_counts_rejected_without_io() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();

    let err = device.write_named(&["DAC0", "DAC1"], &[1, 1], &[1.0]).unwrap_err();
    assert!(matches!(err, LjmError::InvalidParameter { .. }));
    assert!(err.is_caller_error());
    let err = device.read_named(&["DAC0"], &[1, 1]).unwrap_err();
    assert!(matches!(err, LjmError::InvalidParameter { .. }));
    assert_eq!(sim.count(Operation::AccessNames), 0);
}

#[test]
fn test_resolve_unknown_name() {
    let sim = SimulatedLjm::new();
    let ljm = ljm(&sim);
    let addrs = ljm.resolve_addresses(&["AIN0", "AIN2", "DAC1"]).unwrap();
    assert_eq!(
        addrs.iter().map(|a| a.address).collect::<Vec<_>>(),
        vec![0, 4, 1002]
    );

    let err = ljm.resolve_addresses(&["AIN0", "AIN_NOPE"]).unwrap_err();
    assert_eq!(
        err,
        LjmError::UnknownName {
            name: "AIN_NOPE".to_string()
        }
    );
}

#[test]
fn test_lost_connection_is_whole_call_error() {
    let sim = SimulatedLjm::new().with_faults(FaultPlan::none().fail_nth(
        Operation::AccessNames,
        1,
        ErrorCode::CANNOT_CONNECT,
    ));
    let device = ljm(&sim).open_any().unwrap();
    let err = device.read_named(&["DAC0", "DAC1"], &[1, 1]).unwrap_err();
    assert!(matches!(err, LjmError::Connection { .. }));
}

// =============================================================================
// I2C
// =============================================================================

/// Read four bytes, write four, read them back.
#[test]
fn test_eeprom_write_then_read_back() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();
    let config = I2cConfig::for_device(device.device_type(), EEPROM_ADDRESS);
    let eeprom = Eeprom::new(device.i2c(config).unwrap());

    assert_eq!(eeprom.read(0, 4).unwrap(), vec![0xFF; 4]);
    eeprom.write_page(0, &[0x12, 0x34, 0x56, 0x78]).unwrap();
    assert_eq!(eeprom.read(0, 4).unwrap(), vec![0x12, 0x34, 0x56, 0x78]);

    assert_eq!(sim.register("I2C_SDA_DIONUM"), Some(1.0));
    assert_eq!(sim.register("I2C_SCL_DIONUM"), Some(0.0));
    assert_eq!(sim.register("I2C_SPEED_THROTTLE"), Some(65516.0));
    assert_eq!(sim.register("I2C_SLAVE_ADDRESS"), Some(80.0));
    assert_eq!(&sim.eeprom_contents().unwrap()[..5], &[0x12, 0x34, 0x56, 0x78, 0xFF]);
}

#[test]
fn test_t4_uses_fio4_fio5() {
    let sim = SimulatedLjm::with_config(SimConfig::t4_usb());
    let device = ljm(&sim).open_any().unwrap();
    assert_eq!(device.device_type(), DeviceType::T4);

    let bus = device
        .i2c(I2cConfig::for_device(device.device_type(), EEPROM_ADDRESS))
        .unwrap();
    assert_eq!(bus.config().sda_dionum, 5);
    assert_eq!(sim.register("I2C_SDA_DIONUM"), Some(5.0));
    assert_eq!(sim.register("I2C_SCL_DIONUM"), Some(4.0));
    bus.write(&[0, 0xAB]).unwrap();
}

#[test]
fn test_missing_slave_is_not_acknowledged() {
    let mut cfg = SimConfig::default();
    cfg.eeprom = false;
    let sim = SimulatedLjm::with_config(cfg);
    let device = ljm(&sim).open_any().unwrap();
    let bus = device
        .i2c(I2cConfig::for_device(DeviceType::T7, EEPROM_ADDRESS))
        .unwrap();

    assert_eq!(
        bus.transaction(&[0], 4).unwrap_err(),
        LjmError::NoAcknowledge {
            slave_address: EEPROM_ADDRESS
        }
    );
}

#[test]
fn test_eeprom_page_crossing_rejected_without_io() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();
    let eeprom = Eeprom::new(
        device
            .i2c(I2cConfig::for_device(DeviceType::T7, EEPROM_ADDRESS))
            .unwrap(),
    );
    sim.clear_calls();

    let err = eeprom.write_page(14, &[1, 2, 3]).unwrap_err();
    assert!(matches!(err, LjmError::InvalidParameter { .. }));
    let err = eeprom.write_page(0, &[]).unwrap_err();
    assert!(matches!(err, LjmError::InvalidParameter { .. }));
    assert!(sim.calls().is_empty());
}

#[test]
fn test_i2c_transaction_is_two_bulk_calls() {
    let sim = SimulatedLjm::new();
    let device = ljm(&sim).open_any().unwrap();
    let bus = device
        .i2c(I2cConfig::for_device(DeviceType::T7, EEPROM_ADDRESS))
        .unwrap();
    sim.clear_calls();

    bus.transaction(&[0], 2).unwrap();
    let names: Vec<Vec<String>> = sim
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::AccessNames { names, .. } => Some(names),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec![
            vec![
                "I2C_NUM_BYTES_TX".to_string(),
                "I2C_NUM_BYTES_RX".to_string(),
                "I2C_DATA_TX".to_string(),
                "I2C_GO".to_string(),
            ],
            vec!["I2C_ACKS".to_string(), "I2C_DATA_RX".to_string()],
        ]
    );
}

// =============================================================================
// Stream-out
// =============================================================================

/// 512-sample ramp on DAC0 at 1 kHz through stream-out 0.
#[test]
fn test_periodic_output_ramp() {
    let sim = SimulatedLjm::new();
    let mut device = ljm(&sim).open_any().unwrap();
    let ramp = Waveform::linear_ramp(0.0, 2.5, 512).unwrap();
    let config = OutputStreamConfig::new("DAC0", 1_000.0, ramp.clone());
    assert_eq!(config.effective_scans_per_read(), 500);

    {
        let session = device.start_periodic_output(&config).unwrap();
        assert_eq!(session.index(), 0);
        assert_eq!(session.target_address(), 1000);
        assert_eq!(session.actual_scan_rate(), 1_000.0);

        assert_eq!(sim.stream_out_buffer(0).unwrap(), ramp.values());
        assert_eq!(sim.register("STREAM_OUT0_TARGET"), Some(1000.0));
        assert_eq!(sim.register("STREAM_OUT0_ENABLE"), Some(1.0));

        let held = session.hold(Duration::from_millis(30), None);
        assert!(held >= Duration::from_millis(30));
        let dac = session.device().read_name("DAC0").unwrap();
        assert!((0.0..2.5).contains(&dac), "DAC0 = {}", dac);
    }

    // Dropping the session stopped the stream exactly once.
    assert!(!device.is_streaming());
    assert_eq!(sim.count(Operation::StreamStop), 1);
    device.close().unwrap();
    assert_eq!(sim.count(Operation::StreamStop), 1);
}

#[test]
fn test_output_index_out_of_range() {
    let sim = SimulatedLjm::new();
    let mut device = ljm(&sim).open_any().unwrap();
    let config = OutputStreamConfig::new(
        "DAC0",
        1_000.0,
        Waveform::linear_ramp(0.0, 1.0, 16).unwrap(),
    )
    .with_index(4);

    let err = device.start_periodic_output(&config).unwrap_err();
    assert_eq!(
        err,
        LjmError::InvalidIndex {
            what: "stream-out",
            index: 4,
            max: 3
        }
    );
    assert_eq!(sim.count(Operation::PeriodicStreamOut), 0);
    assert_eq!(sim.count(Operation::StreamStart), 0);
}

#[test]
fn test_output_buffer_too_large() {
    let sim = SimulatedLjm::new();
    let mut device = ljm(&sim).open_any().unwrap();
    let waveform = Waveform::from_values(vec![0.5; MAX_WAVEFORM_SAMPLES + 1]).unwrap();
    let config = OutputStreamConfig::new("DAC1", 1_000.0, waveform);

    let err = device.start_periodic_output(&config).unwrap_err();
    assert_eq!(
        err,
        LjmError::BufferTooLarge {
            len: MAX_WAVEFORM_SAMPLES + 1,
            max: MAX_WAVEFORM_SAMPLES
        }
    );
    assert_eq!(sim.count(Operation::PeriodicStreamOut), 0);
}

#[test]
fn test_output_to_read_only_target_rejected() {
    let sim = SimulatedLjm::new();
    let mut device = ljm(&sim).open_any().unwrap();
    let config = OutputStreamConfig::new(
        "AIN0",
        1_000.0,
        Waveform::linear_ramp(0.0, 1.0, 16).unwrap(),
    );

    let err = device.start_periodic_output(&config).unwrap_err();
    assert!(matches!(err, LjmError::InvalidParameter { .. }));
    assert!(!device.is_streaming());
    assert_eq!(sim.count(Operation::StreamStart), 0);
}
