//! LabJack Hardware Smoke Tests
//!
//! Runs against a real T-series device through the installed `LabJackM`
//! library.
//!
//! # Environment Variables
//!
//! Required:
//! - `LABJACK_SMOKE_TEST=1` - Enable the test suite
//!
//! Optional:
//! - `LABJACK_IDENTIFIER` - Serial number, IP or name (default: "ANY")
//!
//! # Quick Setup
//!
//! ```bash
//! export LABJACK_SMOKE_TEST=1
//! cargo test --features hardware -p daq-driver-labjack --test hardware_smoke
//! ```
//!
//! | Test | Description |
//! |------|-------------|
//! | `device_discovery_test` | Open, print handle info, close |
//! | `stream_smoke_test` | Ten reads of AIN0/AIN2 at 10 kHz |
//! | `stream_cleanup_test` | Second session on the same handle after the first ends |

#![cfg(feature = "hardware")]

use std::env;

use daq_driver_labjack::{
    ConnectionType, DeviceType, LibraryConfig, Ljm, LjmError, OpenTarget, ReadLoop,
    StopCondition, StreamConfig,
};

fn smoke_test_enabled() -> bool {
    env::var("LABJACK_SMOKE_TEST")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn target() -> OpenTarget {
    let identifier = env::var("LABJACK_IDENTIFIER").unwrap_or_else(|_| "ANY".to_string());
    OpenTarget::new(DeviceType::Any, ConnectionType::Any, identifier)
}

macro_rules! skip_if_disabled {
    () => {
        if !smoke_test_enabled() {
            println!("LabJack smoke test skipped (set LABJACK_SMOKE_TEST=1 to enable)");
            return;
        }
    };
}

#[test]
fn device_discovery_test() {
    skip_if_disabled!();

    let ljm = Ljm::native(LibraryConfig::default()).expect("LJM library not usable");
    let device = ljm.open(&target()).expect("no LabJack device found");
    println!("Opened {}", device.info());
    assert!(device.info().serial_number > 0);
    device.close().expect("close failed");
}

#[test]
fn stream_smoke_test() {
    skip_if_disabled!();

    let ljm = Ljm::native(LibraryConfig::default()).expect("LJM library not usable");
    let config = StreamConfig::builder()
        .channels(&["AIN0", "AIN2"])
        .scan_rate(10_000.0)
        .build()
        .expect("config");

    let summary = ljm
        .with_device(&target(), |device| {
            let mut session = device.start_input_stream(&config)?;
            ReadLoop::new(StopCondition::Reads(10)).run(&mut session, |batch| {
                assert_eq!(batch.samples.len() % batch.channel_count, 0);
                Ok::<_, LjmError>(())
            })
        })
        .expect("stream failed");

    println!("{}", summary);
    assert_eq!(summary.reads, 10);
    assert!(summary.actual_scan_rate > 0.0);
}

#[test]
fn stream_cleanup_test() {
    skip_if_disabled!();

    let ljm = Ljm::native(LibraryConfig::default()).expect("LJM library not usable");
    let config = StreamConfig::builder()
        .channels(&["AIN0"])
        .scan_rate(1_000.0)
        .build()
        .expect("config");

    let mut device = ljm.open(&target()).expect("no LabJack device found");
    for _ in 0..2 {
        let mut session = device.start_input_stream(&config).expect("start");
        session.read_batch().expect("read");
    }
    device.stop_stream().expect("stop is idempotent");
    device.close().expect("close failed");
}
