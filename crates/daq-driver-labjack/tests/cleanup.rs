//! Release-order tests.
//!
//! Whatever goes wrong once a stream is running, the stream must be stopped
//! exactly once and only then the handle closed, exactly once.
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_clean_run_stops_then_closes` | Normal completion |
//! | `test_read_failures_stop_then_close` | Injected read errors at several points |
//! | `test_callback_error_stops_then_closes` | Consumer aborts the loop |
//! | `test_failed_stop_still_closes` | Stop itself fails |
//! | `test_unable_to_stop_still_closes` | LJM reports it could not stop the stream |
//! | `test_failed_start_cleans_up` | Start fails after being attempted |
//! | `test_drop_path_stops_then_closes` | Error propagated with `?`, no explicit close |
//! | `test_stop_is_idempotent` | Stop twice, with and without a stream |

use daq_driver_labjack::mock::{Fault, FaultPlan, Operation, SimulatedLjm};
use daq_driver_labjack::{
    ErrorCode, LibraryConfig, Ljm, LjmError, OpenTarget, ReadLoop, RunSummary, StopCondition,
    StreamConfig,
};

// =============================================================================
// Helpers
// =============================================================================

fn stream_config() -> StreamConfig {
    StreamConfig::builder()
        .channels(&["AIN0", "AIN2"])
        .scan_rate(25_000.0)
        .build()
        .unwrap()
}

/// Stop and close calls, in order.
fn release_calls(sim: &SimulatedLjm) -> Vec<Operation> {
    sim.operations()
        .into_iter()
        .filter(|op| matches!(op, Operation::StreamStop | Operation::Close))
        .collect()
}

fn run_with(plan: FaultPlan, reads: u64) -> (SimulatedLjm, Result<RunSummary, LjmError>) {
    let sim = SimulatedLjm::new().with_faults(plan);
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();
    let config = stream_config();
    let result = ljm.with_device(&OpenTarget::any(), |device| {
        let mut session = device.start_input_stream(&config)?;
        ReadLoop::new(StopCondition::Reads(reads)).run(&mut session, |_| Ok::<_, LjmError>(()))
    });
    (sim, result)
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_clean_run_stops_then_closes() {
    let (sim, result) = run_with(FaultPlan::none(), 10);
    let summary = result.unwrap();
    assert_eq!(summary.reads, 10);
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_read_failures_stop_then_close() {
    let codes = [
        ErrorCode::CANNOT_CONNECT,
        ErrorCode::LJM_BUFFER_FULL,
        ErrorCode::MBE6_SLAVE_DEVICE_BUSY,
        ErrorCode::NO_RESPONSE_BYTES_RECEIVED,
    ];
    for nth in [1, 2, 5, 10] {
        for code in codes {
            let plan = FaultPlan::none().fail_nth(Operation::StreamRead, nth, code);
            let (sim, result) = run_with(plan, 10);

            let err = result.unwrap_err();
            if let Some(reported) = err.code() {
                assert_eq!(reported, code);
            }
            assert_eq!(
                release_calls(&sim),
                vec![Operation::StreamStop, Operation::Close],
                "fault {} on read {}",
                code,
                nth
            );
            assert_eq!(sim.open_handles(), 0);
        }
    }
}

#[test]
fn test_callback_error_stops_then_closes() {
    let sim = SimulatedLjm::new();
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();
    let config = stream_config();

    let result: anyhow::Result<RunSummary> = ljm.with_device(&OpenTarget::any(), |device| {
        let mut session = device.start_input_stream(&config)?;
        ReadLoop::new(StopCondition::Reads(10)).run(&mut session, |batch| {
            if batch.sequence == 3 {
                anyhow::bail!("consumer gave up");
            }
            Ok(())
        })
    });

    assert_eq!(result.unwrap_err().to_string(), "consumer gave up");
    assert_eq!(sim.count(Operation::StreamRead), 4);
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
}

#[test]
fn test_failed_stop_still_closes() {
    let plan = FaultPlan::none().fail_nth(Operation::StreamStop, 1, ErrorCode::CANNOT_CONNECT);
    let (sim, result) = run_with(plan, 3);

    assert!(matches!(result, Err(LjmError::Connection { .. })));
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_unable_to_stop_still_closes() {
    let plan =
        FaultPlan::none().fail_nth(Operation::StreamStop, 1, ErrorCode::UNABLE_TO_STOP_STREAM);
    let (sim, result) = run_with(plan, 3);

    let err = result.unwrap_err();
    assert!(matches!(err, LjmError::StreamStopFailed { .. }));
    assert_eq!(err.code(), Some(ErrorCode::UNABLE_TO_STOP_STREAM));
    assert!(!err.is_transient());
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_failed_start_cleans_up() {
    let plan = FaultPlan::none().fail_nth(
        Operation::StreamStart,
        1,
        ErrorCode::COULD_NOT_START_STREAM,
    );
    let (sim, result) = run_with(plan, 3);

    assert!(matches!(
        result,
        Err(LjmError::Library {
            code: ErrorCode::COULD_NOT_START_STREAM
        })
    ));
    assert_eq!(sim.count(Operation::StreamRead), 0);
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
}

#[test]
fn test_drop_path_stops_then_closes() {
    fn acquire(ljm: &Ljm) -> Result<(), LjmError> {
        let mut device = ljm.open_any()?;
        let mut session = device.start_input_stream(&stream_config())?;
        loop {
            session.read_batch()?;
        }
    }

    let sim = SimulatedLjm::new().with_faults(FaultPlan::none().with(Fault::OnCall {
        operation: Operation::StreamRead,
        nth: 4,
        code: ErrorCode::SOCKET_LEVEL_ERROR,
    }));
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();

    assert!(matches!(acquire(&ljm), Err(LjmError::Connection { .. })));
    assert_eq!(
        release_calls(&sim),
        vec![Operation::StreamStop, Operation::Close]
    );
    assert_eq!(sim.open_handles(), 0);
}

#[test]
fn test_stop_is_idempotent() {
    let sim = SimulatedLjm::new();
    let ljm = Ljm::new(sim.clone(), LibraryConfig::default()).unwrap();
    let mut device = ljm.open_any().unwrap();

    // Nothing running: both calls succeed.
    device.stop_stream().unwrap();
    device.stop_stream().unwrap();

    {
        let mut session = device.start_input_stream(&stream_config()).unwrap();
        session.read_batch().unwrap();
        session.stop().unwrap();
        session.stop().unwrap();
        assert!(!session.is_running());
        assert!(matches!(
            session.read_batch(),
            Err(LjmError::StreamNotRunning { .. })
        ));
    }
    assert!(!device.is_streaming());
    device.stop_stream().unwrap();

    let handle = device.handle();
    device.close().unwrap();
    assert!(!sim.is_streaming(handle));
    assert_eq!(sim.count(Operation::Close), 1);
}
