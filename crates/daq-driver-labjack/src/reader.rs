//! Stream reader loop.
//!
//! [`ReadLoop`] drains a [`StreamSession`] until a [`StopCondition`] is met,
//! hands every batch to a callback, and accumulates diagnostics:
//!
//! - skipped scans are counted and reported as [`StreamWarning`]s; they
//!   never fail the run
//! - device and client backlogs are tracked separately, and a
//!   [`BacklogMonitor`] warns when the client backlog keeps growing
//! - throughput is computed from scans actually received over wall-clock
//!   time, next to the rate the device reported
//!
//! Whatever ends the loop (condition met, cancellation, read error, callback
//! error), the stream is stopped before `run` returns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::LjmError;
use crate::streaming::{StreamBatch, StreamSession};

/// When the loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// After a fixed number of reads
    Reads(u64),
    /// After a wall-clock duration (checked between reads)
    Duration(Duration),
    /// Only when the cancel token fires
    UntilCancelled,
}

impl Default for StopCondition {
    fn default() -> Self {
        Self::Reads(100)
    }
}

/// Cooperative cancellation, checked between reads.
///
/// A read in progress is never interrupted; cancellation takes effect once
/// it returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Non-fatal data-quality events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamWarning {
    /// A batch contained scans the device could not fill.
    SkippedScans {
        /// Read number
        sequence: u64,
        /// Scans skipped in that read
        count: u32,
    },
    /// The client backlog grew on several consecutive reads.
    BacklogGrowing {
        /// Read number
        sequence: u64,
        /// Client backlog at that read
        client_backlog: u32,
        /// Device backlog at that read
        device_backlog: u32,
        /// Consecutive reads with growth
        consecutive: usize,
    },
}

impl fmt::Display for StreamWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedScans { sequence, count } => {
                write!(f, "read {}: {} skipped scans", sequence, count)
            }
            Self::BacklogGrowing {
                sequence,
                client_backlog,
                device_backlog,
                consecutive,
            } => write!(
                f,
                "read {}: client backlog {} grew for {} reads (device backlog {})",
                sequence, client_backlog, consecutive, device_backlog
            ),
        }
    }
}

/// Detects sustained client backlog growth.
#[derive(Debug, Clone)]
pub struct BacklogMonitor {
    window: usize,
    last: Option<u32>,
    streak: usize,
}

impl BacklogMonitor {
    /// Warn after `window` consecutive reads with a growing backlog.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            last: None,
            streak: 0,
        }
    }

    /// Feed one batch; returns a warning when the streak reaches the window.
    pub fn observe(&mut self, batch: &StreamBatch) -> Option<StreamWarning> {
        let backlog = batch.client_backlog;
        match self.last {
            Some(prev) if backlog > prev => self.streak += 1,
            _ => self.streak = 0,
        }
        self.last = Some(backlog);

        if self.streak > 0 && self.streak % self.window == 0 {
            Some(StreamWarning::BacklogGrowing {
                sequence: batch.sequence,
                client_backlog: backlog,
                device_backlog: batch.device_backlog,
                consecutive: self.streak,
            })
        } else {
            None
        }
    }
}

impl Default for BacklogMonitor {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Read count reached
    ReadsCompleted,
    /// Duration elapsed
    DurationElapsed,
    /// Cancel token fired
    Cancelled,
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Reads performed
    pub reads: u64,
    /// Scans received, skipped ones included
    pub total_scans: u64,
    /// Scans the device skipped
    pub skipped_scans: u64,
    /// Channels per scan
    pub channel_count: usize,
    /// Wall-clock time of the loop
    pub elapsed: Duration,
    /// Scan rate the device reported at start
    pub actual_scan_rate: f64,
    /// Highest device backlog seen
    pub max_device_backlog: u32,
    /// Highest client backlog seen
    pub max_client_backlog: u32,
    /// Data-quality warnings raised
    pub warnings: Vec<StreamWarning>,
    /// Why the loop ended
    pub stop_reason: StopReason,
}

impl RunSummary {
    /// Scans per second actually received.
    pub fn timed_scan_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_scans as f64 / secs
        } else {
            0.0
        }
    }

    /// Samples per second actually received.
    pub fn sample_rate(&self) -> f64 {
        self.timed_scan_rate() * self.channel_count as f64
    }

    /// Scans the device should have produced in the elapsed time.
    pub fn expected_scans(&self) -> f64 {
        self.elapsed.as_secs_f64() * self.actual_scan_rate
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total scans: {}", self.total_scans)?;
        writeln!(f, "Skipped scans: {}", self.skipped_scans)?;
        writeln!(f, "Time taken: {:.6} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "LJM scan rate: {} scans/second", self.actual_scan_rate)?;
        writeln!(f, "Timed scan rate: {:.3} scans/second", self.timed_scan_rate())?;
        writeln!(f, "Sample rate: {:.3} samples/second", self.sample_rate())?;
        write!(
            f,
            "Peak backlog: device {}, LJM {}",
            self.max_device_backlog, self.max_client_backlog
        )
    }
}

/// Reads a stream until a stop condition is met.
#[derive(Debug, Clone, Default)]
pub struct ReadLoop {
    stop: StopCondition,
    cancel: Option<CancelToken>,
    backlog_window: Option<usize>,
}

impl ReadLoop {
    /// A loop ending on `stop`.
    pub fn new(stop: StopCondition) -> Self {
        Self {
            stop,
            cancel: None,
            backlog_window: None,
        }
    }

    /// Also end when `token` fires.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Reads of backlog growth before a warning.
    pub fn backlog_window(mut self, reads: usize) -> Self {
        self.backlog_window = Some(reads);
        self
    }

    fn should_stop(&self, reads: u64, started: Instant) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(StopReason::Cancelled);
        }
        match self.stop {
            StopCondition::Reads(n) if reads >= n => Some(StopReason::ReadsCompleted),
            StopCondition::Duration(d) if started.elapsed() >= d => {
                Some(StopReason::DurationElapsed)
            }
            _ => None,
        }
    }

    /// Run the loop, calling `on_batch` for every batch.
    ///
    /// The stream is stopped before this returns, on success and on error.
    /// A callback error ends the loop and is returned as is.
    pub fn run<E, F>(
        &self,
        session: &mut StreamSession<'_>,
        mut on_batch: F,
    ) -> std::result::Result<RunSummary, E>
    where
        E: From<LjmError>,
        F: FnMut(&StreamBatch) -> std::result::Result<(), E>,
    {
        let mut monitor = self
            .backlog_window
            .map(BacklogMonitor::new)
            .unwrap_or_default();
        let mut summary = RunSummary {
            reads: 0,
            total_scans: 0,
            skipped_scans: 0,
            channel_count: session.channel_count(),
            elapsed: Duration::ZERO,
            actual_scan_rate: session.actual_scan_rate(),
            max_device_backlog: 0,
            max_client_backlog: 0,
            warnings: Vec::new(),
            stop_reason: StopReason::ReadsCompleted,
        };

        let started = Instant::now();
        let outcome = loop {
            if let Some(reason) = self.should_stop(summary.reads, started) {
                summary.stop_reason = reason;
                break Ok(());
            }

            let batch = match session.read_batch() {
                Ok(batch) => batch,
                Err(e) => break Err(E::from(e)),
            };

            summary.reads += 1;
            summary.total_scans += batch.n_scans() as u64;
            summary.skipped_scans += u64::from(batch.skipped_scans);
            summary.max_device_backlog = summary.max_device_backlog.max(batch.device_backlog);
            summary.max_client_backlog = summary.max_client_backlog.max(batch.client_backlog);

            if batch.skipped_scans > 0 {
                warn!(
                    sequence = batch.sequence,
                    skipped = batch.skipped_scans,
                    "Device skipped scans"
                );
                summary.warnings.push(StreamWarning::SkippedScans {
                    sequence: batch.sequence,
                    count: batch.skipped_scans,
                });
            }
            if let Some(warning) = monitor.observe(&batch) {
                warn!(
                    sequence = batch.sequence,
                    client_backlog = batch.client_backlog,
                    device_backlog = batch.device_backlog,
                    "LJM backlog keeps growing; reader is falling behind"
                );
                summary.warnings.push(warning);
            }

            if let Err(e) = on_batch(&batch) {
                break Err(e);
            }
        };
        summary.elapsed = started.elapsed();

        let stopped = session.stop();
        match outcome {
            Ok(()) => {
                stopped?;
                info!(
                    reads = summary.reads,
                    total_scans = summary.total_scans,
                    skipped = summary.skipped_scans,
                    timed_rate = summary.timed_scan_rate(),
                    reason = ?summary.stop_reason,
                    "Stream read loop finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "Failed to stop stream after error");
                }
                Err(e)
            }
        }
    }
}
