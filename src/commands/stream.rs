//! `stream`: acquire analog inputs in stream mode and summarize the run.

use anyhow::{Context, Result};
use daq_driver_labjack::{CancelToken, Ljm, LjmError, OpenTarget, ReadLoop, RunSummary};
use tracing::info;

use crate::config::StreamSettings;

/// Stream `settings.channels` until the configured stop condition or
/// `cancel` fires.
///
/// The stream is stopped and the device closed before this returns, also
/// when a read fails.
pub fn run(
    ljm: &Ljm,
    target: &OpenTarget,
    settings: &StreamSettings,
    cancel: CancelToken,
) -> Result<RunSummary> {
    let config = settings
        .to_stream_config()
        .context("Invalid stream configuration")?;
    let stop = settings
        .stop_condition()
        .context("Invalid stream duration")?;
    let reader = ReadLoop::new(stop)
        .cancel_token(cancel)
        .backlog_window(settings.backlog_window);

    let summary = ljm
        .with_device(target, |device| {
            info!(device = %device.info(), "Opened LabJack");
            let mut session = device.start_input_stream(&config)?;
            let names = session.channel_names().to_vec();

            reader.run(&mut session, |batch| {
                if let Some(scan) = batch.first_scan() {
                    let values: Vec<String> = names
                        .iter()
                        .zip(scan)
                        .map(|(name, value)| match value {
                            Some(v) => format!("{} = {:.4}", name, v),
                            None => format!("{} = skipped", name),
                        })
                        .collect();
                    info!(
                        read = batch.sequence,
                        first_scan = %values.join(", "),
                        skipped = batch.skipped_scans,
                        device_backlog = batch.device_backlog,
                        ljm_backlog = batch.client_backlog,
                        "Stream read"
                    );
                }
                Ok::<_, LjmError>(())
            })
        })
        .with_context(|| format!("Stream on {} failed", target))?;

    Ok(summary)
}
