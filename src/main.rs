//! CLI Entry Point for labjack-daq
//!
//! # Usage
//!
//! Print device identity:
//! ```bash
//! labjack-daq info --identifier 192.168.1.175
//! ```
//!
//! Stream AIN0 and AIN2 at 25 kHz for 100 reads (the defaults):
//! ```bash
//! labjack-daq stream
//! labjack-daq --simulate stream --channels AIN0,AIN1 --duration 2
//! ```
//!
//! Replay a ramp on DAC0 for five seconds:
//! ```bash
//! labjack-daq stream-out --target DAC0 --duration 5
//! ```
//!
//! Write and read back an LJTick-DAC EEPROM:
//! ```bash
//! labjack-daq i2c-eeprom --offset 0 --length 4
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_labjack::{CancelToken, ConnectionType, DeviceType};
use labjack_daq::commands;
use labjack_daq::config::AppConfig;
use labjack_daq::logging::{self, OutputFormat};
use tokio::signal;
use tracing::warn;

#[derive(Parser)]
#[command(name = "labjack-daq")]
#[command(about = "Stream, stream-out and I2C for LabJack T-series devices", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults to ./labjack-daq.toml if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in simulator instead of the LJM library
    #[arg(long, global = true)]
    simulate: bool,

    /// Device type (ANY, T4, T7, T8, TSERIES)
    #[arg(long, global = true)]
    device_type: Option<DeviceType>,

    /// Connection type (ANY, USB, TCP, ETHERNET, WIFI, ...)
    #[arg(long, global = true)]
    connection_type: Option<ConnectionType>,

    /// Serial number, IP address, device name or ANY
    #[arg(long, global = true)]
    identifier: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the device and print its identity
    Info,

    /// Stream analog inputs and print a run summary
    Stream {
        /// Channels in scan order, comma separated
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,

        /// Scans per second
        #[arg(long)]
        scan_rate: Option<f64>,

        /// Scans per read
        #[arg(long)]
        scans_per_read: Option<u32>,

        /// Number of reads
        #[arg(long)]
        reads: Option<u64>,

        /// Stream for this many seconds instead of a number of reads
        #[arg(long, conflicts_with = "reads")]
        duration: Option<f64>,
    },

    /// Replay a waveform on an output register
    StreamOut {
        /// Stream-out channel (0-3)
        #[arg(long)]
        index: Option<u8>,

        /// Register to drive
        #[arg(long)]
        target: Option<String>,

        /// Samples per second
        #[arg(long)]
        scan_rate: Option<f64>,

        /// Seconds to run
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Read, write and read back an I2C EEPROM
    I2cEeprom {
        /// Memory offset
        #[arg(long)]
        offset: Option<u8>,

        /// Bytes to write (within one page)
        #[arg(long)]
        length: Option<usize>,
    },
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(&self, config: &mut AppConfig) {
        if self.simulate {
            config.device.simulate = true;
        }
        if let Some(device_type) = self.device_type {
            config.device.device_type = device_type;
        }
        if let Some(connection_type) = self.connection_type {
            config.device.connection_type = connection_type;
        }
        if let Some(identifier) = &self.identifier {
            config.device.identifier = identifier.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        match &self.command {
            Commands::Info => {}
            Commands::Stream {
                channels,
                scan_rate,
                scans_per_read,
                reads,
                duration,
            } => {
                let stream = &mut config.stream;
                if let Some(channels) = channels {
                    stream.channels = channels.clone();
                }
                if let Some(rate) = scan_rate {
                    stream.scan_rate = *rate;
                }
                if scans_per_read.is_some() {
                    stream.scans_per_read = *scans_per_read;
                }
                if let Some(reads) = reads {
                    stream.reads = *reads;
                    stream.duration_secs = None;
                }
                if duration.is_some() {
                    stream.duration_secs = *duration;
                }
            }
            Commands::StreamOut {
                index,
                target,
                scan_rate,
                duration,
            } => {
                let out = &mut config.stream_out;
                if let Some(index) = index {
                    out.index = *index;
                }
                if let Some(target) = target {
                    out.target = target.clone();
                }
                if let Some(rate) = scan_rate {
                    out.scan_rate = *rate;
                }
                if let Some(secs) = duration {
                    out.duration_secs = *secs;
                }
            }
            Commands::I2cEeprom { offset, length } => {
                if let Some(offset) = offset {
                    config.i2c.offset = *offset;
                }
                if let Some(length) = length {
                    config.i2c.length = *length;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;
    logging::init_from_settings(&config.logging).map_err(anyhow::Error::msg)?;

    // Ctrl-C ends the read loop or the output hold; cleanup runs as usual.
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            on_signal.cancel();
        }
    });

    let command = cli.command;
    tokio::task::spawn_blocking(move || execute(command, &config, cancel))
        .await
        .context("Command task failed")?
}

fn execute(command: Commands, config: &AppConfig, cancel: CancelToken) -> Result<()> {
    let ljm = commands::connect(config)?;
    let target = config.device.target();

    match command {
        Commands::Info => {
            let report = commands::info::run(&ljm, &target)?;
            println!("{}", report);
        }
        Commands::Stream { .. } => {
            let summary = commands::stream::run(&ljm, &target, &config.stream, cancel)?;
            println!("{}", summary);
            for warning in &summary.warnings {
                println!("Warning: {}", warning);
            }
        }
        Commands::StreamOut { .. } => {
            let report = commands::stream_out::run(&ljm, &target, &config.stream_out, cancel)?;
            println!("{}", report);
        }
        Commands::I2cEeprom { .. } => {
            let report = commands::i2c::run(&ljm, &target, &config.i2c)?;
            println!("{}", report);
        }
    }
    Ok(())
}
