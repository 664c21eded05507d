//! Command-line tooling for LabJack T-series devices.
//!
//! The driver lives in `daq-driver-labjack`; this crate adds what a program
//! around it needs:
//!
//! - [`config`] - layered configuration (defaults, TOML file, environment)
//! - [`logging`] - `tracing-subscriber` setup
//! - [`commands`] - the `info`, `stream`, `stream-out` and `i2c-eeprom`
//!   subcommands as plain blocking functions

pub mod commands;
pub mod config;
pub mod logging;

pub use config::AppConfig;
