//! Logger initialization for the command-line tool.

use crate::error::{ExportError, Result};
use clap::ValueEnum;
use log::LevelFilter;

/// Logging verbosity accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Progress messages (default)
    Info,
    /// Driver, connection and column format details
    Debug,
    /// Everything
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Initializes `env_logger` at `level`.
///
/// `RUST_LOG` is read first and `level` overrides it; the database client
/// modules never log below `info`.
///
/// # Errors
///
/// Returns `ExportError::Config` when a logger is already installed.
pub fn init_logger(level: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();

    builder.filter_level(level);
    builder.filter_module("postgres", level.min(LevelFilter::Info));
    builder.filter_module("tokio_postgres", level.min(LevelFilter::Info));
    builder.filter_module("sqlexcel", level);
    builder.format_timestamp_millis();

    builder
        .try_init()
        .map_err(|e| ExportError::Config(format!("failed to initialize logger: {}", e)))
}
