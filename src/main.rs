use std::ffi::OsString;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{error, info};

use sqlexcel::logging::{init_logger, LogLevel};
use sqlexcel::{run_export, ExportConfig};

/// Export the results of SQL queries to Excel workbooks
#[derive(Parser, Debug)]
#[command(name = "sqlexcel", version, about)]
struct Cli {
    /// JSON configuration file describing the datasource and output files
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

/// Accept the single-dash `-config` spelling as well as `--config`
fn normalize_args<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-config") => OsString::from("--config"),
            Some(s) if s.starts_with("-config=") => OsString::from(format!("-{}", s)),
            _ => arg,
        })
        .collect()
}

fn parse_cli<I: IntoIterator<Item = OsString>>(args: I) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(normalize_args(args))
}

/// Process exit code for a command line clap refused
///
/// Help and version requests succeed; any usage error exits with 1, the
/// same code as a failed export.
fn usage_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

fn run(config_path: PathBuf) -> Result<()> {
    info!("Reading JSON Config from: {}", config_path.display());
    let config = ExportConfig::from_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let report = run_export(&config).context("Export failed")?;
    for file in &report.files {
        info!(
            "Successfully exported data in excel format in file {} ({} sheets, {} rows)",
            file.path.display(),
            file.sheets.len(),
            file.rows()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            process::exit(usage_exit_code(&e));
        }
    };

    init_logger(cli.log_level.into()).context("Failed to initialize logger")?;

    let Some(config_path) = cli.config else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    if let Err(e) = run(config_path) {
        error!("An error occurred while exporting data to excel. {:#}", e);
        process::exit(1);
    }
    Ok(())
}
