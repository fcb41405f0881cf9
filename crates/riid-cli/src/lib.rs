//! RIID CLI - command-line interface for gamma spectrum event detection
//!
//! This CLI provides a terminal interface to:
//! - Replay a gross spectrum series against a background measurement
//! - Report the detected events and save their gross and background spectra

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod commands;
mod error;
pub mod io;

use commands::detect;
pub use error::{CliError, CliResult};

/// RIID CLI application
#[derive(Parser)]
#[command(name = "riid")]
#[command(about = "RIID - radioisotope identification toolkit CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Detect events within a series of gamma spectra based on a background measurement
    Detect(detect::DetectArgs),
}

/// Run using the current process arguments.
pub fn run() -> CliResult<()> {
    run_with_args(std::env::args_os())
}

/// Run using the provided argument iterator.
pub fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    // Execute command
    match cli.command {
        Commands::Detect(args) => detect::execute(args),
    }
}
