//! Scenario harness CLI - behavioral tests for live browser applications
//!
//! Drives a real-time web application through a browser, injects
//! instrumentation into the page, replays scripted input, and verifies the
//! state the application exposes.

use std::path::PathBuf;

use clap::Parser;
use harness::common::config::Config;
use harness::common::logging;
use harness::{cli, commands};
use commands::Commands;

#[derive(Parser)]
#[command(name = "harness", about = "Browser-driven scenario test harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write detailed logs to a file (default location if no path given)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Guard flushes the file writer on exit
    let _log_guard = match &cli.log_file {
        Some(path) => logging::init_with_file(cli.verbose, path.as_deref()),
        None => {
            logging::init_cli(cli.verbose);
            None
        }
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
