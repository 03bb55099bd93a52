//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios against the target in a browser
    Run {
        /// Scenario files or directories (searched recursively for *.yaml / *.yml)
        #[arg(default_value = "scenarios")]
        paths: Vec<PathBuf>,

        /// Only run scenarios whose name contains this text
        #[arg(long, short)]
        filter: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headful: bool,

        /// Run scenarios marked parallel_safe concurrently
        #[arg(long)]
        parallel: bool,

        /// Base URL for relative scenario targets (overrides the config)
        #[arg(long)]
        base_url: Option<String>,

        /// Default per-scenario budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the run report as JSON instead of the summary
        #[arg(long)]
        json: bool,

        /// Also write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List discovered scenarios
    List {
        /// Scenario files or directories
        #[arg(default_value = "scenarios")]
        paths: Vec<PathBuf>,
    },

    /// Parse and validate scenarios without a browser
    Validate {
        /// Scenario files or directories
        #[arg(default_value = "scenarios")]
        paths: Vec<PathBuf>,
    },
}
