//! Logging and tracing configuration
//!
//! Human-facing progress goes to stdout through the report printer; tracing
//! output goes to stderr so it never interleaves with a `--json` report.
//! An optional log file captures full detail for post-mortem debugging.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::paths;

/// Default filter when `RUST_LOG` is not set
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("harness=debug,warn")
        } else {
            EnvFilter::new("harness=info,warn")
        }
    })
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing with an additional log file
///
/// The file gets full detail (file, line, span enter/exit) without ANSI
/// colors. The returned guard must be held until exit so buffered lines
/// are flushed. Falls back to stderr-only logging if the file can't be
/// opened.
pub fn init_with_file(verbose: bool, path: Option<&Path>) -> Option<(PathBuf, WorkerGuard)> {
    let log_file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => paths::default_log_file(),
    };

    let opened = log_file.and_then(|log_file| {
        if let Some(dir) = log_file.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Warning: Could not create log directory: {}", e);
                return None;
            }
        }
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => Some((log_file, file)),
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
                None
            }
        }
    });

    let Some((log_file, file)) = opened else {
        init_cli(verbose);
        return None;
    };

    let (writer, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Some((log_file, guard))
}
