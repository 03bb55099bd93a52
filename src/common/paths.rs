//! Configuration and log file locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/scenario-harness/`
//! - macOS: `~/Library/Application Support/scenario-harness/`
//! - Windows: `%APPDATA%\scenario-harness\`

use std::path::PathBuf;

/// Application name used for config and data directories
const APP_NAME: &str = "scenario-harness";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Default log file for `--log-file` without an explicit path
pub fn default_log_file() -> Option<PathBuf> {
    log_dir().map(|dir| dir.join("harness.log"))
}
