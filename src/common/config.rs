//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Browser process settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Default settings applied to every scenario
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Console buffer settings
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Run scheduling settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Page viewport in CSS pixels
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Browser process settings
#[derive(Debug, Deserialize, Clone)]
pub struct BrowserSettings {
    /// Path to a Chrome/Chromium executable (searched on PATH if unset)
    pub executable: Option<PathBuf>,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Keep the Chrome sandbox enabled (disable in containers)
    #[serde(default = "default_true")]
    pub sandbox: bool,

    /// Extra command-line switches passed to the browser
    #[serde(default)]
    pub args: Vec<String>,

    /// Give every session its own browser context (cookies, storage)
    #[serde(default = "default_true")]
    pub isolated_contexts: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            sandbox: true,
            args: Vec::new(),
            isolated_contexts: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Executables tried, in order, when no browser path is configured
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

impl BrowserSettings {
    /// Resolve the browser executable
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        if let Some(path) = &self.executable {
            return Some(path.clone());
        }
        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

/// Default settings
#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    /// Base URL that relative scenario URLs are joined onto
    pub base_url: Option<String>,

    /// Query parameters added to every target URL
    #[serde(default = "default_query")]
    pub query: BTreeMap<String, String>,

    /// Viewport for scenarios that don't set one
    #[serde(default)]
    pub viewport: Viewport,

    /// Settle time after each dispatched action
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// How long to wait for a hooked global to appear
    #[serde(default = "default_probe_wait")]
    pub probe_wait_ms: u64,

    /// Poll interval while waiting for a hooked global
    #[serde(default = "default_probe_poll")]
    pub probe_poll_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base_url: None,
            query: default_query(),
            viewport: Viewport::default(),
            settle_ms: default_settle(),
            probe_wait_ms: default_probe_wait(),
            probe_poll_ms: default_probe_poll(),
        }
    }
}

fn default_query() -> BTreeMap<String, String> {
    BTreeMap::from([("agent".to_string(), "1".to_string())])
}
fn default_settle() -> u64 {
    100
}
fn default_probe_wait() -> u64 {
    5_000
}
fn default_probe_poll() -> u64 {
    50
}

impl Defaults {
    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_ms)
    }

    pub fn probe_poll(&self) -> Duration {
        Duration::from_millis(self.probe_poll_ms.max(1))
    }
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for launching the browser process
    #[serde(default = "default_launch")]
    pub launch_secs: u64,

    /// Timeout for a single navigation
    #[serde(default = "default_navigation")]
    pub navigation_secs: u64,

    /// Wall-clock budget for a scenario that doesn't set its own
    #[serde(default = "default_scenario")]
    pub scenario_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch_secs: default_launch(),
            navigation_secs: default_navigation(),
            scenario_secs: default_scenario(),
        }
    }
}

fn default_launch() -> u64 {
    20
}
fn default_navigation() -> u64 {
    30
}
fn default_scenario() -> u64 {
    120
}

/// Console buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    /// Maximum number of console lines to buffer per session
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Maximum total bytes to buffer per session
    #[serde(default = "default_max_bytes")]
    pub max_bytes_mb: usize,

    /// Lines included in a report excerpt when no filter is set
    #[serde(default = "default_excerpt_lines")]
    pub excerpt_lines: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            max_bytes_mb: default_max_bytes(),
            excerpt_lines: default_excerpt_lines(),
        }
    }
}

fn default_max_events() -> usize {
    10_000
}
fn default_max_bytes() -> usize {
    10
}
fn default_excerpt_lines() -> usize {
    20
}

/// Run scheduling configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RunConfig {
    /// Allow scenarios marked `parallel_safe` to run concurrently
    #[serde(default)]
    pub parallel: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.browser.headless);
        assert!(config.browser.isolated_contexts);
        assert_eq!(config.defaults.settle_ms, 100);
        assert_eq!(config.defaults.query.get("agent").map(String::as_str), Some("1"));
        assert_eq!(config.timeouts.navigation_secs, 30);
        assert!(!config.run.parallel);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [browser]
            headless = false
            args = ["--mute-audio"]

            [defaults]
            base_url = "http://localhost:5173"
            viewport = { width = 800, height = 600 }

            [console]
            excerpt_lines = 5
            "#,
        )
        .unwrap();

        assert!(!config.browser.headless);
        assert!(config.browser.sandbox);
        assert_eq!(config.browser.args, vec!["--mute-audio".to_string()]);
        assert_eq!(config.defaults.base_url.as_deref(), Some("http://localhost:5173"));
        assert_eq!(config.defaults.viewport, Viewport { width: 800, height: 600 });
        assert_eq!(config.defaults.probe_wait_ms, 5_000);
        assert_eq!(config.console.excerpt_lines, 5);
        assert_eq!(config.console.max_events, 10_000);
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::parse("[browser\nheadless = ").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }

    #[test]
    fn test_explicit_executable_wins() {
        let settings = BrowserSettings {
            executable: Some(PathBuf::from("/opt/chrome/chrome")),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve_executable(),
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
    }
}
