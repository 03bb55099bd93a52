//! Error types for the scenario harness
//!
//! Error messages are designed to be clear and actionable, with hints on
//! how to resolve common issues. Every error maps onto a report
//! [`FailureCategory`] so a failed scenario says whether the harness could
//! not observe the target, observed it failing, or saw the target misbehave.

use std::io;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Browser/Session Errors ===
    #[error("Failed to launch browser: {0}. Set [browser].executable in the config or install chromium")]
    BrowserLaunch(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Navigation to '{url}' failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to '{url}' timed out after {secs} seconds. Is the target application running?")]
    NavigationTimeout { url: String, secs: u64 },

    #[error("Script evaluation failed for '{expression}': {message}")]
    Script { expression: String, message: String },

    #[error("Session already closed")]
    SessionClosed,

    // === Instrumentation Errors ===
    #[error("Probe '{name}' not found: the page did not expose it within {waited_ms}ms. Check the global name and that probes are installed before input")]
    ProbeNotFound { name: String, waited_ms: u64 },

    // === Sequencing Errors ===
    #[error("Unknown key '{0}'. Use a single character or a DOM key name such as Escape, Enter, ArrowUp")]
    UnknownKey(String),

    // === Timeout Errors ===
    #[error("Scenario exceeded its budget of {budget_ms}ms and was cancelled")]
    ScenarioTimeout { budget_ms: u64 },

    // === Target Errors ===
    #[error("Target application raised an uncaught error: {0}")]
    PageError(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a script evaluation error
    pub fn script(expression: &str, message: impl ToString) -> Self {
        // Long injected scripts make unreadable messages
        let expression = if expression.chars().count() > 80 {
            format!("{}...", expression.chars().take(80).collect::<String>())
        } else {
            expression.to_string()
        };
        Self::Script {
            expression,
            message: message.to_string(),
        }
    }

    /// Create an invalid scenario error
    pub fn invalid_scenario(name: &str, reason: impl ToString) -> Self {
        Self::InvalidScenario {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Report category for this error
    pub fn category(&self) -> FailureCategory {
        match self {
            Error::BrowserLaunch(_)
            | Error::Session(_)
            | Error::Navigation { .. }
            | Error::NavigationTimeout { .. }
            | Error::Script { .. }
            | Error::SessionClosed
            | Error::Io(_)
            | Error::Json(_)
            | Error::Internal(_) => FailureCategory::SessionError,
            Error::ProbeNotFound { .. } => FailureCategory::ProbeNotFound,
            Error::ScenarioTimeout { .. } => FailureCategory::Timeout,
            Error::PageError(_) => FailureCategory::UnexpectedPageError,
            Error::UnknownKey(_)
            | Error::Config(_)
            | Error::ConfigParse(_)
            | Error::InvalidScenario { .. }
            | Error::FileRead { .. } => FailureCategory::InvalidScenario,
        }
    }
}

/// Why a scenario failed, as shown in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    SessionError,
    ProbeNotFound,
    ExpectationFailure,
    Timeout,
    UnexpectedPageError,
    InvalidScenario,
}

/// Remediation class of a failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The harness could not observe the target
    CouldNotObserve,
    /// The target was observed and an expectation did not hold
    ObservedAndFailed,
    /// The target raised an error of its own
    TargetMisbehaved,
    /// The scenario or configuration is wrong
    HarnessMisconfigured,
}

impl FailureCategory {
    pub fn class(self) -> FailureClass {
        match self {
            Self::SessionError | Self::ProbeNotFound | Self::Timeout => {
                FailureClass::CouldNotObserve
            }
            Self::ExpectationFailure => FailureClass::ObservedAndFailed,
            Self::UnexpectedPageError => FailureClass::TargetMisbehaved,
            Self::InvalidScenario => FailureClass::HarnessMisconfigured,
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionError => write!(f, "session error"),
            Self::ProbeNotFound => write!(f, "probe not found"),
            Self::ExpectationFailure => write!(f, "expectation failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::UnexpectedPageError => write!(f, "unexpected page error"),
            Self::InvalidScenario => write!(f, "invalid scenario"),
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CouldNotObserve => write!(f, "harness could not observe"),
            Self::ObservedAndFailed => write!(f, "observed and failed"),
            Self::TargetMisbehaved => write!(f, "target misbehaved"),
            Self::HarnessMisconfigured => write!(f, "harness misconfigured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_separate_remediation_classes() {
        let probe = Error::ProbeNotFound {
            name: "gameState".to_string(),
            waited_ms: 100,
        };
        assert_eq!(probe.category(), FailureCategory::ProbeNotFound);
        assert_eq!(probe.category().class(), FailureClass::CouldNotObserve);

        let timeout = Error::ScenarioTimeout { budget_ms: 10 };
        assert_eq!(timeout.category().class(), FailureClass::CouldNotObserve);

        let page = Error::PageError("boom".to_string());
        assert_eq!(page.category().class(), FailureClass::TargetMisbehaved);

        assert_eq!(
            FailureCategory::ExpectationFailure.class(),
            FailureClass::ObservedAndFailed
        );
    }

    #[test]
    fn test_script_error_truncates_long_expressions() {
        let long = "x".repeat(200);
        match Error::script(&long, "TypeError") {
            Error::Script { expression, .. } => assert_eq!(expression.len(), 83),
            other => panic!("Expected Script error, got {other:?}"),
        }
    }
}
