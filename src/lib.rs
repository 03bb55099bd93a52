//! Scenario harness - behavioral tests for live browser applications
//!
//! This library drives an interactive web application through a remote
//! browser, installs probes into the page, replays input sequences, and
//! checks the state the application exposes on its globals.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod probe;
pub mod scenario;
pub mod sequencer;
pub mod session;
pub mod testing;
pub mod verifier;

// Re-export commonly used types for tests
pub use common::{Error, FailureCategory, FailureClass, Result};
pub use scenario::Scenario;
pub use testing::{Orchestrator, RunReport, ScenarioResult};
pub use verifier::{Checkpoint, ConsoleExpectation, Expectation};
