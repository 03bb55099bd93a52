//! Scenario orchestration and reporting
//!
//! The [`Orchestrator`] owns the scenario registry and one shared session
//! controller; each scenario body is pure data (steps and checkpoints) and
//! the orchestrator supplies the open/navigate/teardown around it.

mod report;
mod runner;

pub use report::{Failure, RunReport, ScenarioResult};
pub use runner::Orchestrator;
