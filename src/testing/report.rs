//! Run report
//!
//! Aggregates scenario results into counts and failure detail, renders a
//! colored console summary, and serializes to JSON for machines.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::common::{Error, FailureCategory, FailureClass, Result};
use crate::probe::{ConsoleLine, ProbeRecord};
use crate::verifier::CheckpointResult;

/// Why a scenario failed
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub category: FailureCategory,
    pub class: FailureClass,
    pub message: String,
}

impl Failure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            class: category.class(),
            message: message.into(),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        Self::new(error.category(), error.to_string())
    }
}

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub checkpoints: Vec<CheckpointResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub page_errors: Vec<String>,
    /// Diagnostic console excerpt
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<ConsoleLine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeRecord>,
}

impl ScenarioResult {
    /// A scenario that failed before a session could be used
    pub fn errored(name: &str, error: &Error, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            duration_ms,
            failure: Some(Failure::from_error(error)),
            checkpoints: Vec::new(),
            page_errors: Vec::new(),
            console: Vec::new(),
            probes: Vec::new(),
        }
    }

    pub fn category(&self) -> Option<FailureCategory> {
        self.failure.as_ref().map(|f| f.category)
    }

    /// Checkpoints with at least one failing expectation
    pub fn failed_checkpoints(&self) -> impl Iterator<Item = &CheckpointResult> {
        self.checkpoints.iter().filter(|c| !c.passed)
    }
}

/// Aggregate of one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioResult>,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

impl RunReport {
    pub fn new(
        scenarios: Vec<ScenarioResult>,
        duration_ms: u64,
        sessions_opened: usize,
        sessions_closed: usize,
    ) -> Self {
        let passed = scenarios.iter().filter(|s| s.passed).count();
        Self {
            failed: scenarios.len() - passed,
            passed,
            scenarios,
            duration_ms,
            sessions_opened,
            sessions_closed,
        }
    }

    /// Every scenario passed
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioResult> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Number of failed scenarios per category
    pub fn count(&self, category: FailureCategory) -> usize {
        self.scenarios
            .iter()
            .filter(|s| s.category() == Some(category))
            .count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Print a human-readable summary to stdout
    pub fn print_summary(&self) {
        println!("\n{}", "Scenarios:".cyan());

        for scenario in &self.scenarios {
            let timing = format!("({}ms)", scenario.duration_ms).dimmed();
            if scenario.passed {
                println!("  {} {} {}", "✓".green(), scenario.name, timing);
                continue;
            }

            println!("  {} {} {}", "✗".red(), scenario.name.bold(), timing);
            if let Some(failure) = &scenario.failure {
                println!(
                    "      {} {}",
                    format!("[{}]", failure.category).yellow(),
                    failure.message
                );
            }
            for checkpoint in scenario.failed_checkpoints() {
                println!("      checkpoint '{}':", checkpoint.name);
                for expectation in checkpoint.failures() {
                    for reason in &expectation.failures {
                        println!("        {} {}", "✗".red(), reason);
                    }
                }
            }
            for error in &scenario.page_errors {
                println!("      {} {}", "page error:".red(), error);
            }
            if !scenario.console.is_empty() {
                println!("      {}", "console:".dimmed());
                for line in &scenario.console {
                    println!("        {}", format!("[{}] {}", line.level, line.text).dimmed());
                }
            }
        }

        let summary = format!(
            "{} passed, {} failed ({} total) in {:.1}s",
            self.passed,
            self.failed,
            self.scenarios.len(),
            self.duration_ms as f64 / 1000.0
        );
        if self.success() {
            println!("\n{} {}\n", "✓".green().bold(), summary.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), summary.red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_categories() {
        let ok = ScenarioResult {
            name: "ok".to_string(),
            passed: true,
            duration_ms: 5,
            failure: None,
            checkpoints: Vec::new(),
            page_errors: Vec::new(),
            console: Vec::new(),
            probes: Vec::new(),
        };
        let timed_out = ScenarioResult::errored("slow", &Error::ScenarioTimeout { budget_ms: 10 }, 10);
        let missing = ScenarioResult::errored(
            "missing",
            &Error::ProbeNotFound {
                name: "gameState".to_string(),
                waited_ms: 5000,
            },
            5000,
        );

        let report = RunReport::new(vec![ok, timed_out, missing], 5015, 3, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.success());
        assert_eq!(report.count(FailureCategory::Timeout), 1);
        assert_eq!(
            report.get("missing").and_then(|s| s.failure.as_ref()).map(|f| f.class),
            Some(FailureClass::CouldNotObserve)
        );
    }

    #[test]
    fn test_json_shape() {
        let failed = ScenarioResult::errored("boom", &Error::PageError("Uncaught Error: x".to_string()), 1);
        let report = RunReport::new(vec![failed], 1, 1, 1);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        let failure = &json["scenarios"][0]["failure"];
        assert_eq!(failure["category"], "unexpected_page_error");
        assert_eq!(failure["class"], "target_misbehaved");
        assert_eq!(json["failed"], 1);
        assert!(json["scenarios"][0].get("console").is_none());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        RunReport::new(Vec::new(), 0, 0, 0).write_json(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"passed\": 0"));
    }
}
