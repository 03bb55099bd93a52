//! Scenario orchestration
//!
//! Runs registered scenarios, each in its own fresh session, and turns every
//! outcome into a [`ScenarioResult`]. A scenario's failure is caught at this
//! boundary and never stops the scenarios after it. Every opened session is
//! closed on every exit path, including budget expiry.

use std::sync::Arc;

use tokio::time::Instant;

use crate::browser::BrowserDriver;
use crate::common::config::Config;
use crate::common::{Error, FailureCategory, Result};
use crate::probe::{ConsoleLine, Injector};
use crate::scenario::{PlanStep, Scenario};
use crate::sequencer::Sequencer;
use crate::session::{Session, SessionController};
use crate::verifier::{self, CheckpointResult};

use super::report::{Failure, RunReport, ScenarioResult};

/// Registry and runner of scenarios
pub struct Orchestrator {
    controller: SessionController,
    config: Config,
    injector: Injector,
    sequencer: Sequencer,
    scenarios: Vec<Scenario>,
}

impl Orchestrator {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: Config) -> Self {
        let injector = Injector::new(&config.defaults, &config.console);
        let sequencer = Sequencer::new(config.defaults.probe_wait(), config.defaults.probe_poll());
        Self {
            controller: SessionController::new(driver),
            config,
            injector,
            sequencer,
            scenarios: Vec::new(),
        }
    }

    /// Add a scenario; report order follows registration order
    pub fn register(&mut self, scenario: Scenario) -> &mut Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every registered scenario
    ///
    /// Sequential unless `run.parallel` is set, in which case scenarios
    /// marked `parallel_safe` run concurrently before the rest.
    pub async fn run_all(&self) -> RunReport {
        let started = Instant::now();
        let mut results: Vec<Option<ScenarioResult>> = vec![None; self.scenarios.len()];

        let (concurrent, sequential): (Vec<usize>, Vec<usize>) = (0..self.scenarios.len())
            .partition(|&i| self.config.run.parallel && self.scenarios[i].parallel_safe);

        if !concurrent.is_empty() {
            tracing::info!(count = concurrent.len(), "Running parallel-safe scenarios concurrently");
            let runs = concurrent.iter().map(|&i| async move {
                (i, self.run_scenario(&self.scenarios[i]).await)
            });
            for (i, result) in futures_util::future::join_all(runs).await {
                results[i] = Some(result);
            }
        }

        for i in sequential {
            results[i] = Some(self.run_scenario(&self.scenarios[i]).await);
        }

        let counters = self.controller.counters();
        RunReport::new(
            results.into_iter().flatten().collect(),
            started.elapsed().as_millis() as u64,
            counters.opened(),
            counters.closed(),
        )
    }

    /// Run one scenario in a fresh session
    #[tracing::instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let prepared = scenario
            .session_config(&self.config)
            .and_then(|config| Ok((config, scenario.plan(&self.config.defaults)?)));
        let (session_config, plan) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(error = %e, "Scenario is invalid");
                return ScenarioResult::errored(&scenario.name, &e, elapsed_ms());
            }
        };

        let mut session = match self.controller.open(session_config).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open session");
                return ScenarioResult::errored(&scenario.name, &e, elapsed_ms());
            }
        };

        let budget = scenario.timeout(&self.config.timeouts);
        let mut checkpoints = Vec::new();
        let outcome = tokio::time::timeout(
            budget,
            self.drive(scenario, &plan, &mut session, &mut checkpoints),
        )
        .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(Error::ScenarioTimeout {
                budget_ms: budget.as_millis() as u64,
            }),
        };

        let console = self.excerpt(scenario, &mut session);
        let page_errors = session.page_errors().to_vec();
        let probes = session.probes().to_vec();

        if let Err(e) = self.controller.close(session).await {
            tracing::warn!(error = %e, "Session close failed");
        }

        let failure = match error {
            Some(e) => Some(Failure::from_error(&e)),
            None => checkpoint_failure(&checkpoints),
        };
        let passed = failure.is_none();

        match &failure {
            None => tracing::info!(duration_ms = elapsed_ms(), "Scenario passed"),
            Some(f) => tracing::info!(category = %f.category, message = %f.message, "Scenario failed"),
        }

        ScenarioResult {
            name: scenario.name.clone(),
            passed,
            duration_ms: elapsed_ms(),
            failure,
            checkpoints,
            page_errors,
            console,
            probes,
        }
    }

    /// Scenario body; checkpoint results accumulate outside so they survive cancellation
    async fn drive(
        &self,
        scenario: &Scenario,
        plan: &[PlanStep],
        session: &mut Session,
        checkpoints: &mut Vec<CheckpointResult>,
    ) -> Result<()> {
        self.injector.install(session, &scenario.probes).await?;
        session.navigate_to_target().await?;
        self.injector.install(session, &scenario.probes).await?;

        for step in plan {
            match step {
                PlanStep::Actions(actions) => self.sequencer.run(session, actions).await?,
                PlanStep::Checkpoint(checkpoint) => {
                    checkpoints.push(verifier::checkpoint(session, checkpoint).await?);
                    check_page_errors(scenario, session)?;
                }
                PlanStep::WaitUntil {
                    checkpoint,
                    timeout,
                    poll,
                } => {
                    let result = verifier::poll_until(session, checkpoint, *timeout, *poll).await?;
                    checkpoints.push(result);
                    check_page_errors(scenario, session)?;
                }
            }
        }

        session.drain_events();
        check_page_errors(scenario, session)
    }

    /// Console lines for the report: filter matches, or the last few lines
    fn excerpt(&self, scenario: &Scenario, session: &mut Session) -> Vec<ConsoleLine> {
        match &scenario.diagnostics.console_filter {
            Some(filter) => verifier::filter_console(session, |line| line.text.contains(filter.as_str())),
            None => {
                let mut lines = verifier::filter_console(session, |_| true);
                let keep = self.config.console.excerpt_lines;
                lines.split_off(lines.len().saturating_sub(keep))
            }
        }
    }
}

fn check_page_errors(scenario: &Scenario, session: &Session) -> Result<()> {
    match session.page_errors().first() {
        Some(message) if scenario.fail_on_page_error => Err(Error::PageError(message.clone())),
        _ => Ok(()),
    }
}

fn checkpoint_failure(checkpoints: &[CheckpointResult]) -> Option<Failure> {
    let failed: Vec<_> = checkpoints.iter().filter(|c| !c.passed).collect();
    let first = failed.first()?;
    let reason = first
        .failures()
        .flat_map(|e| e.failures.first())
        .next()
        .cloned()
        .unwrap_or_default();

    let message = if failed.len() == 1 {
        format!("checkpoint '{}' failed: {reason}", first.name)
    } else {
        format!(
            "{} checkpoints failed; first '{}': {reason}",
            failed.len(),
            first.name
        )
    };
    Some(Failure::new(FailureCategory::ExpectationFailure, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockApp, MockBrowser};
    use crate::verifier::{Checkpoint, Expectation};
    use serde_json::json;

    fn config() -> Config {
        let mut config = Config::default();
        config.defaults.base_url = Some("http://localhost:8080".to_string());
        config
    }

    #[tokio::test]
    async fn test_invalid_scenario_does_not_open_session() {
        let browser = MockBrowser::new(MockApp::new());
        let stats = browser.stats();
        let mut orchestrator = Orchestrator::new(Arc::new(browser), config());
        orchestrator.register(Scenario::new("bad key").url("/").press("hyperspace"));

        let report = orchestrator.run_all().await;
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.scenarios[0].category(),
            Some(FailureCategory::InvalidScenario)
        );
        assert_eq!(stats.pages_opened(), 0);
    }

    #[tokio::test]
    async fn test_failed_checkpoints_are_expectation_failures() {
        let app = MockApp::new().global("gameState", json!({ "hp": 3 }));
        let mut orchestrator = Orchestrator::new(Arc::new(MockBrowser::new(app)), config());
        orchestrator.register(
            Scenario::new("hp")
                .url("/")
                .global("gameState")
                .checkpoint(Checkpoint::new("full").expect(Expectation::field("hp").equals(5)))
                .checkpoint(Checkpoint::new("alive").expect(Expectation::field("hp").greater_than(0.0))),
        );

        let report = orchestrator.run_all().await;
        let result = &report.scenarios[0];
        assert!(!result.passed);
        assert_eq!(result.checkpoints.len(), 2);
        assert!(result.checkpoints[1].passed);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.category, FailureCategory::ExpectationFailure);
        assert_eq!(failure.message, "checkpoint 'full' failed: expected hp == 5, got 3");
    }

    #[test]
    fn test_no_failed_checkpoints_means_no_failure() {
        assert!(checkpoint_failure(&[]).is_none());
    }
}
