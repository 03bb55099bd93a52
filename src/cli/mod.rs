//! CLI command handling
//!
//! Dispatches CLI commands and formats output. Returns whether the command
//! succeeded so `main` can pick the exit code.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::browser::CdpBrowser;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::scenario::{self, Scenario};
use crate::testing::Orchestrator;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, mut config: Config) -> Result<bool> {
    match command {
        Commands::Run {
            paths,
            filter,
            headful,
            parallel,
            base_url,
            timeout,
            json,
            report,
        } => {
            if headful {
                config.browser.headless = false;
            }
            if parallel {
                config.run.parallel = true;
            }
            if let Some(base_url) = base_url {
                config.defaults.base_url = Some(base_url);
            }
            if let Some(secs) = timeout {
                config.timeouts.scenario_secs = secs;
            }

            let scenarios = scenario::load_all(&paths, filter.as_deref())?;
            if scenarios.is_empty() {
                return Err(Error::Config(format!(
                    "No scenarios found in {}",
                    display_paths(&paths)
                )));
            }
            ensure_valid(&scenarios, &config)?;

            let browser = CdpBrowser::launch(
                &config.browser,
                Duration::from_secs(config.timeouts.launch_secs),
            )
            .await?;

            let mut orchestrator = Orchestrator::new(Arc::new(browser), config);
            for scenario in scenarios {
                orchestrator.register(scenario);
            }

            if !json {
                println!(
                    "{} {} scenario(s)",
                    "Running".blue().bold(),
                    orchestrator.scenarios().len()
                );
            }

            let run = orchestrator.run_all().await;

            if let Err(e) = orchestrator.controller().shutdown().await {
                tracing::warn!(error = %e, "Browser shutdown failed");
            }

            if json {
                println!("{}", run.to_json()?);
            } else {
                run.print_summary();
            }
            if let Some(path) = report {
                run.write_json(&path)?;
                if !json {
                    println!("Report written to {}", path.display());
                }
            }

            Ok(run.success())
        }

        Commands::List { paths } => {
            let scenarios = scenario::load_all(&paths, None)?;
            if scenarios.is_empty() {
                println!("No scenarios found in {}", display_paths(&paths));
                return Ok(true);
            }

            for scenario in &scenarios {
                let source = scenario
                    .source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {} step(s), {} checkpoint(s)  {}",
                    scenario.name.bold(),
                    scenario.steps.len(),
                    scenario.checkpoint_count(),
                    source.dimmed()
                );
                if let Some(description) = &scenario.description {
                    println!("  {}", description.dimmed());
                }
            }
            Ok(true)
        }

        Commands::Validate { paths } => {
            let scenarios = scenario::load_all(&paths, None)?;
            let mut valid = true;
            for scenario in &scenarios {
                match scenario.validate(&config.defaults) {
                    Ok(()) => println!("  {} {}", "✓".green(), scenario.name),
                    Err(e) => {
                        valid = false;
                        println!("  {} {}", "✗".red(), e);
                    }
                }
            }

            if valid {
                println!("\n{} {} scenario(s) valid", "✓".green().bold(), scenarios.len());
            } else {
                println!("\n{} Some scenarios are invalid", "✗".red().bold());
            }
            Ok(valid)
        }
    }
}

/// Refuse to start a browser for scenarios that can't run
fn ensure_valid(scenarios: &[Scenario], config: &Config) -> Result<()> {
    let mut errors: Vec<Error> = scenarios
        .iter()
        .filter_map(|s| s.validate(&config.defaults).err())
        .collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        n => {
            for e in &errors {
                eprintln!("  {} {}", "✗".red(), e);
            }
            Err(Error::Config(format!(
                "{n} scenarios are invalid; run 'harness validate' for details"
            )))
        }
    }
}

fn display_paths(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
