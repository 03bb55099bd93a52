//! Scenario definitions
//!
//! A scenario is pure data: a target, the probes it needs, and an ordered
//! list of steps mixing input actions with checkpoints. Scenarios are read
//! from YAML files or built in code, then planned into sequencer actions and
//! verifier checkpoints against the effective defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::browser::KeyDefinition;
use crate::common::config::{Config, Defaults, Timeouts, Viewport};
use crate::common::{Error, Result};
use crate::probe::ProbeSet;
use crate::sequencer::Action;
use crate::session::SessionConfig;
use crate::verifier::{Checkpoint, ConsoleExpectation, Expectation};

/// A complete scenario
///
/// Unknown keys are rejected everywhere in the format: a misspelled
/// `settle_ms` or `timeout_ms` would otherwise fall back to a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Name shown in reports
    pub name: String,
    pub description: Option<String>,
    /// Where to point the session
    pub target: Target,
    /// Instrumentation to install
    #[serde(default)]
    pub probes: ProbeSet,
    /// Actions interleaved with checkpoints
    pub steps: Vec<Step>,
    /// Wall-clock budget; the configured scenario timeout when unset
    pub timeout_ms: Option<u64>,
    /// May run concurrently with other parallel-safe scenarios
    #[serde(default)]
    pub parallel_safe: bool,
    /// Fail when the page raises an uncaught error
    #[serde(default = "default_true")]
    pub fail_on_page_error: bool,
    #[serde(default)]
    pub diagnostics: Diagnostics,
    /// File the scenario was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Navigation target
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// Absolute URL, or a path joined onto `defaults.base_url`
    pub url: String,
    /// Extra query parameters; an empty value removes the parameter
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    pub viewport: Option<Viewport>,
}

/// Report diagnostics settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Diagnostics {
    /// Only console lines containing this go into the report excerpt
    pub console_filter: Option<String>,
}

/// A single scenario step
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    KeyDown {
        key: String,
        settle_ms: Option<u64>,
    },
    KeyUp {
        key: String,
        settle_ms: Option<u64>,
    },
    /// Key down, optional hold, key up
    Press {
        key: String,
        #[serde(default)]
        hold_ms: u64,
        settle_ms: Option<u64>,
    },
    /// Press each character of `text` in order
    Type {
        text: String,
        settle_ms: Option<u64>,
    },
    Click {
        x: f64,
        y: f64,
        settle_ms: Option<u64>,
    },
    Navigate {
        url: String,
        settle_ms: Option<u64>,
    },
    Wait {
        ms: u64,
    },
    /// Run a script in the page
    Eval {
        script: String,
        settle_ms: Option<u64>,
    },
    /// Poll expectations until they hold or the timeout elapses
    WaitUntil {
        name: Option<String>,
        #[serde(default)]
        expect: Vec<Expectation>,
        #[serde(default)]
        console: Vec<ConsoleExpectation>,
        timeout_ms: u64,
        poll_ms: Option<u64>,
    },
    Checkpoint {
        name: String,
        #[serde(default)]
        expect: Vec<Expectation>,
        #[serde(default)]
        console: Vec<ConsoleExpectation>,
    },
}

impl Step {
    fn set_settle(&mut self, ms: u64) {
        match self {
            Step::KeyDown { settle_ms, .. }
            | Step::KeyUp { settle_ms, .. }
            | Step::Press { settle_ms, .. }
            | Step::Type { settle_ms, .. }
            | Step::Click { settle_ms, .. }
            | Step::Navigate { settle_ms, .. }
            | Step::Eval { settle_ms, .. } => *settle_ms = Some(ms),
            Step::Wait { .. } | Step::WaitUntil { .. } | Step::Checkpoint { .. } => {}
        }
    }
}

/// A planned step, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Consecutive input actions
    Actions(Vec<Action>),
    Checkpoint(Checkpoint),
    WaitUntil {
        checkpoint: Checkpoint,
        timeout: Duration,
        poll: Duration,
    },
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            target: Target::default(),
            probes: ProbeSet::default(),
            steps: Vec::new(),
            timeout_ms: None,
            parallel_safe: false,
            fail_on_page_error: true,
            diagnostics: Diagnostics::default(),
            source: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.target.url = url.to_string();
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.target.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.target.viewport = Some(Viewport { width, height });
        self
    }

    /// Hook a global exposed by the target
    pub fn global(mut self, name: &str) -> Self {
        self.probes.globals.push(name.to_string());
        self
    }

    pub fn without_console(mut self) -> Self {
        self.probes.console = false;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn parallel_safe(mut self) -> Self {
        self.parallel_safe = true;
        self
    }

    pub fn allow_page_errors(mut self) -> Self {
        self.fail_on_page_error = false;
        self
    }

    pub fn console_filter(mut self, filter: &str) -> Self {
        self.diagnostics.console_filter = Some(filter.to_string());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn key_down(self, key: &str) -> Self {
        self.step(Step::KeyDown {
            key: key.to_string(),
            settle_ms: None,
        })
    }

    pub fn key_up(self, key: &str) -> Self {
        self.step(Step::KeyUp {
            key: key.to_string(),
            settle_ms: None,
        })
    }

    pub fn press(self, key: &str) -> Self {
        self.hold(key, 0)
    }

    pub fn hold(self, key: &str, hold_ms: u64) -> Self {
        self.step(Step::Press {
            key: key.to_string(),
            hold_ms,
            settle_ms: None,
        })
    }

    pub fn type_text(self, text: &str) -> Self {
        self.step(Step::Type {
            text: text.to_string(),
            settle_ms: None,
        })
    }

    pub fn click(self, x: f64, y: f64) -> Self {
        self.step(Step::Click {
            x,
            y,
            settle_ms: None,
        })
    }

    pub fn navigate(self, url: &str) -> Self {
        self.step(Step::Navigate {
            url: url.to_string(),
            settle_ms: None,
        })
    }

    pub fn wait(self, ms: u64) -> Self {
        self.step(Step::Wait { ms })
    }

    pub fn eval(self, script: &str) -> Self {
        self.step(Step::Eval {
            script: script.to_string(),
            settle_ms: None,
        })
    }

    /// Set the settle time of the most recent input step
    pub fn settle(mut self, ms: u64) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.set_settle(ms);
        }
        self
    }

    pub fn checkpoint(self, checkpoint: Checkpoint) -> Self {
        self.step(Step::Checkpoint {
            name: checkpoint.name,
            expect: checkpoint.expect,
            console: checkpoint.console,
        })
    }

    pub fn wait_until(self, checkpoint: Checkpoint, timeout_ms: u64) -> Self {
        self.step(Step::WaitUntil {
            name: Some(checkpoint.name),
            expect: checkpoint.expect,
            console: checkpoint.console,
            timeout_ms,
            poll_ms: None,
        })
    }

    /// Number of checkpoints (including wait_until steps)
    pub fn checkpoint_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Checkpoint { .. } | Step::WaitUntil { .. }))
            .count()
    }

    /// Resolve steps into sequencer actions and checkpoints
    pub fn plan(&self, defaults: &Defaults) -> Result<Vec<PlanStep>> {
        let settle = |ms: Option<u64>| Duration::from_millis(ms.unwrap_or(defaults.settle_ms));
        let key = |index: usize, name: &str| {
            KeyDefinition::parse(name)
                .map_err(|e| Error::invalid_scenario(&self.name, format!("step {}: {e}", index + 1)))
        };

        let mut plan = Vec::new();
        let mut actions = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                Step::KeyDown { key: k, settle_ms } => actions.push(Action::KeyDown {
                    key: key(index, k)?,
                    settle: settle(*settle_ms),
                }),
                Step::KeyUp { key: k, settle_ms } => actions.push(Action::KeyUp {
                    key: key(index, k)?,
                    settle: settle(*settle_ms),
                }),
                Step::Press {
                    key: k,
                    hold_ms,
                    settle_ms,
                } => actions.push(Action::Press {
                    key: key(index, k)?,
                    hold: Duration::from_millis(*hold_ms),
                    settle: settle(*settle_ms),
                }),
                Step::Type { text, settle_ms } => {
                    for c in text.chars() {
                        let definition = KeyDefinition::from_char(c).map_err(|e| {
                            Error::invalid_scenario(&self.name, format!("step {}: {e}", index + 1))
                        })?;
                        actions.push(Action::press(definition, settle(*settle_ms)));
                    }
                }
                Step::Click { x, y, settle_ms } => actions.push(Action::Click {
                    x: *x,
                    y: *y,
                    settle: settle(*settle_ms),
                }),
                Step::Navigate { url, settle_ms } => actions.push(Action::Navigate {
                    url: url.clone(),
                    settle: settle(*settle_ms),
                }),
                Step::Wait { ms } => actions.push(Action::Wait(Duration::from_millis(*ms))),
                Step::Eval { script, settle_ms } => actions.push(Action::Eval {
                    script: script.clone(),
                    settle: settle(*settle_ms),
                }),
                Step::Checkpoint {
                    name,
                    expect,
                    console,
                } => {
                    if !actions.is_empty() {
                        plan.push(PlanStep::Actions(std::mem::take(&mut actions)));
                    }
                    plan.push(PlanStep::Checkpoint(Checkpoint {
                        name: name.clone(),
                        expect: expect.clone(),
                        console: console.clone(),
                    }));
                }
                Step::WaitUntil {
                    name,
                    expect,
                    console,
                    timeout_ms,
                    poll_ms,
                } => {
                    if !actions.is_empty() {
                        plan.push(PlanStep::Actions(std::mem::take(&mut actions)));
                    }
                    plan.push(PlanStep::WaitUntil {
                        checkpoint: Checkpoint {
                            name: name.clone().unwrap_or_else(|| format!("wait until (step {})", index + 1)),
                            expect: expect.clone(),
                            console: console.clone(),
                        },
                        timeout: Duration::from_millis(*timeout_ms),
                        poll: Duration::from_millis(poll_ms.unwrap_or(defaults.probe_poll_ms).max(1)),
                    });
                }
            }
        }
        if !actions.is_empty() {
            plan.push(PlanStep::Actions(actions));
        }
        Ok(plan)
    }

    /// Check the scenario without a browser
    pub fn validate(&self, defaults: &Defaults) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(Error::invalid_scenario(&self.name, reason)) };

        if self.name.trim().is_empty() {
            return Err(Error::invalid_scenario("<unnamed>", "name is empty"));
        }
        if self.target.url.trim().is_empty() {
            return invalid("target.url is empty".to_string());
        }
        if self.steps.is_empty() {
            return invalid("no steps".to_string());
        }
        if self.timeout_ms == Some(0) {
            return invalid("timeout_ms must be greater than zero".to_string());
        }
        if self.probes.globals.iter().any(|g| g.trim().is_empty()) {
            return invalid("probes.globals contains an empty name".to_string());
        }

        let plan = self.plan(defaults)?;
        if !plan
            .iter()
            .any(|s| matches!(s, PlanStep::Checkpoint(_) | PlanStep::WaitUntil { .. }))
        {
            return invalid("no checkpoints; nothing would be verified".to_string());
        }

        for step in &plan {
            let checkpoint = match step {
                PlanStep::Checkpoint(c) | PlanStep::WaitUntil { checkpoint: c, .. } => c,
                PlanStep::Actions(_) => continue,
            };
            if checkpoint.is_empty() {
                return invalid(format!("checkpoint '{}' has no expectations", checkpoint.name));
            }
            if !checkpoint.expect.is_empty() && self.probes.globals.is_empty() {
                return invalid(format!(
                    "checkpoint '{}' reads state but probes.globals is empty",
                    checkpoint.name
                ));
            }
            if !checkpoint.console.is_empty() && !self.probes.console {
                return invalid(format!(
                    "checkpoint '{}' reads the console but console capture is disabled",
                    checkpoint.name
                ));
            }
            for expectation in &checkpoint.expect {
                if expectation.field.trim().is_empty() {
                    return invalid(format!("checkpoint '{}' has an empty field", checkpoint.name));
                }
                if expectation.condition_count() == 0 {
                    return invalid(format!(
                        "expectation on '{}' in checkpoint '{}' states no condition",
                        expectation.field, checkpoint.name
                    ));
                }
            }
            if checkpoint.console.iter().any(|c| c.contains.is_empty()) {
                return invalid(format!(
                    "checkpoint '{}' has an empty console match",
                    checkpoint.name
                ));
            }
        }
        Ok(())
    }

    /// Absolute navigation URL with the merged query parameters
    pub fn target_url(&self, defaults: &Defaults) -> Result<String> {
        let mut url = match url::Url::parse(&self.target.url) {
            Ok(url) => url,
            Err(_) => {
                let Some(base) = defaults.base_url.as_deref() else {
                    return Err(Error::invalid_scenario(
                        &self.name,
                        format!(
                            "relative url '{}' needs defaults.base_url or --base-url",
                            self.target.url
                        ),
                    ));
                };
                url::Url::parse(base)
                    .and_then(|base| base.join(&self.target.url))
                    .map_err(|e| Error::Config(format!("Invalid base URL '{base}': {e}")))?
            }
        };

        let mut merged = defaults.query.clone();
        merged.extend(self.target.query.clone());

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !merged.contains_key(k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let added: Vec<(&String, &String)> = merged.iter().filter(|(_, v)| !v.is_empty()).collect();

        if kept.is_empty() && added.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            for (k, v) in added {
                pairs.append_pair(k, v);
            }
        }
        Ok(url.into())
    }

    /// Session settings for this scenario
    pub fn session_config(&self, config: &Config) -> Result<SessionConfig> {
        Ok(SessionConfig {
            url: self.target_url(&config.defaults)?,
            viewport: self.target.viewport.unwrap_or(config.defaults.viewport),
            navigation_timeout: Duration::from_secs(config.timeouts.navigation_secs),
        })
    }

    /// Wall-clock budget
    pub fn timeout(&self, timeouts: &Timeouts) -> Duration {
        match self.timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(timeouts.scenario_secs),
        }
    }
}

/// Load every scenario in a YAML file
///
/// A file holds either one scenario or a list under `scenarios:`.
pub fn load_file(path: &Path) -> Result<Vec<Scenario>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let label = path.display().to_string();

    let document: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| Error::invalid_scenario(&label, e))?;

    let mut scenarios = match document.get("scenarios") {
        Some(list) => serde_yaml::from_value::<Vec<Scenario>>(list.clone()),
        None => serde_yaml::from_value::<Scenario>(document).map(|s| vec![s]),
    }
    .map_err(|e| Error::invalid_scenario(&label, e))?;

    for scenario in &mut scenarios {
        scenario.source = Some(path.to_path_buf());
    }
    Ok(scenarios)
}

fn is_scenario_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Expand files and directories into scenario files, sorted per directory
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut found)?;
        } else if path.exists() {
            found.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_scenario_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Discover and load scenarios, optionally keeping only names containing `filter`
pub fn load_all(paths: &[PathBuf], filter: Option<&str>) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    for file in discover(paths)? {
        scenarios.extend(load_file(&file)?);
    }
    if let Some(filter) = filter {
        scenarios.retain(|s| s.name.contains(filter));
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEST_LOG: &str = r#"
name: quest log hotkey
target:
  url: /play
probes:
  globals: [gameState]
steps:
  - action: press
    key: q
    settle_ms: 300
  - action: checkpoint
    name: quest log open
    expect:
      - field: showQuestLog
        equals: true
  - action: press
    key: Escape
  - action: checkpoint
    name: quest log closed
    expect:
      - field: showQuestLog
        equals: false
"#;

    fn defaults() -> Defaults {
        Defaults {
            base_url: Some("http://localhost:8080".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_and_plan() {
        let scenario: Scenario = serde_yaml::from_str(QUEST_LOG).unwrap();
        assert!(scenario.fail_on_page_error);
        assert!(scenario.probes.console);
        scenario.validate(&defaults()).unwrap();

        let plan = scenario.plan(&defaults()).unwrap();
        assert_eq!(plan.len(), 4);
        match &plan[0] {
            PlanStep::Actions(actions) => {
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].settle(), Duration::from_millis(300));
            }
            other => panic!("expected actions, got {other:?}"),
        }
        match &plan[2] {
            PlanStep::Actions(actions) => assert_eq!(actions[0].settle(), Duration::from_millis(100)),
            other => panic!("expected actions, got {other:?}"),
        }
        assert!(matches!(&plan[3], PlanStep::Checkpoint(c) if c.name == "quest log closed"));
    }

    #[test]
    fn test_target_url_merges_query() {
        let scenario = Scenario::new("q").url("/play?seed=7");
        assert_eq!(
            scenario.target_url(&defaults()).unwrap(),
            "http://localhost:8080/play?seed=7&agent=1"
        );

        let scenario = Scenario::new("q").url("http://127.0.0.1:3000/?agent=0").query("debug", "1");
        assert_eq!(
            scenario.target_url(&defaults()).unwrap(),
            "http://127.0.0.1:3000/?agent=1&debug=1"
        );

        let scenario = Scenario::new("q").url("/play").query("agent", "");
        assert_eq!(
            scenario.target_url(&defaults()).unwrap(),
            "http://localhost:8080/play"
        );
    }

    #[test]
    fn test_relative_url_without_base_is_invalid() {
        let err = Scenario::new("q").url("/play").target_url(&Defaults::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidScenario { .. }));
    }

    #[test]
    fn test_type_expands_to_presses() {
        let scenario = Scenario::new("typing").url("/").type_text("hi!").settle(5);
        let plan = scenario.plan(&defaults()).unwrap();
        let PlanStep::Actions(actions) = &plan[0] else {
            panic!("expected actions");
        };
        let shown: Vec<_> = actions.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["press h", "press i", "press !"]);
        assert!(actions.iter().all(|a| a.settle() == Duration::from_millis(5)));
    }

    #[test]
    fn test_validation_errors() {
        let d = defaults();
        let base = || Scenario::new("s").url("/").global("gameState");

        assert!(base().validate(&d).is_err(), "no steps");
        assert!(base().press("q").validate(&d).is_err(), "no checkpoint");
        assert!(base()
            .press("hyperspace")
            .checkpoint(Checkpoint::new("c").expect(Expectation::field("x").exists(true)))
            .validate(&d)
            .is_err());
        assert!(base()
            .press("q")
            .checkpoint(Checkpoint::new("empty"))
            .validate(&d)
            .is_err());
        assert!(base()
            .checkpoint(Checkpoint::new("c").expect(Expectation::field("x")))
            .validate(&d)
            .is_err());
        assert!(Scenario::new("s")
            .url("/")
            .checkpoint(Checkpoint::new("c").expect(Expectation::field("x").truthy(true)))
            .validate(&d)
            .is_err());
        assert!(base()
            .press("q")
            .checkpoint(Checkpoint::new("c").expect(Expectation::field("x").truthy(true)))
            .validate(&d)
            .is_ok());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let yaml = "name: s\ntarget: { url: / }\nsteps:\n  - action: teleport\n    to: town\n";
        assert!(serde_yaml::from_str::<Scenario>(yaml).is_err());
    }

    #[test]
    fn test_misspelled_keys_are_rejected() {
        let step_typo = QUEST_LOG.replace("settle_ms: 300", "settle: 900");
        let err = serde_yaml::from_str::<Scenario>(&step_typo).unwrap_err();
        assert!(err.to_string().contains("settle"), "{err}");

        let top_level_typo = format!("timeuot_ms: 500\n{QUEST_LOG}");
        let err = serde_yaml::from_str::<Scenario>(&top_level_typo).unwrap_err();
        assert!(err.to_string().contains("timeuot_ms"), "{err}");

        let nested_typo = QUEST_LOG.replace("  url: /play", "  url: /play\n  viewpor: { width: 1, height: 1 }");
        assert!(serde_yaml::from_str::<Scenario>(&nested_typo).is_err());
        assert!(serde_yaml::from_str::<Scenario>(QUEST_LOG).is_ok());
    }

    #[test]
    fn test_load_file_reports_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.yaml");
        std::fs::write(&path, QUEST_LOG.replace("settle_ms: 300", "settle: 900")).unwrap();

        match load_file(&path) {
            Err(Error::InvalidScenario { reason, .. }) => assert!(reason.contains("unknown field"), "{reason}"),
            other => panic!("expected InvalidScenario, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_falls_back_to_config() {
        let timeouts = Timeouts::default();
        assert_eq!(Scenario::new("s").timeout(&timeouts), Duration::from_secs(120));
        assert_eq!(
            Scenario::new("s").timeout_ms(250).timeout(&timeouts),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_load_file_with_scenario_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        std::fs::write(
            &path,
            "scenarios:\n  - name: a\n    target: { url: / }\n    steps: [{ action: wait, ms: 1 }]\n  - name: b\n    target: { url: / }\n    steps: [{ action: wait, ms: 2 }]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = load_all(&[dir.path().to_path_buf()], None).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(scenarios[0].source.as_deref(), Some(path.as_path()));

        let filtered = load_all(&[path], Some("b")).unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
