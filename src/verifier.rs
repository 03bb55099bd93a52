//! Checkpoint verification
//!
//! A checkpoint reads every hooked global in one runtime call, so all of its
//! expectations observe the same instant, then evaluates each expectation
//! independently. Failures never short-circuit: a checkpoint with K failing
//! expectations reports K failures.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::common::{Error, Result};
use crate::probe::{ConsoleBuffer, ConsoleLine};
use crate::session::Session;

/// Depth limit for serialized snapshots
const SNAPSHOT_DEPTH: u32 = 8;

/// Deserialize a present field as `Some`, even when it is `null`
fn explicit<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// An assertion over one field of the hooked state
///
/// Every stated condition must hold.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    /// Dotted path; the first segment may name a hooked global
    pub field: String,
    #[serde(default, deserialize_with = "explicit")]
    pub equals: Option<Value>,
    #[serde(default, deserialize_with = "explicit")]
    pub not_equals: Option<Value>,
    pub truthy: Option<bool>,
    pub one_of: Option<Vec<Value>>,
    /// Substring, array element or object key
    pub contains: Option<Value>,
    /// Whether the field holds a non-null value
    ///
    /// Snapshots carry JavaScript `undefined` as `null`, so a field that is
    /// present but `null` counts as absent.
    pub exists: Option<bool>,
    pub greater_than: Option<f64>,
    pub less_than: Option<f64>,
}

impl Expectation {
    pub fn field(path: &str) -> Self {
        Self {
            field: path.to_string(),
            ..Default::default()
        }
    }

    pub fn equals(mut self, value: impl Into<Value>) -> Self {
        self.equals = Some(value.into());
        self
    }

    pub fn not_equals(mut self, value: impl Into<Value>) -> Self {
        self.not_equals = Some(value.into());
        self
    }

    pub fn truthy(mut self, truthy: bool) -> Self {
        self.truthy = Some(truthy);
        self
    }

    pub fn one_of<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn contains(mut self, value: impl Into<Value>) -> Self {
        self.contains = Some(value.into());
        self
    }

    pub fn exists(mut self, exists: bool) -> Self {
        self.exists = Some(exists);
        self
    }

    pub fn greater_than(mut self, n: f64) -> Self {
        self.greater_than = Some(n);
        self
    }

    pub fn less_than(mut self, n: f64) -> Self {
        self.less_than = Some(n);
        self
    }

    /// Number of stated conditions
    pub fn condition_count(&self) -> usize {
        [
            self.equals.is_some(),
            self.not_equals.is_some(),
            self.truthy.is_some(),
            self.one_of.is_some(),
            self.contains.is_some(),
            self.exists.is_some(),
            self.greater_than.is_some(),
            self.less_than.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Human-readable form, e.g. `showQuestLog == true`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = &self.equals {
            parts.push(format!("== {v}"));
        }
        if let Some(v) = &self.not_equals {
            parts.push(format!("!= {v}"));
        }
        if let Some(t) = self.truthy {
            parts.push(if t { "is truthy" } else { "is falsy" }.to_string());
        }
        if let Some(values) = &self.one_of {
            let values: Vec<_> = values.iter().map(Value::to_string).collect();
            parts.push(format!("in [{}]", values.join(", ")));
        }
        if let Some(v) = &self.contains {
            parts.push(format!("contains {v}"));
        }
        if let Some(e) = self.exists {
            parts.push(if e { "exists" } else { "is absent" }.to_string());
        }
        if let Some(n) = self.greater_than {
            parts.push(format!("> {n}"));
        }
        if let Some(n) = self.less_than {
            parts.push(format!("< {n}"));
        }
        format!("{} {}", self.field, parts.join(" and "))
    }

    /// Check every condition against `actual` (`None` when the path is missing)
    fn failures(&self, actual: Option<&Value>) -> Vec<String> {
        let value = actual.unwrap_or(&Value::Null);
        let shown = actual.map(Value::to_string).unwrap_or_else(|| "undefined".to_string());
        let mut failures = Vec::new();

        if let Some(expected) = &self.equals {
            if !values_equal(value, expected) {
                failures.push(format!("expected {} == {expected}, got {shown}", self.field));
            }
        }
        if let Some(unexpected) = &self.not_equals {
            if values_equal(value, unexpected) {
                failures.push(format!("expected {} != {unexpected}", self.field));
            }
        }
        if let Some(want) = self.truthy {
            if is_truthy(value) != want {
                let word = if want { "truthy" } else { "falsy" };
                failures.push(format!("expected {} to be {word}, got {shown}", self.field));
            }
        }
        if let Some(options) = &self.one_of {
            if !options.iter().any(|o| values_equal(value, o)) {
                failures.push(format!(
                    "expected {} to be one of {}, got {shown}",
                    self.field,
                    Value::Array(options.clone())
                ));
            }
        }
        if let Some(needle) = &self.contains {
            if !contains(value, needle) {
                failures.push(format!("expected {} to contain {needle}, got {shown}", self.field));
            }
        }
        if let Some(want) = self.exists {
            let present = !value.is_null();
            if present != want {
                let word = if want { "exist" } else { "be absent" };
                failures.push(format!("expected {} to {word}, got {shown}", self.field));
            }
        }
        if let Some(bound) = self.greater_than {
            if !value.as_f64().is_some_and(|n| n > bound) {
                failures.push(format!("expected {} > {bound}, got {shown}", self.field));
            }
        }
        if let Some(bound) = self.less_than {
            if !value.as_f64().is_some_and(|n| n < bound) {
                failures.push(format!("expected {} < {bound}, got {shown}", self.field));
            }
        }
        failures
    }
}

/// An assertion over the captured console
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConsoleExpectation {
    /// Substring a line must contain to match
    pub contains: String,
    /// Exact number of matching lines
    pub count: Option<usize>,
    /// No line may match
    #[serde(default)]
    pub absent: bool,
}

impl ConsoleExpectation {
    pub fn contains(needle: &str) -> Self {
        Self {
            contains: needle.to_string(),
            ..Default::default()
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn absent(mut self) -> Self {
        self.absent = true;
        self
    }

    pub fn describe(&self) -> String {
        match (self.absent, self.count) {
            (true, _) => format!("console has no line containing {:?}", self.contains),
            (false, Some(n)) => format!("console has {n} line(s) containing {:?}", self.contains),
            (false, None) => format!("console has a line containing {:?}", self.contains),
        }
    }

    fn evaluate(&self, console: Option<&ConsoleBuffer>) -> ExpectationResult {
        let description = self.describe();
        let Some(console) = console else {
            return ExpectationResult::failed(
                description,
                Value::Null,
                vec!["console capture is not installed".to_string()],
            );
        };

        let matched = console.matching(&self.contains).len();
        let failure = match (self.absent, self.count) {
            (true, _) if matched > 0 => Some(format!("found {matched} matching line(s)")),
            (false, Some(n)) if matched != n => Some(format!("expected {n}, found {matched}")),
            (false, None) if matched == 0 => Some("no matching line".to_string()),
            _ => None,
        };

        let actual = json!(matched);
        match failure {
            Some(f) => ExpectationResult::failed(description, actual, vec![f]),
            None => ExpectationResult::passed(description, actual),
        }
    }
}

/// A named set of expectations evaluated at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub name: String,
    pub expect: Vec<Expectation>,
    pub console: Vec<ConsoleExpectation>,
}

impl Checkpoint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expect.push(expectation);
        self
    }

    pub fn console(mut self, expectation: ConsoleExpectation) -> Self {
        self.console.push(expectation);
        self
    }

    pub fn len(&self) -> usize {
        self.expect.len() + self.console.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one expectation
#[derive(Debug, Clone, Serialize)]
pub struct ExpectationResult {
    pub description: String,
    pub passed: bool,
    /// Observed value (`null` when missing)
    pub actual: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl ExpectationResult {
    fn passed(description: String, actual: Value) -> Self {
        Self {
            description,
            passed: true,
            actual,
            failures: Vec::new(),
        }
    }

    fn failed(description: String, actual: Value, failures: Vec<String>) -> Self {
        Self {
            description,
            passed: false,
            actual,
            failures,
        }
    }
}

/// Outcome of one checkpoint
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointResult {
    pub name: String,
    pub passed: bool,
    pub expectations: Vec<ExpectationResult>,
}

impl CheckpointResult {
    /// Failing expectations, in declaration order
    pub fn failures(&self) -> impl Iterator<Item = &ExpectationResult> {
        self.expectations.iter().filter(|e| !e.passed)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// State read back from the page at one instant
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Hooked global names in installation order
    globals: Vec<String>,
    values: Map<String, Value>,
}

impl Snapshot {
    pub fn new(globals: Vec<String>, values: Map<String, Value>) -> Self {
        Self { globals, values }
    }

    /// Resolve a field path
    ///
    /// The longest hooked global that prefixes the path is used as root;
    /// otherwise the path is resolved inside the first hooked global.
    pub fn lookup(&self, field: &str) -> std::result::Result<Option<&Value>, String> {
        let root = self
            .globals
            .iter()
            .filter(|g| field == g.as_str() || field.starts_with(&format!("{g}.")))
            .max_by_key(|g| g.len());

        let (global, rest) = match root {
            Some(g) => (g.as_str(), field[g.len()..].trim_start_matches('.')),
            None => match self.globals.first() {
                Some(g) => (g.as_str(), field),
                None => return Err("no globals are hooked".to_string()),
            },
        };

        let mut current = match self.values.get(global) {
            Some(v) => v,
            None => return Ok(None),
        };
        for part in rest.split('.').filter(|p| !p.is_empty()) {
            current = match current {
                Value::Object(map) => match map.get(part) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                Value::Array(items) => match part.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
        }
        Ok(Some(current))
    }
}

/// Evaluate a checkpoint against an already captured snapshot
pub fn evaluate(
    checkpoint: &Checkpoint,
    snapshot: &Snapshot,
    console: Option<&ConsoleBuffer>,
) -> CheckpointResult {
    let mut expectations = Vec::with_capacity(checkpoint.len());

    for expectation in &checkpoint.expect {
        let description = expectation.describe();
        let result = match snapshot.lookup(&expectation.field) {
            Ok(actual) => {
                let failures = expectation.failures(actual);
                let actual = actual.cloned().unwrap_or(Value::Null);
                if failures.is_empty() {
                    ExpectationResult::passed(description, actual)
                } else {
                    ExpectationResult::failed(description, actual, failures)
                }
            }
            Err(reason) => ExpectationResult::failed(description, Value::Null, vec![reason]),
        };
        expectations.push(result);
    }

    for expectation in &checkpoint.console {
        expectations.push(expectation.evaluate(console));
    }

    CheckpointResult {
        name: checkpoint.name.clone(),
        passed: expectations.iter().all(|e| e.passed),
        expectations,
    }
}

/// Read every hooked global in one runtime call
pub async fn read_snapshot(session: &mut Session) -> Result<Snapshot> {
    let globals = session.hooked_globals();
    if globals.is_empty() {
        return Ok(Snapshot::new(globals, Map::new()));
    }

    let reply = session
        .page()?
        .call_runtime("snapshot", vec![json!(globals), json!(SNAPSHOT_DEPTH)])
        .await?;
    match reply {
        Value::Object(values) => Ok(Snapshot::new(globals, values)),
        other => Err(Error::script(
            "snapshot",
            format!("expected an object from the runtime, got {other}"),
        )),
    }
}

/// Snapshot the session and evaluate a checkpoint
#[tracing::instrument(skip_all, fields(session = session.id(), checkpoint = %checkpoint.name))]
pub async fn checkpoint(session: &mut Session, checkpoint: &Checkpoint) -> Result<CheckpointResult> {
    let snapshot = read_snapshot(session).await?;
    session.drain_events();
    let result = evaluate(checkpoint, &snapshot, session.console());

    if result.passed {
        tracing::debug!("Checkpoint passed");
    } else {
        tracing::debug!(failures = result.failure_count(), "Checkpoint failed");
    }
    Ok(result)
}

/// Re-evaluate a checkpoint until it passes or `timeout` elapses
///
/// Returns the last evaluated result either way.
pub async fn poll_until(
    session: &mut Session,
    target: &Checkpoint,
    timeout: Duration,
    poll: Duration,
) -> Result<CheckpointResult> {
    let poll = poll.max(Duration::from_millis(1));
    let started = Instant::now();
    loop {
        let result = checkpoint(session, target).await?;
        let waited = started.elapsed();
        if result.passed || waited >= timeout {
            return Ok(result);
        }
        tokio::time::sleep(poll.min(timeout - waited)).await;
    }
}

/// Captured console lines matching `predicate`, in arrival order
pub fn filter_console<F>(session: &mut Session, predicate: F) -> Vec<ConsoleLine>
where
    F: FnMut(&ConsoleLine) -> bool,
{
    session.drain_events();
    match session.console() {
        Some(console) => console.filter(predicate).into_iter().cloned().collect(),
        None => Vec::new(),
    }
}

/// Loose equality for JSON values: numbers compare numerically
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// JavaScript truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
