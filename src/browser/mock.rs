//! Simulated browser for tests
//!
//! Implements the driver traits with a scripted application model instead
//! of a real page. The model behaves like the targets the harness is built
//! for: globals appear some time after load, input is applied on a later
//! tick, key handlers fire on key-down and key-up separately, diagnostic
//! text goes to the console, and the app can throw uncaught errors.
//!
//! Faults can be injected (a key whose dispatch fails at the transport
//! level) to exercise teardown paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::config::Viewport;
use crate::common::{Error, Result};
use crate::probe::RUNTIME_SCRIPT;

use super::driver::{BrowserDriver, ConsoleLevel, KeyPhase, PageDriver, PageEvent, RUNTIME_GLOBAL};
use super::keys::KeyDefinition;

/// A state change the simulated app performs in response to input
#[derive(Debug, Clone)]
pub enum Effect {
    /// Set a dotted path under the app's globals
    Set { path: String, value: Value },
    /// Flip a boolean at a dotted path
    Toggle { path: String },
    /// Add to a number at a dotted path
    Increment { path: String, by: f64 },
    /// Write a line to the console
    Log(String),
    /// Raise an uncaught error
    Throw(String),
}

impl Effect {
    pub fn set(path: &str, value: impl Into<Value>) -> Self {
        Self::Set {
            path: path.to_string(),
            value: value.into(),
        }
    }

    pub fn toggle(path: &str) -> Self {
        Self::Toggle {
            path: path.to_string(),
        }
    }

    pub fn increment(path: &str, by: f64) -> Self {
        Self::Increment {
            path: path.to_string(),
            by,
        }
    }

    pub fn log(text: &str) -> Self {
        Self::Log(text.to_string())
    }

    pub fn throw(message: &str) -> Self {
        Self::Throw(message.to_string())
    }
}

/// Scripted application model
#[derive(Debug, Clone, Default)]
pub struct MockApp {
    globals: Map<String, Value>,
    ready_after: Duration,
    tick: Duration,
    navigation_delay: Duration,
    on_load: Vec<Effect>,
    key_down: HashMap<String, Vec<Effect>>,
    key_up: HashMap<String, Vec<Effect>>,
    on_click: Vec<Effect>,
    scripts: HashMap<String, Vec<Effect>>,
    fail_on_key: Option<String>,
}

impl MockApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a global once the app has loaded
    pub fn global(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_string(), value);
        self
    }

    /// Delay between navigation and the globals appearing
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = delay;
        self
    }

    /// Latency between input and its effect becoming visible
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Time a navigation takes to complete
    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    /// Effects applied as the app finishes loading
    pub fn on_load(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.on_load.extend(effects);
        self
    }

    /// Effects applied on key-down of `key` (DOM key value)
    pub fn on_key_down(mut self, key: &str, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.key_down
            .entry(key.to_string())
            .or_default()
            .extend(effects);
        self
    }

    /// Effects applied on key-up of `key` (DOM key value)
    pub fn on_key_up(mut self, key: &str, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.key_up.entry(key.to_string()).or_default().extend(effects);
        self
    }

    /// Effects applied on any click
    pub fn on_click(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.on_click.extend(effects);
        self
    }

    /// Effects applied when exactly this script is evaluated
    pub fn on_script(mut self, script: &str, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.scripts
            .entry(script.to_string())
            .or_default()
            .extend(effects);
        self
    }

    /// Make dispatching `key` fail as if the browser connection dropped
    pub fn fail_on_key(mut self, key: &str) -> Self {
        self.fail_on_key = Some(key.to_string());
        self
    }
}

/// Page lifecycle counters shared by a mock browser and its pages
#[derive(Debug, Default)]
pub struct MockStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockStats {
    pub fn pages_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of pages open at the same time
    pub fn max_live_pages(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

/// Simulated browser process
pub struct MockBrowser {
    app: MockApp,
    stats: Arc<MockStats>,
}

impl MockBrowser {
    pub fn new(app: MockApp) -> Self {
        Self {
            app,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn open_page(&self, viewport: Viewport) -> Result<Box<dyn PageDriver>> {
        let n = self.stats.opened.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Box::new(MockPage {
            id: format!("mock-{n}"),
            app: self.app.clone(),
            stats: Arc::clone(&self.stats),
            viewport,
            event_tx,
            event_rx: Some(event_rx),
            init_runtime: false,
            runtime_active: false,
            loaded_at: None,
            load_effects_applied: false,
            world: Map::new(),
            pending: Vec::new(),
            held: HashSet::new(),
            closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One simulated page; every page starts from the app's initial state
struct MockPage {
    id: String,
    app: MockApp,
    stats: Arc<MockStats>,
    viewport: Viewport,
    event_tx: mpsc::UnboundedSender<PageEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<PageEvent>>,
    /// Runtime registered as an init script (applies on next navigation)
    init_runtime: bool,
    /// Runtime present in the current document
    runtime_active: bool,
    loaded_at: Option<Instant>,
    load_effects_applied: bool,
    world: Map<String, Value>,
    pending: Vec<(Instant, Effect)>,
    held: HashSet<String>,
    closed: bool,
}

impl MockPage {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn is_ready(&self) -> bool {
        self.loaded_at
            .map(|at| at.elapsed() >= self.app.ready_after)
            .unwrap_or(false)
    }

    /// Advance the simulated app to the current instant
    fn advance(&mut self) {
        if !self.is_ready() {
            return;
        }
        if !self.load_effects_applied {
            self.load_effects_applied = true;
            self.world = self.app.globals.clone();
            let ready_at = self
                .loaded_at
                .map(|at| at + self.app.ready_after)
                .unwrap_or_else(Instant::now);
            for effect in self.app.on_load.clone() {
                self.apply(effect, ready_at);
            }
        }
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(at, _)| *at <= now);
        self.pending = later;
        for (at, effect) in due {
            self.apply(effect, at);
        }
    }

    fn schedule(&mut self, effects: Vec<Effect>) {
        let due = Instant::now() + self.app.tick;
        self.pending.extend(effects.into_iter().map(|e| (due, e)));
    }

    /// Apply an effect as of `at`, the instant the app would have run it
    fn apply(&mut self, effect: Effect, at: Instant) {
        match effect {
            Effect::Set { path, value } => set_path(&mut self.world, &path, value),
            Effect::Toggle { path } => {
                let current = get_path(&self.world, &path)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                set_path(&mut self.world, &path, Value::Bool(!current));
            }
            Effect::Increment { path, by } => {
                let current = get_path(&self.world, &path)
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let next = current + by;
                let value = if next.fract() == 0.0 && next.abs() < i64::MAX as f64 {
                    json!(next as i64)
                } else {
                    json!(next)
                };
                set_path(&mut self.world, &path, value);
            }
            Effect::Log(text) => {
                let _ = self.event_tx.send(PageEvent::Console {
                    level: ConsoleLevel::Log,
                    text,
                    at,
                });
            }
            Effect::Throw(message) => {
                let _ = self.event_tx.send(PageEvent::Exception {
                    message: format!("Uncaught Error: {message}"),
                    at,
                });
            }
        }
    }

    fn runtime_missing(&self, method: &str) -> Error {
        Error::script(
            &format!("window.{RUNTIME_GLOBAL}.{method}"),
            format!("TypeError: Cannot read properties of undefined (reading '{method}')"),
        )
    }
}

#[async_trait]
impl PageDriver for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<PageEvent>> {
        self.event_rx.take()
    }

    async fn add_init_script(&mut self, source: &str) -> Result<()> {
        self.ensure_open()?;
        if source == RUNTIME_SCRIPT {
            self.init_runtime = true;
        }
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<()> {
        self.ensure_open()?;
        tokio::time::sleep(self.app.navigation_delay).await;
        self.loaded_at = Some(Instant::now());
        self.load_effects_applied = false;
        self.runtime_active = self.init_runtime;
        self.world.clear();
        self.pending.clear();
        self.held.clear();
        self.advance();
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.ensure_open()?;
        if expression == RUNTIME_SCRIPT {
            self.runtime_active = self.loaded_at.is_some();
            return Ok(Value::Null);
        }
        self.advance();
        if let Some(effects) = self.app.scripts.get(expression).cloned() {
            let now = Instant::now();
            for effect in effects {
                self.apply(effect, now);
            }
        }
        Ok(Value::Null)
    }

    async fn call_runtime(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_open()?;
        if !self.runtime_active {
            return Err(self.runtime_missing(method));
        }
        self.advance();

        match method {
            "hook" => {
                let name = args.first().and_then(Value::as_str).unwrap_or_default();
                match get_path(&self.world, name) {
                    Some(value) => Ok(json!({ "found": true, "type": js_type(value) })),
                    None => Ok(json!({ "found": false })),
                }
            }
            "snapshot" => {
                let names = args
                    .first()
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut out = Map::new();
                for name in names.iter().filter_map(Value::as_str) {
                    let value = get_path(&self.world, name).cloned().unwrap_or(Value::Null);
                    out.insert(name.to_string(), value);
                }
                Ok(Value::Object(out))
            }
            "viewport" => Ok(json!({
                "width": self.viewport.width,
                "height": self.viewport.height,
            })),
            other => Err(Error::script(
                &format!("window.{RUNTIME_GLOBAL}.{other}"),
                "TypeError: not a function",
            )),
        }
    }

    async fn dispatch_key(&mut self, key: &KeyDefinition, phase: KeyPhase) -> Result<()> {
        self.ensure_open()?;
        if self.app.fail_on_key.as_deref() == Some(key.key.as_str()) {
            return Err(Error::Session("browser connection reset".to_string()));
        }
        self.advance();
        // Not loaded yet: nothing is listening
        if !self.is_ready() {
            return Ok(());
        }

        match phase {
            KeyPhase::Down => {
                // Auto-repeat while held does not re-trigger handlers
                if !self.held.insert(key.key.clone()) {
                    return Ok(());
                }
                let effects = self.app.key_down.get(&key.key).cloned().unwrap_or_default();
                self.schedule(effects);
            }
            KeyPhase::Up => {
                self.held.remove(&key.key);
                let effects = self.app.key_up.get(&key.key).cloned().unwrap_or_default();
                self.schedule(effects);
            }
        }
        Ok(())
    }

    async fn click(&mut self, _x: f64, _y: f64) -> Result<()> {
        self.ensure_open()?;
        self.advance();
        if self.is_ready() {
            let effects = self.app.on_click.clone();
            self.schedule(effects);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn js_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn get_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut current = root;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}
