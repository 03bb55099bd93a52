//! Instrumentation injection
//!
//! Probes are installed in two phases around navigation:
//!
//! 1. Before navigation the runtime is registered as an init script and
//!    console capture is switched on, so both are in place before any
//!    application code runs.
//! 2. After navigation each requested global is hooked. Targets expose their
//!    globals lazily (after assets load, after the first frame), so hooking
//!    polls until the global appears or the wait budget runs out, which is
//!    reported as `ProbeNotFound` rather than an empty snapshot.
//!
//! Installing onto an already navigated session evaluates the runtime late;
//! console lines emitted before that point are not captured.

mod console;
mod runtime;

pub use console::{ConsoleBuffer, ConsoleLine};
pub use runtime::RUNTIME_SCRIPT;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::common::config::{ConsoleConfig, Defaults};
use crate::common::{Error, Result};
use crate::session::{Session, SessionState};

/// Probes requested by a scenario
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProbeSet {
    /// Capture console output
    #[serde(default = "default_true")]
    pub console: bool,

    /// Globals to hook, as dotted paths from `window`
    #[serde(default)]
    pub globals: Vec<String>,
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self {
            console: true,
            globals: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl ProbeSet {
    pub fn global(mut self, name: &str) -> Self {
        self.globals.push(name.to_string());
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }
}

/// Kind of installed probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    ConsoleCapture,
    GlobalState { name: String },
}

/// A probe installed into a session
#[derive(Debug, Clone, Serialize)]
pub struct ProbeRecord {
    #[serde(flatten)]
    pub kind: ProbeKind,
    /// Milliseconds after session open
    pub installed_at_ms: u64,
}

/// How the runtime got into the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Missing,
    /// Registered before navigation; survives reloads
    InitScript,
    /// Evaluated after load; lost on the next navigation
    Evaluated,
}

/// Installs probes into sessions
#[derive(Debug, Clone)]
pub struct Injector {
    wait: Duration,
    poll: Duration,
    console: ConsoleConfig,
}

impl Injector {
    pub fn new(defaults: &Defaults, console: &ConsoleConfig) -> Self {
        Self {
            wait: defaults.probe_wait(),
            poll: defaults.probe_poll(),
            console: console.clone(),
        }
    }

    /// Override the hook wait budget
    pub fn with_wait(mut self, wait: Duration, poll: Duration) -> Self {
        self.wait = wait;
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    /// Install whatever the session's lifecycle state allows
    ///
    /// A `Created` session gets the pre-navigation phase only; call again
    /// after navigation to hook globals.
    pub async fn install(&self, session: &mut Session, probes: &ProbeSet) -> Result<()> {
        match session.state() {
            SessionState::Created => self.prepare(session, probes).await,
            SessionState::Navigated => self.attach(session, probes).await,
            SessionState::Closed => Err(Error::SessionClosed),
        }
    }

    /// Pre-navigation phase: runtime init script and console capture
    pub async fn prepare(&self, session: &mut Session, probes: &ProbeSet) -> Result<()> {
        if session.state() != SessionState::Created {
            return Err(Error::Internal(format!(
                "probes can only be prepared before navigation (session is {})",
                session.state()
            )));
        }

        session.page()?.add_init_script(RUNTIME_SCRIPT).await?;
        session.set_runtime_mode(RuntimeMode::InitScript);

        if probes.console {
            self.enable_console(session);
        }
        tracing::debug!(session = session.id(), "Probes prepared before navigation");
        Ok(())
    }

    /// Post-navigation phase: hook every requested global
    pub async fn attach(&self, session: &mut Session, probes: &ProbeSet) -> Result<()> {
        if probes.console && session.console().is_none() {
            tracing::debug!(
                session = session.id(),
                "Console capture installed after load; earlier lines are lost"
            );
            self.enable_console(session);
        }

        for name in &probes.globals {
            await_global(session, name, self.wait, self.poll).await?;
            let installed_at_ms = session.elapsed().as_millis() as u64;
            session.record_probe(ProbeRecord {
                kind: ProbeKind::GlobalState { name: name.clone() },
                installed_at_ms,
            });
            tracing::debug!(session = session.id(), global = %name, "Global hooked");
        }
        check_viewport(session).await;
        Ok(())
    }

    fn enable_console(&self, session: &mut Session) {
        let installed_at_ms = session.elapsed().as_millis() as u64;
        session.enable_console(ConsoleBuffer::from_config(&self.console));
        session.record_probe(ProbeRecord {
            kind: ProbeKind::ConsoleCapture,
            installed_at_ms,
        });
    }
}

/// Warn when the document's viewport differs from the requested one
async fn check_viewport(session: &mut Session) {
    let expected = session.config().viewport;
    let Ok(page) = session.page() else {
        return;
    };
    let Ok(reply) = page.call_runtime("viewport", Vec::new()).await else {
        return;
    };
    let size = |key: &str| reply.get(key).and_then(Value::as_u64);
    if size("width") != Some(u64::from(expected.width)) || size("height") != Some(u64::from(expected.height)) {
        tracing::warn!(
            session = session.id(),
            expected = %format!("{}x{}", expected.width, expected.height),
            actual = %reply,
            "Page viewport differs from the requested size"
        );
    }
}

/// Make sure the runtime exists in the current document
async fn ensure_runtime(session: &mut Session) -> Result<()> {
    if session.runtime_mode() == RuntimeMode::InitScript {
        return Ok(());
    }
    session.page()?.evaluate(RUNTIME_SCRIPT).await?;
    session.set_runtime_mode(RuntimeMode::Evaluated);
    Ok(())
}

/// Poll until `name` resolves to a value in the page
///
/// Script errors while polling (runtime not there yet, document still
/// loading) count as "not yet". Transport failures end the wait.
pub async fn await_global(
    session: &mut Session,
    name: &str,
    wait: Duration,
    poll: Duration,
) -> Result<()> {
    ensure_runtime(session).await?;

    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match session.page()?.call_runtime("hook", vec![json!(name)]).await {
            Ok(reply) if reply.get("found").and_then(Value::as_bool) == Some(true) => {
                return Ok(());
            }
            Ok(_) => {}
            Err(e @ Error::Script { .. }) => {
                tracing::trace!(global = name, error = %e, "Hook not ready");
            }
            Err(e) => return Err(e),
        }

        let waited = started.elapsed();
        if waited >= wait {
            tracing::debug!(global = name, attempts, "Global never appeared");
            return Err(Error::ProbeNotFound {
                name: name.to_string(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll.min(wait - waited)).await;
    }
}

/// Re-hook every global the session already hooked (after a navigation)
pub async fn rehook(session: &mut Session, wait: Duration, poll: Duration) -> Result<()> {
    for name in session.hooked_globals() {
        await_global(session, &name, wait, poll).await?;
    }
    Ok(())
}
