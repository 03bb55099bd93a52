//! Browser session lifecycle
//!
//! A [`Session`] is one controlled page used by exactly one scenario. The
//! [`SessionController`] opens sessions on a shared browser driver and is
//! the only place they are closed. Every opened session is closed exactly
//! once: explicitly through [`SessionController::close`], or by the `Drop`
//! fallback if a session is abandoned mid-flight.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::browser::{BrowserDriver, PageDriver, PageEvent};
use crate::common::config::Viewport;
use crate::common::{Error, Result};
use crate::probe::{ConsoleBuffer, ProbeKind, ProbeRecord, RuntimeMode};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Page open, nothing loaded yet
    Created,
    /// Target document loaded
    Navigated,
    /// Page released
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Navigated => write!(f, "navigated"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Absolute navigation target
    pub url: String,
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
}

/// Opened/closed totals for teardown verification
#[derive(Debug, Default)]
pub struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl SessionCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet closed
    pub fn open_now(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

/// One controlled browser page
pub struct Session {
    id: u64,
    config: SessionConfig,
    page: Option<Box<dyn PageDriver>>,
    events_rx: Option<mpsc::UnboundedReceiver<PageEvent>>,
    state: SessionState,
    opened_at: Instant,
    /// Console capture buffer, present once the console probe is installed
    console: Option<ConsoleBuffer>,
    /// Uncaught errors raised by the page
    page_errors: Vec<String>,
    probes: Vec<ProbeRecord>,
    runtime: RuntimeMode,
    counters: Arc<SessionCounters>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Time since the session was opened
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// The live page, or `SessionClosed`
    pub fn page(&mut self) -> Result<&mut (dyn PageDriver + 'static)> {
        match self.page.as_deref_mut() {
            Some(page) => Ok(page),
            None => Err(Error::SessionClosed),
        }
    }

    /// Navigate to the session's configured target
    pub async fn navigate_to_target(&mut self) -> Result<()> {
        let url = self.config.url.clone();
        self.navigate(&url).await
    }

    /// Navigate to `url`, resolved against the session target if relative
    #[tracing::instrument(skip(self), fields(session = self.id))]
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let url = resolve_against(&self.config.url, url)?;
        let timeout = self.config.navigation_timeout;

        let page = self.page()?;
        match tokio::time::timeout(timeout, page.navigate(&url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::NavigationTimeout {
                    url,
                    secs: timeout.as_secs(),
                })
            }
        }

        self.state = SessionState::Navigated;
        // An evaluated runtime does not survive a new document
        if self.runtime == RuntimeMode::Evaluated {
            self.runtime = RuntimeMode::Missing;
        }
        tracing::debug!(%url, "Navigated");
        Ok(())
    }

    /// Move everything the page has emitted into the session buffers
    ///
    /// Console lines are kept only once console capture is installed, and
    /// keep the time the driver received them rather than the drain time.
    pub fn drain_events(&mut self) {
        let Some(rx) = self.events_rx.as_mut() else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                PageEvent::Console { level, text, at } => {
                    if let Some(console) = self.console.as_mut() {
                        let at_ms = at.saturating_duration_since(self.opened_at).as_millis() as u64;
                        console.push(level, text, at_ms);
                    }
                }
                PageEvent::Exception { message, .. } => {
                    tracing::debug!(session = self.id, %message, "Page raised an error");
                    self.page_errors.push(message);
                }
            }
        }
    }

    /// Captured console, if the console probe is installed
    pub fn console(&self) -> Option<&ConsoleBuffer> {
        self.console.as_ref()
    }

    /// Uncaught errors raised by the page so far
    pub fn page_errors(&self) -> &[String] {
        &self.page_errors
    }

    /// Probes installed into this session
    pub fn probes(&self) -> &[ProbeRecord] {
        &self.probes
    }

    /// Names of the hooked globals, in installation order
    pub fn hooked_globals(&self) -> Vec<String> {
        self.probes
            .iter()
            .filter_map(|p| match &p.kind {
                ProbeKind::GlobalState { name } => Some(name.clone()),
                ProbeKind::ConsoleCapture => None,
            })
            .collect()
    }

    /// How the instrumentation runtime reached the current document
    pub fn runtime_mode(&self) -> RuntimeMode {
        self.runtime
    }

    pub(crate) fn set_runtime_mode(&mut self, mode: RuntimeMode) {
        self.runtime = mode;
    }

    pub(crate) fn enable_console(&mut self, buffer: ConsoleBuffer) {
        if self.console.is_none() {
            self.console = Some(buffer);
        }
    }

    pub(crate) fn record_probe(&mut self, record: ProbeRecord) {
        if !self.probes.iter().any(|p| p.kind == record.kind) {
            self.probes.push(record);
        }
    }

    /// Release the page. Idempotent; the counter moves only once.
    async fn release(&mut self) -> Result<()> {
        let Some(mut page) = self.page.take() else {
            return Ok(());
        };
        self.drain_events();
        self.state = SessionState::Closed;
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        page.close().await
    }

    #[cfg(test)]
    pub(crate) async fn close_page_for_test(&mut self) {
        if let Some(page) = self.page.as_mut() {
            let _ = page.close().await;
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(session = self.id, "Session dropped without close; closing in background");
        // Best-effort: can't await in drop
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!(error = %e, "Background page close failed");
                }
            });
        }
    }
}

/// Resolve a possibly relative URL against a base
fn resolve_against(base: &str, url: &str) -> Result<String> {
    if let Ok(absolute) = url::Url::parse(url) {
        return Ok(absolute.into());
    }
    let base = url::Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid session URL '{base}': {e}")))?;
    base.join(url)
        .map(Into::into)
        .map_err(|e| Error::Config(format!("Invalid URL '{url}': {e}")))
}

/// Opens and closes sessions on a shared browser
pub struct SessionController {
    driver: Arc<dyn BrowserDriver>,
    counters: Arc<SessionCounters>,
    next_id: AtomicU64,
}

impl SessionController {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            counters: Arc::new(SessionCounters::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a fresh page; the session starts in `Created`
    ///
    /// Navigation is a separate step so probes can be installed before any
    /// application code runs.
    #[tracing::instrument(skip(self, config), fields(url = %config.url))]
    pub async fn open(&self, config: SessionConfig) -> Result<Session> {
        let mut page = self.driver.open_page(config.viewport).await?;
        let events_rx = page.take_event_receiver();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(session = id, page = page.id(), "Session opened");

        Ok(Session {
            id,
            config,
            page: Some(page),
            events_rx,
            state: SessionState::Created,
            opened_at: Instant::now(),
            console: None,
            page_errors: Vec::new(),
            probes: Vec::new(),
            runtime: RuntimeMode::Missing,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Close a session, releasing its page
    pub async fn close(&self, mut session: Session) -> Result<()> {
        let id = session.id;
        let result = session.release().await;
        match &result {
            Ok(()) => tracing::debug!(session = id, "Session closed"),
            Err(e) => tracing::warn!(session = id, error = %e, "Session close failed"),
        }
        result
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Shut down the underlying browser
    pub async fn shutdown(&self) -> Result<()> {
        self.driver.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{Effect, MockApp, MockBrowser};
    use crate::browser::{KeyDefinition, KeyPhase};
    use crate::common::config::{ConsoleConfig, Defaults};
    use crate::probe::{Injector, ProbeSet};

    fn config() -> SessionConfig {
        SessionConfig {
            url: "http://localhost:8080/?agent=1".to_string(),
            viewport: Viewport::default(),
            navigation_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_resolve_relative_urls() {
        assert_eq!(
            resolve_against("http://localhost:8080/play?agent=1", "/menu").unwrap(),
            "http://localhost:8080/menu"
        );
        assert_eq!(
            resolve_against("http://localhost:8080/", "http://example.com/x").unwrap(),
            "http://example.com/x"
        );
    }

    #[tokio::test]
    async fn test_lifecycle_states_and_counters() {
        let browser = MockBrowser::new(MockApp::new());
        let stats = browser.stats();
        let controller = SessionController::new(Arc::new(browser));

        let mut session = controller.open(config()).await.unwrap();
        assert_eq!(session.state(), SessionState::Created);

        session.navigate_to_target().await.unwrap();
        assert_eq!(session.state(), SessionState::Navigated);
        assert_eq!(controller.counters().open_now(), 1);

        controller.close(session).await.unwrap();
        assert_eq!(controller.counters().opened(), 1);
        assert_eq!(controller.counters().closed(), 1);
        assert_eq!(stats.pages_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_is_session_error() {
        let app = MockApp::new().navigation_delay(Duration::from_secs(5));
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));

        let mut session = controller.open(config()).await.unwrap();
        let err = session.navigate_to_target().await.unwrap_err();
        assert!(matches!(err, Error::NavigationTimeout { secs: 1, .. }));
        assert_eq!(err.category(), crate::FailureCategory::SessionError);

        controller.close(session).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_lines_keep_arrival_time() {
        let app = MockApp::new()
            .tick(Duration::from_millis(10))
            .on_key_down("a", [Effect::log("first")])
            .on_key_down("b", [Effect::log("second")]);
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let injector = Injector::new(&Defaults::default(), &ConsoleConfig::default());
        let mut session = controller.open(config()).await.unwrap();
        injector.install(&mut session, &ProbeSet::default()).await.unwrap();
        session.navigate_to_target().await.unwrap();

        let a = KeyDefinition::parse("a").unwrap();
        let b = KeyDefinition::parse("b").unwrap();
        session.page().unwrap().dispatch_key(&a, KeyPhase::Down).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        session.page().unwrap().dispatch_key(&b, KeyPhase::Down).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.page().unwrap().evaluate("0").await.unwrap();

        session.drain_events();
        let times: Vec<_> = session
            .console()
            .unwrap()
            .lines()
            .map(|l| (l.text.as_str(), l.at_ms))
            .collect();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].0, "first");
        assert!(times[0].1 < 100, "{times:?}");
        assert_eq!(times[1].1 - times[0].1, 1_000);

        controller.close(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_viewport_applies_per_page_and_shutdown_reaches_browser() {
        let browser = MockBrowser::new(MockApp::new());
        let stats = browser.stats();
        let controller = SessionController::new(Arc::new(browser));
        let injector = Injector::new(&Defaults::default(), &ConsoleConfig::default());

        let mut small = controller
            .open(SessionConfig {
                viewport: Viewport { width: 800, height: 600 },
                ..config()
            })
            .await
            .unwrap();
        let mut default = controller.open(config()).await.unwrap();
        for session in [&mut small, &mut default] {
            injector.install(session, &ProbeSet::default()).await.unwrap();
            session.navigate_to_target().await.unwrap();
        }

        let viewport = small.page().unwrap().call_runtime("viewport", vec![]).await.unwrap();
        assert_eq!(viewport, serde_json::json!({ "width": 800, "height": 600 }));
        let viewport = default.page().unwrap().call_runtime("viewport", vec![]).await.unwrap();
        assert_eq!(viewport, serde_json::json!({ "width": 1280, "height": 720 }));

        controller.close(small).await.unwrap();
        controller.close(default).await.unwrap();
        assert_eq!(stats.shutdowns(), 0);
        controller.shutdown().await.unwrap();
        assert_eq!(stats.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_still_counts_as_closed() {
        let browser = MockBrowser::new(MockApp::new());
        let stats = browser.stats();
        let controller = SessionController::new(Arc::new(browser));

        let session = controller.open(config()).await.unwrap();
        drop(session);
        tokio::task::yield_now().await;

        assert_eq!(controller.counters().closed(), 1);
        assert_eq!(stats.pages_closed(), 1);
    }
}
