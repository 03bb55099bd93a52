//! Chrome DevTools Protocol driver
//!
//! One browser process is launched per run and shared by every session.
//! Each page is opened in its own browser context (when isolation is
//! enabled) so cookies and storage never leak between scenarios, and closing
//! a page disposes only that page's context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::config::{BrowserSettings, Viewport};
use crate::common::{Error, Result};

use super::driver::{BrowserDriver, ConsoleLevel, KeyPhase, PageDriver, PageEvent, RUNTIME_GLOBAL};
use super::keys::KeyDefinition;

/// Browser process controlled over CDP
pub struct CdpBrowser {
    inner: Arc<Mutex<Browser>>,
    /// CDP message pump; the connection dies when this task ends
    handler: JoinHandle<()>,
    isolated_contexts: bool,
    next_page: AtomicU64,
}

impl CdpBrowser {
    /// Launch a browser process
    #[tracing::instrument(skip(settings), fields(headless = settings.headless))]
    pub async fn launch(settings: &BrowserSettings, launch_timeout: Duration) -> Result<Self> {
        let mut builder = BrowserConfig::builder().launch_timeout(launch_timeout);

        if !settings.headless {
            builder = builder.with_head();
        }
        if !settings.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = settings.resolve_executable() {
            tracing::debug!(executable = %path.display(), "Using browser executable");
            builder = builder.chrome_executable(path);
        }
        for arg in &settings.args {
            builder = builder.arg(arg.clone());
        }

        let config = builder.build().map_err(Error::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        tracing::info!("Browser launched");

        Ok(Self {
            inner: Arc::new(Mutex::new(browser)),
            handler,
            isolated_contexts: settings.isolated_contexts,
            next_page: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl BrowserDriver for CdpBrowser {
    async fn open_page(&self, viewport: Viewport) -> Result<Box<dyn PageDriver>> {
        if self.handler.is_finished() {
            return Err(Error::Session("browser connection closed".to_string()));
        }

        let (page, context) = {
            let browser = self.inner.lock().await;

            let context = if self.isolated_contexts {
                let created = browser
                    .execute(CreateBrowserContextParams::default())
                    .await
                    .map_err(|e| Error::Session(format!("Failed to create browser context: {e}")))?;
                Some(created.result.browser_context_id.clone())
            } else {
                None
            };

            let mut params = CreateTargetParams::new("about:blank");
            params.browser_context_id = context.clone();

            let page = browser
                .new_page(params)
                .await
                .map_err(|e| Error::Session(format!("Failed to open page: {e}")))?;
            (page, context)
        };

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| Error::Session(format!("Failed to set viewport: {e}")))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let listeners = spawn_listeners(&page, event_tx).await?;

        let id = format!("page-{}", self.next_page.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(page = %id, ?context, "Page opened");

        Ok(Box::new(CdpPage {
            id,
            page: Some(page),
            browser: Arc::clone(&self.inner),
            context,
            listeners,
            event_rx: Some(event_rx),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.inner.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;
        self.handler.abort();
        tracing::info!("Browser shut down");
        Ok(())
    }
}

/// Subscribe to console and exception events before anything is navigated
async fn spawn_listeners(
    page: &Page,
    event_tx: mpsc::UnboundedSender<PageEvent>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut console = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| Error::Session(format!("Failed to subscribe to console: {e}")))?;
    let mut exceptions = page
        .event_listener::<EventExceptionThrown>()
        .await
        .map_err(|e| Error::Session(format!("Failed to subscribe to exceptions: {e}")))?;

    let console_tx = event_tx.clone();
    let console_task = tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let text = event
                .args
                .iter()
                .map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            let level = console_level(&event.r#type);
            if console_tx.send(PageEvent::Console {
                level,
                text,
                at: Instant::now(),
            }).is_err() {
                break;
            }
        }
    });

    let exception_task = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let message = details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone());
            if event_tx.send(PageEvent::Exception {
                message,
                at: Instant::now(),
            }).is_err() {
                break;
            }
        }
    });

    Ok(vec![console_task, exception_task])
}

fn console_level(kind: &ConsoleApiCalledType) -> ConsoleLevel {
    match kind {
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Log,
    }
}

/// Render a console argument the way devtools would print it
fn remote_object_text(object: &RemoteObject) -> String {
    match (&object.value, &object.description) {
        (Some(Value::String(s)), _) => s.clone(),
        (Some(value), _) => value.to_string(),
        (None, Some(description)) => description.clone(),
        (None, None) => format!("{:?}", object.r#type).to_lowercase(),
    }
}

/// A page controlled over CDP
struct CdpPage {
    id: String,
    page: Option<Page>,
    browser: Arc<Mutex<Browser>>,
    context: Option<BrowserContextId>,
    listeners: Vec<JoinHandle<()>>,
    event_rx: Option<mpsc::UnboundedReceiver<PageEvent>>,
}

impl CdpPage {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(Error::SessionClosed)
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    fn id(&self) -> &str {
        &self.id
    }

    fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<PageEvent>> {
        self.event_rx.take()
    }

    async fn add_init_script(&mut self, source: &str) -> Result<()> {
        self.page()?
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(|e| Error::Session(format!("Failed to add init script: {e}")))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::debug!(page = %self.id, url, "Navigating");
        self.page()?
            .goto(url)
            .await
            .map_err(|e| Error::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let result = self
            .page()?
            .evaluate(expression)
            .await
            .map_err(|e| Error::script(expression, e))?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn call_runtime(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        let args = serde_json::to_string(&args)?;
        let expression = format!("window.{RUNTIME_GLOBAL}.{method}(...{args})");
        self.evaluate(&expression).await
    }

    async fn dispatch_key(&mut self, key: &KeyDefinition, phase: KeyPhase) -> Result<()> {
        let event_type = match (phase, &key.text) {
            (KeyPhase::Down, Some(_)) => DispatchKeyEventType::KeyDown,
            (KeyPhase::Down, None) => DispatchKeyEventType::RawKeyDown,
            (KeyPhase::Up, _) => DispatchKeyEventType::KeyUp,
        };

        let mut builder = DispatchKeyEventParams::builder()
            .r#type(event_type)
            .key(key.key.clone())
            .code(key.code.clone())
            .windows_virtual_key_code(key.key_code)
            .native_virtual_key_code(key.key_code);
        if phase == KeyPhase::Down {
            if let Some(text) = &key.text {
                builder = builder.text(text.clone()).unmodified_text(text.clone());
            }
        }
        let params = builder.build().map_err(Error::Session)?;

        self.page()?
            .execute(params)
            .await
            .map_err(|e| Error::Session(format!("Key dispatch failed: {e}")))?;
        Ok(())
    }

    async fn click(&mut self, x: f64, y: f64) -> Result<()> {
        for event_type in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(event_type)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(Error::Session)?;
            self.page()?
                .execute(params)
                .await
                .map_err(|e| Error::Session(format!("Click failed: {e}")))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };

        for listener in self.listeners.drain(..) {
            listener.abort();
        }

        let closed = page
            .close()
            .await
            .map_err(|e| Error::Session(format!("Failed to close page: {e}")));

        if let Some(context) = self.context.take() {
            let browser = self.browser.lock().await;
            if let Err(e) = browser
                .execute(DisposeBrowserContextParams::new(context))
                .await
            {
                tracing::warn!(page = %self.id, error = %e, "Failed to dispose browser context");
            }
        }

        tracing::debug!(page = %self.id, "Page closed");
        closed
    }
}
