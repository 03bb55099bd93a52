//! Browser driver traits
//!
//! Every operation suspends the caller until the remote browser acknowledges
//! it. Page-originated events (console output, uncaught exceptions) are
//! pushed into an unbounded channel from the moment the page is opened, so
//! nothing emitted before the first read is lost.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::config::Viewport;
use crate::common::Result;

use super::keys::KeyDefinition;

/// Name of the instrumentation runtime object installed on `window`
pub const RUNTIME_GLOBAL: &str = "__harness";

/// Console message level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
}

impl std::fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// Event emitted by a page, stamped when the driver received it
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// A console API call
    Console {
        level: ConsoleLevel,
        text: String,
        at: Instant,
    },
    /// An uncaught exception or unhandled rejection
    Exception { message: String, at: Instant },
}

/// Key transition sent to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

/// A controllable browser process
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh page with the given viewport
    ///
    /// Pages never share page-level state with each other.
    async fn open_page(&self, viewport: Viewport) -> Result<Box<dyn PageDriver>>;

    /// Shut the browser process down
    async fn shutdown(&self) -> Result<()>;
}

/// A single controllable page
#[async_trait]
pub trait PageDriver: Send {
    /// Driver-assigned page identifier (for logs)
    fn id(&self) -> &str;

    /// Take the page event receiver (can only be called once)
    fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<PageEvent>>;

    /// Register a script that runs before any page script on every new document
    async fn add_init_script(&mut self, source: &str) -> Result<()>;

    /// Navigate and wait for the load to complete
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate an expression in the page and return its JSON value
    ///
    /// `undefined` and non-serializable results come back as `Value::Null`.
    async fn evaluate(&mut self, expression: &str) -> Result<Value>;

    /// Call a method on the instrumentation runtime (`window.__harness`)
    async fn call_runtime(&mut self, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Dispatch a synthetic key transition to the focused page
    async fn dispatch_key(&mut self, key: &KeyDefinition, phase: KeyPhase) -> Result<()>;

    /// Dispatch a left-button click at viewport coordinates
    async fn click(&mut self, x: f64, y: f64) -> Result<()>;

    /// Close the page. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}
