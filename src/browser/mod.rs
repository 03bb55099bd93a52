//! Remote browser control channel
//!
//! The harness talks to the browser only through the [`BrowserDriver`] and
//! [`PageDriver`] traits. [`cdp::CdpBrowser`] implements them over the
//! Chrome DevTools Protocol; [`mock::MockBrowser`] implements them with a
//! scripted application model for tests that must not need a real browser.

pub mod cdp;
pub mod driver;
pub mod keys;
pub mod mock;

pub use cdp::CdpBrowser;
pub use driver::{BrowserDriver, ConsoleLevel, KeyPhase, PageDriver, PageEvent, RUNTIME_GLOBAL};
pub use keys::KeyDefinition;
