//! Browser automation capability layer.
//!
//! The engine drives the conferencing UI exclusively through the
//! [`BrowserDriver`] trait, a thin capability set over one automated
//! browser instance per session. The production implementation lives in
//! [`chromium`]; tests substitute scripted fakes.

pub mod chromium;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use chromium::{ChromiumDriver, ChromiumLauncher};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation timed out")]
    Timeout,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page evaluation failed: {0}")]
    Evaluate(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("browser connection closed")]
    Closed,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Capability set over a single automated browser instance.
///
/// Every method is an I/O suspension point. Implementations must tolerate
/// the hostile environment of third-party single-page apps: selectors go
/// stale, navigations race evaluations, and elements vanish mid-click.
/// "Not found" is a normal answer (`Ok(false)`), not an error.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to `url` and wait for the load to settle.
    async fn open(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Evaluate a JS expression in the page, returning its JSON value.
    /// Expressions yielding `undefined` map to `Value::Null`.
    async fn evaluate(&self, js: &str) -> DriverResult<Value>;

    /// Click the first element matching a CSS selector.
    /// Returns whether anything was clicked; no-match is `Ok(false)`.
    async fn find_and_click(&self, selector: &str) -> DriverResult<bool>;

    /// Click the first clickable element whose visible text contains any
    /// of `needles` (case-insensitive). Returns whether a match was clicked.
    async fn click_by_text(&self, needles: &[&str]) -> DriverResult<bool>;

    /// Raw mouse click at page coordinates.
    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()>;

    /// Focus the element, select and delete its contents, then type `text`
    /// character-by-character with a perceptible inter-key delay.
    ///
    /// Direct value assignment is deliberately unsupported: the target UIs
    /// rebuild their state from input events.
    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()>;

    /// Send a modifier+key combination, e.g. `"c"` or `"ctrl+shift+u"`.
    async fn keyboard(&self, shortcut: &str) -> DriverResult<()>;

    /// Capture the current viewport as a PNG at `path`.
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Grant microphone/camera/notification permissions for `origin`.
    /// Must be called before navigating to the meeting URL.
    async fn grant_permissions(&self, origin: &str) -> DriverResult<()>;

    /// Best-effort teardown. Idempotent.
    async fn close(&self);
}

/// Factory seam for creating a browser per session.
///
/// The engine owns exactly one driver per live session; injecting the
/// launcher keeps the engine testable without a real browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserDriver>>;
}
