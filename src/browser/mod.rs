//! Browser automation behind a fixed async contract.
//!
//! The orchestration layer never touches CDP directly: everything goes
//! through [`AutomationEngine`], so the session and agent code can be
//! exercised against scripted fakes while production runs on
//! [`ChromiumEngine`]. All calls are async and all failures come back as
//! [`BrowserError`] values with a reason; nothing here panics.

mod chromium;
mod setup;
mod snapshot;

pub use chromium::{ChromiumEngine, ChromiumFactory};
pub use setup::{download_managed_browser, find_browser_executable};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to find browser executable: {0}")]
    NotFound(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    NotLaunched,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Page call failed: {0}")]
    PageCallFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Capture encoding for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

/// Observed page identity once navigation settles. `url` may differ from
/// the requested address when the site redirects.
#[derive(Debug, Clone)]
pub struct NavigatedPage {
    pub url: String,
    pub title: String,
}

/// The automation-engine contract.
///
/// An engine is constructed cold and brought up with [`launch`]. A closed
/// engine is never relaunched; callers create a fresh one instead.
///
/// [`launch`]: AutomationEngine::launch
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Start the underlying browser process. Launching an already-launched
    /// engine is a no-op.
    async fn launch(&self) -> BrowserResult<()>;

    /// Whether the engine currently holds a live browser. Implementations
    /// should health-check the process, not just their own bookkeeping.
    async fn is_launched(&self) -> bool;

    /// Navigate the page and report where it actually landed.
    async fn navigate(&self, url: &str) -> BrowserResult<NavigatedPage>;

    /// Click the element matching a CSS selector.
    async fn click(&self, selector: &str) -> BrowserResult<()>;

    /// Focus the element matching a CSS selector, clear it, and type text.
    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()>;

    /// Scroll the page vertically; positive is downward.
    async fn scroll(&self, delta_y: i64) -> BrowserResult<()>;

    /// Capture the viewport.
    async fn screenshot(&self, format: ImageFormat, quality: u8) -> BrowserResult<Vec<u8>>;

    /// Structured textual outline of the current page: title, URL, a
    /// bounded text excerpt, and (when `interactive`) the usable
    /// interactive elements with selector hints.
    async fn snapshot(&self, interactive: bool) -> BrowserResult<String>;

    /// Best-effort wait for in-flight navigation/rendering to settle.
    /// Timing out is expected and never an error.
    async fn wait_for_settle(&self, timeout: Duration);

    /// Shut the browser down. Closing twice is a no-op.
    async fn close(&self) -> BrowserResult<()>;
}

/// Creates cold engines. The session layer decides when to launch them,
/// one per connection.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn AutomationEngine>;
}
