//! chromiumoxide-backed implementation of the automation contract.
//!
//! Single-page model: one page is created at launch and every navigation
//! reuses it, so "the current page" is always well defined.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide_cdp::cdp::js_protocol::runtime::{CallArgument, CallFunctionOnParams};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    AutomationEngine, BrowserError, BrowserResult, EngineFactory, ImageFormat, NavigatedPage,
    setup, snapshot,
};
use crate::BrowserSettings;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hides `navigator.webdriver` before any target page script runs.
const WEBDRIVER_OVERRIDE: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => false });";

/// Live browser state, present only between launch and close.
struct Inner {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    profile_dir: Option<PathBuf>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Handler must not outlive the browser it serves
        self.handler.abort();
        if let Some(dir) = &self.profile_dir {
            warn!(
                "Engine dropped without close; profile directory orphaned: {}",
                dir.display()
            );
        }
    }
}

pub struct ChromiumEngine {
    settings: BrowserSettings,
    inner: Mutex<Option<Inner>>,
}

impl ChromiumEngine {
    /// A cold engine; nothing starts until [`AutomationEngine::launch`].
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(None),
        }
    }

    async fn page(&self) -> BrowserResult<Page> {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(inner) => Ok(inner.page.clone()),
            None => Err(BrowserError::NotLaunched),
        }
    }
}

#[async_trait]
impl AutomationEngine for ChromiumEngine {
    async fn launch(&self) -> BrowserResult<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (browser, handler, profile_dir) = setup::launch_browser(&self.settings).await?;

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                setup::cleanup_profile_dir(&profile_dir);
                return Err(BrowserError::LaunchFailed(format!(
                    "initial page creation failed: {e}"
                )));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                WEBDRIVER_OVERRIDE,
            ))
            .await
        {
            warn!("webdriver override injection failed: {e}");
        }

        *guard = Some(Inner {
            browser,
            handler,
            page,
            profile_dir: Some(profile_dir),
        });
        info!("Browser engine launched");
        Ok(())
    }

    async fn is_launched(&self) -> bool {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            // Probe the process; a crashed Chrome leaves stale bookkeeping
            Some(inner) => inner.browser.version().await.is_ok(),
            None => false,
        }
    }

    async fn navigate(&self, url: &str) -> BrowserResult<NavigatedPage> {
        let target = Url::parse(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("invalid url '{url}': {e}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(BrowserError::NavigationFailed(format!(
                "unsupported scheme '{}', only http and https are allowed",
                target.scheme()
            )));
        }

        let page = self.page().await?;

        tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(target.as_str()))
            .await
            .map_err(|_| {
                BrowserError::NavigationFailed(format!(
                    "timeout after {}s loading {url}",
                    NAVIGATION_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("page load incomplete: {e}")))?;

        // Where we landed, not where we asked to go
        let observed = page
            .url()
            .await
            .map_err(|e| BrowserError::PageCallFailed(e.to_string()))?
            .unwrap_or_else(|| url.to_string());
        let title = page.get_title().await.ok().flatten().unwrap_or_default();

        debug!(requested = url, observed = %observed, "navigation complete");
        Ok(NavigatedPage {
            url: observed,
            title,
        })
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        if selector.trim().is_empty() {
            return Err(BrowserError::ElementNotFound("empty selector".into()));
        }
        let page = self.page().await?;
        let element = wait_for_element(&page, selector, ELEMENT_TIMEOUT).await?;

        element.scroll_into_view().await.map_err(|e| {
            BrowserError::PageCallFailed(format!("scroll into view failed for '{selector}': {e}"))
        })?;

        // Click via coordinates; Element::click can hang on the
        // IntersectionObserver visibility check
        let point = element.clickable_point().await.map_err(|e| {
            BrowserError::PageCallFailed(format!("no clickable point for '{selector}': {e}"))
        })?;
        page.click(point).await.map_err(|e| {
            BrowserError::PageCallFailed(format!("click failed for '{selector}': {e}"))
        })?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()> {
        if selector.trim().is_empty() {
            return Err(BrowserError::ElementNotFound("empty selector".into()));
        }
        let page = self.page().await?;
        let element = wait_for_element(&page, selector, ELEMENT_TIMEOUT).await?;

        element.scroll_into_view().await.map_err(|e| {
            BrowserError::PageCallFailed(format!("scroll into view failed for '{selector}': {e}"))
        })?;

        // Click to focus before typing
        let point = element.clickable_point().await.map_err(|e| {
            BrowserError::PageCallFailed(format!("no clickable point for '{selector}': {e}"))
        })?;
        page.click(point).await.map_err(|e| {
            BrowserError::PageCallFailed(format!("focus click failed for '{selector}': {e}"))
        })?;

        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| {
                BrowserError::PageCallFailed(format!("clear failed for '{selector}': {e}"))
            })?;

        element.type_str(text).await.map_err(|e| {
            BrowserError::PageCallFailed(format!("typing failed for '{selector}': {e}"))
        })?;
        Ok(())
    }

    async fn scroll(&self, delta_y: i64) -> BrowserResult<()> {
        let page = self.page().await?;
        let y = delta_y.clamp(-10_000, 10_000);

        // Parameterized evaluation prevents injection
        let call = CallFunctionOnParams::builder()
            .function_declaration("(y) => window.scrollBy(0, y)")
            .argument(CallArgument::builder().value(json!(y)).build())
            .build()
            .map_err(|e| BrowserError::PageCallFailed(format!("scroll params: {e}")))?;

        page.evaluate_function(call)
            .await
            .map_err(|e| BrowserError::PageCallFailed(format!("scroll failed: {e}")))?;
        Ok(())
    }

    async fn screenshot(&self, format: ImageFormat, quality: u8) -> BrowserResult<Vec<u8>> {
        let page = self.page().await?;
        let params = match format {
            ImageFormat::Jpeg => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(quality as i64)
                .build(),
            ImageFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        };
        page.screenshot(params)
            .await
            .map_err(|e| BrowserError::PageCallFailed(e.to_string()))
    }

    async fn snapshot(&self, interactive: bool) -> BrowserResult<String> {
        let page = self.page().await?;
        Ok(snapshot::build_outline(&page, interactive).await)
    }

    async fn wait_for_settle(&self, timeout: Duration) {
        let Ok(page) = self.page().await else {
            return;
        };
        match tokio::time::timeout(timeout, page.wait_for_navigation()).await {
            Ok(Err(e)) => debug!("settle wait: {e}"),
            Err(_) => debug!("settle wait elapsed after {}ms", timeout.as_millis()),
            Ok(Ok(_)) => {}
        }
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut guard = self.inner.lock().await;
        let Some(mut inner) = guard.take() else {
            return Ok(());
        };

        if let Err(e) = inner.browser.close().await {
            warn!("browser close failed: {e}");
        }
        // wait() must complete before the profile directory is removed,
        // otherwise Chrome still holds file handles into it
        if let Err(e) = inner.browser.wait().await {
            warn!("browser wait failed: {e}");
        }
        if let Some(dir) = inner.profile_dir.take() {
            setup::cleanup_profile_dir(&dir);
        }
        info!("Browser engine closed");
        Ok(())
    }
}

/// Poll for an element with exponential backoff. SPAs render elements well
/// after the load event fires, so a single `find_element` is not enough.
async fn wait_for_element(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> BrowserResult<Element> {
    let start = std::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }

        if start.elapsed() >= timeout {
            return Err(BrowserError::ElementNotFound(format!(
                "'{}' (timeout after {}ms)",
                selector,
                timeout.as_millis()
            )));
        }

        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}

/// Creates cold [`ChromiumEngine`]s from shared settings.
pub struct ChromiumFactory {
    settings: BrowserSettings,
}

impl ChromiumFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

impl EngineFactory for ChromiumFactory {
    fn create(&self) -> Arc<dyn AutomationEngine> {
        Arc::new(ChromiumEngine::new(self.settings.clone()))
    }
}
