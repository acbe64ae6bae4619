//! Chromium launch plumbing: executable discovery, managed download
//! fallback, profile isolation, and the CDP event handler task.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use super::{BrowserError, BrowserResult};
use crate::BrowserSettings;

/// A believable desktop user agent. Headless Chrome's default UA advertises
/// itself and gets sessions blocked.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// RAII guard for the temporary profile directory.
///
/// Removes the directory on drop unless consumed by `into_path()`, so a
/// failed launch never orphans a profile.
pub(super) struct TempDirGuard {
    path: PathBuf,
    keep: bool,
}

impl TempDirGuard {
    fn new(path: PathBuf) -> BrowserResult<Self> {
        std::fs::create_dir_all(&path).map_err(|e| BrowserError::IoError(e.to_string()))?;
        Ok(Self { path, keep: false })
    }

    /// Consume the guard and return the path, preventing automatic cleanup.
    fn into_path(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to clean up temp dir {}: {}", self.path.display(), e);
            } else {
                info!(
                    "Cleaned up temp dir after launch failure: {}",
                    self.path.display()
                );
            }
        }
    }
}

/// Remove a profile directory left behind by a closed engine.
///
/// Blocking on purpose: called after `browser.wait()` has confirmed Chrome
/// released its file handles, sometimes from drop context.
pub(super) fn cleanup_profile_dir(path: &PathBuf) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(
            "Failed to clean up profile directory {}: {}",
            path.display(),
            e
        );
    }
}

/// Find a Chrome/Chromium executable with platform-specific search paths.
pub async fn find_browser_executable() -> BrowserResult<PathBuf> {
    // Environment variable overrides all other discovery
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let paths = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = if let Some(rest) = path_str.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            let output = Command::new("which").arg(cmd).output();
            if let Ok(output) = output
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser using 'which': {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    Err(BrowserError::NotFound(
        "no Chrome/Chromium executable found".into(),
    ))
}

/// Download a managed Chromium build into the user cache directory and
/// return the executable path.
pub async fn download_managed_browser() -> BrowserResult<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join(".cache");
            warn!(
                "Could not determine system cache directory, using temp fallback: {}",
                fallback.display()
            );
            fallback
        })
        .join("webpilot/chromium");

    std::fs::create_dir_all(&cache_dir).map_err(|e| BrowserError::IoError(e.to_string()))?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .map_err(|e| BrowserError::NotFound(e.to_string()))?,
    );

    let revision_info = fetcher
        .fetch()
        .await
        .map_err(|e| BrowserError::NotFound(format!("browser download failed: {e}")))?;

    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Find or download Chromium and launch it with the stealth and rendering
/// flags the frame-streaming path needs, plus an isolated profile directory.
///
/// Returns the browser, the spawned CDP handler task, and the profile
/// directory the caller must remove after shutdown.
pub(super) async fn launch_browser(
    settings: &BrowserSettings,
) -> BrowserResult<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    // Unique profile per engine so concurrent sessions never contend on a
    // Chrome profile lock.
    let profile_dir = std::env::temp_dir().join(format!(
        "webpilot_profile_{}_{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    let temp_guard = TempDirGuard::new(profile_dir)?;
    let user_data_dir = temp_guard.path.clone();

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(settings.window.width, settings.window.height)
        .user_data_dir(user_data_dir)
        .chrome_executable(chrome_path);

    if settings.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={USER_AGENT}"))
        // Stealth: hides navigator.webdriver and the automation infobar
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--exclude-switches=enable-automation")
        // Rendering: headless capture comes back grey without software GL
        .arg("--use-gl=swiftshader")
        .arg("--enable-surface-synchronization")
        .arg(format!(
            "--window-size={},{}",
            settings.window.width, settings.window.height
        ))
        // Stability
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-prompt-on-repost")
        .arg("--disable-notifications")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    // Sandbox cannot setuid inside containers
    if should_disable_sandbox() {
        info!("Detected containerized environment, disabling sandbox");
        config_builder = config_builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| BrowserError::LaunchFailed(format!("config build failed: {e}")))?;

    info!(headless = settings.headless, "Launching browser");
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();

                // Chrome sends CDP events chromiumoxide doesn't recognize;
                // those deserialization misses are not actionable.
                // https://github.com/mattsse/chromiumoxide/issues/167
                let is_benign_serialization_error = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if !is_benign_serialization_error {
                    error!("Browser handler error: {:?}", e);
                } else {
                    trace!("Suppressed benign CDP serialization error: {}", error_msg);
                }
            }
        }
        info!("Browser handler task completed");
    });

    Ok((browser, handler_task, temp_guard.into_path()))
}

/// Detect a containerized environment (Docker, Kubernetes) where the
/// setuid sandbox is unavailable.
fn should_disable_sandbox() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}
