//! Scripted doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{
    AutomationEngine, BrowserError, BrowserResult, EngineFactory, ImageFormat, NavigatedPage,
};
use crate::llm::{ChatMessage, CompletionClient, LlmError, LlmResult};

/// Completion client that pops scripted replies in order and records every
/// transcript it was shown. An exhausted script fails the call, which doubles
/// as the model-failure fixture.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    pub transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Api {
                status: 500,
                body: "scripted replies exhausted".to_string(),
            })
    }
}

/// Automation engine double. Records every call in order and lets tests
/// script failures, page titles, outlines, and capture latency.
pub struct FakeEngine {
    pub launched: AtomicBool,
    pub launch_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub screenshot_calls: AtomicUsize,
    pub launch_error: Mutex<Option<String>>,
    pub fail_selectors: Mutex<Vec<String>>,
    pub title: Mutex<String>,
    pub outline: Mutex<String>,
    pub frame_bytes: Mutex<Vec<u8>>,
    pub capture_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            launched: AtomicBool::new(false),
            launch_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            screenshot_calls: AtomicUsize::new(0),
            launch_error: Mutex::new(None),
            fail_selectors: Mutex::new(Vec::new()),
            title: Mutex::new("Example Domain".to_string()),
            outline: Mutex::new("Page: Example Domain\nURL: https://example.com/".to_string()),
            frame_bytes: Mutex::new(vec![0xFF, 0xD8, 0xFF]),
            capture_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn should_fail(&self, selector: &str) -> bool {
        self.fail_selectors
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == selector)
    }
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    async fn launch(&self) -> BrowserResult<()> {
        self.launch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.launch_error.lock().unwrap().take() {
            return Err(BrowserError::LaunchFailed(message));
        }
        self.launched.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    async fn navigate(&self, url: &str) -> BrowserResult<NavigatedPage> {
        if !self.launched.load(Ordering::SeqCst) {
            return Err(BrowserError::NotLaunched);
        }
        self.record(format!("navigate {url}"));
        Ok(NavigatedPage {
            url: url.to_string(),
            title: self.title.lock().unwrap().clone(),
        })
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        if self.should_fail(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> BrowserResult<()> {
        if self.should_fail(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        self.record(format!("fill {selector} {text}"));
        Ok(())
    }

    async fn scroll(&self, delta_y: i64) -> BrowserResult<()> {
        self.record(format!("scroll {delta_y}"));
        Ok(())
    }

    async fn screenshot(&self, _format: ImageFormat, _quality: u8) -> BrowserResult<Vec<u8>> {
        let delay = *self.capture_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.screenshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame_bytes.lock().unwrap().clone())
    }

    async fn snapshot(&self, _interactive: bool) -> BrowserResult<String> {
        self.record("snapshot".to_string());
        Ok(self.outline.lock().unwrap().clone())
    }

    async fn wait_for_settle(&self, _timeout: Duration) {
        self.record("settle".to_string());
    }

    async fn close(&self) -> BrowserResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.launched.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out clones of one shared [`FakeEngine`] so tests keep a
/// handle to the engine a session is using.
pub struct FakeEngineFactory {
    pub engine: Arc<FakeEngine>,
}

impl FakeEngineFactory {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self { engine }
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self) -> Arc<dyn AutomationEngine> {
        self.engine.clone()
    }
}
