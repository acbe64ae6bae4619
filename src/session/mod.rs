//! Per-connection browser session lifecycle.

mod frames;

pub use frames::FrameLoopHandle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::browser::{AutomationEngine, BrowserError, BrowserResult, EngineFactory};
use crate::config::FrameSettings;
use crate::protocol::{AgentStatus, ServerEvent};

/// Live browser state for one connection.
///
/// Only one exists per connection at a time. It holds the engine, the page
/// URL it last landed on, and the frame loop feeding the client's live view.
pub struct Session {
    engine: Arc<dyn AutomationEngine>,
    current_url: String,
    frame_loop: Option<FrameLoopHandle>,
    action_seq: u64,
    started_at: DateTime<Utc>,
}

impl Session {
    fn new(engine: Arc<dyn AutomationEngine>) -> Self {
        Self {
            engine,
            current_url: String::new(),
            frame_loop: None,
            action_seq: 0,
            started_at: Utc::now(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn AutomationEngine> {
        &self.engine
    }

    /// URL of the last successful navigation; empty while the page is still
    /// blank.
    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn set_current_url(&mut self, url: String) {
        self.current_url = url;
    }

    /// Monotonic ordinal tagging the next executed action in logs.
    pub fn next_action_seq(&mut self) -> u64 {
        self.action_seq += 1;
        self.action_seq
    }

    /// Stop the frame loop, then close the browser. Close failures are
    /// logged and swallowed; teardown always completes.
    async fn shutdown(mut self) {
        if let Some(frame_loop) = self.frame_loop.take() {
            frame_loop.stop().await;
        }
        if let Err(error) = self.engine.close().await {
            warn!(%error, "browser close failed during session teardown");
        }
    }
}

/// Creates, reuses, and tears down the [`Session`] for one connection.
pub struct SessionManager {
    connection_id: String,
    factory: Arc<dyn EngineFactory>,
    frame_settings: FrameSettings,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(
        connection_id: impl Into<String>,
        factory: Arc<dyn EngineFactory>,
        frame_settings: FrameSettings,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            factory,
            frame_settings,
            session: None,
        }
    }

    /// Hand back the live session, creating one when there is none or the
    /// existing browser no longer answers its health probe.
    ///
    /// Launch failures propagate and leave the manager without a session;
    /// the next instruction simply tries again.
    pub async fn ensure(
        &mut self,
        events: &mpsc::Sender<ServerEvent>,
    ) -> BrowserResult<&mut Session> {
        let alive = match &self.session {
            Some(session) => session.engine.is_launched().await,
            None => false,
        };

        if !alive {
            if let Some(stale) = self.session.take() {
                warn!(
                    connection = %self.connection_id,
                    "browser stopped answering, replacing the session"
                );
                stale.shutdown().await;
            }

            let _ = events
                .send(ServerEvent::status(
                    "Launching browser session...",
                    AgentStatus::Thinking,
                ))
                .await;

            let engine = self.factory.create();
            engine.launch().await?;

            let mut session = Session::new(engine);
            session.frame_loop = Some(frames::spawn(
                session.engine.clone(),
                events.clone(),
                self.frame_settings.clone(),
            ));
            info!(connection = %self.connection_id, "browser session ready");
            self.session = Some(session);
        }

        self.session.as_mut().ok_or(BrowserError::NotLaunched)
    }

    /// Tear the session down if one exists. Calling this with no session is
    /// a no-op, so disconnect paths can invoke it unconditionally.
    pub async fn destroy(&mut self) {
        if let Some(session) = self.session.take() {
            let age_secs = (Utc::now() - session.started_at).num_seconds();
            info!(
                connection = %self.connection_id,
                age_secs,
                "destroying browser session"
            );
            session.shutdown().await;
        }
    }
}
