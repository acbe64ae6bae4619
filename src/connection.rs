//! Per-connection state and instruction handling.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::agent::{ControlLoop, RouteDecision, Router};
use crate::browser::EngineFactory;
use crate::config::Config;
use crate::llm::{ChatMessage, CompletionClient};
use crate::protocol::{AgentStatus, ClientMessage, ServerEvent};
use crate::session::SessionManager;

/// Chat history for one connection. Shared by the router across
/// instructions and kept through browser session teardowns; only closing
/// the socket discards it.
#[derive(Default)]
pub struct ConversationTranscript {
    messages: Vec<ChatMessage>,
}

impl ConversationTranscript {
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// Everything one WebSocket connection owns: its id, its event channel,
/// its conversation, and its browser session manager. Dropped with the
/// socket.
pub struct ConnectionContext {
    id: String,
    events: mpsc::Sender<ServerEvent>,
    transcript: ConversationTranscript,
    sessions: SessionManager,
    router: Router,
    llm: Arc<dyn CompletionClient>,
    config: Config,
}

impl ConnectionContext {
    pub fn new(
        id: impl Into<String>,
        events: mpsc::Sender<ServerEvent>,
        llm: Arc<dyn CompletionClient>,
        engines: Arc<dyn EngineFactory>,
        config: Config,
    ) -> Self {
        let id = id.into();
        Self {
            sessions: SessionManager::new(id.clone(), engines, config.frames.clone()),
            router: Router::new(llm.clone()),
            transcript: ConversationTranscript::default(),
            id,
            events,
            llm,
            config,
        }
    }

    /// Handle one raw text frame from the client. Malformed input costs an
    /// error event and nothing else; the connection stays usable.
    pub async fn handle_text(&mut self, raw: &str) {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Command { instruction }) => {
                self.handle_instruction(&instruction).await;
            }
            Err(parse_error) => {
                warn!(connection = %self.id, %parse_error, "malformed client message");
                self.send(ServerEvent::error(
                    "Could not parse that message. Expected {\"type\": \"command\", \"instruction\": \"...\"}.",
                ))
                .await;
            }
        }
    }

    /// Route one instruction: either answer conversationally or hand it to
    /// the control loop with a live browser session.
    async fn handle_instruction(&mut self, instruction: &str) {
        info!(connection = %self.id, instruction, "instruction received");
        self.transcript.push_user(instruction);

        let decision = match self.router.classify(self.transcript.messages()).await {
            Ok(decision) => decision,
            Err(llm_error) => {
                error!(connection = %self.id, %llm_error, "routing model call failed");
                self.fail_and_teardown(
                    "The language model is unreachable right now. Please try again.",
                )
                .await;
                return;
            }
        };

        match decision {
            RouteDecision::Reply(reply) => {
                self.transcript.push_assistant(reply.clone());
                self.send(ServerEvent::status(reply, AgentStatus::Idle)).await;
            }
            RouteDecision::Agent => self.run_agent(instruction).await,
        }
    }

    async fn run_agent(&mut self, instruction: &str) {
        let session = match self.sessions.ensure(&self.events).await {
            Ok(session) => session,
            Err(launch_error) => {
                error!(connection = %self.id, %launch_error, "browser launch failed");
                self.send(ServerEvent::error(format!(
                    "Could not start the browser: {launch_error}"
                )))
                .await;
                return;
            }
        };

        let control_loop = ControlLoop::new(
            self.llm.clone(),
            self.events.clone(),
            self.config.agent.clone(),
        );

        match control_loop.run(session, instruction).await {
            Ok(outcome) => {
                // Keep the conversation coherent for follow-up questions.
                self.transcript.push_assistant(outcome.summary());
            }
            Err(agent_error) => {
                error!(connection = %self.id, %agent_error, "agent invocation failed");
                self.fail_and_teardown(
                    "The agent hit an internal error and the browser session was reset.",
                )
                .await;
            }
        }
    }

    /// Tear down the browser session when the socket goes away.
    pub async fn teardown(&mut self) {
        self.sessions.destroy().await;
    }

    /// One error event, then the session goes. The connection survives;
    /// the next instruction starts from a clean browser.
    async fn fail_and_teardown(&mut self, message: &str) {
        self.send(ServerEvent::error(message)).await;
        self.sessions.destroy().await;
    }

    async fn send(&self, event: ServerEvent) {
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeEngine, FakeEngineFactory, ScriptedModel};
    use std::sync::atomic::Ordering;

    fn new_context(
        engine: Arc<FakeEngine>,
        model: ScriptedModel,
    ) -> (ConnectionContext, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let config = Config {
            agent: crate::config::AgentSettings {
                settle_delay_ms: 0,
                ..Default::default()
            },
            // Keep the frame loop quiet during connection tests.
            frames: crate::config::FrameSettings {
                interval_ms: 60_000,
                ..Default::default()
            },
            ..Default::default()
        };
        let context = ConnectionContext::new(
            "test-conn",
            tx,
            Arc::new(model),
            Arc::new(FakeEngineFactory::new(engine)),
            config,
        );
        (context, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn conversational_reply_needs_no_browser() {
        let engine = FakeEngine::new();
        let (mut context, mut rx) = new_context(engine.clone(), ScriptedModel::new(["Hello! Ask me anything."]));

        context
            .handle_text(r#"{"type": "command", "instruction": "hello"}"#)
            .await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ServerEvent::Status { data, status: AgentStatus::Idle } if data == "Hello! Ask me anything."
        ));
        assert_eq!(engine.launch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(context.transcript.messages().len(), 2);
    }

    #[tokio::test]
    async fn malformed_message_costs_one_error_event() {
        let engine = FakeEngine::new();
        let (mut context, mut rx) = new_context(engine.clone(), ScriptedModel::new(["Still here."]));

        context.handle_text("{not json").await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::Error { .. }));

        // The connection is still usable afterwards.
        context
            .handle_text(r#"{"type": "command", "instruction": "hi"}"#)
            .await;
        assert!(matches!(
            drain(&mut rx).last(),
            Some(ServerEvent::Status { .. })
        ));
    }

    #[tokio::test]
    async fn agent_instruction_launches_and_reports() {
        let engine = FakeEngine::new();
        let (mut context, mut rx) = new_context(
            engine.clone(),
            ScriptedModel::new([
                "ACTION",
                "navigate https://example.com",
                "done the title is Example Domain",
            ]),
        );

        context
            .handle_text(r#"{"type": "command", "instruction": "open example.com and read the title"}"#)
            .await;

        assert_eq!(engine.launch_calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ServerEvent::Result { data, status: AgentStatus::Done })
                if data == "the title is Example Domain"
        ));
        // The summary joined the conversation.
        assert_eq!(
            context.transcript.messages().last().unwrap().content,
            "the title is Example Domain"
        );
    }

    #[tokio::test]
    async fn model_failure_tears_the_session_down() {
        let engine = FakeEngine::new();
        let (mut context, mut rx) = new_context(
            engine.clone(),
            // Routes into the agent, then the model dies.
            ScriptedModel::new(["ACTION"]),
        );

        context
            .handle_text(r#"{"type": "command", "instruction": "open example.com"}"#)
            .await;

        assert_eq!(engine.launch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.close_calls.load(Ordering::SeqCst), 1);
        let events = drain(&mut rx);
        let errors = events
            .iter()
            .filter(|event| matches!(event, ServerEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn launch_failure_reports_and_leaves_no_session() {
        let engine = FakeEngine::new();
        *engine.launch_error.lock().unwrap() = Some("no executable".to_string());
        let (mut context, mut rx) = new_context(engine.clone(), ScriptedModel::new(["ACTION"]));

        context
            .handle_text(r#"{"type": "command", "instruction": "open example.com"}"#)
            .await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, ServerEvent::Error { .. })));
        assert!(!matches!(events.last(), Some(ServerEvent::Result { .. })));
        assert_eq!(engine.close_calls.load(Ordering::SeqCst), 0);

        context.teardown().await;
        assert_eq!(engine.close_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn teardown_after_agent_run_closes_the_browser() {
        let engine = FakeEngine::new();
        let (mut context, _rx) = new_context(
            engine.clone(),
            ScriptedModel::new(["ACTION", "done nothing to see"]),
        );

        context
            .handle_text(r#"{"type": "command", "instruction": "look around"}"#)
            .await;
        context.teardown().await;
        context.teardown().await;

        assert_eq!(engine.close_calls.load(Ordering::SeqCst), 1);
    }
}
