//! First-pass classifier deciding whether an instruction needs the
//! browser at all.

use std::sync::Arc;

use tracing::debug;

use crate::llm::{ChatMessage, CompletionClient, LlmResult};

/// Exact reply that routes the instruction into the control loop.
const ACTION_SENTINEL: &str = "ACTION";

const ROUTER_PROMPT: &str = "You are the dispatcher for an assistant that can \
operate a real web browser. Read the conversation and decide whether the \
user's latest message requires using the browser: visiting a site, clicking, \
typing into a page, scrolling, or reading live page content. If it does, \
reply with exactly ACTION and nothing else. Otherwise answer the user \
directly and conversationally.";

/// Outcome of classifying one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The instruction needs the browser; start the control loop.
    Agent,
    /// Plain conversation; the model already wrote the answer.
    Reply(String),
}

pub struct Router {
    llm: Arc<dyn CompletionClient>,
}

impl Router {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Single-shot classification over the conversation so far.
    ///
    /// The caller appends the new instruction to the conversation before
    /// calling. There is no retry; a model failure propagates.
    pub async fn classify(&self, conversation: &[ChatMessage]) -> LlmResult<RouteDecision> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(ROUTER_PROMPT));
        messages.extend_from_slice(conversation);

        let reply = self.llm.complete(&messages).await?;
        if reply.trim() == ACTION_SENTINEL {
            debug!("instruction routed to the control loop");
            Ok(RouteDecision::Agent)
        } else {
            debug!("instruction answered conversationally");
            Ok(RouteDecision::Reply(reply))
        }
    }
}
