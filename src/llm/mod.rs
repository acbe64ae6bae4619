//! Language-model completion client.
//!
//! The agent only ever needs one operation: send an ordered list of
//! role-tagged messages, get one assistant reply back. `CompletionClient`
//! is that seam; `OpenAiClient` implements it against any OpenAI-compatible
//! chat-completions endpoint. Keeping the trait object-safe lets tests
//! script the model.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the completion service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status with the response body text.
    #[error("llm returned {status}: {body}")]
    Api { status: u16, body: String },
}

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Completion service contract: ordered messages in, one assistant reply out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String>;
}
