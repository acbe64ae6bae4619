//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use tracing::debug;

use super::{ChatMessage, CompletionClient, LlmError, LlmResult};

pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: String, model: String, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
        });

        debug!(
            model = %self.model,
            messages = messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        debug!(content_len = content.len(), "completion response received");
        Ok(content)
    }
}
