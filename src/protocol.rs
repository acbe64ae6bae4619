//! Wire protocol for the WebSocket client connection.
//!
//! One JSON message type per event. Inbound traffic is a single `command`
//! shape; outbound traffic is `status`/`result`/`frame`/`error`. Frames
//! carry base64 JPEG data and are independent of the instruction lifecycle.

use serde::{Deserialize, Serialize};

/// Agent activity reported alongside status and result events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Scraping,
    Done,
    Error,
}

/// Messages accepted from the client. Unknown extra fields are ignored so
/// older clients that still send a `url` alongside the instruction keep
/// working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Command { instruction: String },
}

/// Messages pushed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Progress report for the in-flight instruction, or a direct
    /// conversational reply.
    Status { data: String, status: AgentStatus },
    /// Terminal output of one instruction.
    Result { data: String, status: AgentStatus },
    /// One captured page image, base64-encoded JPEG.
    Frame { data: String },
    /// Fatal condition for the current instruction.
    Error { data: String, status: AgentStatus },
}

impl ServerEvent {
    pub fn status(data: impl Into<String>, status: AgentStatus) -> Self {
        Self::Status {
            data: data.into(),
            status,
        }
    }

    pub fn result(data: impl Into<String>, status: AgentStatus) -> Self {
        Self::Result {
            data: data.into(),
            status,
        }
    }

    pub fn frame(base64_image: impl Into<String>) -> Self {
        Self::Frame {
            data: base64_image.into(),
        }
    }

    pub fn error(data: impl Into<String>) -> Self {
        Self::Error {
            data: data.into(),
            status: AgentStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_deserialization() {
        let json = r#"{"type":"command","instruction":"go to example.com"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::Command { instruction } = parsed;
        assert_eq!(instruction, "go to example.com");
    }

    #[test]
    fn test_command_ignores_extra_fields() {
        let json = r#"{"type":"command","url":"https://example.com","instruction":"hi"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::Command { instruction } = parsed;
        assert_eq!(instruction, "hi");
    }

    #[test]
    fn test_malformed_command_rejected() {
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_status_event_shape() {
        let event = ServerEvent::status("Launching browser session...", AgentStatus::Thinking);
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["data"], "Launching browser session...");
        assert_eq!(value["status"], "thinking");
    }

    #[test]
    fn test_result_event_shape() {
        let event = ServerEvent::result("Found 3 items", AgentStatus::Done);
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["status"], "done");
    }

    #[test]
    fn test_frame_event_has_no_status() {
        let event = ServerEvent::frame("aGVsbG8=");
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["data"], "aGVsbG8=");
        assert!(value.get("status").is_none());
    }

    #[test]
    fn test_error_event_status_is_error() {
        let event = ServerEvent::error("browser launch failed: no executable");
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["status"], "error");
    }
}
