//! Conversational browser automation over a persistent WebSocket.
//!
//! A client sends plain-language commands; a language model either answers
//! directly or drives a headless Chromium session action by action, while a
//! frame loop streams JPEG snapshots of whatever the browser is doing.

pub mod agent;
pub mod browser;
pub mod config;
pub mod connection;
pub mod llm;
pub mod protocol;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{
    AgentSettings, BrowserSettings, Config, FrameSettings, LlmSettings, ServerSettings,
    WindowSettings, load_yaml_config,
};
