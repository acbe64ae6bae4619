//! Runtime configuration, loaded from `config.yaml` next to the manifest
//! when present, else built entirely from defaults.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub frames: FrameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Window dimensions; also the frame viewport
    #[serde(default)]
    pub window: WindowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Completion endpoint configuration. The API key never lives in the file;
/// only the name of the environment variable holding it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model calls allowed per instruction before the loop gives up
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Pause between an executed action and the next page read
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSettings {
    /// Capture cadence; 66ms is roughly 15 frames per second
    #[serde(default = "default_frame_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_steps() -> usize {
    10
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_frame_interval_ms() -> u64 {
    66
}

fn default_jpeg_quality() -> u8 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            browser: BrowserSettings::default(),
            llm: LlmSettings::default(),
            agent: AgentSettings::default(),
            frames: FrameSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window: WindowSettings::default(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_frame_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Load config from config.yaml in the package root
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.browser.headless);
        assert_eq!(config.browser.window.width, 1280);
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.frames.interval_ms, 66);
        assert_eq!(config.frames.jpeg_quality, 60);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "
server:
  port: 8080
frames:
  jpeg_quality: 80
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.frames.jpeg_quality, 80);
        assert_eq!(config.frames.interval_ms, 66);
    }
}
