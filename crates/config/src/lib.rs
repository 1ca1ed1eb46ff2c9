//! Configuration loading, validation, and management for CrawlPilot.
//!
//! Loads configuration from `~/.crawlpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use crawlpilot_core::{BusyPolicy, LimitPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.crawlpilot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name, used for logging and to pick a default endpoint
    #[serde(default = "default_provider")]
    pub provider: String,

    /// OpenAI-compatible base URL (defaults per provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Timeout for a single HTTP request to the model
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for transient failures (timeouts, rate limits, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_request_timeout() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    500
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per turn (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock bound on a whole turn
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,

    /// How hitting `max_iterations` is reported
    #[serde(default)]
    pub on_iteration_limit: LimitPolicy,

    /// What a second concurrent turn on the same session does
    #[serde(default)]
    pub busy_policy: BusyPolicy,

    /// User input beyond this many characters is truncated
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Instructions sent ahead of the history on every model call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_turn_timeout() -> u64 {
    120
}
fn default_max_input_chars() -> usize {
    175_000
}

/// The default assistant instructions.
pub fn default_system_prompt() -> String {
    "You are a helpful AI assistant with web search and scraping capabilities. \
Your responses are shown in a chat interface.\n\n\
Formatting:\n\
- Start with a direct answer or short summary, then details.\n\
- Use bullet points for lists and **bold** for key points.\n\
- Keep paragraphs short and scannable; avoid repeating information.\n\n\
Capabilities: you can search the web, scrape pages, map websites and \
extract structured data with the provided tools. Use them whenever the \
question needs current or specific information from the web, and cite the \
pages you used. End with a brief offer of next steps."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            turn_timeout_secs: default_turn_timeout(),
            on_iteration_limit: LimitPolicy::default(),
            busy_policy: BusyPolicy::default(),
            max_input_chars: default_max_input_chars(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firecrawl_api_key: Option<String>,

    #[serde(default = "default_firecrawl_url")]
    pub firecrawl_api_url: String,

    /// Per-call timeout
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Calls from one batch that may run at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Tool output beyond this many characters is truncated
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Tool names to register. Empty = all built-in tools.
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_firecrawl_url() -> String {
    "https://api.firecrawl.dev".into()
}
fn default_call_timeout() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_output_chars() -> usize {
    50_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            firecrawl_api_key: None,
            firecrawl_api_url: default_firecrawl_url(),
            call_timeout_secs: default_call_timeout(),
            max_concurrency: default_max_concurrency(),
            max_output_chars: default_max_output_chars(),
            enabled: vec![],
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("firecrawl_api_key", &redact(&self.firecrawl_api_key))
            .field("firecrawl_api_url", &self.firecrawl_api_url)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_output_chars", &self.max_output_chars)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Sessions kept in memory before the least recently used idle one is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_max_sessions() -> usize {
    1_000
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_sessions: default_max_sessions(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.crawlpilot/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CRAWLPILOT_API_KEY`, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`
    /// - `FIRECRAWL_API_KEY`
    /// - `CRAWLPILOT_MODEL`
    /// - `PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific path and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("CRAWLPILOT_API_KEY")
            .or_else(|| lookup("GEMINI_API_KEY"))
            .or_else(|| lookup("GOOGLE_API_KEY"))
        {
            self.model.api_key = Some(key);
        }

        if let Some(key) = lookup("FIRECRAWL_API_KEY") {
            self.tools.firecrawl_api_key = Some(key);
        }

        if let Some(model) = lookup("CRAWLPILOT_MODEL") {
            self.model.model = model;
        }

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".crawlpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.turn_timeout_secs == 0 || self.tools.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs and tools.call_timeout_secs must be > 0".into(),
            ));
        }

        if self.tools.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_concurrency must be at least 1".into(),
            ));
        }

        if self.gateway.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_sessions must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
