//! Model client implementations for CrawlPilot.
//!
//! All clients implement the `crawlpilot_core::ModelClient` trait.
//! [`build_from_config`] assembles the configured client wrapped in retries.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatClient;
pub use retry::RetryingClient;

use crawlpilot_config::ModelConfig;
use crawlpilot_core::{ModelClient, ModelError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Providers that run locally and accept any key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm"];

/// Build the model client described by the configuration.
pub fn build_from_config(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ModelError> {
    let api_key = match &config.api_key {
        Some(key) if !key.trim().is_empty() => key.clone(),
        _ if KEYLESS_PROVIDERS.contains(&config.provider.as_str()) => "none".into(),
        _ => {
            return Err(ModelError::NotConfigured(format!(
                "no API key for provider '{}' (set model.api_key or GEMINI_API_KEY)",
                config.provider
            )));
        }
    };

    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| openai_compat::default_base_url(&config.provider));

    let client = OpenAiCompatClient::new(
        &config.provider,
        &base_url,
        api_key,
        &config.model,
        Duration::from_secs(config.request_timeout_secs),
    )?
    .with_temperature(config.temperature)
    .with_max_tokens(config.max_tokens);

    info!(provider = %config.provider, model = %config.model, url = %base_url, "Model client ready");

    let retrying = RetryingClient::new(Arc::new(client))
        .with_max_retries(config.max_retries)
        .with_base_delay(Duration::from_millis(config.retry_base_delay_ms));
    Ok(Arc::new(retrying))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = ModelConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn builds_with_key() {
        let config = ModelConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        let client = build_from_config(&config).unwrap();
        assert_eq!(client.name(), "gemini");
    }

    #[test]
    fn local_provider_needs_no_key() {
        let config = ModelConfig {
            provider: "ollama".into(),
            model: "llama3".into(),
            ..Default::default()
        };
        assert!(build_from_config(&config).is_ok());
    }

    #[test]
    fn default_urls() {
        assert!(openai_compat::default_base_url("gemini").ends_with("/v1beta/openai"));
        assert_eq!(openai_compat::default_base_url("ollama"), "http://localhost:11434/v1");
    }
}
