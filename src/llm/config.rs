//! LLM configuration and service construction

use super::{LlmService, LoggingService, OpenAIService, UnconfiguredService};
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Configuration for the completion oracle
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GROQ_API_KEY")
                .or_else(|_| std::env::var("LLM_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}

/// Build the oracle described by `config`, wrapped with request logging.
///
/// Falls back to [`UnconfiguredService`] when no key is present or the
/// HTTP client cannot be built, so the server can still start.
pub fn connect(config: &LlmConfig) -> Arc<dyn LlmService> {
    let Some(api_key) = config.api_key.clone() else {
        tracing::warn!("No LLM API key configured. Set GROQ_API_KEY or LLM_API_KEY.");
        return Arc::new(UnconfiguredService);
    };

    match OpenAIService::new(api_key, &config.base_url, config.model.clone()) {
        Ok(service) => Arc::new(LoggingService::new(Arc::new(service))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create LLM client");
            Arc::new(UnconfiguredService)
        }
    }
}
