//! Environment-driven configuration for inference backends.

use finsight_core::defaults;
use finsight_core::{Error, Result};

/// Configuration for the OpenAI-compatible generation backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model to use for generation.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl LlmConfig {
    /// Load from environment variables.
    ///
    /// `LLM_API_KEY` is required; a missing key is a startup error, not a
    /// per-job failure, so misconfiguration surfaces before any work is
    /// accepted.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| Error::Config("LLM_API_KEY is not set".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(Error::Config("LLM_API_KEY is empty".to_string()));
        }

        Ok(Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| defaults::LLM_BASE_URL.to_string()),
            api_key,
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| defaults::LLM_MODEL.to_string()),
            timeout_seconds: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::LLM_TIMEOUT_SECS),
        })
    }
}

/// Configuration for the Serper web-search provider.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Search endpoint URL.
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl SearchConfig {
    /// Load from environment variables.
    ///
    /// Returns `None` when `SEARCH_API_KEY` is unset: search is an optional
    /// capability and the pipeline degrades gracefully without it.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SEARCH_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }

        Some(Self {
            base_url: std::env::var("SEARCH_BASE_URL")
                .unwrap_or_else(|_| defaults::SEARCH_BASE_URL.to_string()),
            api_key,
            timeout_seconds: std::env::var("SEARCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::SEARCH_TIMEOUT_SECS),
        })
    }
}
