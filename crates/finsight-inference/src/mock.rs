//! Mock backends for deterministic testing.
//!
//! Provide scripted generation responses and canned search hits so the
//! pipeline can be exercised without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use finsight_core::{Error, GenerationBackend, Result, SearchHit, SearchProvider};

/// A logged call against a mock backend.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

/// Mock generation backend for testing.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    /// Responses keyed on a substring of the prompt.
    keyed_responses: HashMap<String, String>,
    default_response: String,
    fail_on: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            keyed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            fail_on: None,
        }
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned when no keyed response matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Return `output` whenever the prompt contains `key`.
    pub fn with_keyed_response(
        mut self,
        key: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .keyed_responses
            .insert(key.into(), output.into());
        self
    }

    /// Fail with `Error::Inference` whenever the prompt contains `key`.
    pub fn failing_on(mut self, key: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).fail_on = Some(key.into());
        self
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of generation calls made.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.call_log.lock().unwrap().push(MockCall {
            operation: "generate".to_string(),
            input: prompt.to_string(),
        });

        if let Some(ref key) = self.config.fail_on {
            if prompt.contains(key.as_str()) {
                return Err(Error::Inference(format!("mock failure on '{key}'")));
            }
        }

        for (key, output) in &self.config.keyed_responses {
            if prompt.contains(key.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(self.config.default_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Mock search provider returning canned hits.
#[derive(Clone, Default)]
pub struct MockSearchProvider {
    hits: Vec<SearchHit>,
}

impl MockSearchProvider {
    /// Create a provider that returns no hits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider returning the given hits.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_response() {
        let backend = MockGenerationBackend::new().with_fixed_response("analysis text");
        let out = backend.generate_with_system("sys", "prompt").await.unwrap();
        assert_eq!(out, "analysis text");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_keyed_response_takes_priority() {
        let backend = MockGenerationBackend::new()
            .with_fixed_response("default")
            .with_keyed_response("risk", "risk assessment");

        let out = backend
            .generate_with_system("", "assess the risk profile")
            .await
            .unwrap();
        assert_eq!(out, "risk assessment");

        let out = backend.generate_with_system("", "other").await.unwrap();
        assert_eq!(out, "default");
    }

    #[tokio::test]
    async fn test_failing_on() {
        let backend = MockGenerationBackend::new().failing_on("recommendation");
        let err = backend
            .generate_with_system("", "give a recommendation")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[tokio::test]
    async fn test_mock_search_limit() {
        let provider = MockSearchProvider::with_hits(vec![
            SearchHit {
                title: "a".into(),
                url: "u".into(),
                snippet: "s".into(),
            };
            4
        ]);
        let hits = provider.search("q", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
