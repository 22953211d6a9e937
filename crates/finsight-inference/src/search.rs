//! Serper web-search provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use finsight_core::{Error, Result, SearchHit, SearchProvider};

use crate::config::SearchConfig;

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Web-search provider backed by the Serper API.
pub struct SerperProvider {
    client: Client,
    config: SearchConfig,
}

impl SerperProvider {
    /// Create a new provider with the given configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Search(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "serper",
            base_url = %config.base_url,
            "Initializing search provider"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables. Returns `None` when search is
    /// not configured.
    pub fn from_env() -> Result<Option<Self>> {
        match SearchConfig::from_env() {
            Some(config) => Ok(Some(Self::new(config)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        debug!(
            subsystem = "inference",
            component = "serper",
            op = "search",
            "Searching"
        );

        let response = self
            .client
            .post(&self.config.base_url)
            .header("X-API-KEY", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&SerperRequest { q: query, num: limit })
            .send()
            .await
            .map_err(|e| Error::Search(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Search(format!(
                "Search endpoint returned {}",
                response.status()
            )));
        }

        let result: SerperResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse response: {}", e)))?;

        Ok(result
            .organic
            .into_iter()
            .take(limit)
            .map(|o| SearchHit {
                title: o.title,
                url: o.link,
                snippet: o.snippet,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> SearchConfig {
        SearchConfig {
            base_url,
            api_key: "serper-key".to_string(),
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_search_parses_organic_hits() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "serper-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [
                    {"title": "Fed holds rates", "link": "https://example.com/a", "snippet": "Rates unchanged."},
                    {"title": "Markets rally", "link": "https://example.com/b", "snippet": "Stocks up."}
                ]
            })))
            .mount(&server)
            .await;

        let provider = SerperProvider::new(test_config(format!("{}/search", server.uri()))).unwrap();
        let hits = provider.search("fed rates", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Fed holds rates");
        assert_eq!(hits[1].url, "https://example.com/b");
    }

    #[tokio::test]
    async fn test_search_truncates_to_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [
                    {"title": "a", "link": "u1", "snippet": "s"},
                    {"title": "b", "link": "u2", "snippet": "s"},
                    {"title": "c", "link": "u3", "snippet": "s"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = SerperProvider::new(test_config(format!("{}/search", server.uri()))).unwrap();
        let hits = provider.search("q", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = SerperProvider::new(test_config(format!("{}/search", server.uri()))).unwrap();
        let err = provider.search("q", 5).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[tokio::test]
    async fn test_search_empty_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let provider = SerperProvider::new(test_config(format!("{}/search", server.uri()))).unwrap();
        let hits = provider.search("q", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
