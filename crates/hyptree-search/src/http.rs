//! HTTP-backed search gateway against a configurable search endpoint.

use crate::gateway::SearchGateway;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub struct HttpSearchGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSearchGateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), api_key: None }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchGateway for HttpSearchGateway {
    async fn search(&self, query: &str) -> String {
        let mut request = self.client.get(&self.endpoint).query(&[("q", query)]);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {key}"));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("search request failed: {e}");
                return String::new();
            }
        };

        if !response.status().is_success() {
            warn!("search endpoint returned {}", response.status());
            return String::new();
        }

        let parsed: SearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("search response was not valid JSON: {e}");
                return String::new();
            }
        };

        parsed
            .results
            .into_iter()
            .map(|r| format!("{}: {}", r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
