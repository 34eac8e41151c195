//! SerpAPI (Google engine) client.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AgentError;

use super::{SearchHit, SearchProvider};

pub const DEFAULT_ENDPOINT: &str = "https://serpapi.com/search.json";

#[derive(Clone)]
pub struct SerpApiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for SerpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl SerpApiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

fn into_hits(response: SerpResponse, limit: usize) -> Result<Vec<SearchHit>, AgentError> {
    // SerpAPI reports "no results" through the error field too.
    if let Some(err) = response.error {
        if response.organic_results.is_empty() && !err.contains("hasn't returned any results") {
            return Err(AgentError::Provider(format!("search provider error: {err}")));
        }
    }

    Ok(response
        .organic_results
        .into_iter()
        .filter(|r| !r.link.is_empty())
        .take(limit)
        .map(|r| SearchHit {
            title: r.title,
            url: r.link,
            snippet: r.snippet,
        })
        .collect())
}

#[async_trait::async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AgentError> {
        let num = limit.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Provider(format!(
                "search provider returned {status}"
            )));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("malformed search response: {e}")))?;

        into_hits(body, limit)
    }

    fn name(&self) -> &'static str {
        "serpapi"
    }
}

/// Stand-in used when no search API key is configured.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredSearch;

#[async_trait::async_trait]
impl SearchProvider for UnconfiguredSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, AgentError> {
        Err(AgentError::Provider(
            "search provider not configured".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}
