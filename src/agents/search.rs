use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::domain::{AgentResult, AgentType};
use crate::error::AgentError;
use crate::progress::ProgressReporter;
use crate::search::SearchProvider;

use super::CapabilityAgent;

pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Request phrasing removed before querying, longest first.
const QUERY_PREFIXES: &[&str] = &[
    "find information about",
    "find information on",
    "information about",
    "research about",
    "tell me about",
    "search the web for",
    "search for",
    "look up",
    "search",
    "find",
];

#[derive(Debug, Clone)]
pub struct SearchAgent {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl SearchAgent {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results: max_results.clamp(1, DEFAULT_MAX_RESULTS),
        }
    }
}

/// Strip request phrasing so only the subject is sent to the provider.
pub fn derive_query(description: &str) -> String {
    let mut query = description.trim();
    for prefix in QUERY_PREFIXES {
        let Some(head) = query.get(..prefix.len()) else {
            continue;
        };
        let rest = &query[prefix.len()..];
        if head.eq_ignore_ascii_case(prefix)
            && rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
        {
            query = rest;
            break;
        }
    }
    query
        .trim_start_matches([':', ' ', '\t'])
        .trim_end_matches(['?', ' ', '\t', '\n'])
        .trim()
        .to_string()
}

#[async_trait::async_trait]
impl CapabilityAgent for SearchAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Search
    }

    async fn run(&self, description: &str, progress: &ProgressReporter) -> AgentResult {
        let query = derive_query(description);
        let mut metadata = Map::new();
        metadata.insert("query".into(), json!(query));
        metadata.insert("provider".into(), json!(self.provider.name()));

        if query.is_empty() {
            return AgentResult::failure(
                self.name(),
                AgentError::Provider("search query is empty".to_string()),
                Value::Null,
                metadata,
            );
        }

        progress.thinking(format!("Analyzing search query: {query}"));
        progress.action(format!("Searching the web for: {query}"));

        match self.provider.search(&query, self.max_results).await {
            Ok(mut hits) => {
                hits.truncate(self.max_results);
                debug!(name: "agent.search.results", count = hits.len(), "Search completed");
                metadata.insert("results_count".into(), json!(hits.len()));
                AgentResult::success(self.name(), json!(hits), metadata)
            }
            Err(err) => AgentResult::failure(self.name(), err, Value::Null, metadata),
        }
    }
}
