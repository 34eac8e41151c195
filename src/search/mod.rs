//! Web search collaborators.

pub mod serpapi;

pub use serpapi::{SerpApiClient, UnconfiguredSearch};

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Returns up to `limit` ranked hits for a query.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AgentError>;

    fn name(&self) -> &'static str;
}
