//! Semantic index over memory entries.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::MemoryEntry;
use crate::error::MemoryError;
use crate::memory::embedding::cosine_similarity;

/// A memory entry with its query-time similarity.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub score: f32,
}

#[async_trait]
pub trait SemanticIndex: Send + Sync + std::fmt::Debug {
    /// Index a new entry. Entries are immutable: re-inserting a `task_ref`
    /// fails.
    async fn insert(&self, entry: MemoryEntry) -> Result<(), MemoryError>;

    /// Rank every entry against `query`, best first. Equal scores are
    /// ordered most recent first.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredEntry>, MemoryError>;

    async fn contains(&self, task_ref: Uuid) -> Result<bool, MemoryError>;

    async fn len(&self) -> Result<usize, MemoryError>;

    async fn clear(&self) -> Result<(), MemoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<Uuid, MemoryEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn insert(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.task_ref) {
            return Err(MemoryError::Storage(format!(
                "memory entry for task {} already indexed",
                entry.task_ref
            )));
        }
        entries.insert(entry.task_ref, entry);
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredEntry>, MemoryError> {
        let entries = self.entries.read().await;
        let mut matches: Vec<ScoredEntry> = entries
            .values()
            .map(|entry| ScoredEntry {
                score: cosine_similarity(query, &entry.embedding),
                entry: entry.clone(),
            })
            .filter(|m| m.score >= min_score)
            .collect();
        drop(entries);

        matches.sort_by(rank);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn contains(&self, task_ref: Uuid) -> Result<bool, MemoryError> {
        Ok(self.entries.read().await.contains_key(&task_ref))
    }

    async fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Score descending, then newest first, then id for a total order.
fn rank(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entry.submitted_at.cmp(&a.entry.submitted_at))
        .then_with(|| a.entry.task_ref.cmp(&b.entry.task_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentType;
    use chrono::{Duration, Utc};

    fn entry(embedding: Vec<f32>, age_secs: i64) -> MemoryEntry {
        MemoryEntry {
            task_ref: Uuid::new_v4(),
            agent_type: AgentType::Coding,
            content_text: String::new(),
            embedding,
            submitted_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_recency() {
        let index = InMemoryIndex::new();
        let older_tie = entry(vec![1.0, 0.0], 60);
        let newer_tie = entry(vec![1.0, 0.0], 1);
        let weaker = entry(vec![1.0, 1.0], 0);
        let unrelated = entry(vec![0.0, 1.0], 0);
        for e in [&older_tie, &newer_tie, &weaker, &unrelated] {
            index.insert(e.clone()).await.unwrap();
        }

        let hits = index.search(&[1.0, 0.0], 3, 0.0).await.unwrap();
        let refs: Vec<_> = hits.iter().map(|h| h.entry.task_ref).collect();
        assert_eq!(refs, vec![newer_tie.task_ref, older_tie.task_ref, weaker.task_ref]);
        assert!(hits[2].score < hits[1].score);
    }

    #[tokio::test]
    async fn test_min_score_filters_and_empty_index_is_ok() {
        let index = InMemoryIndex::new();
        assert!(index.search(&[1.0], 5, 0.0).await.unwrap().is_empty());

        index.insert(entry(vec![0.0, 1.0], 0)).await.unwrap();
        assert!(index.search(&[1.0, 0.0], 5, 0.1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_are_immutable() {
        let index = InMemoryIndex::new();
        let e = entry(vec![1.0], 0);
        index.insert(e.clone()).await.unwrap();
        assert!(index.insert(e).await.is_err());
        assert_eq!(index.len().await.unwrap(), 1);
    }
}
