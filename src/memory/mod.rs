//! Dual-store task memory.
//!
//! Every resolved task is written twice: the full [`TaskRecord`] goes to a
//! [`ChronologicalLog`] (durable, ordered) and a [`MemoryEntry`] derived from
//! it goes to a [`SemanticIndex`] (embedding similarity). The two writes are
//! best-effort with reporting: the log write decides whether the task was
//! recorded at all, the index write only whether it is searchable yet. A
//! [`RecordReceipt`] tells the caller which of the two happened, and
//! [`MemoryStore::reconcile`] later indexes anything the log holds that the
//! index is missing.

pub mod embedding;
pub mod index;
pub mod log;
pub mod sqlite;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{MemoryEntry, MemoryStats, RecalledMemory, TaskRecord};
use crate::error::MemoryError;

pub use embedding::{Embedder, FastEmbedder, HashingEmbedder, cosine_similarity};
pub use index::{InMemoryIndex, ScoredEntry, SemanticIndex};
pub use log::{ChronologicalLog, InMemoryLog};
pub use sqlite::SqliteLog;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Failed,
    Skipped,
}

/// Per-backend outcome of [`MemoryStore::record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReceipt {
    pub chronological: WriteStatus,
    pub semantic: WriteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecordReceipt {
    /// Both backends hold the task.
    pub fn is_complete(&self) -> bool {
        self.chronological == WriteStatus::Written && self.semantic == WriteStatus::Written
    }

    /// Receipt for a task whose chronological write failed.
    pub fn not_recorded(detail: impl Into<String>) -> Self {
        Self {
            chronological: WriteStatus::Failed,
            semantic: WriteStatus::Skipped,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    log: Arc<dyn ChronologicalLog>,
    index: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn Embedder>,
    /// Writers share, `clear` is exclusive: a record never straddles a clear.
    gate: Arc<RwLock<()>>,
}

impl MemoryStore {
    pub fn new(
        log: Arc<dyn ChronologicalLog>,
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            log,
            index,
            embedder,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Process-local store, nothing survives a restart.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            Arc::new(InMemoryLog::new()),
            Arc::new(InMemoryIndex::new()),
            embedder,
        )
    }

    pub fn log_backend(&self) -> &'static str {
        self.log.backend()
    }

    pub fn embedder_name(&self) -> &'static str {
        self.embedder.name()
    }

    /// Write a resolved task to both backends.
    ///
    /// Returns `Err` only when the chronological write fails, in which case
    /// nothing was recorded. A semantic failure after a successful log write
    /// yields `Ok` with `semantic: Failed`.
    #[instrument(skip_all, fields(task_id = %task.id, agent_type = %task.agent_type))]
    pub async fn record(&self, task: &TaskRecord) -> Result<RecordReceipt, MemoryError> {
        if task.is_pending() {
            return Err(MemoryError::InvalidArgument(format!(
                "task {} is still pending",
                task.id
            )));
        }

        let _shared = self.gate.read().await;

        if let Err(e) = self.log.append(task).await {
            error!(name: "memory.record.failed", error = %e, "Chronological write failed");
            return Err(e);
        }

        match self.index_task(task).await {
            Ok(()) => {
                debug!(name: "memory.record.written", "Task recorded in both stores");
                Ok(RecordReceipt {
                    chronological: WriteStatus::Written,
                    semantic: WriteStatus::Written,
                    detail: None,
                })
            }
            Err(e) => {
                warn!(
                    name: "memory.record.degraded",
                    error = %e,
                    "Task recorded but not yet searchable"
                );
                Ok(RecordReceipt {
                    chronological: WriteStatus::Written,
                    semantic: WriteStatus::Failed,
                    detail: Some(e.to_string()),
                })
            }
        }
    }

    async fn index_task(&self, task: &TaskRecord) -> Result<(), MemoryError> {
        let content = MemoryEntry::content_for(task);
        let embedding = self.embedder.embed_one(&content).await?;
        self.index.insert(MemoryEntry::new(task, embedding)).await
    }

    /// Top `top_k` entries by similarity to `query`, best first.
    pub async fn recall(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RecalledMemory>, MemoryError> {
        self.recall_with_threshold(query, top_k, 0.0).await
    }

    /// Like [`recall`](Self::recall), dropping entries scoring below `min_score`.
    #[instrument(skip(self))]
    pub async fn recall_with_threshold(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RecalledMemory>, MemoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(MemoryError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let query_vec = self.embedder.embed_one(query).await?;
        let hits = self.index.search(&query_vec, top_k, min_score).await?;

        Ok(hits
            .into_iter()
            .map(|hit| RecalledMemory {
                task_ref: hit.entry.task_ref,
                content: hit.entry.content_text,
                timestamp: hit.entry.submitted_at,
                relevance_score: hit.score,
                kind: hit.entry.agent_type,
            })
            .collect())
    }

    /// Most recent task records first.
    pub async fn history(&self, limit: i64) -> Result<Vec<TaskRecord>, MemoryError> {
        let limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| {
                MemoryError::InvalidArgument(format!(
                    "limit must be a positive integer, got {limit}"
                ))
            })?;
        self.log.recent(limit).await
    }

    /// Empty both stores. Both are attempted even if the first fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), MemoryError> {
        let _exclusive = self.gate.write().await;

        let log_result = self.log.clear().await;
        let index_result = self.index.clear().await;

        match (log_result, index_result) {
            (Ok(()), Ok(())) => {
                info!(name: "memory.cleared", "Memory cleared");
                Ok(())
            }
            (Err(e), _) | (Ok(()), Err(e)) => {
                error!(name: "memory.clear.failed", error = %e, "Memory clear failed");
                Err(e)
            }
        }
    }

    /// Index every logged record the semantic index is missing.
    /// Returns how many entries were added; records that fail to index are
    /// logged and left for the next pass.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<usize, MemoryError> {
        let _shared = self.gate.read().await;

        let mut indexed = 0;
        for task in self.log.all().await? {
            if task.is_pending() || self.index.contains(task.id).await? {
                continue;
            }
            match self.index_task(&task).await {
                Ok(()) => indexed += 1,
                Err(e) => warn!(
                    name: "memory.reconcile.skipped",
                    task_id = %task.id,
                    error = %e,
                    "Record left unindexed"
                ),
            }
        }

        if indexed > 0 {
            info!(name: "memory.reconciled", indexed, "Semantic index caught up with log");
        }
        Ok(indexed)
    }

    pub async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let by_agent = self.log.count_by_agent().await?;
        Ok(MemoryStats {
            total_records: by_agent.values().sum(),
            indexed_entries: self.index.len().await?,
            by_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentResult, AgentType};
    use crate::error::AgentError;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn store() -> MemoryStore {
        MemoryStore::in_memory(Arc::new(HashingEmbedder::new(512)))
    }

    fn resolved(description: &str, agent_type: AgentType, result: Value) -> TaskRecord {
        let mut task = TaskRecord::new(description, agent_type).unwrap();
        task.resolve(&AgentResult::success(agent_type.agent_name(), result, Map::new()))
            .unwrap();
        task
    }

    /// Index that fails inserts until switched back on, and always refuses
    /// entries mentioning `refuses`.
    #[derive(Debug, Default)]
    struct FlakyIndex {
        inner: InMemoryIndex,
        broken: AtomicBool,
        refuses: Option<&'static str>,
    }

    #[async_trait]
    impl SemanticIndex for FlakyIndex {
        async fn insert(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
            let refused = self
                .refuses
                .is_some_and(|word| entry.content_text.contains(word));
            if refused || self.broken.load(Ordering::SeqCst) {
                return Err(MemoryError::storage("index unavailable"));
            }
            self.inner.insert(entry).await
        }

        async fn search(
            &self,
            query: &[f32],
            limit: usize,
            min_score: f32,
        ) -> Result<Vec<ScoredEntry>, MemoryError> {
            self.inner.search(query, limit, min_score).await
        }

        async fn contains(&self, task_ref: Uuid) -> Result<bool, MemoryError> {
            self.inner.contains(task_ref).await
        }

        async fn len(&self) -> Result<usize, MemoryError> {
            self.inner.len().await
        }

        async fn clear(&self) -> Result<(), MemoryError> {
            self.inner.clear().await
        }
    }

    #[derive(Debug)]
    struct FailingLog;

    #[async_trait]
    impl ChronologicalLog for FailingLog {
        async fn append(&self, _task: &TaskRecord) -> Result<(), MemoryError> {
            Err(MemoryError::storage("disk full"))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<TaskRecord>, MemoryError> {
            Ok(Vec::new())
        }

        async fn all(&self) -> Result<Vec<TaskRecord>, MemoryError> {
            Ok(Vec::new())
        }

        async fn count_by_agent(&self) -> Result<BTreeMap<String, usize>, MemoryError> {
            Ok(BTreeMap::new())
        }

        async fn clear(&self) -> Result<(), MemoryError> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_recall_ranks_matching_entry_first() {
        let memory = store();
        let fib = resolved(
            "Write a function to compute fibonacci numbers",
            AgentType::Coding,
            json!("def fibonacci(n): return n"),
        );
        memory
            .record(&resolved(
                "search for latest rust news",
                AgentType::Search,
                json!([{"title": "Rust 1.80 released", "url": "https://r", "snippet": ""}]),
            ))
            .await
            .unwrap();
        memory.record(&fib).await.unwrap();
        memory
            .record(&resolved("print(1+1)", AgentType::Execution, json!("2\n")))
            .await
            .unwrap();

        let hits = memory.recall("fibonacci", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].task_ref, fib.id);
        assert_eq!(hits[0].kind, AgentType::Coding);
        assert!(hits[0].relevance_score > 0.0);
        assert!(hits[1].relevance_score < hits[0].relevance_score);

        let again = memory.recall("fibonacci", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(again[0].relevance_score, hits[0].relevance_score);
    }

    #[tokio::test]
    async fn test_recall_on_empty_store_and_bad_input() {
        let memory = store();
        assert!(memory.recall("anything", 5).await.unwrap().is_empty());
        assert!(matches!(
            memory.recall("   ", 5).await,
            Err(MemoryError::InvalidArgument(_))
        ));
        assert!(matches!(
            memory.recall("x", 0).await,
            Err(MemoryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_history_limits_and_order() {
        let memory = store();
        let mut ids = Vec::new();
        for i in 0..12 {
            let mut task = resolved(&format!("task number {i}"), AgentType::Coding, json!(i));
            task.submitted_at += chrono::Duration::milliseconds(i);
            memory.record(&task).await.unwrap();
            ids.push(task.id);
        }

        let recent = memory.history(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id, ids[11]);
        assert_eq!(recent[9].id, ids[2]);

        for bad in [0, -1] {
            assert!(matches!(
                memory.history(bad).await,
                Err(MemoryError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_failed_tasks_are_recorded_and_pending_rejected() {
        let memory = store();
        let mut failed = TaskRecord::new("import os", AgentType::Execution).unwrap();
        assert!(matches!(
            memory.record(&failed).await,
            Err(MemoryError::InvalidArgument(_))
        ));

        failed
            .resolve(&AgentResult::failure(
                "ExecutionAgent",
                AgentError::Security("forbidden import 'os'".into()),
                Value::Null,
                Map::new(),
            ))
            .unwrap();
        let receipt = memory.record(&failed).await.unwrap();
        assert!(receipt.is_complete());

        let hits = memory.recall("forbidden import", 5).await.unwrap();
        assert_eq!(hits[0].task_ref, failed.id);
    }

    #[tokio::test]
    async fn test_clear_empties_both_stores_and_is_idempotent() {
        let memory = store();
        memory.clear().await.unwrap();
        memory
            .record(&resolved("find rust docs", AgentType::Search, json!([])))
            .await
            .unwrap();

        memory.clear().await.unwrap();
        memory.clear().await.unwrap();

        assert!(memory.history(50).await.unwrap().is_empty());
        assert!(memory.recall("rust", 5).await.unwrap().is_empty());
        assert_eq!(memory.stats().await.unwrap(), MemoryStats::default());
    }

    #[tokio::test]
    async fn test_degraded_write_is_reported_then_reconciled() {
        let index = Arc::new(FlakyIndex::default());
        index.broken.store(true, Ordering::SeqCst);
        let memory = MemoryStore::new(
            Arc::new(InMemoryLog::new()),
            index.clone(),
            Arc::new(HashingEmbedder::new(512)),
        );

        let task = resolved("compute fibonacci", AgentType::Coding, json!("fib"));
        let receipt = memory.record(&task).await.unwrap();
        assert_eq!(receipt.chronological, WriteStatus::Written);
        assert_eq!(receipt.semantic, WriteStatus::Failed);
        assert!(receipt.detail.as_deref().unwrap().contains("index unavailable"));

        assert_eq!(memory.history(5).await.unwrap().len(), 1);
        assert!(memory.recall("fibonacci", 5).await.unwrap().is_empty());

        index.broken.store(false, Ordering::SeqCst);
        assert_eq!(memory.reconcile().await.unwrap(), 1);
        assert_eq!(memory.reconcile().await.unwrap(), 0);

        let hits = memory.recall("fibonacci", 5).await.unwrap();
        assert_eq!(hits[0].task_ref, task.id);

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.indexed_entries, 1);
        assert_eq!(stats.by_agent.get("CodingAgent"), Some(&1));
    }

    #[tokio::test]
    async fn test_log_failure_records_nothing() {
        let index = Arc::new(InMemoryIndex::new());
        let memory = MemoryStore::new(
            Arc::new(FailingLog),
            index.clone(),
            Arc::new(HashingEmbedder::new(512)),
        );

        let task = resolved("compute fibonacci", AgentType::Coding, json!("fib"));
        let err = memory.record(&task).await.unwrap_err();
        assert!(matches!(err, MemoryError::Storage(ref m) if m == "disk full"));
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_skips_records_that_fail_to_index() {
        let log = Arc::new(InMemoryLog::new());
        let mut ids = Vec::new();
        for (i, description) in (0_i64..).zip(["first job", "poison job", "third job"]) {
            let mut task = resolved(description, AgentType::Coding, json!(i));
            task.submitted_at += chrono::Duration::milliseconds(i);
            log.append(&task).await.unwrap();
            ids.push(task.id);
        }
        let index = Arc::new(FlakyIndex {
            refuses: Some("poison"),
            ..FlakyIndex::default()
        });
        let memory = MemoryStore::new(log, index.clone(), Arc::new(HashingEmbedder::new(512)));

        assert_eq!(memory.reconcile().await.unwrap(), 2);
        assert!(index.contains(ids[0]).await.unwrap());
        assert!(!index.contains(ids[1]).await.unwrap());
        assert!(index.contains(ids[2]).await.unwrap());

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.indexed_entries, 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_stay_independent() {
        let memory = store();
        let tasks: Vec<_> = (0..8)
            .map(|i| resolved(&format!("parallel job {i}"), AgentType::Coding, json!(i)))
            .collect();

        let handles: Vec<_> = tasks
            .iter()
            .cloned()
            .map(|task| {
                let memory = memory.clone();
                tokio::spawn(async move { memory.record(&task).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_complete());
        }

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.total_records, 8);
        assert_eq!(stats.indexed_entries, 8);
    }
}
