//! Chronological task log: ordered append, point lookups, recency scans.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::TaskRecord;
use crate::error::MemoryError;

#[async_trait]
pub trait ChronologicalLog: Send + Sync + std::fmt::Debug {
    /// Append a resolved record. Records are immutable: appending an id
    /// that is already present fails.
    async fn append(&self, task: &TaskRecord) -> Result<(), MemoryError>;

    /// Most recent records first, at most `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<TaskRecord>, MemoryError>;

    /// Every record, oldest first.
    async fn all(&self) -> Result<Vec<TaskRecord>, MemoryError>;

    async fn count_by_agent(&self) -> Result<BTreeMap<String, usize>, MemoryError>;

    async fn clear(&self) -> Result<(), MemoryError>;

    fn backend(&self) -> &'static str;
}

/// Process-local log. Used for tests and `memory.database_url = "memory"`.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    records: RwLock<Vec<TaskRecord>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChronologicalLog for InMemoryLog {
    async fn append(&self, task: &TaskRecord) -> Result<(), MemoryError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == task.id) {
            return Err(MemoryError::Storage(format!(
                "task {} is already recorded",
                task.id
            )));
        }
        records.push(task.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TaskRecord>, MemoryError> {
        let records = self.records.read().await;
        // Reverse first so that, for equal timestamps, later appends win.
        let mut newest: Vec<TaskRecord> = records.iter().rev().cloned().collect();
        newest.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        newest.truncate(limit);
        Ok(newest)
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, MemoryError> {
        let mut records = self.records.read().await.clone();
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(records)
    }

    async fn count_by_agent(&self) -> Result<BTreeMap<String, usize>, MemoryError> {
        let records = self.records.read().await;
        let mut counts = BTreeMap::new();
        for record in records.iter() {
            *counts
                .entry(record.agent_type.agent_name().to_string())
                .or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.records.write().await.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
