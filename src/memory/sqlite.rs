//! SQLite-backed chronological log.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::domain::{AgentType, TaskRecord, TaskStatus};
use crate::error::MemoryError;
use crate::memory::log::ChronologicalLog;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS task_records (
    id            TEXT PRIMARY KEY,
    description   TEXT NOT NULL,
    agent_type    TEXT NOT NULL,
    submitted_at  TEXT NOT NULL,
    status        TEXT NOT NULL,
    result        TEXT,
    error_message TEXT,
    metadata      TEXT NOT NULL DEFAULT '{}',
    completed_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_task_records_submitted_at
    ON task_records (submitted_at DESC);
";

const SELECT_COLUMNS: &str = "id, description, agent_type, submitted_at, status, result, \
                              error_message, metadata, completed_at";

#[derive(Debug, Clone)]
pub struct SqliteLog {
    pool: SqlitePool,
}

impl SqliteLog {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, MemoryError> {
        ensure_parent_dir(url).await?;

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to an in-memory database is a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!(name: "memory.sqlite.ready", url = %url, "Chronological log ready");

        Ok(Self { pool })
    }
}

async fn ensure_parent_dir(url: &str) -> Result<(), MemoryError> {
    let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(MemoryError::storage)?;
        }
    }
    Ok(())
}

/// Fixed-width RFC 3339 so that lexical order matches time order.
fn encode_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::Storage(format!("bad timestamp '{raw}': {e}")))
}

fn decode_row(row: &SqliteRow) -> Result<TaskRecord, MemoryError> {
    let id: String = row.try_get("id")?;
    let agent_type: String = row.try_get("agent_type")?;
    let status: String = row.try_get("status")?;
    let submitted_at: String = row.try_get("submitted_at")?;
    let result: Option<String> = row.try_get("result")?;
    let metadata: String = row.try_get("metadata")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(TaskRecord {
        id: Uuid::parse_str(&id).map_err(MemoryError::storage)?,
        description: row.try_get("description")?,
        agent_type: AgentType::from_str(&agent_type).map_err(MemoryError::storage)?,
        submitted_at: decode_time(&submitted_at)?,
        status: TaskStatus::from_str(&status).map_err(MemoryError::storage)?,
        result: result.map(|r| serde_json::from_str(&r)).transpose()?,
        error_message: row.try_get("error_message")?,
        metadata: serde_json::from_str(&metadata)?,
        completed_at: completed_at.as_deref().map(decode_time).transpose()?,
    })
}

#[async_trait]
impl ChronologicalLog for SqliteLog {
    async fn append(&self, task: &TaskRecord) -> Result<(), MemoryError> {
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;
        let metadata = serde_json::to_string(&task.metadata)?;

        sqlx::query(
            r"
            INSERT INTO task_records
                (id, description, agent_type, submitted_at, status, result,
                 error_message, metadata, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(task.id.to_string())
        .bind(&task.description)
        .bind(task.agent_type.as_str())
        .bind(encode_time(task.submitted_at))
        .bind(task.status.as_str())
        .bind(result)
        .bind(&task.error_message)
        .bind(metadata)
        .bind(task.completed_at.map(encode_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TaskRecord>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM task_records \
             ORDER BY submitted_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn all(&self) -> Result<Vec<TaskRecord>, MemoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM task_records ORDER BY submitted_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count_by_agent(&self) -> Result<BTreeMap<String, usize>, MemoryError> {
        let rows = sqlx::query(
            "SELECT agent_type, COUNT(*) AS n FROM task_records GROUP BY agent_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let agent_type: String = row.try_get("agent_type")?;
            let n: i64 = row.try_get("n")?;
            let name = AgentType::from_str(&agent_type)
                .map_err(MemoryError::storage)?
                .agent_name();
            counts.insert(name.to_string(), usize::try_from(n).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM task_records")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentResult;
    use serde_json::json;

    fn resolved(description: &str, agent_type: AgentType) -> TaskRecord {
        let mut task = TaskRecord::new(description, agent_type).unwrap();
        task.resolve(&AgentResult::success(
            agent_type.agent_name(),
            json!({"answer": 42}),
            serde_json::Map::new(),
        ))
        .unwrap();
        task
    }

    #[tokio::test]
    async fn test_roundtrip_and_recency_order() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/nested/memory.db", dir.path().display());
        let log = SqliteLog::connect(&url).await.unwrap();

        let first = resolved("first task", AgentType::Search);
        let mut second = resolved("second task", AgentType::Coding);
        second.submitted_at = first.submitted_at + chrono::Duration::seconds(1);
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].description, "second task");
        assert_eq!(recent[1].id, first.id);

        assert_eq!(recent[0].result, Some(json!({"answer": 42})));

        let counts = log.count_by_agent().await.unwrap();
        assert_eq!(counts.get("SearchAgent"), Some(&1));
        assert_eq!(counts.get("CodingAgent"), Some(&1));
    }

    #[tokio::test]
    async fn test_duplicate_append_is_rejected() {
        let log = SqliteLog::connect("sqlite::memory:").await.unwrap();
        let task = resolved("only once", AgentType::Execution);
        log.append(&task).await.unwrap();
        assert!(matches!(log.append(&task).await, Err(MemoryError::Storage(_))));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let log = SqliteLog::connect("sqlite::memory:").await.unwrap();
        log.clear().await.unwrap();
        log.append(&resolved("to be cleared", AgentType::Search))
            .await
            .unwrap();
        log.clear().await.unwrap();
        log.clear().await.unwrap();
        assert!(log.recent(50).await.unwrap().is_empty());
    }
}
