use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::task::{AgentType, TaskRecord};

/// Maximum characters of the agent result folded into the indexed text.
const SUMMARY_CHARS: usize = 500;

/// Semantically indexed, immutable projection of a resolved task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub task_ref: Uuid,
    pub agent_type: AgentType,
    pub content_text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub submitted_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(task: &TaskRecord, embedding: Vec<f32>) -> Self {
        Self {
            task_ref: task.id,
            agent_type: task.agent_type,
            content_text: Self::content_for(task),
            embedding,
            submitted_at: task.submitted_at,
        }
    }

    /// Text indexed for a task: the description followed by a summary of
    /// the outcome.
    pub fn content_for(task: &TaskRecord) -> String {
        let summary = match (&task.error_message, &task.result) {
            (Some(err), _) => err.clone(),
            (None, Some(result)) => summarize(result),
            (None, None) => String::new(),
        };
        format!(
            "Task: {}\nAgent: {}\nResult: {}",
            task.description,
            task.agent_type.agent_name(),
            truncate_chars(&summary, SUMMARY_CHARS)
        )
    }
}

fn summarize(result: &Value) -> String {
    match result {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        // Search hits: keep the titles, they carry most of the signal.
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("title").and_then(Value::as_str) {
                Some(title) => title.to_string(),
                None => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// One recall hit with its query-time score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalledMemory {
    pub task_ref: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub relevance_score: f32,
    #[serde(rename = "type")]
    pub kind: AgentType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total_records: usize,
    pub indexed_entries: usize,
    pub by_agent: BTreeMap<String, usize>,
}
