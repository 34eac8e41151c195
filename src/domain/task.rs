use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentResult;
use crate::error::TaskError;

/// The capability that handles a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Search,
    Coding,
    Execution,
}

impl AgentType {
    /// All known capabilities, in display order.
    pub const ALL: [AgentType; 3] = [Self::Search, Self::Coding, Self::Execution];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Coding => "coding",
            Self::Execution => "execution",
        }
    }

    /// Name reported by the agent implementing this capability.
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Search => "SearchAgent",
            Self::Coding => "CodingAgent",
            Self::Execution => "ExecutionAgent",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "coding" => Ok(Self::Coding),
            "execution" => Ok(Self::Execution),
            other => Err(TaskError::InvalidArgument(format!(
                "unknown agent type '{other}' (available: search, coding, execution)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(TaskError::InvalidArgument(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// One submitted task and its outcome.
///
/// A record starts out `Pending` and is resolved exactly once via
/// [`TaskRecord::resolve`]. Only resolved records are written to memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub description: String,
    pub agent_type: AgentType,
    pub submitted_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a pending record. The description is trimmed and must be non-empty.
    pub fn new(description: &str, agent_type: AgentType) -> Result<Self, TaskError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(TaskError::InvalidArgument(
                "description must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            description: description.to_string(),
            agent_type,
            submitted_at: Utc::now(),
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
            metadata: serde_json::Map::new(),
            completed_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Apply the agent outcome. Fails if the record was already resolved.
    pub fn resolve(&mut self, outcome: &AgentResult) -> Result<(), TaskError> {
        if !self.is_pending() {
            return Err(TaskError::InvalidArgument(format!(
                "task {} already resolved as {}",
                self.id,
                self.status.as_str()
            )));
        }

        self.result = Some(outcome.result.clone());
        self.metadata = outcome.metadata.clone();
        self.completed_at = Some(Utc::now());
        match &outcome.error {
            None => {
                self.status = TaskStatus::Success;
                self.error_message = None;
            }
            Some(err) => {
                self.status = TaskStatus::Error;
                self.error_message = Some(err.to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use serde_json::json;

    #[test]
    fn test_new_trims_and_rejects_empty() {
        let record = TaskRecord::new("  compute fibonacci \n", AgentType::Coding).unwrap();
        assert_eq!(record.description, "compute fibonacci");
        assert!(record.is_pending());
        assert!(record.result.is_none());

        assert!(matches!(
            TaskRecord::new("   ", AgentType::Search),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_success_then_reject_second_transition() {
        let mut record = TaskRecord::new("print(1)", AgentType::Execution).unwrap();
        let ok = AgentResult::success("ExecutionAgent", json!("1\n"), serde_json::Map::new());
        record.resolve(&ok).unwrap();

        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.result, Some(json!("1\n")));
        assert!(record.error_message.is_none());
        assert!(record.completed_at.is_some());

        let failed = AgentResult::failure(
            "ExecutionAgent",
            AgentError::Timeout(30),
            serde_json::Value::Null,
            serde_json::Map::new(),
        );
        assert!(record.resolve(&failed).is_err());
        assert_eq!(record.status, TaskStatus::Success);
    }

    #[test]
    fn test_resolve_error_populates_message() {
        let mut record = TaskRecord::new("open('x', 'w')", AgentType::Execution).unwrap();
        let failed = AgentResult::failure(
            "ExecutionAgent",
            AgentError::Security("file access via open()".into()),
            serde_json::Value::Null,
            serde_json::Map::new(),
        );
        record.resolve(&failed).unwrap();

        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(
            record.error_message.as_deref(),
            Some("security error: file access via open()")
        );
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("Search".parse::<AgentType>().unwrap(), AgentType::Search);
        assert_eq!(" coding ".parse::<AgentType>().unwrap(), AgentType::Coding);
        assert!("planner".parse::<AgentType>().is_err());
    }
}
