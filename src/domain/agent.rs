use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Success,
    Error,
}

/// Outcome of one capability agent invocation.
///
/// `result` may be populated on failure too: a code generation run that
/// fails validation still returns the raw generated text.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub status: AgentStatus,
    pub result: Value,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
}

impl AgentResult {
    pub fn success(agent_name: impl Into<String>, result: Value, metadata: Map<String, Value>) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Success,
            result,
            metadata,
            error: None,
        }
    }

    pub fn failure(
        agent_name: impl Into<String>,
        error: AgentError,
        result: Value,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Error,
            result,
            metadata,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}
