use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Start,
    Thinking,
    Action,
    Complete,
    Error,
}

impl ProgressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Thinking => "thinking",
            Self::Action => "action",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Ephemeral notification about orchestration or agent activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task the event belongs to, when emitted on behalf of one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub agent: String,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
