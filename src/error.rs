//! Error taxonomy shared by agents, the memory store and the orchestrator.
//!
//! Agent-level failures ([`AgentError`]) never escape the orchestrator: they
//! are folded into a structured task response. Caller input problems and
//! storage failures ([`MemoryError`], [`TaskError`]) are surfaced directly.

use serde::{Serialize, Serializer};

/// Failures produced by a capability agent while running a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Upstream search or generation service failed (network, quota, malformed response).
    #[error("provider error: {0}")]
    Provider(String),

    /// Generated code could not be confirmed as well-formed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The execution budget elapsed before the program finished.
    #[error("execution timed out after {0}s")]
    Timeout(u64),

    /// Execution input was rejected before running.
    #[error("security error: {0}")]
    Security(String),

    /// The executed program ran but exited unsuccessfully.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl AgentError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider_error",
            Self::Validation(_) => "validation_error",
            Self::Timeout(_) => "timeout_error",
            Self::Security(_) => "security_error",
            Self::Runtime(_) => "runtime_error",
        }
    }
}

impl Serialize for AgentError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AgentError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Failures of the memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Malformed caller input (empty query, non-positive limit).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A backend read or write failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl MemoryError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {err}"))
    }
}

/// Failures surfaced by the orchestrator entry points.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The task runner itself failed (panic or cancellation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<MemoryError> for TaskError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            MemoryError::Storage(msg) => Self::Storage(msg),
        }
    }
}
