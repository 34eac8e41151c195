//! Task entry point: classify, dispatch to one agent, report progress, and
//! record the outcome.

pub mod classifier;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::domain::{
    AgentResult, AgentType, MemoryStats, RecalledMemory, TaskRecord, TaskStatus,
};
use crate::error::{AgentError, TaskError};
use crate::memory::{MemoryStore, RecordReceipt};
use crate::progress::ProgressHub;

pub use classifier::{Classification, ClassificationSource, classify, detect_cues};

const ORCHESTRATOR: &str = "Orchestrator";

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub description: String,
    pub agent_type: AgentType,
    pub submitted_at: DateTime<Utc>,
    pub classified_by: ClassificationSource,
}

/// Structured outcome of one submission. Always carries a definite status.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub task: TaskSummary,
    pub agent_response: AgentResult,
    pub memory: RecordReceipt,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallContext {
    pub query: String,
    pub relevant_memories: Vec<RecalledMemory>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub agent_type: AgentType,
    pub name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub agents: Vec<AgentInfo>,
    pub memory: MemoryStats,
    pub memory_backend: &'static str,
    pub embedder: &'static str,
    pub observers: usize,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    agents: AgentRegistry,
    memory: MemoryStore,
    progress: ProgressHub,
}

impl Orchestrator {
    pub fn new(agents: AgentRegistry, memory: MemoryStore, progress: ProgressHub) -> Self {
        Self {
            agents,
            memory,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Run one task to completion.
    ///
    /// Agent failures never surface as `Err`: they resolve the task as
    /// `error`, are recorded like successes, and end with an `error` event.
    /// `Err` means the input was rejected before any work started.
    #[instrument(
        skip(self, description),
        fields(task_id = tracing::field::Empty, agent_type = tracing::field::Empty)
    )]
    pub async fn execute_task(
        &self,
        description: &str,
        explicit: Option<AgentType>,
    ) -> Result<TaskResponse, TaskError> {
        let classification = classify(description, explicit);
        let mut task = TaskRecord::new(description, classification.agent_type)?;

        let span = tracing::Span::current();
        span.record("task_id", tracing::field::display(task.id));
        span.record("agent_type", task.agent_type.as_str());

        let agent = Arc::clone(self.agents.get(task.agent_type));
        let reporter = self.progress.reporter(task.id, ORCHESTRATOR);
        reporter.start(format!(
            "Routing task to {} ({:?})",
            agent.name(),
            classification.source
        ));
        info!(
            name: "orchestrator.dispatch",
            agent = agent.name(),
            source = ?classification.source,
            "Dispatching task"
        );

        let agent_reporter = reporter.for_agent(agent.name());
        let outcome = match AssertUnwindSafe(agent.run(&task.description, &agent_reporter))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(name: "orchestrator.agent.panicked", agent = agent.name(), "Agent panicked");
                AgentResult::failure(
                    agent.name(),
                    AgentError::Runtime(format!("{} failed unexpectedly", agent.name())),
                    Value::Null,
                    Map::new(),
                )
            }
        };

        task.resolve(&outcome)?;
        task.metadata.insert(
            "classified_by".into(),
            serde_json::to_value(classification.source).unwrap_or(Value::Null),
        );

        match &task.error_message {
            None => {
                reporter.complete(format!("{} completed the task", agent.name()));
                info!(name: "orchestrator.task.completed", "Task completed");
            }
            Some(message) => {
                reporter.error(message.clone());
                warn!(
                    name: "orchestrator.task.failed",
                    error = %message,
                    "Task resolved with an agent error"
                );
            }
        }

        let memory = match self.memory.record(&task).await {
            Ok(receipt) => receipt,
            Err(e) => RecordReceipt::not_recorded(e.to_string()),
        };

        Ok(TaskResponse {
            status: task.status,
            error_message: task.error_message.clone(),
            task: TaskSummary {
                id: task.id,
                description: task.description,
                agent_type: task.agent_type,
                submitted_at: task.submitted_at,
                classified_by: classification.source,
            },
            agent_response: outcome,
            memory,
        })
    }

    pub async fn recall_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<RecallContext, TaskError> {
        let relevant_memories = self.memory.recall(query, top_k).await?;
        Ok(RecallContext {
            query: query.trim().to_string(),
            count: relevant_memories.len(),
            relevant_memories,
        })
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<TaskRecord>, TaskError> {
        Ok(self.memory.history(limit).await?)
    }

    pub async fn clear_memory(&self) -> Result<(), TaskError> {
        Ok(self.memory.clear().await?)
    }

    pub async fn status(&self) -> Result<SystemStatus, TaskError> {
        Ok(SystemStatus {
            status: "active",
            agents: self
                .agents
                .roster()
                .map(|(agent_type, name)| AgentInfo { agent_type, name })
                .collect(),
            memory: self.memory.stats().await?,
            memory_backend: self.memory.log_backend(),
            embedder: self.memory.embedder_name(),
            observers: self.progress.observer_count(),
        })
    }
}
