//! Capability agents: one unit of work per invocation, no internal retries.

pub mod coding;
pub mod execution;
pub mod search;

use std::sync::Arc;

pub use coding::CodingAgent;
pub use execution::ExecutionAgent;
pub use search::SearchAgent;

use crate::domain::{AgentResult, AgentType};
use crate::error::TaskError;
use crate::progress::ProgressReporter;

#[async_trait::async_trait]
pub trait CapabilityAgent: Send + Sync + std::fmt::Debug {
    fn agent_type(&self) -> AgentType;

    fn name(&self) -> &'static str {
        self.agent_type().agent_name()
    }

    /// Run one task. Failures are reported in the returned result, never
    /// as a panic or an `Err`.
    async fn run(&self, description: &str, progress: &ProgressReporter) -> AgentResult;
}

/// Body of the first Markdown code fence in `text`, if any. An unclosed
/// fence runs to the end of the text.
pub(crate) fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_marker = &text[open + 3..];
    // The rest of the opening line is the language tag.
    let body_start = after_marker.find('\n').map_or(after_marker.len(), |i| i + 1);
    let body = &after_marker[body_start..];
    let body = body.find("```").map_or(body, |close| &body[..close]);
    Some(body.trim_start_matches(['\n', '\r']).trim_end())
}

/// Closed mapping from capability to the agent serving it.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    search: Arc<dyn CapabilityAgent>,
    coding: Arc<dyn CapabilityAgent>,
    execution: Arc<dyn CapabilityAgent>,
}

impl AgentRegistry {
    /// # Errors
    ///
    /// [`TaskError::InvalidArgument`] if an agent is placed in a slot that
    /// does not match its own capability.
    pub fn new(
        search: Arc<dyn CapabilityAgent>,
        coding: Arc<dyn CapabilityAgent>,
        execution: Arc<dyn CapabilityAgent>,
    ) -> Result<Self, TaskError> {
        for (slot, agent) in [
            (AgentType::Search, &search),
            (AgentType::Coding, &coding),
            (AgentType::Execution, &execution),
        ] {
            if agent.agent_type() != slot {
                return Err(TaskError::InvalidArgument(format!(
                    "{} cannot serve the {slot} capability",
                    agent.name()
                )));
            }
        }
        Ok(Self {
            search,
            coding,
            execution,
        })
    }

    pub fn get(&self, agent_type: AgentType) -> &Arc<dyn CapabilityAgent> {
        match agent_type {
            AgentType::Search => &self.search,
            AgentType::Coding => &self.coding,
            AgentType::Execution => &self.execution,
        }
    }

    /// Each capability with the name of the agent serving it.
    pub fn roster(&self) -> impl Iterator<Item = (AgentType, &'static str)> + '_ {
        AgentType::ALL.iter().map(|t| (*t, self.get(*t).name()))
    }
}
