//! Core data model: task records, agent results, memory entries and
//! progress events.

pub mod agent;
pub mod events;
pub mod memory;
pub mod task;

pub use agent::{AgentResult, AgentStatus};
pub use events::{ProgressEvent, ProgressKind};
pub use memory::{MemoryEntry, MemoryStats, RecalledMemory};
pub use task::{AgentType, TaskRecord, TaskStatus};
