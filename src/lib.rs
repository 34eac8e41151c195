//! Agent orchestration service.
//!
//! Routes free-text tasks to one of three capability agents (web search,
//! code generation, sandboxed execution), streams progress to live
//! observers, and keeps every task in a dual-store memory for recall.
//!
//! # Modules
//!
//! - [`orchestrator`]: classification, dispatch, and task lifecycle
//! - [`agents`]: the capability agents
//! - [`progress`]: broadcast channel for progress events
//! - [`memory`]: chronological log + semantic index
//! - [`llm`], [`search`], [`sandbox`]: external collaborators
//! - [`server`]: HTTP and SSE surface

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod agents;
pub mod config;
pub mod domain;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod sandbox;
pub mod search;
pub mod server;
pub mod telemetry;

use crate::config::AppConfig;
use orchestrator::Orchestrator;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Task entry point; owns the agents, memory and progress hub.
    pub orchestrator: Arc<Orchestrator>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
