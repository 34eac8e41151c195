//! Text generation clients used by the coding agent.
//!
//! - [`ChatCompletionsClient`]: OpenAI-compatible `/v1/chat/completions`
//!   (or an Azure deployment), non-streaming.
//! - [`TemplateGenerator`]: offline fallback used when no LLM endpoint is
//!   configured.

pub mod chat;
pub mod provider;
pub mod template;

pub use chat::ChatCompletionsClient;
pub use provider::Provider;
pub use template::TemplateGenerator;

use crate::error::AgentError;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`).
    pub model: String,
    /// Provider type, detected from `base_url`.
    pub provider: Provider,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Produces source text for a natural-language prompt.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Generate a completion for `prompt` under the given system instruction.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Provider`] on transport failures, non-success
    /// status codes or malformed responses.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AgentError>;

    /// Short identifier reported in agent metadata.
    fn name(&self) -> String;
}
