use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::domain::{AgentResult, AgentType};
use crate::error::AgentError;
use crate::llm::TextGenerator;
use crate::progress::ProgressReporter;
use crate::sandbox::{SyntaxValidator, SyntaxVerdict};

use super::{CapabilityAgent, fenced_block};

const SYSTEM_PROMPT: &str = "You are an expert Python developer. Write clean, correct, \
well-commented Python 3 code that fulfils the user's request. Respond with a single \
Python code block and nothing else.";

/// Generates Python source and checks that it parses.
#[derive(Debug, Clone)]
pub struct CodingAgent {
    generator: Arc<dyn TextGenerator>,
    validator: Arc<dyn SyntaxValidator>,
}

impl CodingAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, validator: Arc<dyn SyntaxValidator>) -> Self {
        Self {
            generator,
            validator,
        }
    }
}

/// Generated text with any Markdown fence removed.
pub fn strip_code_fence(raw: &str) -> String {
    fenced_block(raw).unwrap_or(raw.trim()).to_string()
}

#[async_trait::async_trait]
impl CapabilityAgent for CodingAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Coding
    }

    async fn run(&self, description: &str, progress: &ProgressReporter) -> AgentResult {
        let mut metadata = Map::new();
        metadata.insert("language".into(), json!("python"));
        metadata.insert("generator".into(), json!(self.generator.name()));

        progress.thinking(format!("Planning code structure for: {description}"));
        progress.action(format!("Generating code with {}", self.generator.name()));

        let raw = match self.generator.generate(SYSTEM_PROMPT, description).await {
            Ok(raw) => raw,
            Err(err) => return AgentResult::failure(self.name(), err, Value::Null, metadata),
        };

        let code = strip_code_fence(&raw);
        metadata.insert("lines".into(), json!(code.lines().count()));

        if code.is_empty() {
            metadata.insert("syntax_valid".into(), json!(false));
            return AgentResult::failure(
                self.name(),
                AgentError::Validation("generator returned no code".to_string()),
                json!(raw),
                metadata,
            );
        }

        progress.action("Validating syntax");
        let verdict = self.validator.check(&code).await;
        metadata.insert("syntax_valid".into(), json!(verdict.is_valid()));

        match verdict {
            SyntaxVerdict::Valid => AgentResult::success(self.name(), json!(code), metadata),
            SyntaxVerdict::Invalid(reason) => AgentResult::failure(
                self.name(),
                AgentError::Validation(reason),
                json!(code),
                metadata,
            ),
            SyntaxVerdict::Unknown(reason) => AgentResult::failure(
                self.name(),
                AgentError::Validation(format!("could not confirm syntax: {reason}")),
                json!(code),
                metadata,
            ),
        }
    }
}
