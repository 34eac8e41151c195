use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::domain::{AgentResult, AgentType};
use crate::error::AgentError;
use crate::progress::ProgressReporter;
use crate::sandbox::{CodeGuard, CodeScreen, SandboxRunner};

use super::{CapabilityAgent, fenced_block};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Leading phrases stripped before execution, longest first.
const DIRECTIVES: &[&str] = &[
    "execute this code",
    "test this code",
    "run this code",
    "execute this",
    "run the code",
    "run this",
    "execute",
    "run",
];

/// Screens code textually with a [`CodeGuard`] and structurally with a
/// [`CodeScreen`], then runs it under a hard budget.
#[derive(Debug, Clone)]
pub struct ExecutionAgent {
    runner: Arc<dyn SandboxRunner>,
    screen: Arc<dyn CodeScreen>,
    guard: CodeGuard,
    timeout: Duration,
}

impl ExecutionAgent {
    pub fn new(
        runner: Arc<dyn SandboxRunner>,
        screen: Arc<dyn CodeScreen>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            screen,
            guard: CodeGuard,
            timeout,
        }
    }
}

/// The code to run: the first fenced block, else the description with any
/// leading directive (`run this:`, `execute:`, ...) removed.
pub fn extract_code(description: &str) -> String {
    if let Some(block) = fenced_block(description) {
        return block.to_string();
    }

    let text = description.trim();
    for directive in DIRECTIVES {
        let Some(head) = text.get(..directive.len()) else {
            continue;
        };
        let rest = &text[directive.len()..];
        if !head.eq_ignore_ascii_case(directive) {
            continue;
        }
        if let Some(code) = rest.strip_prefix(':') {
            return code.trim().to_string();
        }
        if rest.starts_with(char::is_whitespace) {
            return rest.trim().to_string();
        }
    }
    text.to_string()
}

fn failure_reason(stderr: &str, exit_code: Option<i32>) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match exit_code {
        Some(code) => format!("process exited with status {code}"),
        None => "process terminated by signal".to_string(),
    }
}

#[async_trait::async_trait]
impl CapabilityAgent for ExecutionAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Execution
    }

    async fn run(&self, description: &str, progress: &ProgressReporter) -> AgentResult {
        let code = extract_code(description);
        let mut metadata = Map::new();
        metadata.insert("language".into(), json!("python"));
        metadata.insert("timeout_secs".into(), json!(self.timeout.as_secs()));

        if code.is_empty() {
            return AgentResult::failure(
                self.name(),
                AgentError::Validation("no code to execute".to_string()),
                Value::Null,
                metadata,
            );
        }

        progress.thinking("Preparing to execute code");
        let screened = match self.guard.check(&code) {
            Ok(()) => self.screen.screen(&code).await,
            Err(err) => Err(err),
        };
        if let Err(err) = screened {
            progress.action(format!("Rejected before execution: {err}"));
            return AgentResult::failure(self.name(), err, Value::Null, metadata);
        }

        progress.action(format!(
            "Running code in sandbox (timeout {}s)",
            self.timeout.as_secs()
        ));
        let output = match self.runner.run(&code, self.timeout).await {
            Ok(output) => output,
            Err(err) => return AgentResult::failure(self.name(), err, Value::Null, metadata),
        };

        metadata.insert("exit_code".into(), json!(output.exit_code));
        metadata.insert(
            "duration_ms".into(),
            json!(u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX)),
        );
        metadata.insert("stderr".into(), json!(output.stderr));
        metadata.insert("truncated".into(), json!(output.truncated));

        if output.succeeded() {
            AgentResult::success(self.name(), json!(output.stdout), metadata)
        } else {
            let reason = failure_reason(&output.stderr, output.exit_code);
            AgentResult::failure(
                self.name(),
                AgentError::Runtime(reason),
                json!(output.stdout),
                metadata,
            )
        }
    }
}
