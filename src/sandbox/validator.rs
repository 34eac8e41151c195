use std::time::Duration;

use super::run_script;

const PARSE_SCRIPT: &str = "import ast, sys\nast.parse(sys.stdin.read())";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxVerdict {
    Valid,
    /// The parser rejected the text; carries the parser's message.
    Invalid(String),
    /// The check itself could not run.
    Unknown(String),
}

impl SyntaxVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[async_trait::async_trait]
pub trait SyntaxValidator: Send + Sync + std::fmt::Debug {
    async fn check(&self, code: &str) -> SyntaxVerdict;
}

/// Parses (never executes) code with `ast.parse` in the configured interpreter.
#[derive(Debug, Clone)]
pub struct PythonSyntaxValidator {
    python_bin: String,
    budget: Duration,
}

impl PythonSyntaxValidator {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
            budget: Duration::from_secs(10),
        }
    }
}

#[async_trait::async_trait]
impl SyntaxValidator for PythonSyntaxValidator {
    async fn check(&self, code: &str) -> SyntaxVerdict {
        match tokio::time::timeout(
            self.budget,
            run_script(&self.python_bin, PARSE_SCRIPT, &[], code),
        )
        .await
        {
            Err(_) => SyntaxVerdict::Unknown("syntax check timed out".to_string()),
            Ok(Err(e)) => SyntaxVerdict::Unknown(format!(
                "cannot run '{}' for syntax check: {e}",
                self.python_bin
            )),
            Ok(Ok(output)) if output.status.success() => SyntaxVerdict::Valid,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("syntax error")
                    .trim()
                    .to_string();
                SyntaxVerdict::Invalid(message)
            }
        }
    }
}
