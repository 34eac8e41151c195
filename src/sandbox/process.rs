use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

use super::{SandboxOutput, SandboxRunner, truncate_text};

pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 20_000;

/// Runs code with `python -I -c` in a scratch directory.
///
/// The child gets an empty environment apart from `PATH`, no stdin, and is
/// killed when the budget elapses.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    python_bin: String,
    max_output_chars: usize,
}

impl ProcessSandbox {
    pub fn new(python_bin: impl Into<String>, max_output_chars: usize) -> Self {
        Self {
            python_bin: python_bin.into(),
            max_output_chars: max_output_chars.max(1),
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new("python3", DEFAULT_MAX_OUTPUT_CHARS)
    }
}

#[async_trait::async_trait]
impl SandboxRunner for ProcessSandbox {
    async fn run(&self, code: &str, budget: Duration) -> Result<SandboxOutput, AgentError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| AgentError::Runtime(format!("failed to create scratch dir: {e}")))?;

        let mut command = Command::new(&self.python_bin);
        command
            .arg("-I")
            .arg("-c")
            .arg(code)
            .current_dir(scratch.path())
            .env_clear()
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            AgentError::Runtime(format!(
                "failed to launch interpreter '{}': {e}",
                self.python_bin
            ))
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| AgentError::Runtime(format!("failed to collect output: {e}")))?
            }
            Err(_) => {
                warn!(
                    name: "sandbox.timeout",
                    budget_secs = budget.as_secs(),
                    "Sandboxed run exceeded its budget, process killed"
                );
                return Err(AgentError::Timeout(budget.as_secs().max(1)));
            }
        };
        let duration = started.elapsed();

        let (stdout, out_cut) =
            truncate_text(&String::from_utf8_lossy(&output.stdout), self.max_output_chars);
        let (stderr, err_cut) =
            truncate_text(&String::from_utf8_lossy(&output.stderr), self.max_output_chars);

        debug!(
            name: "sandbox.finished",
            exit_code = ?output.status.code(),
            duration_ms = duration.as_millis() as u64,
            "Sandboxed run finished"
        );

        Ok(SandboxOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
            duration,
            truncated: out_cut || err_cut,
        })
    }
}
