//! Isolated execution of untrusted Python snippets.
//!
//! [`CodeGuard`] and then [`PythonAstScreen`] reject input statically before
//! anything runs. [`ProcessSandbox`] runs what passes in a short-lived
//! interpreter under a hard wall-clock budget. [`PythonSyntaxValidator`]
//! checks generated code without executing it.

pub mod guard;
pub mod process;
pub mod screen;
pub mod validator;

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub use guard::CodeGuard;
pub use process::ProcessSandbox;
pub use screen::{CodeScreen, PythonAstScreen};
pub use validator::{PythonSyntaxValidator, SyntaxValidator, SyntaxVerdict};

use crate::error::AgentError;

/// Captured result of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// Either stream was cut at the output cap.
    pub truncated: bool,
}

impl SandboxOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs source text under a timeout.
#[async_trait::async_trait]
pub trait SandboxRunner: Send + Sync + std::fmt::Debug {
    /// # Errors
    ///
    /// [`AgentError::Timeout`] when `budget` elapses (the process is killed),
    /// [`AgentError::Runtime`] when the interpreter cannot be started.
    async fn run(&self, code: &str, budget: Duration) -> Result<SandboxOutput, AgentError>;
}

/// Run a helper `script` in an isolated interpreter, feeding `input` on
/// stdin. Never executes `input` itself.
pub(crate) async fn run_script(
    python_bin: &str,
    script: &str,
    args: &[&str],
    input: &str,
) -> std::io::Result<Output> {
    let mut child = Command::new(python_bin)
        .arg("-I")
        .arg("-c")
        .arg(script)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        // Dropping closes the pipe so the script sees EOF.
    }
    child.wait_with_output().await
}

/// Cut `text` to at most `max_chars` characters.
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    let mut iter = text.chars();
    let truncated = iter.by_ref().take(max_chars).collect::<String>();
    if iter.next().is_some() {
        (truncated, true)
    } else {
        (text.to_string(), false)
    }
}
