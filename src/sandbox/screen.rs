//! Syntax-tree screening of code before it reaches the sandbox.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::AgentError;

use super::guard::{ALLOWED_DUNDERS, FORBIDDEN_MODULES};
use super::run_script;

/// Builtins that open files, evaluate strings or reach objects by name.
pub const BLOCKED_BUILTINS: &[&str] = &[
    "open",
    "eval",
    "exec",
    "compile",
    "__import__",
    "globals",
    "locals",
    "vars",
    "breakpoint",
    "getattr",
    "setattr",
    "delattr",
];

/// Walks every node of the parsed module and prints the first violation as
/// JSON. argv: forbidden modules, blocked builtins, allowed dunders.
const SCREEN_SCRIPT: &str = r#"import ast, json, sys
forbidden = set(sys.argv[1].split(","))
blocked = set(sys.argv[2].split(","))
allowed = set(sys.argv[3].split(","))

def dunder(s):
    return len(s) > 4 and s.startswith("__") and s.endswith("__") and s not in allowed

def violation(node):
    if isinstance(node, ast.Import):
        for alias in node.names:
            root = alias.name.split(".")[0]
            if root in forbidden:
                return "forbidden import '%s'" % root
    elif isinstance(node, ast.ImportFrom):
        root = (node.module or "").split(".")[0]
        if node.level == 0 and root in forbidden:
            return "forbidden import '%s'" % root
    elif isinstance(node, ast.Name):
        if node.id in blocked:
            return "forbidden builtin '%s'" % node.id
        if dunder(node.id):
            return "access to interpreter internals ('%s')" % node.id
    elif isinstance(node, ast.Attribute):
        if dunder(node.attr):
            return "access to interpreter internals ('%s')" % node.attr
    elif isinstance(node, ast.Constant) and isinstance(node.value, str):
        if dunder(node.value):
            return "access to interpreter internals ('%s')" % node.value
    return None

try:
    tree = ast.parse(sys.stdin.read())
except SyntaxError:
    tree = None
found = None
if tree is not None:
    for node in ast.walk(tree):
        found = violation(node)
        if found:
            break
print(json.dumps({"violation": found}))
"#;

/// Second line of defence after [`super::CodeGuard`]: inspects the parsed
/// program rather than its text.
#[async_trait::async_trait]
pub trait CodeScreen: Send + Sync + std::fmt::Debug {
    /// # Errors
    ///
    /// [`AgentError::Security`] for a rejected program,
    /// [`AgentError::Runtime`] when the screen itself cannot run. Code is
    /// never executed in either case.
    async fn screen(&self, code: &str) -> Result<(), AgentError>;
}

#[derive(Debug, Deserialize)]
struct ScreenReport {
    violation: Option<String>,
}

/// Screens with `ast.walk` in the configured interpreter. Unparseable code
/// passes; the sandbox then reports the syntax error.
#[derive(Debug, Clone)]
pub struct PythonAstScreen {
    python_bin: String,
    budget: Duration,
}

impl PythonAstScreen {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
            budget: Duration::from_secs(10),
        }
    }
}

#[async_trait::async_trait]
impl CodeScreen for PythonAstScreen {
    async fn screen(&self, code: &str) -> Result<(), AgentError> {
        let forbidden = FORBIDDEN_MODULES.join(",");
        let blocked = BLOCKED_BUILTINS.join(",");
        let allowed = ALLOWED_DUNDERS.join(",");
        let args = [forbidden.as_str(), blocked.as_str(), allowed.as_str()];

        let output = match tokio::time::timeout(
            self.budget,
            run_script(&self.python_bin, SCREEN_SCRIPT, &args, code),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AgentError::Runtime(format!(
                    "cannot run '{}' to screen code: {e}",
                    self.python_bin
                )));
            }
            Err(_) => return Err(AgentError::Runtime("code screening timed out".to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Runtime(format!(
                "code screening failed: {}",
                stderr.lines().last().unwrap_or("no diagnostics").trim()
            )));
        }

        let report: ScreenReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| AgentError::Runtime(format!("unreadable screening report: {e}")))?;

        match report.violation {
            None => Ok(()),
            Some(reason) => {
                warn!(name: "sandbox.screen.rejected", %reason, "Code rejected by syntax-tree screen");
                Err(AgentError::Security(reason))
            }
        }
    }
}
