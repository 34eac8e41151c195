//! Static screening of code before it reaches the sandbox.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AgentError;

/// Top-level modules that reach the filesystem, processes, network, or the
/// interpreter's own machinery.
pub const FORBIDDEN_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "ctypes",
    "pathlib",
    "multiprocessing",
    "threading",
    "signal",
    "importlib",
    "pty",
    "fcntl",
    "resource",
    "pickle",
    "marshal",
    "builtins",
    "io",
    "tempfile",
    "glob",
    "urllib",
    "http",
    "requests",
    "asyncio",
];

/// Dunder names ordinary scripts need. Every other `__x__` is rejected.
pub const ALLOWED_DUNDERS: &[&str] = &["__name__", "__main__", "__init__", "__str__", "__repr__"];

struct Rule {
    pattern: Regex,
    reason: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    [
        (r"\bopen\s*\(", "file access via open()"),
        (r"\b(eval|exec|compile)\s*\(", "dynamic evaluation"),
        (r"\b(globals|locals|vars)\s*\(", "namespace introspection"),
        (r"\bbreakpoint\s*\(", "interactive debugger"),
        (r"\b(getattr|setattr|delattr)\s*\(", "reflective attribute access"),
    ]
    .into_iter()
    .map(|(pattern, reason)| Rule {
        pattern: Regex::new(pattern).expect("guard pattern is valid"),
        reason,
    })
    .collect()
});

static DUNDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__[A-Za-z]\w*?__").expect("dunder pattern is valid"));

/// `from <module> import`, wherever it appears on a line.
static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfrom\s+(\.*)([\w.]*)\s+import\b").expect("from-import pattern is valid")
});

/// `import a.b as c, d` once `from ... import` clauses are removed.
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bimport\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)")
        .expect("import pattern is valid")
});

/// Fast textual screen, run before [`super::CodeScreen`].
///
/// Matching is textual: a forbidden call spelled inside a string literal
/// or comment is rejected too. Code it lets through still goes to the
/// syntax-tree screen.
#[derive(Debug, Clone, Default)]
pub struct CodeGuard;

impl CodeGuard {
    /// # Errors
    ///
    /// [`AgentError::Security`] naming the first violation found.
    pub fn check(&self, code: &str) -> Result<(), AgentError> {
        if let Some(module) = imported_modules(code)
            .into_iter()
            .find(|m| FORBIDDEN_MODULES.contains(&m.as_str()))
        {
            return Err(AgentError::Security(format!(
                "forbidden import '{module}'"
            )));
        }

        for rule in RULES.iter() {
            if let Some(found) = rule.pattern.find(code) {
                return Err(AgentError::Security(format!(
                    "{} ('{}')",
                    rule.reason,
                    found.as_str().trim_end_matches(['(', ' ', '\t'])
                )));
            }
        }

        if let Some(found) = DUNDER
            .find_iter(code)
            .find(|m| !ALLOWED_DUNDERS.contains(&m.as_str()))
        {
            return Err(AgentError::Security(format!(
                "access to interpreter internals ('{}')",
                found.as_str()
            )));
        }
        Ok(())
    }
}

/// Top-level module names from `from ... import` and `import` clauses,
/// at any nesting depth.
fn imported_modules(code: &str) -> Vec<String> {
    let mut modules: Vec<String> = FROM_IMPORT
        .captures_iter(code)
        // Relative imports stay inside the (empty) scratch package.
        .filter(|caps| caps[1].is_empty() && !caps[2].is_empty())
        .map(|caps| top_level(&caps[2]))
        .collect();

    let without_from = FROM_IMPORT.replace_all(code, "");
    for caps in IMPORT.captures_iter(&without_from) {
        for item in caps[1].split(',') {
            if let Some(name) = item.split_whitespace().next() {
                modules.push(top_level(name));
            }
        }
    }
    modules
}

fn top_level(dotted: &str) -> String {
    dotted.split('.').next().unwrap_or(dotted).trim().to_string()
}
