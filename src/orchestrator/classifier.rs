//! Keyword and pattern routing of task descriptions to a capability.
//!
//! Precedence when several categories match: execution, then search, then
//! coding. A trailing question mark counts as a search cue only when nothing
//! else matched. Anything left unmatched is treated as a coding request.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::AgentType;

/// Requests to run something. Always count.
const EXECUTION_PHRASES: &[&str] = &[
    "run this",
    "run the code",
    "run code",
    "run the script",
    "execute",
    "execute this",
    "test this code",
    "evaluate this",
];

const SEARCH_PHRASES: &[&str] = &[
    "search",
    "look up",
    "lookup",
    "latest",
    "news",
    "research",
    "find information",
    "find out",
    "find me",
    "find articles",
    "find docs",
    "find documentation",
    "find resources",
    "find examples",
    "what is",
    "what are",
    "who is",
    "who are",
    "tell me about",
    "information about",
];

const CODING_PHRASES: &[&str] = &[
    "write code",
    "write a function",
    "write a class",
    "write a script",
    "write a program",
    "write python",
    "generate code",
    "create a function",
    "create a class",
    "create a script",
    "implement",
    "code to",
    "code for",
    "python function",
    "algorithm for",
    "function",
    "refactor",
];

/// Literal runnable statements. Counted only for short or multi-line input,
/// so prose that merely mentions `print(` in a long paragraph is not run.
static CODE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("print(", r"\bprint\s*\("),
        ("def", r"(?m)^\s*def\s+\w+\s*\("),
        ("class", r"(?m)^\s*class\s+\w+\s*[:(]"),
        ("import", r"(?m)^\s*(import\s+\w+|from\s+\w+(\.\w+)*\s+import\s+)"),
        ("return", r"(?m)^\s*return\b"),
        ("__main__", r"if\s+__name__\s*=="),
        ("builtin call", r"\b(len|range|sum|sorted|max|min)\s*\([^)]*\)"),
        ("loop", r"(?m)^\s*(for\s+\w+\s+in\s+.+|while\s+.+):"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("code pattern is valid")))
    .collect()
});

/// Short snippets are below this many words.
const SHORT_INPUT_WORDS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Explicit,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub agent_type: AgentType,
    pub source: ClassificationSource,
}

/// Cues found in a description, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cues {
    pub execution: Vec<&'static str>,
    pub search: Vec<&'static str>,
    pub coding: Vec<&'static str>,
    pub trailing_question: bool,
}

/// Resolve the capability for a task. An explicit type is used verbatim.
pub fn classify(description: &str, explicit: Option<AgentType>) -> Classification {
    if let Some(agent_type) = explicit {
        return Classification {
            agent_type,
            source: ClassificationSource::Explicit,
        };
    }
    Classification {
        agent_type: infer(&detect_cues(description)),
        source: ClassificationSource::Inferred,
    }
}

fn infer(cues: &Cues) -> AgentType {
    if !cues.execution.is_empty() {
        AgentType::Execution
    } else if !cues.search.is_empty() {
        AgentType::Search
    } else if !cues.coding.is_empty() {
        AgentType::Coding
    } else if cues.trailing_question {
        AgentType::Search
    } else {
        AgentType::Coding
    }
}

pub fn detect_cues(description: &str) -> Cues {
    let normalized = normalize(description);
    let phrases = |table: &[&'static str]| -> Vec<&'static str> {
        table
            .iter()
            .copied()
            .filter(|p| normalized.contains(&format!(" {p} ")))
            .collect()
    };

    let mut execution = phrases(EXECUTION_PHRASES);
    let trimmed = description.trim();
    let code_like = trimmed.split_whitespace().count() < SHORT_INPUT_WORDS
        || trimmed.contains('\n');
    if code_like {
        execution.extend(
            CODE_PATTERNS
                .iter()
                .filter(|(_, re)| re.is_match(description))
                .map(|(label, _)| *label),
        );
    }

    Cues {
        execution,
        search: phrases(SEARCH_PHRASES),
        coding: phrases(CODING_PHRASES),
        trailing_question: trimmed.ends_with('?'),
    }
}

/// Lowercased words separated by single spaces, padded for whole-word lookup.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inferred(text: &str) -> AgentType {
        let c = classify(text, None);
        assert_eq!(c.source, ClassificationSource::Inferred);
        c.agent_type
    }

    #[test]
    fn test_explicit_type_wins() {
        let c = classify("search for rust news", Some(AgentType::Execution));
        assert_eq!(c.agent_type, AgentType::Execution);
        assert_eq!(c.source, ClassificationSource::Explicit);
    }

    #[test]
    fn test_execution_beats_coding_words() {
        assert_eq!(inferred("run this: print(1+1)"), AgentType::Execution);
        assert_eq!(
            inferred("run this function: def f(): return 1"),
            AgentType::Execution
        );
        assert_eq!(inferred("print('Hello from AI Agent!')"), AgentType::Execution);
        assert_eq!(inferred("x = 3\nfor i in range(x):\n    print(i)"), AgentType::Execution);
    }

    #[test]
    fn test_search_cues() {
        assert_eq!(inferred("Search for the latest Rust release"), AgentType::Search);
        assert_eq!(inferred("look up tokio broadcast semantics"), AgentType::Search);
        assert_eq!(inferred("What is a vector database"), AgentType::Search);
        assert_eq!(inferred("find information about sqlite WAL"), AgentType::Search);
        assert_eq!(inferred("How do lifetimes work in practice?"), AgentType::Search);
    }

    #[test]
    fn test_search_beats_coding() {
        assert_eq!(
            inferred("search for a function to compute fibonacci"),
            AgentType::Search
        );
    }

    #[test]
    fn test_coding_cues_and_default() {
        assert_eq!(
            inferred("Write a function to compute fibonacci numbers"),
            AgentType::Coding
        );
        assert_eq!(inferred("write a function to find max in a list"), AgentType::Coding);
        assert_eq!(inferred("Can you write a function for binary search?"), AgentType::Search);
        assert_eq!(inferred("a snake game with score tracking"), AgentType::Coding);
        assert_eq!(inferred("implement quicksort?"), AgentType::Coding);
    }

    #[test]
    fn test_whole_word_matching() {
        // "newsletter" is not "news", "executed" is not "execute".
        assert_eq!(inferred("generate code for a newsletter signup"), AgentType::Coding);
        assert_eq!(inferred("log every executed step"), AgentType::Coding);
    }

    #[test]
    fn test_long_prose_mentioning_code_is_not_executed() {
        let prose = "I would like you to write a small utility that reads numbers from a \
                     list and uses print( to show each one along with its square and a \
                     running total so that I can follow the output easily in my terminal";
        assert!(prose.split_whitespace().count() >= SHORT_INPUT_WORDS);
        assert_eq!(inferred(prose), AgentType::Coding);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let text = "tell me about async runtimes";
        assert_eq!(inferred(text), inferred(text));
        assert_eq!(detect_cues(text).search, vec!["tell me about"]);
    }
}
