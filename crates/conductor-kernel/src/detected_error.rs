//! Error-classification data model (spec §3, §4.I).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixability category assigned to a detected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Category {
    CodeLevel,
    PlanLevel,
    EnvLevel,
    TestFailure,
    Unknown,
}

/// Which tier of the classifier produced a [`DetectedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Regex,
    Llm,
}

/// A single classification record, a point-in-time snapshot of what a
/// failing test command or agent error most likely means (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedError {
    pub category: Category,
    pub agent_can_fix: bool,
    pub requires_human_intervention: bool,
    #[serde(default)]
    pub suggestion: String,
    pub method: Method,
    pub confidence: f64,
    #[serde(default)]
    pub raw_output: String,
    pub timestamp: DateTime<Utc>,
}

impl DetectedError {
    pub fn regex_match(
        category: Category,
        agent_can_fix: bool,
        requires_human_intervention: bool,
        suggestion: impl Into<String>,
        raw_output: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        DetectedError {
            category,
            agent_can_fix,
            requires_human_intervention,
            suggestion: suggestion.into(),
            method: Method::Regex,
            confidence: 1.0,
            raw_output: raw_output.into(),
            timestamp,
        }
    }
}

/// Fixed taxonomy of failure patterns extracted from verdict + feedback +
/// output by keyword matching (spec §4.G step 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePattern {
    CompilationError,
    TestFailure,
    DependencyMissing,
    PermissionError,
    Timeout,
    RuntimeError,
}

impl FailurePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePattern::CompilationError => "compilation_error",
            FailurePattern::TestFailure => "test_failure",
            FailurePattern::DependencyMissing => "dependency_missing",
            FailurePattern::PermissionError => "permission_error",
            FailurePattern::Timeout => "timeout",
            FailurePattern::RuntimeError => "runtime_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_match_has_full_confidence() {
        let now = Utc::now();
        let e = DetectedError::regex_match(
            Category::EnvLevel,
            false,
            true,
            "switch to a single simulator target",
            "xcodebuild: error: multiple devices matched",
            now,
        );
        assert_eq!(e.method, Method::Regex);
        assert_eq!(e.confidence, 1.0);
        assert!(!e.agent_can_fix);
        assert!(e.requires_human_intervention);
    }

    #[test]
    fn failure_pattern_strings_match_taxonomy() {
        assert_eq!(FailurePattern::CompilationError.as_str(), "compilation_error");
        assert_eq!(FailurePattern::DependencyMissing.as_str(), "dependency_missing");
    }

    #[test]
    fn category_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Category::EnvLevel).unwrap();
        assert_eq!(json, "\"ENV_LEVEL\"");
    }
}
