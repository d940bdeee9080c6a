//! QC review data model (spec §3, §4.F, §6).

use serde::{Deserialize, Serialize};

/// The categorical outcome of a QC review.
///
/// An empty flag (absent from this enum; see [`ReviewResult::flag`] being
/// `None`) denotes a reviewer failure, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Accept.
    Green,
    /// Accept with notes.
    Yellow,
    /// Reject.
    Red,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Green => "GREEN",
            Verdict::Yellow => "YELLOW",
            Verdict::Red => "RED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GREEN" => Some(Verdict::Green),
            "YELLOW" => Some(Verdict::Yellow),
            "RED" => Some(Verdict::Red),
            _ => None,
        }
    }
}

/// One reviewer's structured issue report, part of the QC response schema
/// (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

/// The outcome of one review, single-agent or one slot of a multi-agent
/// fan-out. `flag = None` denotes a reviewer failure (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewResult {
    pub flag: Option<Verdict>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default)]
    pub suggested_agent: String,
    /// Reviewer identity; `"multi-agent(<comma-list>)"` for an aggregated
    /// result (spec §4.F).
    #[serde(default)]
    pub agent_name: String,
}

impl ReviewResult {
    pub fn failure(agent_name: impl Into<String>, feedback: impl Into<String>) -> Self {
        ReviewResult {
            flag: None,
            feedback: feedback.into(),
            agent_name: agent_name.into(),
            ..Default::default()
        }
    }
}

/// `ShouldRetry(result, attempt) = result.Flag == RED && attempt < MaxRetries`
/// (spec §4.F). Kept as a standalone pure function so it is directly
/// testable without constructing a full executor (SPEC_FULL.md §B).
pub fn should_retry(result: &ReviewResult, attempt: u32, max_retries: u32) -> bool {
    result.flag == Some(Verdict::Red) && attempt < max_retries
}
