//! Terminal task outcome and persisted-history data model (spec §3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::review::Verdict;

/// Terminal status of a task, as distinct from a [`Verdict`]: `Failed`
/// covers invocation/timeout/dependency failures that never reach QC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Yellow,
    Red,
    Failed,
}

impl From<Verdict> for Status {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Green => Status::Green,
            Verdict::Yellow => Status::Yellow,
            Verdict::Red => Status::Red,
        }
    }
}

/// One attempt's verdict, recorded into `ExecutionHistory` for the
/// lifetime of a single task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub verdict: Option<Verdict>,
    pub feedback: String,
}

/// The final result of executing one task through the Task Executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: Status,
    pub output: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub retry_count: u32,
    pub review_feedback: String,
    pub error: Option<String>,
    pub execution_history: Vec<AttemptRecord>,
}

impl TaskResult {
    pub fn failed(error: impl Into<String>) -> Self {
        TaskResult {
            status: Status::Failed,
            output: String::new(),
            duration: Duration::ZERO,
            retry_count: 0,
            review_feedback: String::new(),
            error: Some(error.into()),
            execution_history: Vec::new(),
        }
    }
}

/// A persisted history row, owned by the external learning store
/// (spec §3: `TaskExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub plan_file: String,
    pub run_number: u64,
    pub task_number: String,
    pub agent: String,
    pub success: bool,
    pub qc_verdict: Option<Verdict>,
    pub qc_feedback: String,
    pub failure_patterns: Vec<String>,
    pub duration_secs: f64,
    pub output: String,
    pub error_message: Option<String>,
}

mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_verdict() {
        assert_eq!(Status::from(Verdict::Green), Status::Green);
        assert_eq!(Status::from(Verdict::Red), Status::Red);
    }

    #[test]
    fn failed_result_has_no_history() {
        let r = TaskResult::failed("boom");
        assert_eq!(r.status, Status::Failed);
        assert!(r.execution_history.is_empty());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn task_result_duration_roundtrips_through_json() {
        let r = TaskResult {
            duration: Duration::from_millis(1500),
            ..TaskResult::failed("x")
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
