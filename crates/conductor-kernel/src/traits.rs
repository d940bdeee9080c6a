//! External collaborator interfaces (spec §1, §6).
//!
//! These are the "explicitly out of scope" surfaces: the core depends only
//! on these trait contracts, never on a concrete agent runner, plan
//! parser, or learning store.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointInfo;
use crate::error::KernelResult;
use crate::execution::TaskExecution;
use crate::task::Task;

/// Plan status as persisted by the [`PlanUpdater`] (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    InProgress,
    Completed,
    Failed,
}

/// Writes per-task status back into the plan artifact. The parser/
/// serializer itself is out of scope (spec §1); this is the seam.
#[async_trait]
pub trait PlanUpdater: Send + Sync {
    /// `completed_at` is set only on terminal success (spec §6).
    async fn update(
        &self,
        path: &str,
        task_number: &str,
        status: PlanStatus,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> KernelResult<()>;
}

/// The result of invoking an external LLM agent process (spec §6).
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub output: String,
    pub error: Option<String>,
    pub exit_code: i32,
    pub duration: Duration,
}

impl AgentOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.exit_code != 0
    }
}

/// Runs an external LLM agent process for a task (spec §1, §6). Output may
/// be JSON-enveloped with `content`/`error` fields; the executor accepts
/// both shapes.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, task: &Task) -> KernelResult<AgentOutcome>;
}

/// Runs a shell-style command string through a POSIX shell, returning
/// combined stdout+stderr (spec §6). `Ok` carries the combined output for a
/// zero exit status; a non-zero exit status is reported as
/// `Err(KernelError::TestCommandFailed { output, .. })` so the combined
/// output remains available to the error classifier on failure.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> KernelResult<String>;
}

/// Whether the working copy is clean, per [`ScmAdapter::is_clean_state`].
pub type IsClean = bool;

/// Source-control adapter backing Branch Guard and Checkpoint Hook
/// (spec §4.D, §4.E, §6).
#[async_trait]
pub trait ScmAdapter: Send + Sync {
    async fn create_checkpoint(&self, task_number: &str) -> KernelResult<CheckpointInfo>;
    async fn restore_checkpoint(&self, commit_hash: &str) -> KernelResult<()>;
    async fn delete_checkpoint(&self, branch_name: &str) -> KernelResult<()>;
    async fn create_branch(&self, name: &str) -> KernelResult<()>;
    async fn switch_branch(&self, name: &str) -> KernelResult<()>;
    async fn get_current_branch(&self) -> KernelResult<String>;
    async fn is_clean_state(&self) -> KernelResult<IsClean>;
    async fn list_checkpoints(&self) -> KernelResult<Vec<CheckpointInfo>>;
}

/// Prior-failure analysis returned by the learning store's
/// `AnalyzeFailures` (spec §4.G step 2, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub failure_count: u32,
    pub tried_agents: Vec<String>,
    pub common_patterns: Vec<String>,
    pub suggested_agent: Option<String>,
    pub suggested_approach: Option<String>,
}

impl FailureAnalysis {
    pub fn has_past_failures(&self) -> bool {
        self.failure_count > 0
    }
}

/// External history store used for learning-driven retries (spec §6).
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn analyze_failures(
        &self,
        plan_file: &str,
        task_number: &str,
        min_failures: u32,
    ) -> KernelResult<FailureAnalysis>;

    async fn record_execution(&self, exec: &TaskExecution) -> KernelResult<()>;

    async fn get_execution_history(
        &self,
        plan_file: &str,
        task_number: &str,
    ) -> KernelResult<Vec<TaskExecution>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_outcome_failure_detection() {
        let ok = AgentOutcome {
            output: "done".into(),
            error: None,
            exit_code: 0,
            duration: Duration::from_secs(1),
        };
        assert!(!ok.is_failure());

        let bad_exit = AgentOutcome {
            exit_code: 1,
            ..ok.clone()
        };
        assert!(bad_exit.is_failure());

        let errored = AgentOutcome {
            error: Some("boom".into()),
            ..ok
        };
        assert!(errored.is_failure());
    }

    #[test]
    fn failure_analysis_default_has_no_past_failures() {
        let a = FailureAnalysis::default();
        assert!(!a.has_past_failures());
    }
}
