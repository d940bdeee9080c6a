//! Shared mock collaborators for unit tests across this crate
//! (SPEC_FULL.md §A.4). Each is built from closures/queues of canned
//! responses so a test can script exact sequences — e.g. "RED then GREEN"
//! for the retry-to-success scenario (spec §8 scenario 4).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use error_stack::Report;
use parking_lot::Mutex;

use conductor_kernel::error::KernelResult;
use conductor_kernel::{
    AgentInvoker, AgentOutcome, CheckpointInfo, CommandRunner, FailureAnalysis, KernelError,
    LearningStore, PlanStatus, PlanUpdater, ScmAdapter, Task, TaskExecution,
};

/// Scripts a sequence of agent responses; each `invoke` pops the next
/// queued entry. Exhausting the queue repeats the last entry so unscripted
/// extra calls don't panic.
pub struct MockAgentInvoker {
    responses: Mutex<VecDeque<AgentOutcome>>,
    last: Mutex<Option<AgentOutcome>>,
    pub invocations: Mutex<Vec<String>>,
}

impl MockAgentInvoker {
    pub fn new() -> Self {
        MockAgentInvoker {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn push_output(self, output: impl Into<String>) -> Self {
        self.responses.lock().push_back(AgentOutcome {
            output: output.into(),
            error: None,
            exit_code: 0,
            duration: Duration::from_millis(1),
        });
        self
    }

    pub fn push_failure(self, error: impl Into<String>) -> Self {
        self.responses.lock().push_back(AgentOutcome {
            output: String::new(),
            error: Some(error.into()),
            exit_code: 1,
            duration: Duration::from_millis(1),
        });
        self
    }
}

impl Default for MockAgentInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn invoke(&self, task: &Task) -> KernelResult<AgentOutcome> {
        self.invocations.lock().push(task.number.clone());
        let mut queue = self.responses.lock();
        let outcome = queue.pop_front().unwrap_or_else(|| {
            self.last
                .lock()
                .clone()
                .unwrap_or(AgentOutcome {
                    output: String::new(),
                    error: None,
                    exit_code: 0,
                    duration: Duration::from_millis(1),
                })
        });
        *self.last.lock() = Some(outcome.clone());
        Ok(outcome)
    }
}

/// Scripts a sequence of command results, one per call to `run`
/// regardless of the command string.
pub struct MockCommandRunner {
    results: Mutex<VecDeque<Result<String, String>>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        MockCommandRunner {
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_success(self, output: impl Into<String>) -> Self {
        self.results.lock().push_back(Ok(output.into()));
        self
    }

    pub fn push_failure(self, output: impl Into<String>) -> Self {
        self.results.lock().push_back(Err(output.into()));
        self
    }
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, command: &str) -> KernelResult<String> {
        match self.results.lock().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(output)) => Err(Report::new(KernelError::TestCommandFailed {
                command: command.to_string(),
                output,
            })),
            None => Ok(String::new()),
        }
    }
}

/// Scripts branch/checkpoint behaviour for Branch Guard and Checkpoint
/// Hook tests.
pub struct MockScmAdapter {
    clean_state: Mutex<bool>,
    current_branch: Mutex<String>,
    switch_failure: Mutex<Option<String>>,
    pub created_branches: Mutex<Vec<String>>,
    pub deleted_checkpoints: Mutex<Vec<String>>,
    pub restored_commits: Mutex<Vec<String>>,
    checkpoints: Mutex<Vec<CheckpointInfo>>,
}

impl MockScmAdapter {
    pub fn new() -> Self {
        MockScmAdapter {
            clean_state: Mutex::new(true),
            current_branch: Mutex::new("main".to_string()),
            switch_failure: Mutex::new(None),
            created_branches: Mutex::new(Vec::new()),
            deleted_checkpoints: Mutex::new(Vec::new()),
            restored_commits: Mutex::new(Vec::new()),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clean_state(self, clean: bool) -> Self {
        *self.clean_state.lock() = clean;
        self
    }

    pub fn with_current_branch(self, branch: impl Into<String>) -> Self {
        *self.current_branch.lock() = branch.into();
        self
    }

    pub fn with_switch_failure(self, branch: impl Into<String>) -> Self {
        *self.switch_failure.lock() = Some(branch.into());
        self
    }
}

impl Default for MockScmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScmAdapter for MockScmAdapter {
    async fn create_checkpoint(&self, task_number: &str) -> KernelResult<CheckpointInfo> {
        let info = CheckpointInfo {
            branch_name: format!("conductor-checkpoint-task-{task_number}"),
            commit_hash: format!("commit-{task_number}"),
            created_at: Utc::now(),
        };
        self.checkpoints.lock().push(info.clone());
        Ok(info)
    }

    async fn restore_checkpoint(&self, commit_hash: &str) -> KernelResult<()> {
        self.restored_commits.lock().push(commit_hash.to_string());
        Ok(())
    }

    async fn delete_checkpoint(&self, branch_name: &str) -> KernelResult<()> {
        self.deleted_checkpoints.lock().push(branch_name.to_string());
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> KernelResult<()> {
        self.created_branches.lock().push(name.to_string());
        Ok(())
    }

    async fn switch_branch(&self, name: &str) -> KernelResult<()> {
        if self.switch_failure.lock().as_deref() == Some(name) {
            return Err(Report::new(KernelError::Internal(format!(
                "cannot switch to {name}"
            ))));
        }
        *self.current_branch.lock() = name.to_string();
        Ok(())
    }

    async fn get_current_branch(&self) -> KernelResult<String> {
        Ok(self.current_branch.lock().clone())
    }

    async fn is_clean_state(&self) -> KernelResult<bool> {
        Ok(*self.clean_state.lock())
    }

    async fn list_checkpoints(&self) -> KernelResult<Vec<CheckpointInfo>> {
        Ok(self.checkpoints.lock().clone())
    }
}

/// Records every call for assertions, with a scriptable `FailureAnalysis`.
pub struct MockLearningStore {
    analysis: Mutex<FailureAnalysis>,
    pub recorded: Mutex<Vec<TaskExecution>>,
    history: Mutex<Vec<TaskExecution>>,
}

impl MockLearningStore {
    pub fn new() -> Self {
        MockLearningStore {
            analysis: Mutex::new(FailureAnalysis::default()),
            recorded: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_analysis(self, analysis: FailureAnalysis) -> Self {
        *self.analysis.lock() = analysis;
        self
    }
}

impl Default for MockLearningStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LearningStore for MockLearningStore {
    async fn analyze_failures(
        &self,
        _plan_file: &str,
        _task_number: &str,
        _min_failures: u32,
    ) -> KernelResult<FailureAnalysis> {
        Ok(self.analysis.lock().clone())
    }

    async fn record_execution(&self, exec: &TaskExecution) -> KernelResult<()> {
        self.recorded.lock().push(exec.clone());
        self.history.lock().push(exec.clone());
        Ok(())
    }

    async fn get_execution_history(
        &self,
        _plan_file: &str,
        _task_number: &str,
    ) -> KernelResult<Vec<TaskExecution>> {
        Ok(self.history.lock().clone())
    }
}

/// Records every plan-status update for assertions.
pub struct MockPlanUpdater {
    pub updates: Mutex<Vec<(String, String, PlanStatus)>>,
}

impl MockPlanUpdater {
    pub fn new() -> Self {
        MockPlanUpdater {
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockPlanUpdater {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanUpdater for MockPlanUpdater {
    async fn update(
        &self,
        path: &str,
        task_number: &str,
        status: PlanStatus,
        _completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> KernelResult<()> {
        self.updates
            .lock()
            .push((path.to_string(), task_number.to_string(), status));
        Ok(())
    }
}
