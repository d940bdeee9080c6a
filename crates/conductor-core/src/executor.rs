//! Task Executor (spec §4.G) — the central per-task state machine: lock
//! acquisition, pre-task hooks, the attempt/retry loop gated by QC, and
//! post-task persistence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use error_stack::Report;
use serde_json::Value;

use conductor_kernel::error::KernelResult;
use conductor_kernel::{
    AgentInvoker, AttemptRecord, CommandRunner, DetectedError, FailurePattern, KernelError, LearningStore, Logger,
    PlanStatus, PlanUpdater, ReviewResult, ScmAdapter, Status, Task, TaskExecution, TaskResult, Verdict,
};

use crate::checkpoint::CheckpointHook;
use crate::classifier::ErrorClassifier;
use crate::config::OrchestratorConfig;
use crate::qc::QcController;
use crate::stage::{run_pipeline, PatternIntelligence, PatternIntelligenceStage, Stage, TaskContext, WarmupProvider, WarmupStage};

/// Cooperative cancellation signal propagated to all external calls made
/// during a task's execution (spec §5). Carries an optional deadline so a
/// context.DeadlineExceeded-equivalent can be distinguished from an
/// operator-initiated context.Canceled-equivalent at the attempt boundary
/// (spec §5, §7).
#[derive(Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Cancellation::new()
    }
}

/// Why an attempt boundary observed a dead context: a deadline elapsed, or
/// the caller explicitly cancelled (spec §5 "context.DeadlineExceeded is
/// distinguished from context.Canceled").
pub enum CancelReason {
    DeadlineExceeded,
    Cancelled,
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Cancellation {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.is_deadline_exceeded()
    }

    fn is_deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `None` unless [`Cancellation::is_cancelled`] would return true;
    /// distinguishes which of the two dead-context cases applies.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.is_deadline_exceeded() {
            Some(CancelReason::DeadlineExceeded)
        } else if self.cancelled.load(Ordering::SeqCst) {
            Some(CancelReason::Cancelled)
        } else {
            None
        }
    }
}

/// Lock-path resolution priority (spec §4.G step 1): task's own
/// `source_file`, then the executor's configured fallback, then the
/// plan path passed at the call site.
fn resolve_lock_path(task: &Task, executor_source_file: Option<&str>, plan_path: &str) -> String {
    if !task.source_file.is_empty() {
        return task.source_file.clone();
    }
    if let Some(s) = executor_source_file {
        if !s.is_empty() {
            return s.to_string();
        }
    }
    plan_path.to_string()
}

/// Extracts `content`, falling back to `error`, then the raw string
/// (spec §4.G step 3 / §6's "Output may be JSON-enveloped").
fn parse_agent_output(raw: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if let Some(content) = value.get("content").and_then(Value::as_str) {
            return content.to_string();
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return error.to_string();
        }
    }
    raw.to_string()
}

/// Keyword-matches verdict + feedback + output into the fixed taxonomy
/// (spec §4.G step 10).
fn extract_failure_patterns(review: &ReviewResult, output: &str) -> Vec<String> {
    let haystack = format!("{} {}", review.feedback, output).to_ascii_lowercase();
    let mut found = Vec::new();
    let checks: &[(&str, FailurePattern)] = &[
        ("compil", FailurePattern::CompilationError),
        ("test fail", FailurePattern::TestFailure),
        ("assertion", FailurePattern::TestFailure),
        ("dependency", FailurePattern::DependencyMissing),
        ("not found", FailurePattern::DependencyMissing),
        ("permission denied", FailurePattern::PermissionError),
        ("timed out", FailurePattern::Timeout),
        ("timeout", FailurePattern::Timeout),
        ("panic", FailurePattern::RuntimeError),
        ("runtime error", FailurePattern::RuntimeError),
    ];
    for (needle, pattern) in checks {
        if haystack.contains(needle) && !found.contains(&pattern.as_str().to_string()) {
            found.push(pattern.as_str().to_string());
        }
    }
    found
}

/// Builds the retry-feedback block appended to the prompt before the next
/// attempt (spec §4.G step 14).
fn build_retry_injection(errors: &[DetectedError], review: &ReviewResult, test_output: Option<&str>) -> String {
    let mut block = String::from("\n\nPrevious attempt feedback:\n");
    block.push_str(&review.feedback);
    for e in errors {
        block.push_str(&format!(
            "\n- [{:?}] ({:.0}% confidence) {}",
            e.category,
            e.confidence * 100.0,
            e.suggestion
        ));
    }
    if let Some(output) = test_output {
        block.push_str("\n\n--- Test failure output ---\n");
        block.push_str(output);
    }
    block
}

enum Terminal {
    Settled {
        status: Status,
        review: Option<ReviewResult>,
        output: String,
        retry_count: u32,
        history: Vec<AttemptRecord>,
    },
    Failed {
        message: String,
        retry_count: u32,
        history: Vec<AttemptRecord>,
        verdict: Option<Verdict>,
    },
}

pub struct TaskExecutor<'a> {
    pub lock_manager: &'a crate::lock::FileLockManager,
    pub invoker: &'a dyn AgentInvoker,
    pub command_runner: &'a dyn CommandRunner,
    pub scm: &'a dyn ScmAdapter,
    pub qc: &'a QcController<'a>,
    pub classifier: &'a ErrorClassifier<'a>,
    pub plan_updater: &'a dyn PlanUpdater,
    pub learning_store: Option<&'a dyn LearningStore>,
    pub warmup: Option<&'a dyn WarmupProvider>,
    pub pattern_intelligence: Option<&'a dyn PatternIntelligence>,
    pub config: &'a OrchestratorConfig,
    pub logger: Option<&'a dyn Logger>,
    pub source_file: Option<String>,
}

impl<'a> TaskExecutor<'a> {
    pub async fn execute(
        &self,
        mut task: Task,
        plan_path: &str,
        run_number: u64,
        cancel: &Cancellation,
    ) -> TaskResult {
        let start = Instant::now();
        let lock_path = resolve_lock_path(&task, self.source_file.as_deref(), plan_path);
        let _lock = self.lock_manager.acquire(&lock_path).await;

        self.pre_task_learning_hook(&mut task, plan_path).await;

        let mut ctx = TaskContext::new(task);
        let warmup_stage = self
            .warmup
            .map(|provider| WarmupStage { provider, threshold: self.config.warmup_confidence_threshold });
        let pattern_stage = self.pattern_intelligence.map(|intelligence| PatternIntelligenceStage {
            intelligence,
            threshold: self.config.pattern_duplicate_threshold,
        });
        let mut stages: Vec<&dyn Stage> = Vec::new();
        if let Some(s) = warmup_stage.as_ref() {
            stages.push(s);
        }
        if let Some(s) = pattern_stage.as_ref() {
            stages.push(s);
        }
        if let Err(e) = run_pipeline(&stages, &mut ctx).await {
            conductor_kernel::logging::log_warn(self.logger, format!("pre-task pipeline error: {e:?}"));
        }
        if ctx.is_blocked() {
            let message = ctx.block_reason.unwrap_or_default();
            let terminal = Terminal::Failed { message, retry_count: 0, history: Vec::new(), verdict: None };
            return self.finalize(ctx.task, plan_path, run_number, terminal, start.elapsed()).await;
        }
        let mut task = ctx.task;

        let checkpoint_hook = CheckpointHook::new(self.scm, self.config, self.logger);
        checkpoint_hook.pre_task(&task.number, &mut task.metadata).await;

        if task.agent.is_empty() {
            task.agent = self.config.default_agent.clone();
        }

        if let Err(e) = self
            .plan_updater
            .update(plan_path, &task.number, PlanStatus::InProgress, None)
            .await
        {
            return TaskResult::failed(format!("plan update error: {e:?}"));
        }

        let terminal = self.run_attempt_loop(&mut task, plan_path, run_number, cancel).await;

        self.finalize(task, plan_path, run_number, terminal, start.elapsed())
            .await
    }

    async fn pre_task_learning_hook(&self, task: &mut Task, plan_path: &str) {
        let Some(store) = self.learning_store else {
            return;
        };
        match store.analyze_failures(plan_path, &task.number, 1).await {
            Ok(analysis) if analysis.has_past_failures() => {
                if let Some(suggested) = &analysis.suggested_agent {
                    if !suggested.is_empty() && suggested != &task.agent {
                        task.agent = suggested.clone();
                    }
                }
                task.prompt = format!(
                    "{}\n\nLearning context:\nPast failures: {}\nTried agents: {}\nCommon patterns: {}\n{}",
                    task.prompt,
                    analysis.failure_count,
                    analysis.tried_agents.join(", "),
                    analysis.common_patterns.join(", "),
                    analysis.suggested_approach.clone().unwrap_or_default(),
                );
            }
            Ok(_) => {}
            Err(e) => conductor_kernel::logging::log_warn(
                self.logger,
                format!("learning-store pre-task lookup failed for task {}: {e:?}", task.number),
            ),
        }
    }

    async fn run_attempt_loop(
        &self,
        task: &mut Task,
        plan_path: &str,
        run_number: u64,
        cancel: &Cancellation,
    ) -> Terminal {
        let max_attempts = if self.config.qc_enabled { self.config.max_retries } else { 0 };
        let mut attempt = 0u32;
        let mut history: Vec<AttemptRecord> = Vec::new();

        loop {
            match cancel.reason() {
                Some(CancelReason::DeadlineExceeded) => {
                    let message = KernelError::Timeout {
                        task_number: task.number.clone(),
                        context: "task execution timeout".to_string(),
                    }
                    .to_string();
                    return Terminal::Failed { message, retry_count: attempt, history, verdict: None };
                }
                Some(CancelReason::Cancelled) => {
                    let message = KernelError::Cancelled { task_number: task.number.clone() }.to_string();
                    return Terminal::Failed { message, retry_count: attempt, history, verdict: None };
                }
                None => {}
            }

            let outcome = match self.invoker.invoke(task).await {
                Ok(o) => o,
                Err(e) => {
                    return Terminal::Failed {
                        message: format!("task {}: invocation error: {e:?}", task.number),
                        retry_count: attempt,
                        history,
                        verdict: None,
                    };
                }
            };
            if outcome.is_failure() {
                let message = outcome
                    .error
                    .unwrap_or_else(|| format!("task {}: agent exited {}", task.number, outcome.exit_code));
                return Terminal::Failed { message, retry_count: attempt, history, verdict: None };
            }

            let parsed_output = parse_agent_output(&outcome.output);

            let mut test_output: Option<String> = None;
            if let Some((message, output)) = self.run_test_commands(task, &parsed_output).await {
                if !self.config.qc_enabled {
                    return Terminal::Failed { message, retry_count: attempt, history, verdict: None };
                }
                test_output = Some(output);
            }

            if let Some(message) = self.run_dependency_checks(task).await {
                return Terminal::Failed { message, retry_count: attempt, history, verdict: None };
            }

            let mut verification_context = self.run_verifications(task).await;
            if let Some(output) = &test_output {
                verification_context.push_str("\n--- Test command failure output ---\n");
                verification_context.push_str(output);
            }

            if !self.config.qc_enabled {
                return Terminal::Settled {
                    status: Status::Green,
                    review: None,
                    output: parsed_output,
                    retry_count: attempt,
                    history,
                };
            }

            let review = match self.qc.review(task, &parsed_output, Some(&verification_context)).await {
                Ok(r) => r,
                Err(e) => {
                    return Terminal::Failed {
                        message: format!("task {}: qc invocation error: {e:?}", task.number),
                        retry_count: attempt,
                        history,
                        verdict: None,
                    };
                }
            };

            let patterns = extract_failure_patterns(&review, &parsed_output);
            task.metadata.set_failure_patterns(&patterns);
            if let Some(flag) = review.flag {
                task.metadata.set_qc_verdict(flag);
            }
            history.push(AttemptRecord {
                attempt,
                verdict: review.flag,
                feedback: review.feedback.clone(),
            });

            match review.flag {
                Some(Verdict::Green) => {
                    return Terminal::Settled {
                        status: Status::Green,
                        review: Some(review),
                        output: parsed_output,
                        retry_count: attempt,
                        history,
                    };
                }
                Some(Verdict::Yellow) => {
                    return Terminal::Settled {
                        status: Status::Yellow,
                        review: Some(review),
                        output: parsed_output,
                        retry_count: attempt,
                        history,
                    };
                }
                _ => {
                    let exhausted = attempt >= max_attempts || !conductor_kernel::review::should_retry(&review, attempt, max_attempts);
                    if exhausted {
                        let message = match review.flag {
                            Some(Verdict::Red) => KernelError::quality_gate_failed(task.number.as_str()).to_string(),
                            _ => KernelError::invalid_qc_flag(task.number.as_str(), "").to_string(),
                        };
                        return Terminal::Failed { message, retry_count: attempt, history, verdict: review.flag };
                    }

                    let detected_errors = task.metadata.detected_errors();
                    let all_need_human = !detected_errors.is_empty()
                        && detected_errors.iter().all(|e| !e.agent_can_fix);
                    if all_need_human {
                        let suggestions: Vec<String> =
                            detected_errors.iter().map(|e| e.suggestion.clone()).collect();
                        return Terminal::Failed {
                            message: format!(
                                "task {}: human intervention required: {}",
                                task.number,
                                suggestions.join("; ")
                            ),
                            retry_count: attempt,
                            history,
                            verdict: review.flag,
                        };
                    }

                    task.prompt = format!(
                        "{}{}",
                        task.prompt,
                        build_retry_injection(&detected_errors, &review, test_output.as_deref())
                    );

                    self.persist_attempt(task, plan_path, run_number, &review, &parsed_output).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_test_commands(&self, task: &mut Task, parsed_output: &str) -> Option<(String, String)> {
        let _ = parsed_output;
        if !self.config.enforce_test_commands || task.test_commands.is_empty() {
            return None;
        }
        for command in task.test_commands.clone() {
            if let Err(report) = self.command_runner.run(&command).await {
                let output = test_command_output(&report);
                let detected = self.classifier.classify(&task.number, &command, &output).await;
                task.metadata.push_detected_error(detected);
                let message = format!("task {}: test command failed: {command}", task.number);
                return Some((message, output));
            }
        }
        None
    }

    async fn run_dependency_checks(&self, task: &Task) -> Option<String> {
        let commands: Vec<String> = task.metadata.get("dependency_check_commands").unwrap_or_default();
        for command in commands {
            if self.command_runner.run(&command).await.is_err() {
                return Some(
                    KernelError::DependencyCheckFailed {
                        task_number: task.number.clone(),
                        command,
                    }
                    .to_string(),
                );
            }
        }
        None
    }

    async fn run_verifications(&self, task: &Task) -> String {
        let mut context = String::new();

        if let Some(subject) = &task.commit_subject {
            let command = format!("git log --oneline --grep={subject:?} -n 20");
            let found = matches!(self.command_runner.run(&command).await, Ok(out) if !out.trim().is_empty());
            conductor_kernel::logging::log_warn(
                self.logger,
                format!("commit verification for task {}: subject={subject:?} found={found}", task.number),
            );
            context.push_str(&format!("Commit verification ({subject:?}): {}\n", if found { "found" } else { "not found" }));
        }

        for target in &task.doc_targets {
            let passed = tokio::fs::read_to_string(&target.file)
                .await
                .map(|content| content.contains(&target.section))
                .unwrap_or(false);
            context.push_str(&format!(
                "Doc target {}#{}: {}\n",
                target.file,
                target.section,
                if passed { "present" } else { "missing" }
            ));
        }

        context
    }

    async fn persist_attempt(&self, task: &Task, plan_path: &str, run_number: u64, review: &ReviewResult, output: &str) {
        let Some(store) = self.learning_store else {
            return;
        };
        let exec = TaskExecution {
            plan_file: plan_path.to_string(),
            run_number,
            task_number: task.number.clone(),
            agent: task.agent.clone(),
            success: false,
            qc_verdict: review.flag,
            qc_feedback: review.feedback.clone(),
            failure_patterns: task.metadata.failure_patterns(),
            duration_secs: 0.0,
            output: output.to_string(),
            error_message: None,
        };
        self.record_if_not_duplicate(store, task, exec).await;
    }

    async fn record_if_not_duplicate(&self, store: &dyn LearningStore, task: &Task, exec: TaskExecution) {
        if let Ok(history) = store.get_execution_history(&exec.plan_file, &task.number).await {
            if let Some(last) = history.last() {
                if last.qc_verdict == exec.qc_verdict && last.success == exec.success {
                    return;
                }
            }
        }
        if let Err(e) = store.record_execution(&exec).await {
            conductor_kernel::logging::log_warn(
                self.logger,
                format!("learning-store record_execution failed for task {}: {e:?}", task.number),
            );
        }
    }

    async fn finalize(
        &self,
        task: Task,
        plan_path: &str,
        run_number: u64,
        terminal: Terminal,
        elapsed: Duration,
    ) -> TaskResult {
        let (status, review, output, error, retry_count, history, failed_verdict) = match terminal {
            Terminal::Settled { status, review, output, retry_count, history } => {
                (status, review, output, None, retry_count, history, None)
            }
            Terminal::Failed { message, retry_count, history, verdict } => {
                (Status::Failed, None, String::new(), Some(message), retry_count, history, verdict)
            }
        };

        if let Some(store) = self.learning_store {
            let exec = TaskExecution {
                plan_file: plan_path.to_string(),
                run_number,
                task_number: task.number.clone(),
                agent: task.agent.clone(),
                success: matches!(status, Status::Green | Status::Yellow),
                qc_verdict: review.as_ref().and_then(|r| r.flag),
                qc_feedback: review.as_ref().map(|r| r.feedback.clone()).unwrap_or_default(),
                failure_patterns: task.metadata.failure_patterns(),
                duration_secs: elapsed.as_secs_f64(),
                output: output.clone(),
                error_message: error.clone(),
            };
            self.record_if_not_duplicate(store, &task, exec).await;
        }

        let checkpoint_hook = CheckpointHook::new(self.scm, self.config, self.logger);
        let mut metadata = task.metadata.clone();
        let post_task_verdict = review.as_ref().and_then(|r| r.flag).or(failed_verdict);
        checkpoint_hook
            .post_task(&mut metadata, post_task_verdict, retry_count, self.config.max_retries)
            .await;

        let plan_status = if matches!(status, Status::Green | Status::Yellow) {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        let completed_at = matches!(status, Status::Green | Status::Yellow).then(chrono::Utc::now);
        if let Err(e) = self
            .plan_updater
            .update(plan_path, &task.number, plan_status, completed_at)
            .await
        {
            conductor_kernel::logging::log_warn(self.logger, format!("final plan update failed: {e:?}"));
        }

        TaskResult {
            status,
            output,
            duration: elapsed,
            retry_count,
            review_feedback: review.map(|r| r.feedback).unwrap_or_default(),
            error,
            execution_history: history,
        }
    }
}

fn test_command_output(report: &Report<KernelError>) -> String {
    match report.current_context() {
        KernelError::TestCommandFailed { output, .. } => output.clone(),
        other => other.to_string(),
    }
}
