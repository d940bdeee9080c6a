//! Orchestrator (spec §4.H) — drives waves through the Task Executor with
//! bounded per-wave concurrency, waiting for each wave to drain before the
//! next starts, and runs the checkpoint cleanup sweep once the last wave
//! is done (SPEC_FULL.md §C.3).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use uuid::Uuid;

use conductor_kernel::{Task, TaskResult, Wave};

use crate::checkpoint::CheckpointHook;
use crate::config::OrchestratorConfig;
use crate::executor::{Cancellation, TaskExecutor};

/// One wave's collected results, in the same order as `wave.task_numbers`.
pub struct WaveOutcome {
    pub wave_name: String,
    pub results: Vec<(String, TaskResult)>,
}

/// The outcome of driving an entire plan's waves.
pub struct OrchestratorRun {
    /// Unique identifier for this run, independent of the caller-supplied
    /// `run_number` (which is only sequential within one plan file).
    pub execution_id: Uuid,
    pub waves: Vec<WaveOutcome>,
    /// True if a fatal-to-the-plan result cancelled remaining waves
    /// (spec §4.H).
    pub aborted: bool,
    /// Number of stale checkpoints deleted by the post-run cleanup sweep.
    pub checkpoints_cleaned: usize,
}

/// Default fatal-error classifier (spec §4.H: "default: none fatal —
/// continue").
pub fn never_fatal(_: &TaskResult) -> bool {
    false
}

pub struct Orchestrator<'a> {
    executor: &'a TaskExecutor<'a>,
    config: &'a OrchestratorConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a TaskExecutor<'a>, config: &'a OrchestratorConfig) -> Self {
        Orchestrator { executor, config }
    }

    /// Dispatches every wave's tasks to a worker pool bounded by
    /// `min(wave.max_concurrency, len(wave.task_numbers))` (spec §4.H).
    /// Waits for a wave to fully drain before emitting the next. If
    /// `is_fatal` returns true for any result, cancels the shared
    /// [`Cancellation`] token (so any still-running sibling in the same
    /// wave observes it at its next attempt boundary) and skips remaining
    /// waves once the current one drains.
    pub async fn run(
        &self,
        waves: &[Wave],
        tasks_by_number: &HashMap<String, Task>,
        plan_path: &str,
        run_number: u64,
        is_fatal: &(dyn Fn(&TaskResult) -> bool + Sync),
    ) -> OrchestratorRun {
        let cancel = Cancellation::new();
        let mut wave_outcomes = Vec::new();
        let mut aborted = false;

        for wave in waves {
            if cancel.is_cancelled() {
                aborted = true;
                break;
            }

            let worker_count = wave.max_concurrency.min(wave.task_numbers.len()).max(1);
            let semaphore = Arc::new(Semaphore::new(worker_count));

            let futures = wave.task_numbers.iter().filter_map(|number| {
                let task = tasks_by_number.get(number)?.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let number = number.clone();
                Some(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("wave semaphore is never closed");
                    let result = self.executor.execute(task, plan_path, run_number, &cancel).await;
                    (number, result)
                })
            });

            let results: Vec<(String, TaskResult)> = join_all(futures).await;

            if results.iter().any(|(_, result)| is_fatal(result)) {
                cancel.cancel();
                aborted = true;
            }

            wave_outcomes.push(WaveOutcome {
                wave_name: wave.name.clone(),
                results,
            });

            if aborted {
                break;
            }
        }

        let checkpoint_hook = CheckpointHook::new(self.executor.scm, self.config, self.executor.logger);
        let checkpoints_cleaned = checkpoint_hook.run_cleanup_sweep().await.unwrap_or(0);

        OrchestratorRun {
            execution_id: Uuid::new_v4(),
            waves: wave_outcomes,
            aborted,
            checkpoints_cleaned,
        }
    }
}
