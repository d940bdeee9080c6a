//! Hook-chain abstraction (SPEC_FULL.md §B) backing the Task Executor's
//! optional pre-task pipeline: learning-store lookup, warm-up injection,
//! pattern-intelligence pre-check. Each stage is independently testable
//! and skippable via `enabled()`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use conductor_kernel::error::KernelResult;
use conductor_kernel::Task;

/// Mutable state threaded through a pre-task stage pipeline.
pub struct TaskContext {
    pub task: Task,
    /// Non-empty once a stage decides the task must not run at all
    /// (spec §4.G step 4's `block` mode).
    pub block_reason: Option<String>,
}

impl TaskContext {
    pub fn new(task: Task) -> Self {
        TaskContext {
            task,
            block_reason: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.block_reason.is_some()
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn enabled(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut TaskContext) -> KernelResult<()>;
}

/// Runs every enabled stage in order, short-circuiting once a stage blocks
/// the task. Matches spec §4.G's "pre-task hook → warm-up → pattern-check
/// → checkpoint pre-hook" pipeline shape without hard-coding any one
/// collaborator into the executor body.
pub async fn run_pipeline(stages: &[&dyn Stage], ctx: &mut TaskContext) -> KernelResult<()> {
    for stage in stages {
        if !stage.enabled() {
            continue;
        }
        stage.run(ctx).await?;
        if ctx.is_blocked() {
            break;
        }
    }
    Ok(())
}

/// Suggestion returned by a warm-up pattern provider (spec §4.G step 3).
#[derive(Debug, Clone)]
pub struct WarmupSuggestion {
    pub guidance: String,
    pub confidence: f64,
}

#[async_trait]
pub trait WarmupProvider: Send + Sync {
    async fn suggest(&self, task: &Task) -> Option<WarmupSuggestion>;
}

/// Injects warm-up guidance into the task prompt when the provider's
/// confidence clears `threshold` (spec §4.G step 3).
pub struct WarmupStage<'a> {
    pub provider: &'a dyn WarmupProvider,
    pub threshold: f64,
}

#[async_trait]
impl<'a> Stage for WarmupStage<'a> {
    async fn run(&self, ctx: &mut TaskContext) -> KernelResult<()> {
        if let Some(suggestion) = self.provider.suggest(&ctx.task).await {
            if suggestion.confidence >= self.threshold {
                ctx.task.prompt = format!("{}\n\nWarm-up guidance:\n{}", ctx.task.prompt, suggestion.guidance);
            }
        }
        Ok(())
    }
}

/// How a [`PatternIntelligence`] duplicate finding should affect the task
/// (spec §4.G step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    Block,
    Warn,
    Suggest,
}

#[derive(Debug, Clone)]
pub struct PatternCheck {
    pub mode: PatternMode,
    pub is_duplicate: bool,
    pub similarity: f64,
    pub guidance: String,
    pub block_reason: String,
}

#[async_trait]
pub trait PatternIntelligence: Send + Sync {
    async fn check(&self, task: &Task) -> PatternCheck;
}

/// Runs STOP-protocol/duplicate-detection; in `block` mode with a
/// similarity at or above `threshold`, aborts the task via
/// `ctx.block_reason`. In `warn`/`suggest` modes, appends guidance to the
/// prompt instead (spec §4.G step 4).
pub struct PatternIntelligenceStage<'a> {
    pub intelligence: &'a dyn PatternIntelligence,
    pub threshold: f64,
}

#[async_trait]
impl<'a> Stage for PatternIntelligenceStage<'a> {
    async fn run(&self, ctx: &mut TaskContext) -> KernelResult<()> {
        let check = self.intelligence.check(&ctx.task).await;
        if !check.is_duplicate || check.similarity < self.threshold {
            return Ok(());
        }
        match check.mode {
            PatternMode::Block => {
                ctx.block_reason = Some(check.block_reason);
            }
            PatternMode::Warn | PatternMode::Suggest => {
                if !check.guidance.is_empty() {
                    ctx.task.prompt = format!("{}\n\nPattern guidance:\n{}", ctx.task.prompt, check.guidance);
                }
            }
        }
        Ok(())
    }
}
