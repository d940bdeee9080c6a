//! `conductor-kernel`: trait contracts and data model for the plan-driven
//! task orchestrator.
//!
//! This crate defines traits only (kernel layer). Concrete implementations
//! of every component — File Lock Manager, Dependency Graph, Wave Planner,
//! Branch Guard, Checkpoint Hook, QC Controller, Task Executor,
//! Orchestrator, Error Classifier — are provided in `conductor-core`.

#[cfg(feature = "config")]
pub mod config;
pub mod checkpoint;
pub mod detected_error;
pub mod error;
pub mod execution;
pub mod logging;
pub mod metadata;
pub mod review;
pub mod task;
pub mod traits;

pub use checkpoint::{BranchGuardResult, CheckpointInfo};
pub use detected_error::{Category, DetectedError, FailurePattern, Method};
pub use error::{KernelError, KernelResult};
pub use execution::{AttemptRecord, Status, TaskExecution, TaskResult};
pub use logging::{Logger, NoopLogger};
pub use metadata::TaskMetadata;
pub use review::{Issue, ReviewResult, Verdict, should_retry};
pub use task::{DocTarget, GroupInfo, Task, Wave};
pub use traits::{
    AgentInvoker, AgentOutcome, CommandRunner, FailureAnalysis, IsClean, LearningStore,
    PlanStatus, PlanUpdater, ScmAdapter,
};
