//! Crate-level error types for `conductor-kernel`.
//!
//! Provides a unified [`KernelError`] composing every sub-module's typed
//! error via `#[from]`, together with [`error_stack::Report`] for
//! context-carrying propagation as an error crosses component boundaries
//! (executor -> QC controller -> agent invoker, etc).
//!
//! # Usage
//!
//! ```rust,ignore
//! use conductor_kernel::error::{KernelError, KernelResult};
//! use error_stack::ResultExt;
//!
//! fn plan_wave(n: &str) -> KernelResult<()> {
//!     Err(error_stack::Report::new(KernelError::Internal("boom".into())))
//!         .attach(format!("while planning waves for task {n}"))
//! }
//! ```

use thiserror::Error;

/// Crate-level error type for `conductor-kernel` and every crate built on it.
///
/// Wraps each component's error family via `#[from]` so `?` converts
/// automatically. Use [`error_stack::Report<KernelError>`] (via
/// [`KernelResult`]) to attach human-readable context as the error
/// propagates up the call stack.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// Agent invocation failed, or the process exited non-zero.
    #[error("task {task_number}: {message}")]
    Task {
        task_number: String,
        message: String,
    },

    /// A context deadline elapsed, or the invoker itself timed out.
    #[error("task {task_number}: timeout ({context})")]
    Timeout {
        task_number: String,
        context: String,
    },

    /// The root context was cancelled.
    #[error("task {task_number}: cancelled")]
    Cancelled { task_number: String },

    /// Dependency graph validation or construction failed.
    #[error("graph error: {0}")]
    Graph(String),

    /// Two tasks in the same wave claim the same file.
    #[error("file overlap in wave: task {a} and task {b} both claim {path}")]
    FileOverlap { a: String, b: String, path: String },

    /// A post-agent test command exited non-zero (spec §7 `ErrTestCommandFailed`).
    #[error("test command failed: {command}")]
    TestCommandFailed { command: String, output: String },

    /// A pre-agent dependency-check command failed; the agent is never invoked.
    #[error("dependency check failed for task {task_number}: {command}")]
    DependencyCheckFailed { task_number: String, command: String },

    /// An internal lock invariant was violated (should not occur in practice).
    #[error("lock error: {0}")]
    Lock(String),

    /// The plan-updater collaborator failed to persist a status change.
    #[error("plan update error: {0}")]
    PlanUpdate(String),

    /// Configuration load/validation failure.
    #[cfg(feature = "config")]
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

impl KernelError {
    /// The sentinel error for a RED verdict with retries exhausted (spec §7).
    pub fn quality_gate_failed(task_number: impl Into<String>) -> Self {
        KernelError::Task {
            task_number: task_number.into(),
            message: "quality-gate-failed".to_string(),
        }
    }

    /// An unsupported/empty QC verdict flag.
    pub fn invalid_qc_flag(task_number: impl Into<String>, flag: impl AsRef<str>) -> Self {
        KernelError::Task {
            task_number: task_number.into(),
            message: format!("qc returned unsupported flag {}", flag.as_ref()),
        }
    }
}

/// Convenience result alias using [`error_stack::Report`].
///
/// Equivalent to `Result<T, error_stack::Report<KernelError>>`.
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::{Report, ResultExt};

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let kernel_err: KernelError = io_err.into();
        assert!(matches!(kernel_err, KernelError::Io(_)));
        assert!(kernel_err.to_string().contains("file missing"));
    }

    #[test]
    fn serde_error_converts_via_from() {
        let bad_json = serde_json::from_str::<serde_json::Value>("not json");
        let kernel_err: KernelError = bad_json.unwrap_err().into();
        assert!(matches!(kernel_err, KernelError::Serialization(_)));
    }

    #[test]
    fn quality_gate_failed_message() {
        let err = KernelError::quality_gate_failed("7");
        assert_eq!(err.to_string(), "task 7: quality-gate-failed");
    }

    #[test]
    fn test_command_failed_message() {
        let err = KernelError::TestCommandFailed {
            command: "cargo test".into(),
            output: "1 failed".into(),
        };
        assert!(err.to_string().contains("cargo test"));
    }

    #[test]
    fn invalid_qc_flag_message() {
        let err = KernelError::invalid_qc_flag("7", "MAYBE");
        assert!(err.to_string().contains("unsupported flag MAYBE"));
    }

    #[test]
    fn report_carries_context() {
        let result: KernelResult<()> =
            Err(Report::new(KernelError::Internal("root cause".into())))
                .attach("while planning waves for task 7");

        let report = result.unwrap_err();
        let display = format!("{report:?}");
        assert!(display.contains("root cause"));
        assert!(display.contains("while planning waves for task 7"));
    }
}
