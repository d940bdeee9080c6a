//! Concrete [`Logger`] implementations (SPEC_FULL.md §A.1).

use conductor_kernel::{DetectedError, Logger, ReviewResult};

/// Forwards every [`Logger`] method to `tracing`'s structured macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn warnf(&self, message: &str) {
        tracing::warn!(%message);
    }

    fn infof(&self, message: &str) {
        tracing::info!(%message);
    }

    fn log_error_pattern(&self, pattern: &str, task_number: &str) {
        tracing::warn!(task_number, pattern, "error pattern matched");
    }

    fn log_detected_error(&self, error: &DetectedError, task_number: &str) {
        tracing::warn!(
            task_number,
            category = ?error.category,
            method = ?error.method,
            confidence = error.confidence,
            agent_can_fix = error.agent_can_fix,
            "detected error classified"
        );
    }

    fn log_test_commands(&self, task_number: &str, commands: &[String], passed: bool) {
        tracing::debug!(task_number, ?commands, passed, "test commands executed");
    }

    fn log_criterion_verifications(&self, task_number: &str, passed: bool, detail: &str) {
        tracing::debug!(task_number, passed, detail, "commit verification");
    }

    fn log_doc_target_verifications(&self, task_number: &str, file: &str, section: &str, passed: bool) {
        tracing::debug!(task_number, file, section, passed, "doc target verification");
    }

    fn log_qc_agent_selection(&self, task_number: &str, agents: &[String]) {
        tracing::info!(task_number, ?agents, "qc agents selected");
    }

    fn log_qc_individual_verdicts(&self, task_number: &str, results: &[ReviewResult]) {
        for r in results {
            tracing::info!(
                task_number,
                agent = %r.agent_name,
                verdict = ?r.flag,
                "qc individual verdict"
            );
        }
    }

    fn log_qc_aggregated_result(&self, task_number: &str, result: &ReviewResult) {
        tracing::info!(
            task_number,
            agent = %result.agent_name,
            verdict = ?result.flag,
            "qc aggregated result"
        );
    }
}

/// Installs a `tracing-subscriber` `EnvFilter`-driven subscriber reading
/// `RUST_LOG`. For integration tests and examples only — the library never
/// installs a global subscriber on its own (that is an application concern).
#[cfg(feature = "tracing-init")]
pub fn install_default_subscriber() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_methods_do_not_panic() {
        let logger = TracingLogger;
        logger.warnf("warning");
        logger.infof("info");
        logger.log_error_pattern("timeout", "3");
        logger.log_test_commands("3", &["cargo test".to_string()], true);
        logger.log_qc_agent_selection("3", &["claude".to_string(), "gpt".to_string()]);
    }
}
