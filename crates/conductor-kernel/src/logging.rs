//! Logger trait and nil-tolerant helpers (spec §6, §9).
//!
//! "All callers must tolerate a nil logger" (spec §6) — rather than every
//! call site writing `if let Some(l) = logger { l.warnf(...) }` by hand, the
//! free functions below centralise the check (SPEC_FULL.md §B).

use crate::detected_error::DetectedError;
use crate::review::ReviewResult;

/// Structured diagnostic sink consumed by every component. Implementations
/// live outside this crate (e.g. `conductor-core::logging::TracingLogger`);
/// this crate only defines the contract plus a no-op default.
pub trait Logger: Send + Sync {
    fn warnf(&self, message: &str);
    fn infof(&self, message: &str);
    fn log_error_pattern(&self, pattern: &str, task_number: &str);
    fn log_detected_error(&self, error: &DetectedError, task_number: &str);
    fn log_test_commands(&self, task_number: &str, commands: &[String], passed: bool);
    fn log_criterion_verifications(&self, task_number: &str, passed: bool, detail: &str);
    fn log_doc_target_verifications(&self, task_number: &str, file: &str, section: &str, passed: bool);
    fn log_qc_agent_selection(&self, task_number: &str, agents: &[String]);
    fn log_qc_individual_verdicts(&self, task_number: &str, results: &[ReviewResult]);
    fn log_qc_aggregated_result(&self, task_number: &str, result: &ReviewResult);
}

/// A logger that discards every call. Used when no logger is configured and
/// as the default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn warnf(&self, _message: &str) {}
    fn infof(&self, _message: &str) {}
    fn log_error_pattern(&self, _pattern: &str, _task_number: &str) {}
    fn log_detected_error(&self, _error: &DetectedError, _task_number: &str) {}
    fn log_test_commands(&self, _task_number: &str, _commands: &[String], _passed: bool) {}
    fn log_criterion_verifications(&self, _task_number: &str, _passed: bool, _detail: &str) {}
    fn log_doc_target_verifications(&self, _task_number: &str, _file: &str, _section: &str, _passed: bool) {}
    fn log_qc_agent_selection(&self, _task_number: &str, _agents: &[String]) {}
    fn log_qc_individual_verdicts(&self, _task_number: &str, _results: &[ReviewResult]) {}
    fn log_qc_aggregated_result(&self, _task_number: &str, _result: &ReviewResult) {}
}

pub fn log_warn(logger: Option<&dyn Logger>, message: impl AsRef<str>) {
    if let Some(l) = logger {
        l.warnf(message.as_ref());
    }
}

pub fn log_info(logger: Option<&dyn Logger>, message: impl AsRef<str>) {
    if let Some(l) = logger {
        l.infof(message.as_ref());
    }
}

pub fn log_detected_error(logger: Option<&dyn Logger>, error: &DetectedError, task_number: &str) {
    if let Some(l) = logger {
        l.log_detected_error(error, task_number);
    }
}

pub fn log_qc_aggregated_result(logger: Option<&dyn Logger>, task_number: &str, result: &ReviewResult) {
    if let Some(l) = logger {
        l.log_qc_aggregated_result(task_number, result);
    }
}

pub fn log_qc_individual_verdicts(logger: Option<&dyn Logger>, task_number: &str, results: &[ReviewResult]) {
    if let Some(l) = logger {
        l.log_qc_individual_verdicts(task_number, results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_logger_helpers_never_panic() {
        log_warn(None, "anything");
        log_info(None, "anything");
    }

    #[test]
    fn noop_logger_swallows_everything() {
        let logger: &dyn Logger = &NoopLogger;
        logger.warnf("x");
        logger.infof("x");
        log_warn(Some(logger), "x");
    }
}
