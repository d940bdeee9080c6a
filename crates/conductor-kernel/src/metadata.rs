//! Typed key registry over `Task.Metadata` (spec §3, §9).
//!
//! The dynamic metadata bag is an arbitrary map in the source spec; per the
//! design note in spec §9 ("avoid runtime type-switching in hot paths") it
//! is implemented here as a typed registry: each well-known key has a typed
//! accessor pair, documented with the shape contract it owns. Pipeline
//! stages that need to stash their own ad hoc state may still use the
//! generic `get`/`insert` escape hatch.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::checkpoint::CheckpointInfo;
use crate::detected_error::DetectedError;
use crate::review::Verdict;

const KEY_ROLLBACK_CHECKPOINT: &str = "rollback_checkpoint";
const KEY_DETECTED_ERRORS: &str = "detected_errors";
const KEY_FAILURE_PATTERNS: &str = "failure_patterns";
const KEY_QC_VERDICT: &str = "qc_verdict";

/// Lazily-initialized, open key-value bag attached to a [`crate::task::Task`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TaskMetadata(Map<String, Value>);

impl TaskMetadata {
    pub fn new() -> Self {
        TaskMetadata::default()
    }

    /// Generic escape hatch for pipeline-stage-private keys not covered by a
    /// typed accessor below.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Generic escape hatch, paired with [`TaskMetadata::get`].
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key.into(), v);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }

    // --- rollback_checkpoint: CheckpointInfo ---

    pub fn rollback_checkpoint(&self) -> Option<CheckpointInfo> {
        self.get(KEY_ROLLBACK_CHECKPOINT)
    }

    pub fn set_rollback_checkpoint(&mut self, info: &CheckpointInfo) {
        self.insert(KEY_ROLLBACK_CHECKPOINT, info);
    }

    pub fn clear_rollback_checkpoint(&mut self) {
        self.remove(KEY_ROLLBACK_CHECKPOINT);
    }

    // --- detected_errors: list of DetectedError ---

    pub fn detected_errors(&self) -> Vec<DetectedError> {
        self.get(KEY_DETECTED_ERRORS).unwrap_or_default()
    }

    pub fn set_detected_errors(&mut self, errors: &[DetectedError]) {
        self.insert(KEY_DETECTED_ERRORS, &errors.to_vec());
    }

    pub fn push_detected_error(&mut self, error: DetectedError) {
        let mut current = self.detected_errors();
        current.push(error);
        self.set_detected_errors(&current);
    }

    // --- failure_patterns: list of string ---

    pub fn failure_patterns(&self) -> Vec<String> {
        self.get(KEY_FAILURE_PATTERNS).unwrap_or_default()
    }

    pub fn set_failure_patterns(&mut self, patterns: &[String]) {
        self.insert(KEY_FAILURE_PATTERNS, &patterns.to_vec());
    }

    // --- qc_verdict: string (rendered from Verdict) ---

    pub fn qc_verdict(&self) -> Option<Verdict> {
        self.get::<String>(KEY_QC_VERDICT).and_then(|s| Verdict::parse(&s))
    }

    pub fn set_qc_verdict(&mut self, verdict: Verdict) {
        self.insert(KEY_QC_VERDICT, &verdict.as_str().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_metadata_has_no_typed_values() {
        let m = TaskMetadata::new();
        assert!(m.rollback_checkpoint().is_none());
        assert!(m.detected_errors().is_empty());
        assert!(m.failure_patterns().is_empty());
        assert!(m.qc_verdict().is_none());
    }

    #[test]
    fn rollback_checkpoint_roundtrip() {
        let mut m = TaskMetadata::new();
        let info = CheckpointInfo {
            branch_name: "conductor-checkpoint-1".into(),
            commit_hash: "deadbeef".into(),
            created_at: Utc::now(),
        };
        m.set_rollback_checkpoint(&info);
        let back = m.rollback_checkpoint().unwrap();
        assert_eq!(back.branch_name, "conductor-checkpoint-1");
        m.clear_rollback_checkpoint();
        assert!(m.rollback_checkpoint().is_none());
    }

    #[test]
    fn detected_errors_accumulate() {
        use crate::detected_error::{Category, DetectedError};
        let mut m = TaskMetadata::new();
        m.push_detected_error(DetectedError::regex_match(
            Category::EnvLevel,
            false,
            true,
            "suggestion",
            "raw",
            Utc::now(),
        ));
        m.push_detected_error(DetectedError::regex_match(
            Category::CodeLevel,
            true,
            false,
            "suggestion 2",
            "raw 2",
            Utc::now(),
        ));
        assert_eq!(m.detected_errors().len(), 2);
    }

    #[test]
    fn qc_verdict_roundtrip() {
        let mut m = TaskMetadata::new();
        m.set_qc_verdict(Verdict::Yellow);
        assert_eq!(m.qc_verdict(), Some(Verdict::Yellow));
    }

    #[test]
    fn generic_escape_hatch_roundtrips_arbitrary_values() {
        let mut m = TaskMetadata::new();
        m.insert("custom_pipeline_key", &42u32);
        assert_eq!(m.get::<u32>("custom_pipeline_key"), Some(42));
    }
}
