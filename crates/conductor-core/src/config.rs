//! Aggregate orchestrator configuration (SPEC_FULL.md §A.3).

use std::collections::BTreeSet;

use conductor_kernel::config::{ConfigError, detect_format};
use serde::{Deserialize, Serialize};

fn default_max_concurrency() -> usize {
    10
}

fn default_checkpoint_prefix() -> String {
    "conductor-checkpoint-".to_string()
}

fn default_working_branch_prefix() -> String {
    "conductor-run/".to_string()
}

fn default_protected_branches() -> BTreeSet<String> {
    ["main", "master", "develop"].iter().map(|s| s.to_string()).collect()
}

fn default_keep_checkpoint_days() -> i64 {
    7
}

fn default_max_retries() -> u32 {
    2
}

fn default_classifier_confidence_threshold() -> f64 {
    0.85
}

fn default_warmup_confidence_threshold() -> f64 {
    0.7
}

fn default_pattern_duplicate_threshold() -> f64 {
    0.9
}

/// Every tunable named across spec §4, aggregated into one struct so a
/// caller can load a single partial document and layer it over defaults
/// (spec §1's "configuration loading" exclusion covers *sourcing*, not this
/// primitive).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Whether Branch Guard requires a clean working copy before it runs.
    pub require_clean_state: bool,

    #[serde(default = "default_checkpoint_prefix")]
    pub checkpoint_prefix: String,

    #[serde(default = "default_working_branch_prefix")]
    pub working_branch_prefix: String,

    #[serde(default = "default_protected_branches")]
    pub protected_branches: BTreeSet<String>,

    #[serde(default = "default_keep_checkpoint_days")]
    pub keep_checkpoint_days: i64,

    /// Whether per-task rollback checkpoints are created at all.
    pub rollback_enabled: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether QC review runs at all; if false, a GREEN result is assumed
    /// (spec §4.G step 8).
    pub qc_enabled: bool,

    /// `auto`/`mixed`/`explicit` (spec §4.F).
    pub qc_mode: QcMode,

    pub enforce_test_commands: bool,

    #[serde(default = "default_classifier_confidence_threshold")]
    pub classifier_confidence_threshold: f64,

    pub llm_classification_enabled: bool,

    pub default_agent: String,

    /// Minimum warm-up-provider confidence before its guidance is injected
    /// into a task prompt (spec §4.G step 3).
    #[serde(default = "default_warmup_confidence_threshold")]
    pub warmup_confidence_threshold: f64,

    /// Minimum pattern-intelligence similarity before a duplicate finding
    /// is acted on (spec §4.G step 4).
    #[serde(default = "default_pattern_duplicate_threshold")]
    pub pattern_duplicate_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_concurrency: default_max_concurrency(),
            require_clean_state: true,
            checkpoint_prefix: default_checkpoint_prefix(),
            working_branch_prefix: default_working_branch_prefix(),
            protected_branches: default_protected_branches(),
            keep_checkpoint_days: default_keep_checkpoint_days(),
            rollback_enabled: true,
            max_retries: default_max_retries(),
            qc_enabled: true,
            qc_mode: QcMode::Explicit,
            enforce_test_commands: true,
            classifier_confidence_threshold: default_classifier_confidence_threshold(),
            llm_classification_enabled: false,
            default_agent: String::new(),
            warmup_confidence_threshold: default_warmup_confidence_threshold(),
            pattern_duplicate_threshold: default_pattern_duplicate_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcMode {
    Auto,
    Mixed,
    Explicit,
}

impl OrchestratorConfig {
    /// Loads a partial document in TOML/YAML/JSON (auto-detected from the
    /// extension), substitutes `${VAR}`/`$VAR` references, and layers it
    /// over [`OrchestratorConfig::default`].
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        detect_format(path)?;
        conductor_kernel::config::load_config(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_called_out_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_concurrency, 10);
        assert_eq!(cfg.checkpoint_prefix, "conductor-checkpoint-");
        assert_eq!(cfg.working_branch_prefix, "conductor-run/");
        assert!(cfg.protected_branches.contains("main"));
        assert!(cfg.protected_branches.contains("master"));
        assert!(cfg.protected_branches.contains("develop"));
    }

    #[test]
    fn load_layers_partial_document_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.toml");
        std::fs::write(&path, "max_concurrency = 4\nqc_enabled = true\n").unwrap();

        let cfg = OrchestratorConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.max_concurrency, 4);
        // Fields absent from the file fall back to defaults via serde(default).
        assert_eq!(cfg.checkpoint_prefix, "conductor-checkpoint-");
    }

    #[test]
    fn load_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.ini");
        std::fs::write(&path, "").unwrap();
        assert!(OrchestratorConfig::load(path.to_str().unwrap()).is_err());
    }
}
