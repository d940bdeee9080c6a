//! Source-control checkpoint and branch-guard data model (spec §3, §4.D, §4.E).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named source-control reference captured before a task executes,
/// enabling revert (GLOSSARY: "Checkpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub branch_name: String,
    pub commit_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The outcome of the one-shot, pre-run Branch Guard pass (spec §4.D step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchGuardResult {
    pub original_branch: String,
    pub checkpoint_branch: String,
    /// Empty if the original branch was not in the protected set.
    pub working_branch: String,
    pub timestamp: DateTime<Utc>,
}
