//! Task and wave data model (spec §3).
//!
//! Tasks are immutable inputs; the executor carries a mutable copy per
//! attempt rather than mutating the original (spec §9 "cyclic or shared
//! ownership" note — value copies, explicit mutation via return value).

use serde::{Deserialize, Serialize};

use crate::metadata::TaskMetadata;

/// A single unit of work in the dependency graph.
///
/// `Number` is an opaque string identifier, unique within a plan; wave
/// ordering does a best-effort numeric parse of it for presentation only
/// (spec §9 ambiguity note — never assume `Number` parses as an integer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub number: String,
    pub name: String,
    pub prompt: String,
    pub agent: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub test_commands: Vec<String>,
    /// Which plan file this task belongs to; may differ from the top-level
    /// plan path in multi-file plans.
    #[serde(default)]
    pub source_file: String,
    /// Optional secondary grouping key used by the wave planner's
    /// `GroupInfo` bucketing.
    #[serde(default)]
    pub worktree_group: Option<String>,
    /// Expected commit subject, checked against recent git history by the
    /// executor's commit-verification step; absent skips the check.
    #[serde(default)]
    pub commit_subject: Option<String>,
    /// `(file, section heading)` pairs the executor's documentation-target
    /// verification step scans for.
    #[serde(default)]
    pub doc_targets: Vec<DocTarget>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

/// One documentation-target verification declaration: `file` must contain
/// a heading matching `section` (spec §4.G step 7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocTarget {
    pub file: String,
    pub section: String,
}

impl Task {
    pub fn new(number: impl Into<String>, name: impl Into<String>) -> Self {
        Task {
            number: number.into(),
            name: name.into(),
            prompt: String::new(),
            agent: String::new(),
            depends_on: Vec::new(),
            files: Vec::new(),
            test_commands: Vec::new(),
            source_file: String::new(),
            worktree_group: None,
            commit_subject: None,
            doc_targets: Vec::new(),
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = source_file.into();
        self
    }

    pub fn with_worktree_group(mut self, group: impl Into<String>) -> Self {
        self.worktree_group = Some(group.into());
        self
    }

    pub fn with_commit_subject(mut self, subject: impl Into<String>) -> Self {
        self.commit_subject = Some(subject.into());
        self
    }

    pub fn with_doc_targets(mut self, targets: impl IntoIterator<Item = DocTarget>) -> Self {
        self.doc_targets = targets.into_iter().collect();
        self
    }
}

/// Secondary grouping of a wave's tasks by `worktree_group`, preserved
/// alongside the wave's flat `task_numbers` for callers that want to
/// schedule per-worktree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
    pub groups: std::collections::BTreeMap<String, Vec<String>>,
}

/// An emitted execution wave: every task number listed has zero remaining
/// in-degree at the moment the wave is built (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub name: String,
    pub task_numbers: Vec<String>,
    pub max_concurrency: usize,
    pub group_info: Option<GroupInfo>,
}

impl Wave {
    pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

    pub fn new(index: usize, task_numbers: Vec<String>) -> Self {
        Wave {
            name: format!("Wave {index}"),
            task_numbers,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            group_info: None,
        }
    }
}
