//! Checkpoint Hook (spec §4.E) — per-task SCM checkpoint creation,
//! conditional rollback, and retention-based cleanup.

use chrono::{Duration as ChronoDuration, Utc};
use conductor_kernel::error::KernelResult;
use conductor_kernel::{Logger, ScmAdapter, TaskMetadata, Verdict};

use crate::config::OrchestratorConfig;

/// `rollback iff verdict is RED and attempt equals maxRetries` (spec §4.E
/// PostTask). Kept as a standalone pure function per SPEC_FULL.md §B so it
/// is directly testable.
pub fn should_rollback(verdict: Option<Verdict>, attempt: u32, max_retries: u32) -> bool {
    verdict == Some(Verdict::Red) && attempt == max_retries
}

pub struct CheckpointHook<'a> {
    scm: &'a dyn ScmAdapter,
    config: &'a OrchestratorConfig,
    logger: Option<&'a dyn Logger>,
}

impl<'a> CheckpointHook<'a> {
    pub fn new(scm: &'a dyn ScmAdapter, config: &'a OrchestratorConfig, logger: Option<&'a dyn Logger>) -> Self {
        CheckpointHook { scm, config, logger }
    }

    /// If rollback is enabled, creates a checkpoint and stores it in the
    /// task's metadata. Errors are logged and swallowed — checkpoint
    /// absence disables later rollback but never fails the task
    /// (spec §4.E PreTask).
    pub async fn pre_task(&self, task_number: &str, metadata: &mut TaskMetadata) {
        if !self.config.rollback_enabled {
            return;
        }
        match self.scm.create_checkpoint(task_number).await {
            Ok(info) => metadata.set_rollback_checkpoint(&info),
            Err(e) => conductor_kernel::logging::log_warn(
                self.logger,
                format!("checkpoint pre-hook failed for task {task_number}: {e:?}"),
            ),
        }
    }

    /// Consults [`should_rollback`]; restores to the checkpoint's commit
    /// and deletes the checkpoint branch if rollback triggers, otherwise
    /// deletes the checkpoint branch on success. Any failure here is
    /// logged and swallowed (spec §4.E PostTask).
    pub async fn post_task(
        &self,
        metadata: &mut TaskMetadata,
        verdict: Option<Verdict>,
        attempt: u32,
        max_retries: u32,
    ) {
        let Some(checkpoint) = metadata.rollback_checkpoint() else {
            return;
        };

        if should_rollback(verdict, attempt, max_retries) {
            if let Err(e) = self.scm.restore_checkpoint(&checkpoint.commit_hash).await {
                conductor_kernel::logging::log_warn(
                    self.logger,
                    format!("checkpoint restore failed: {e:?}"),
                );
            }
            if let Err(e) = self.scm.delete_checkpoint(&checkpoint.branch_name).await {
                conductor_kernel::logging::log_warn(
                    self.logger,
                    format!("checkpoint delete failed after rollback: {e:?}"),
                );
            }
        } else if verdict == Some(Verdict::Green) || verdict == Some(Verdict::Yellow) {
            if let Err(e) = self.scm.delete_checkpoint(&checkpoint.branch_name).await {
                conductor_kernel::logging::log_warn(
                    self.logger,
                    format!("checkpoint delete failed after success: {e:?}"),
                );
            }
        }
        metadata.clear_rollback_checkpoint();
    }

    /// Lists checkpoints and deletes any whose `created_at` is older than
    /// `KeepCheckpointDays`. Individual deletion failures are logged and
    /// skipped, never aborting the sweep. Disabled entirely if retention
    /// is ≤ 0 (spec §4.E Cleanup Hook).
    pub async fn run_cleanup_sweep(&self) -> KernelResult<usize> {
        if self.config.keep_checkpoint_days <= 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - ChronoDuration::days(self.config.keep_checkpoint_days);

        let checkpoints = self.scm.list_checkpoints().await?;
        let mut deleted = 0;
        for checkpoint in checkpoints {
            if checkpoint.created_at < cutoff {
                match self.scm.delete_checkpoint(&checkpoint.branch_name).await {
                    Ok(()) => deleted += 1,
                    Err(e) => conductor_kernel::logging::log_warn(
                        self.logger,
                        format!(
                            "checkpoint cleanup: failed to delete {}: {e:?}",
                            checkpoint.branch_name
                        ),
                    ),
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockScmAdapter;

    #[test]
    fn should_rollback_only_on_red_final_attempt() {
        assert!(should_rollback(Some(Verdict::Red), 2, 2));
        assert!(!should_rollback(Some(Verdict::Red), 1, 2));
        assert!(!should_rollback(Some(Verdict::Green), 2, 2));
        assert!(!should_rollback(None, 2, 2));
    }

    #[tokio::test]
    async fn pre_task_stores_checkpoint_in_metadata() {
        let scm = MockScmAdapter::new();
        let config = OrchestratorConfig::default();
        let hook = CheckpointHook::new(&scm, &config, None);
        let mut meta = TaskMetadata::new();
        hook.pre_task("7", &mut meta).await;
        assert!(meta.rollback_checkpoint().is_some());
    }

    #[tokio::test]
    async fn pre_task_skipped_when_rollback_disabled() {
        let scm = MockScmAdapter::new();
        let mut config = OrchestratorConfig::default();
        config.rollback_enabled = false;
        let hook = CheckpointHook::new(&scm, &config, None);
        let mut meta = TaskMetadata::new();
        hook.pre_task("7", &mut meta).await;
        assert!(meta.rollback_checkpoint().is_none());
    }

    #[tokio::test]
    async fn post_task_restores_and_deletes_on_final_red() {
        let scm = MockScmAdapter::new();
        let config = OrchestratorConfig::default();
        let hook = CheckpointHook::new(&scm, &config, None);
        let mut meta = TaskMetadata::new();
        hook.pre_task("7", &mut meta).await;

        hook.post_task(&mut meta, Some(Verdict::Red), 2, 2).await;

        assert_eq!(scm.restored_commits.lock().len(), 1);
        assert_eq!(scm.deleted_checkpoints.lock().len(), 1);
        assert!(meta.rollback_checkpoint().is_none());
    }

    #[tokio::test]
    async fn post_task_deletes_without_restore_on_success() {
        let scm = MockScmAdapter::new();
        let config = OrchestratorConfig::default();
        let hook = CheckpointHook::new(&scm, &config, None);
        let mut meta = TaskMetadata::new();
        hook.pre_task("7", &mut meta).await;

        hook.post_task(&mut meta, Some(Verdict::Green), 0, 2).await;

        assert_eq!(scm.restored_commits.lock().len(), 0);
        assert_eq!(scm.deleted_checkpoints.lock().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_sweep_disabled_when_retention_non_positive() {
        let scm = MockScmAdapter::new();
        let mut config = OrchestratorConfig::default();
        config.keep_checkpoint_days = 0;
        let hook = CheckpointHook::new(&scm, &config, None);
        let deleted = hook.run_cleanup_sweep().await.unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn cleanup_sweep_skips_individual_failures() {
        let scm = MockScmAdapter::new();
        scm.create_checkpoint("old").await.unwrap();
        let config = OrchestratorConfig::default();
        let hook = CheckpointHook::new(&scm, &config, None);
        // fresh checkpoint is not older than retention, so nothing deleted
        let deleted = hook.run_cleanup_sweep().await.unwrap();
        assert_eq!(deleted, 0);
    }
}
