//! Branch Guard (spec §4.D) — one-shot, pre-run SCM safety net.

use chrono::Utc;
use conductor_kernel::error::KernelResult;
use conductor_kernel::{BranchGuardResult, KernelError, Logger, ScmAdapter};
use error_stack::{Report, ResultExt};
use regex::Regex;

use crate::config::OrchestratorConfig;

/// Runs the Branch Guard sequence once, before any task executes
/// (spec §4.D steps 1-5).
pub async fn run(
    scm: &dyn ScmAdapter,
    config: &OrchestratorConfig,
    plan_name: &str,
    logger: Option<&dyn Logger>,
) -> KernelResult<BranchGuardResult> {
    if config.require_clean_state {
        let clean = scm
            .is_clean_state()
            .await
            .attach("checking working-copy cleanliness")?;
        if !clean {
            return Err(Report::new(KernelError::Internal(dirty_state_message())));
        }
    }

    let original_branch = scm.get_current_branch().await.attach("reading current branch")?;

    let timestamp = Utc::now();
    let checkpoint_branch = format!("{}{}", config.checkpoint_prefix, timestamp.timestamp());

    if let Err(e) = create_and_return(scm, &checkpoint_branch, &original_branch).await {
        conductor_kernel::logging::log_warn(
            logger,
            format!("branch guard: failed to create checkpoint branch: {e:?}"),
        );
        return Err(e);
    }

    let mut working_branch = String::new();
    if config.protected_branches.contains(&original_branch) {
        working_branch = working_branch_name(plan_name, &config.working_branch_prefix, timestamp.timestamp());
        scm.create_branch(&working_branch)
            .await
            .attach("creating working branch")?;
        scm.switch_branch(&working_branch)
            .await
            .attach("switching to working branch")?;
    }

    Ok(BranchGuardResult {
        original_branch,
        checkpoint_branch,
        working_branch,
        timestamp,
    })
}

/// Create-and-switch the checkpoint branch, then switch back to the
/// original branch; on switch-back failure, delete the checkpoint and
/// report (spec §4.D step 3).
async fn create_and_return(
    scm: &dyn ScmAdapter,
    checkpoint_branch: &str,
    original_branch: &str,
) -> KernelResult<()> {
    scm.create_branch(checkpoint_branch)
        .await
        .attach("creating checkpoint branch")?;
    scm.switch_branch(checkpoint_branch)
        .await
        .attach("switching to checkpoint branch")?;

    if let Err(e) = scm.switch_branch(original_branch).await {
        let _ = scm.delete_checkpoint(checkpoint_branch).await;
        return Err(e).attach("switching back to original branch after checkpoint creation");
    }
    Ok(())
}

fn dirty_state_message() -> String {
    "working copy is not clean; options: (1) commit your changes, (2) stash your changes with \
     `git stash`, (3) discard your changes with `git checkout -- .`"
        .to_string()
}

/// Derives a working-branch name from the plan name: strip recognised plan
/// extensions, collapse runs of non-alphanumeric characters into a single
/// hyphen, trim leading/trailing hyphens, falling back to `plan-<ts>` for
/// an empty result (spec §4.D step 4).
fn working_branch_name(plan_name: &str, prefix: &str, timestamp: i64) -> String {
    let stripped = strip_plan_extension(plan_name);
    let collapse = Regex::new(r"[^A-Za-z0-9]+").unwrap();
    let slug = collapse.replace_all(&stripped, "-").trim_matches('-').to_string();

    let slug = if slug.is_empty() {
        format!("plan-{timestamp}")
    } else {
        slug
    };

    format!("{prefix}{slug}")
}

fn strip_plan_extension(name: &str) -> String {
    for ext in [".plan.json", ".plan.yaml", ".plan.yml", ".json", ".yaml", ".yml", ".md"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockScmAdapter;

    #[tokio::test]
    async fn dirty_state_fails_with_actionable_message() {
        let scm = MockScmAdapter::new().with_clean_state(false);
        let config = OrchestratorConfig::default();
        let result = run(&scm, &config, "plan.json", None).await;
        let report = result.unwrap_err();
        let msg = format!("{report:?}");
        assert!(msg.contains("commit"));
        assert!(msg.contains("stash"));
        assert!(msg.contains("discard"));
    }

    #[tokio::test]
    async fn unprotected_branch_has_no_working_branch() {
        let scm = MockScmAdapter::new()
            .with_clean_state(true)
            .with_current_branch("feature/widgets");
        let config = OrchestratorConfig::default();
        let result = run(&scm, &config, "plan.json", None).await.unwrap();
        assert_eq!(result.original_branch, "feature/widgets");
        assert!(result.working_branch.is_empty());
        assert!(result.checkpoint_branch.starts_with("conductor-checkpoint-"));
    }

    #[tokio::test]
    async fn protected_branch_creates_working_branch() {
        let scm = MockScmAdapter::new()
            .with_clean_state(true)
            .with_current_branch("main");
        let config = OrchestratorConfig::default();
        let result = run(&scm, &config, "My Plan.json", None).await.unwrap();
        assert!(result.working_branch.starts_with("conductor-run/"));
        assert!(result.working_branch.contains("My-Plan"));
    }

    #[test]
    fn working_branch_name_collapses_and_trims() {
        let name = working_branch_name("My--Weird_Plan!!.json", "conductor-run/", 1);
        assert_eq!(name, "conductor-run/My-Weird-Plan");
    }

    #[test]
    fn working_branch_name_falls_back_for_empty_slug() {
        let name = working_branch_name("???.json", "conductor-run/", 42);
        assert_eq!(name, "conductor-run/plan-42");
    }
}
