//! Read-only probe of the resources a plan owns.

use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::artifacts::Artifacts;
use crate::core::namespace::Namespace;
use crate::core::plan::parse_status;
use crate::io::git::Git;
use crate::io::repo::PlanRepo;

/// Report which of the plan's workspace, branch, plan file and active backup exist.
#[instrument(skip(repo))]
pub fn detect(repo: &PlanRepo, plan_id: &str) -> Result<Artifacts> {
    let mut artifacts = Artifacts::default();

    let worktree = repo.paths.worktree(plan_id);
    if worktree.exists() {
        artifacts.worktree_exists = true;
        artifacts.worktree_has_changes = match Git::new(&worktree).has_changes() {
            Ok(changes) => changes,
            Err(err) => {
                warn!(path = %worktree.display(), err = %err, "status probe failed, assuming clean");
                false
            }
        };
    }

    let branch = repo.paths.branch(plan_id);
    if repo.git.branch_exists(&branch)? {
        artifacts.branch_exists = true;
        artifacts.branch_unmerged_commits = repo
            .git
            .count_commits_between("HEAD", &format!("refs/heads/{branch}"))
            .with_context(|| format!("count unmerged commits on {branch}"))?;
    }

    let plan_file = repo.paths.plan_file(plan_id);
    if plan_file.is_file() {
        artifacts.plan_file_exists = true;
        artifacts.plan_status = match fs::read_to_string(&plan_file) {
            Ok(contents) => parse_status(&contents),
            Err(err) => {
                debug!(path = %plan_file.display(), err = %err, "plan file unreadable as text");
                None
            }
        };
    }

    artifacts.backup_ref_exists = repo.backups().exists(Namespace::Active, plan_id)?;

    debug!(?artifacts, "detected plan artifacts");
    Ok(artifacts)
}
