//! Orchestration for `weft abandon`.
//!
//! Abandoning a plan removes its workspace, branch and plan file, and moves
//! its backup to `refs/plan-abandoned/` so it stays recoverable. Every step
//! is idempotent and runs regardless of earlier failures, so a partial run
//! can simply be repeated.

use std::fs;
use std::io::ErrorKind;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::cleanup::{CleanupResult, Resource};
use crate::core::plan::{plan_id_from_target, validate_plan_id};
use crate::detect::detect;
use crate::error::CleanupError;
use crate::io::audit_log::append_entry;
use crate::io::backup::MoveOutcome;
use crate::io::confirm::Confirm;
use crate::io::repo::PlanRepo;
use crate::io::worktree::force_remove_worktree;

/// Options for [`run_abandon`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbandonOptions {
    /// Recorded in the audit log when present.
    pub reason: Option<String>,
    /// Skip the confirmation prompt (`--yes`).
    pub skip_confirmation: bool,
}

/// What happened to each resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbandonReport {
    pub plan_id: String,
    pub results: Vec<(Resource, CleanupResult)>,
    pub audit_logged: bool,
    pub audit_error: Option<String>,
}

impl AbandonReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, result)| result.success) && self.audit_error.is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &(Resource, CleanupResult)> {
        self.results.iter().filter(|(_, result)| !result.success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonOutcome {
    /// No workspace, branch, plan file or active backup exists.
    NothingToClean { plan_id: String },
    /// The user declined; nothing was touched.
    Cancelled { plan_id: String },
    Completed(AbandonReport),
}

/// Abandon the plan named by `target` (a plan id or a path to its file).
#[instrument(skip(repo, options, confirm))]
pub fn run_abandon(
    repo: &PlanRepo,
    target: &str,
    options: &AbandonOptions,
    confirm: &dyn Confirm,
) -> Result<AbandonOutcome> {
    let plan_id = plan_id_from_target(target);
    validate_plan_id(&plan_id).map_err(|reason| anyhow!("invalid plan id '{plan_id}': {reason}"))?;

    let artifacts = detect(repo, &plan_id)?;
    if artifacts.is_empty() {
        info!(plan_id = %plan_id, "nothing to clean");
        return Ok(AbandonOutcome::NothingToClean { plan_id });
    }

    if !options.skip_confirmation {
        let details = artifacts.describe(&plan_id, &repo.paths.branch(&plan_id));
        let question = format!("Abandon plan '{plan_id}'?");
        if !confirm.confirm(&question, &details)? {
            debug!("abandon declined");
            return Ok(AbandonOutcome::Cancelled { plan_id });
        }
    }

    let results = Resource::ORDER
        .iter()
        .map(|&resource| (resource, cleanup(repo, &plan_id, resource)))
        .collect();

    let mut report = AbandonReport {
        plan_id: plan_id.clone(),
        results,
        audit_logged: false,
        audit_error: None,
    };

    if let Some(reason) = &options.reason {
        match append_entry(&repo.paths.audit_log_path, &plan_id, reason, Utc::now()) {
            Ok(()) => report.audit_logged = true,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "audit log write failed");
                report.audit_error = Some(message);
            }
        }
    }

    info!(plan_id = %plan_id, success = report.is_success(), "abandon finished");
    Ok(AbandonOutcome::Completed(report))
}

fn cleanup(repo: &PlanRepo, plan_id: &str, resource: Resource) -> CleanupResult {
    match resource {
        Resource::Workspace => cleanup_workspace(repo, plan_id),
        Resource::Branch => cleanup_branch(repo, plan_id),
        Resource::PlanFile => cleanup_plan_file(repo, plan_id),
        Resource::Backup => move_backup_to_abandoned(repo, plan_id),
    }
}

/// Force-remove the plan worktree.
pub fn cleanup_workspace(repo: &PlanRepo, plan_id: &str) -> CleanupResult {
    let path = repo.paths.worktree(plan_id);
    to_result(Resource::Workspace, force_remove_worktree(&repo.git, &path))
}

/// Force-delete the plan branch.
pub fn cleanup_branch(repo: &PlanRepo, plan_id: &str) -> CleanupResult {
    let branch = repo.paths.branch(plan_id);
    to_result(Resource::Branch, delete_branch(repo, &branch))
}

fn delete_branch(repo: &PlanRepo, branch: &str) -> Result<bool, CleanupError> {
    if !repo.git.branch_exists(branch)? {
        return Ok(false);
    }
    repo.git.delete_branch_force(branch)?;
    Ok(true)
}

/// Delete the tracked plan file.
pub fn cleanup_plan_file(repo: &PlanRepo, plan_id: &str) -> CleanupResult {
    let path = repo.paths.plan_file(plan_id);
    let outcome = match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CleanupError::Remove { path, source }),
    };
    to_result(Resource::PlanFile, outcome)
}

/// Move the active backup to the abandoned namespace.
pub fn move_backup_to_abandoned(repo: &PlanRepo, plan_id: &str) -> CleanupResult {
    let outcome = repo
        .backups()
        .move_backup_to_abandoned(plan_id)
        .map(|moved| matches!(moved, MoveOutcome::Moved { .. }))
        .map_err(CleanupError::from);
    to_result(Resource::Backup, outcome)
}

fn to_result(resource: Resource, outcome: Result<bool, CleanupError>) -> CleanupResult {
    match outcome {
        Ok(true) => {
            debug!(%resource, "removed");
            CleanupResult::cleaned()
        }
        Ok(false) => {
            debug!(%resource, "already clean");
            CleanupResult::already_clean()
        }
        Err(err) => {
            warn!(%resource, err = %err, "cleanup failed");
            CleanupResult::failed(err.to_string())
        }
    }
}
