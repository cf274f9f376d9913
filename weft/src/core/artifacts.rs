//! Snapshot of which plan resources exist, and how to describe them.

use crate::core::plan::PlanStatus;

/// Result of probing a plan's resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub worktree_exists: bool,
    pub worktree_has_changes: bool,
    pub branch_exists: bool,
    /// Commits on the plan branch not reachable from the main checkout's HEAD.
    pub branch_unmerged_commits: u32,
    pub plan_file_exists: bool,
    /// Status parsed from the plan file, when it exists and has one.
    pub plan_status: Option<PlanStatus>,
    /// Active (`refs/plan-backups/`) record only.
    pub backup_ref_exists: bool,
}

impl Artifacts {
    /// True when there is nothing left to clean up.
    pub fn is_empty(&self) -> bool {
        !self.worktree_exists
            && !self.branch_exists
            && !self.plan_file_exists
            && !self.backup_ref_exists
    }

    /// One line per resource that abandon will force-delete or move.
    pub fn describe(&self, plan_id: &str, branch: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if self.worktree_exists {
            if self.worktree_has_changes {
                lines.push("will force-delete workspace (has uncommitted changes)".to_string());
            } else {
                lines.push("will delete workspace".to_string());
            }
        }
        if self.branch_exists {
            match self.branch_unmerged_commits {
                0 => lines.push(format!("will delete branch {branch}")),
                1 => lines.push(format!(
                    "will force-delete branch {branch} (has 1 unmerged commit)"
                )),
                n => lines.push(format!(
                    "will force-delete branch {branch} (has {n} unmerged commits)"
                )),
            }
        }
        if self.plan_file_exists {
            match self.plan_status {
                Some(status) => lines.push(format!(
                    "will delete plan file for {plan_id} (status: {status})"
                )),
                None => lines.push(format!("will delete plan file for {plan_id}")),
            }
        }
        if self.backup_ref_exists {
            lines.push(
                "will move backup to abandoned (recoverable with `weft recover --abandoned`)"
                    .to_string(),
            );
        }
        lines
    }
}
