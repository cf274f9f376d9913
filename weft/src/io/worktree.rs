//! Plan and temporary worktrees under `.weft/`.

use std::fs;
use std::path::{Path, PathBuf};

use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use crate::error::{CleanupError, DirectoryError, GitError};

use super::ephemeral::{DirResult, EphemeralDirs, check_plan_id};
use super::git::Git;

const SHORT_SHA_LEN: usize = 8;

impl EphemeralDirs {
    /// Check out `rev` detached at `.weft/temp-worktrees/<short-sha>-<random6>`.
    #[instrument(skip(self))]
    pub fn create_temp_worktree(&self, rev: &str) -> DirResult<PathBuf> {
        let sha = self.git.resolve_commit(rev)?.ok_or_else(|| GitError::Failed {
            args: format!("rev-parse --verify {rev}"),
            stderr: format!("unknown revision '{rev}'"),
        })?;
        self.ensure_gitignore()?;
        fs::create_dir_all(&self.paths.temp_worktrees_dir).map_err(|source| {
            DirectoryError::Create {
                path: self.paths.temp_worktrees_dir.clone(),
                source,
            }
        })?;

        let name = temp_worktree_name(&sha, &generate_short_id());
        let path = self.paths.temp_worktrees_dir.join(name);
        self.git.worktree_add_detached(&path, &sha)?;
        info!(path = %path.display(), sha = %sha, "temporary worktree created");
        Ok(path)
    }

    /// Remove a temporary worktree. Returns false if it was already gone.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn remove_temp_worktree(&self, path: &Path) -> DirResult<bool> {
        if !path.exists() {
            debug!("temporary worktree already gone");
            self.git.worktree_prune()?;
            return Ok(false);
        }
        self.git.worktree_remove_force(path)?;
        Ok(true)
    }

    /// Attach `.weft/worktrees/<plan_id>` to the plan branch, creating the
    /// branch at `HEAD` when it does not exist yet. Reuses an existing worktree.
    #[instrument(skip(self))]
    pub fn create_plan_worktree(&self, plan_id: &str) -> DirResult<PathBuf> {
        check_plan_id(plan_id)?;
        let path = self.paths.worktree(plan_id);
        if path.exists() {
            debug!(path = %path.display(), "plan worktree already present");
            return Ok(path);
        }
        self.ensure_gitignore()?;
        fs::create_dir_all(&self.paths.worktrees_dir).map_err(|source| DirectoryError::Create {
            path: self.paths.worktrees_dir.clone(),
            source,
        })?;
        let branch = self.paths.branch(plan_id);
        self.git.worktree_add_branch(&path, &branch, "HEAD")?;
        info!(path = %path.display(), branch = %branch, "plan worktree created");
        Ok(path)
    }
}

/// Force-remove the worktree at `path`.
///
/// Falls back to deleting the directory and pruning registrations when git
/// refuses. Returns false if the directory was already absent; stale
/// registrations are pruned either way.
pub fn force_remove_worktree(git: &Git, path: &Path) -> Result<bool, CleanupError> {
    if !path.exists() {
        git.worktree_prune()?;
        return Ok(false);
    }
    if let Err(err) = git.worktree_remove_force(path) {
        warn!(path = %path.display(), err = %err, "git worktree remove failed, deleting directory");
        if path.exists() {
            fs::remove_dir_all(path).map_err(|source| CleanupError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
        }
        git.worktree_prune()?;
    }
    Ok(true)
}

fn temp_worktree_name(sha: &str, suffix: &str) -> String {
    let short = sha.get(..SHORT_SHA_LEN).unwrap_or(sha);
    format!("{short}-{suffix}")
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
