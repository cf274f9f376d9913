//! Per-process repository context.
//!
//! Built once by the CLI and passed by reference to every command, so no
//! component reaches for global state.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::backup::BackupStore;
use super::config::{WeftConfig, load_config};
use super::ephemeral::EphemeralDirs;
use super::git::Git;
use super::paths::{WeftPaths, config_path};

/// Git handle, resolved paths and config for one repository.
#[derive(Debug, Clone)]
pub struct PlanRepo {
    pub git: Git,
    pub paths: WeftPaths,
    pub config: WeftConfig,
}

impl PlanRepo {
    /// Open the repository containing `dir`, resolving to the main checkout.
    pub fn discover(dir: &Path) -> Result<Self> {
        let root = Git::new(dir)
            .main_worktree_root()
            .with_context(|| format!("{} is not inside a git repository", dir.display()))?;
        Self::open(&root)
    }

    /// Open a repository whose main checkout is `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let config = load_config(&config_path(root))?;
        Ok(Self::with_config(root, config))
    }

    pub fn with_config(root: &Path, config: WeftConfig) -> Self {
        debug!(root = %root.display(), "opening plan repository");
        Self {
            git: Git::new(root),
            paths: WeftPaths::new(root, &config),
            config,
        }
    }

    pub fn backups(&self) -> BackupStore {
        BackupStore::new(self.git.clone(), self.paths.clone())
    }

    pub fn ephemeral(&self) -> EphemeralDirs {
        EphemeralDirs::new(self.git.clone(), self.paths.clone(), &self.config.retention)
    }
}
