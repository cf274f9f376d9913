//! Canonical repository paths for plans, worktrees and ephemeral directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::config::{WeftConfig, relative_components};

/// Entries `.weft/.gitignore` must contain so ephemeral state stays untracked.
const IGNORED_DIRS: [&str; 4] = ["runs/", "sessions/", "temp-worktrees/", "worktrees/"];

/// All canonical paths for a repository root.
#[derive(Debug, Clone)]
pub struct WeftPaths {
    pub root: PathBuf,
    pub weft_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub worktrees_dir: PathBuf,
    pub temp_worktrees_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub audit_log_path: PathBuf,
    tasks_rel: String,
    branch_prefix: String,
}

impl WeftPaths {
    pub fn new(root: impl Into<PathBuf>, config: &WeftConfig) -> Self {
        let root = root.into();
        let weft_dir = root.join(".weft");
        let tasks_rel = relative_components(&config.tasks_dir).join("/");
        Self {
            config_path: config_path(&root),
            gitignore_path: weft_dir.join(".gitignore"),
            worktrees_dir: weft_dir.join("worktrees"),
            temp_worktrees_dir: weft_dir.join("temp-worktrees"),
            runs_dir: weft_dir.join("runs"),
            sessions_dir: weft_dir.join("sessions"),
            tasks_dir: root.join(&tasks_rel),
            audit_log_path: root.join(&config.audit_log),
            weft_dir,
            root,
            tasks_rel,
            branch_prefix: config.branch_prefix.clone(),
        }
    }

    /// Absolute path of the plan's tracked file.
    pub fn plan_file(&self, plan_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{plan_id}.md"))
    }

    /// Repository-relative plan file path with `/` separators, as stored in backup trees.
    pub fn plan_file_relative(&self, plan_id: &str) -> String {
        format!("{}/{plan_id}.md", self.tasks_rel)
    }

    /// Long-lived plan worktree.
    pub fn worktree(&self, plan_id: &str) -> PathBuf {
        self.worktrees_dir.join(plan_id)
    }

    /// Branch the plan worktree is attached to.
    pub fn branch(&self, plan_id: &str) -> String {
        format!("{}{plan_id}", self.branch_prefix)
    }
}

/// Location of the config file for a repository root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(".weft").join("config.toml")
}

/// Make sure `.weft/.gitignore` lists every ephemeral directory.
///
/// Existing lines are kept; output is sorted for stable diffs.
pub fn ensure_weft_gitignore(path: &Path) -> io::Result<()> {
    let mut existing = String::new();
    if path.exists() {
        existing = fs::read_to_string(path)?;
    }

    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    for req in IGNORED_DIRS {
        if !lines.iter().any(|l| l == req) {
            lines.push(req.to_string());
        }
    }

    lines.sort();
    lines.dedup();

    let mut out = lines.join("\n");
    out.push('\n');

    if out != existing {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
    }

    Ok(())
}
