//! Test-only helpers: scratch repositories and scripted confirmation.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::io::confirm::Confirm;
use crate::io::repo::PlanRepo;

/// A throwaway git repository with one commit, deleted on drop.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.name", "Weft Test"])?;
        repo.git(&["config", "user.email", "weft-test@local.invalid"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.root().join("README.md"), "# scratch\n").context("write README")?;
        repo.commit_all("chore: initial commit")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repository root and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(self.root(), args)
    }

    pub fn plan_repo(&self) -> PlanRepo {
        PlanRepo::with_config(self.root(), Default::default())
    }

    /// Write `tasks/<plan_id>.md` (untracked) and return its path.
    pub fn write_plan(&self, plan_id: &str, contents: &str) -> Result<PathBuf> {
        let path = self.plan_repo().paths.plan_file(plan_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Create the plan worktree on `weft/<plan_id>`, branching from HEAD.
    pub fn add_plan_worktree(&self, plan_id: &str) -> Result<PathBuf> {
        Ok(self.plan_repo().ephemeral().create_plan_worktree(plan_id)?)
    }

    /// Write `file` inside `worktree` and commit it there.
    pub fn commit_in(&self, worktree: &Path, file: &str, contents: &str, message: &str) -> Result<()> {
        fs::write(worktree.join(file), contents).with_context(|| format!("write {file}"))?;
        git_in(worktree, &["add", "-A"])?;
        git_in(worktree, &["commit", "-q", "-m", message])?;
        Ok(())
    }
}

fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Set the mtime of `path` to `days` days ago.
pub fn backdate(path: &Path, days: u64) -> std::io::Result<()> {
    let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    fs::File::open(path)?.set_modified(when)
}

/// Answers confirmations from a queue and records every prompt.
///
/// An exhausted queue answers no.
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<bool>>,
    prompts: RefCell<Vec<(String, Vec<String>)>>,
}

impl ScriptedConfirm {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Question and detail lines of every prompt shown so far.
    pub fn prompts(&self) -> Vec<(String, Vec<String>)> {
        self.prompts.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str, details: &[String]) -> Result<bool> {
        self.prompts
            .borrow_mut()
            .push((question.to_string(), details.to_vec()));
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}
