//! Git adapter for weft commands.
//!
//! Backups, branches and worktrees are all plain git objects and refs, so we
//! keep a small, explicit wrapper around `git` subprocess calls. Plumbing
//! commands that take input are fed through stdin; failures carry the
//! captured stderr.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

use tracing::{debug, instrument, warn};

use crate::error::GitError;

/// Identity recorded on backup commits, independent of the user's git config.
const BACKUP_AUTHOR_NAME: &str = "weft";
const BACKUP_AUTHOR_EMAIL: &str = "weft@localhost";

pub type GitResult<T> = std::result::Result<T, GitError>;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// One entry of a recursive `git ls-tree`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub blob: String,
    pub path: String,
}

/// A single instruction for `git update-ref --stdin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdate {
    /// Point `name` at `new`, optionally verifying its current value.
    Update {
        name: String,
        new: String,
        old: Option<String>,
    },
    /// Delete `name`, optionally verifying its current value.
    Delete { name: String, old: Option<String> },
}

impl RefUpdate {
    fn render(&self) -> String {
        match self {
            RefUpdate::Update { name, new, old } => match old {
                Some(old) => format!("update {name} {new} {old}\n"),
                None => format!("update {name} {new}\n"),
            },
            RefUpdate::Delete { name, old } => match old {
                Some(old) => format!("delete {name} {old}\n"),
                None => format!("delete {name}\n"),
            },
        }
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Root of the main checkout, even when called from inside a linked worktree.
    ///
    /// Handles separate git dirs and submodules: the main checkout reports its own
    /// toplevel, and linked worktrees follow the common dir's `core.worktree`.
    pub fn main_worktree_root(&self) -> GitResult<PathBuf> {
        let out = self.run_capture(&[
            "rev-parse",
            "--absolute-git-dir",
            "--path-format=absolute",
            "--git-common-dir",
        ])?;
        let mut lines = out.lines().map(str::trim);
        let (Some(git_dir), Some(common_dir)) = (lines.next(), lines.next()) else {
            return Err(GitError::Failed {
                args: "rev-parse --absolute-git-dir --git-common-dir".to_string(),
                stderr: format!("unexpected output '{}'", out.trim()),
            });
        };
        let root = if Path::new(git_dir) == Path::new(common_dir) {
            PathBuf::from(self.run_capture(&["rev-parse", "--show-toplevel"])?.trim())
        } else {
            self.linked_main_root(Path::new(common_dir))?
        };
        debug!(root = %root.display(), "resolved main worktree root");
        Ok(root)
    }

    fn linked_main_root(&self, common_dir: &Path) -> GitResult<PathBuf> {
        let config = common_dir.join("config");
        let config_arg = config.to_string_lossy();
        let out = self.run(&["config", "--file", &config_arg, "--get", "core.worktree"])?;
        let configured = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if out.status.success() && !configured.is_empty() {
            let root = common_dir.join(configured);
            return Ok(root.canonicalize().unwrap_or(root));
        }
        if common_dir.file_name() == Some(OsStr::new(".git"))
            && let Some(parent) = common_dir.parent()
        {
            return Ok(parent.to_path_buf());
        }
        Err(GitError::Failed {
            args: "rev-parse --git-common-dir".to_string(),
            stderr: format!(
                "cannot locate the main checkout for git dir {}; run weft from the main checkout",
                common_dir.display()
            ),
        })
    }

    /// Resolve a revision to a full commit id, or `None` if it does not exist.
    pub fn resolve_commit(&self, rev: &str) -> GitResult<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.run(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    /// Check whether a fully-qualified ref exists.
    pub fn ref_exists(&self, name: &str) -> GitResult<bool> {
        let status = self.run(&["show-ref", "--verify", "--quiet", name])?.status;
        Ok(status.success())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> GitResult<bool> {
        self.ref_exists(&format!("refs/heads/{branch}"))
    }

    /// Number of commits reachable from `tip` but not from `base`.
    pub fn count_commits_between(&self, base: &str, tip: &str) -> GitResult<u32> {
        let range = format!("{base}..{tip}");
        let out = self.run_capture(&["rev-list", "--count", &range])?;
        out.trim().parse::<u32>().map_err(|err| GitError::Failed {
            args: format!("rev-list --count {range}"),
            stderr: format!("unexpected count '{}': {err}", out.trim()),
        })
    }

    /// Delete a local branch regardless of merge state.
    #[instrument(skip_all, fields(branch))]
    pub fn delete_branch_force(&self, branch: &str) -> GitResult<()> {
        debug!(branch, "force-deleting branch");
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> GitResult<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True if the working tree has staged, unstaged or untracked changes.
    pub fn has_changes(&self) -> GitResult<bool> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    /// Write `contents` to the object database as a blob.
    pub fn hash_object(&self, contents: &[u8]) -> GitResult<String> {
        let out =
            self.run_with_stdin(&["hash-object", "-w", "--no-filters", "--stdin"], contents)?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Build a tree object from `ls-tree` formatted entries.
    pub fn mktree(&self, entries: &[String]) -> GitResult<String> {
        let mut input = entries.join("\n");
        input.push('\n');
        let out = self.run_with_stdin(&["mktree"], input.as_bytes())?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Create a parentless commit for `tree` with a fixed identity.
    #[instrument(skip_all, fields(tree))]
    pub fn commit_tree_orphan(&self, tree: &str, message: &str) -> GitResult<String> {
        let args = ["commit-tree", tree, "-m", message];
        let mut cmd = self.command(&args);
        cmd.env("GIT_AUTHOR_NAME", BACKUP_AUTHOR_NAME)
            .env("GIT_AUTHOR_EMAIL", BACKUP_AUTHOR_EMAIL)
            .env("GIT_COMMITTER_NAME", BACKUP_AUTHOR_NAME)
            .env("GIT_COMMITTER_EMAIL", BACKUP_AUTHOR_EMAIL);
        let out = check(&args, spawn_output(&args, cmd)?)?;
        let commit = String::from_utf8_lossy(&out.stdout).trim().to_string();
        debug!(commit = %commit, "created orphan commit");
        Ok(commit)
    }

    /// Apply ref updates as a single all-or-nothing transaction.
    #[instrument(skip_all, fields(count = updates.len()))]
    pub fn update_refs(&self, updates: &[RefUpdate]) -> GitResult<()> {
        let mut input = String::from("start\n");
        for update in updates {
            input.push_str(&update.render());
        }
        input.push_str("commit\n");
        debug!(transaction = %input.trim_end(), "updating refs");
        self.run_with_stdin(&["update-ref", "--stdin"], input.as_bytes())?;
        Ok(())
    }

    /// Delete a ref unconditionally.
    pub fn delete_ref(&self, name: &str) -> GitResult<()> {
        self.run_checked(&["update-ref", "-d", name])?;
        Ok(())
    }

    /// List refs under `prefix` using a `for-each-ref` format string.
    pub fn for_each_ref(&self, prefix: &str, format: &str) -> GitResult<Vec<String>> {
        let format_arg = format!("--format={format}");
        let out = self.run_capture(&["for-each-ref", &format_arg, prefix])?;
        Ok(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// All blobs in the tree of `rev`, recursively.
    pub fn ls_tree_files(&self, rev: &str) -> GitResult<Vec<TreeFile>> {
        let out = self.run_checked(&["ls-tree", "-r", "-z", rev])?;
        let raw = String::from_utf8_lossy(&out.stdout);
        let mut files = Vec::new();
        for record in raw.split('\0') {
            if record.is_empty() {
                continue;
            }
            let Some((meta, path)) = record.split_once('\t') else {
                continue;
            };
            let mut parts = meta.split_whitespace();
            let (Some(_mode), Some(kind), Some(sha)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if kind == "blob" {
                files.push(TreeFile {
                    blob: sha.to_string(),
                    path: path.to_string(),
                });
            }
        }
        Ok(files)
    }

    /// Raw bytes of a blob.
    pub fn cat_blob(&self, sha: &str) -> GitResult<Vec<u8>> {
        Ok(self.run_checked(&["cat-file", "blob", sha])?.stdout)
    }

    /// True if the object is present in the object database.
    pub fn object_exists(&self, sha: &str) -> GitResult<bool> {
        Ok(self.run(&["cat-file", "-e", sha])?.status.success())
    }

    /// Remove unreachable loose objects older than `expire`.
    #[instrument(skip_all, fields(expire))]
    pub fn prune_objects(&self, expire: &str) -> GitResult<()> {
        let arg = format!("--expire={expire}");
        self.run_checked(&["prune", &arg])?;
        Ok(())
    }

    /// Attach a worktree at `path` on `branch`, creating the branch at `start` if needed.
    #[instrument(skip_all, fields(path = %path.display(), branch))]
    pub fn worktree_add_branch(&self, path: &Path, branch: &str, start: &str) -> GitResult<()> {
        let path_arg = path.to_string_lossy();
        if self.branch_exists(branch)? {
            self.run_checked(&["worktree", "add", &path_arg, branch])?;
        } else {
            self.run_checked(&["worktree", "add", "-b", branch, &path_arg, start])?;
        }
        Ok(())
    }

    /// Create a detached-HEAD worktree at `path` checked out at `rev`.
    #[instrument(skip_all, fields(path = %path.display(), rev))]
    pub fn worktree_add_detached(&self, path: &Path, rev: &str) -> GitResult<()> {
        let path_arg = path.to_string_lossy();
        self.run_checked(&["worktree", "add", "--detach", &path_arg, rev])?;
        Ok(())
    }

    /// Remove a worktree even if it is dirty or locked.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn worktree_remove_force(&self, path: &Path) -> GitResult<()> {
        let path_arg = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", "--force", &path_arg])?;
        Ok(())
    }

    /// Drop registrations of worktrees whose directories are gone.
    pub fn worktree_prune(&self) -> GitResult<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> GitResult<Output> {
        check(args, self.run(args)?)
    }

    fn run(&self, args: &[&str]) -> GitResult<Output> {
        spawn_output(args, self.command(args))
    }

    fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> GitResult<Output> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| GitError::Spawn {
            args: args.join(" "),
            source,
        })?;
        let mut stdin = child.stdin.take().ok_or_else(|| GitError::Failed {
            args: args.join(" "),
            stderr: "stdin was not piped".to_string(),
        })?;

        // Feed stdin from a separate thread so a chatty child cannot deadlock on a full pipe.
        let output = thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(input));
            let output = child.wait_with_output();
            if let Ok(Err(err)) = writer.join() {
                warn!(err = %err, "writing git stdin failed");
            }
            output
        })
        .map_err(|source| GitError::Spawn {
            args: args.join(" "),
            source,
        })?;
        check(args, output)
    }

    fn command<S: AsRef<OsStr>>(&self, args: &[S]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        cmd
    }
}

fn spawn_output(args: &[&str], mut cmd: Command) -> GitResult<Output> {
    cmd.output().map_err(|source| GitError::Spawn {
        args: args.join(" "),
        source,
    })
}

fn check(args: &[&str], output: Output) -> GitResult<Output> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::Failed {
            args: args.join(" "),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(output)
}

fn parse_status_line(line: &str) -> GitResult<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(GitError::Failed {
            args: "status --porcelain=v1".to_string(),
            stderr: format!("unexpected porcelain line: '{line}'"),
        });
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn renders_ref_transaction_lines() {
        let update = RefUpdate::Update {
            name: "refs/plan-abandoned/x".to_string(),
            new: "abc".to_string(),
            old: None,
        };
        let delete = RefUpdate::Delete {
            name: "refs/plan-backups/x".to_string(),
            old: Some("abc".to_string()),
        };
        assert_eq!(update.render(), "update refs/plan-abandoned/x abc\n");
        assert_eq!(delete.render(), "delete refs/plan-backups/x abc\n");
    }

    #[test]
    fn blob_round_trips_through_object_database() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let contents = b"line one\nline two\n\0binary tail";
        let sha = git.hash_object(contents).expect("hash");
        assert!(git.object_exists(&sha).expect("exists"));
        assert_eq!(git.cat_blob(&sha).expect("cat"), contents);
    }

    #[test]
    fn failed_command_carries_stderr() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let err = git
            .delete_branch_force("does-not-exist")
            .expect_err("delete should fail");
        match err {
            GitError::Failed { args, stderr } => {
                assert_eq!(args, "branch -D does-not-exist");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn main_worktree_root_with_separate_git_dir_is_the_checkout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work = temp.path().join("work");
        let git_dir = temp.path().join("gitdir");
        Git::new(temp.path())
            .run_checked(&[
                "init",
                "-q",
                "--separate-git-dir",
                &git_dir.to_string_lossy(),
                &work.to_string_lossy(),
            ])
            .expect("init");

        let root = Git::new(&work).main_worktree_root().expect("root");
        assert_eq!(
            root.canonicalize().expect("canonical root"),
            work.canonicalize().expect("canonical work")
        );
    }

    #[test]
    fn main_worktree_root_from_subdirectory() {
        let repo = TestRepo::new().expect("repo");
        let nested = repo.root().join("docs").join("deep");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let root = Git::new(&nested).main_worktree_root().expect("root");
        assert_eq!(
            root.canonicalize().expect("canonical root"),
            repo.root().canonicalize().expect("canonical repo")
        );
    }

    #[test]
    fn main_worktree_root_resolves_from_linked_worktree() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let linked = repo.root().join(".weft").join("temp-worktrees").join("linked");
        git.worktree_add_detached(&linked, "HEAD").expect("add worktree");

        let root = Git::new(&linked).main_worktree_root().expect("root");
        assert_eq!(
            root.canonicalize().expect("canonical root"),
            repo.root().canonicalize().expect("canonical repo")
        );
    }
}
