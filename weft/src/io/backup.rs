//! Plan backups stored as orphan commits under namespaced refs.
//!
//! A backup of plan `p` is a parentless commit whose tree holds exactly one
//! file, the plan at its canonical path (`tasks/p.md`). The commit is
//! addressed by `refs/plan-backups/p` while the plan is live and by
//! `refs/plan-abandoned/p` after it has been abandoned. Moving between the two
//! rewrites refs only; the commit id is preserved.
//!
//! Re-backing up a plan force-updates its ref. The previous commit becomes
//! unreachable and is reclaimed by [`BackupStore::prune_unreachable`] (or by
//! git's own gc).

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::core::namespace::Namespace;
use crate::core::plan::validate_plan_id;
use crate::error::BackupError;

use super::git::{Git, RefUpdate};
use super::paths::WeftPaths;

pub type BackupResult<T> = std::result::Result<T, BackupError>;

const REF_FORMAT: &str = "%(refname:lstrip=2)%09%(objectname)%09%(committerdate:unix)";

/// A freshly written backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub plan_id: String,
    pub namespace: Namespace,
    pub commit_id: String,
    pub created_at: DateTime<Utc>,
}

/// A backup as reported by [`BackupStore::list_backups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub plan_id: String,
    pub namespace: Namespace,
    pub commit_id: String,
    pub created_at: DateTime<Utc>,
    /// Whether the live plan file currently exists on disk.
    pub file_exists: bool,
}

/// Result of moving a backup between namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { commit_id: String },
    /// No record in the source namespace; nothing was changed.
    Missing,
}

/// Backup store rooted at one repository.
#[derive(Debug, Clone)]
pub struct BackupStore {
    git: Git,
    paths: WeftPaths,
}

impl BackupStore {
    pub fn new(git: Git, paths: WeftPaths) -> Self {
        Self { git, paths }
    }

    /// Snapshot the plan file into `refs/plan-backups/<plan_id>`.
    ///
    /// Replaces any existing active record and drops an abandoned record for
    /// the same id, in one ref transaction.
    #[instrument(skip(self))]
    pub fn create_backup(&self, plan_id: &str) -> BackupResult<BackupRecord> {
        check_plan_id(plan_id)?;
        let path = self.paths.plan_file(plan_id);
        let contents = fs::read(&path).map_err(|source| BackupError::ReadPlan {
            path: path.clone(),
            source,
        })?;

        let blob = self.git.hash_object(&contents)?;
        let tree = self.single_file_tree(&blob, &self.paths.plan_file_relative(plan_id))?;
        let commit = self
            .git
            .commit_tree_orphan(&tree, &format!("Backup of plan: {plan_id}"))?;

        let mut updates = vec![RefUpdate::Update {
            name: Namespace::Active.ref_name(plan_id),
            new: commit.clone(),
            old: None,
        }];
        if let Some(abandoned) = self.resolve(Namespace::Abandoned, plan_id)? {
            debug!(commit = %abandoned, "dropping abandoned record superseded by new backup");
            updates.push(RefUpdate::Delete {
                name: Namespace::Abandoned.ref_name(plan_id),
                old: Some(abandoned),
            });
        }
        self.git.update_refs(&updates)?;

        let created_at = self
            .entry(Namespace::Active, plan_id)?
            .map(|entry| entry.created_at)
            .unwrap_or_else(Utc::now);
        info!(commit = %commit, "backup created");
        Ok(BackupRecord {
            plan_id: plan_id.to_string(),
            namespace: Namespace::Active,
            commit_id: commit,
            created_at,
        })
    }

    /// All records in `namespace`, sorted by plan id.
    pub fn list_backups(&self, namespace: Namespace) -> BackupResult<Vec<BackupEntry>> {
        let lines = self
            .git
            .for_each_ref(namespace.ref_prefix().trim_end_matches('/'), REF_FORMAT)?;
        let mut entries: Vec<BackupEntry> = lines
            .iter()
            .filter_map(|line| self.parse_entry(namespace, line))
            .collect();
        entries.sort_by(|a, b| a.plan_id.cmp(&b.plan_id));
        debug!(namespace = %namespace, count = entries.len(), "listed backups");
        Ok(entries)
    }

    /// The record for one plan, if any.
    pub fn entry(&self, namespace: Namespace, plan_id: &str) -> BackupResult<Option<BackupEntry>> {
        check_plan_id(plan_id)?;
        let lines = self
            .git
            .for_each_ref(&namespace.ref_name(plan_id), REF_FORMAT)?;
        Ok(lines
            .iter()
            .filter_map(|line| self.parse_entry(namespace, line))
            .find(|entry| entry.plan_id == plan_id))
    }

    pub fn exists(&self, namespace: Namespace, plan_id: &str) -> BackupResult<bool> {
        check_plan_id(plan_id)?;
        Ok(self.git.ref_exists(&namespace.ref_name(plan_id))?)
    }

    /// Commit id a namespace ref points at.
    pub fn resolve(&self, namespace: Namespace, plan_id: &str) -> BackupResult<Option<String>> {
        check_plan_id(plan_id)?;
        Ok(self.git.resolve_commit(&namespace.ref_name(plan_id))?)
    }

    /// Restore the plan file from its active backup.
    pub fn recover_backup(&self, plan_id: &str, force: bool) -> BackupResult<PathBuf> {
        self.recover_from(Namespace::Active, plan_id, force)
    }

    /// Restore the plan file from the record in `namespace`.
    ///
    /// Writes the exact stored bytes. Refuses to overwrite an existing file
    /// unless `force` is set. Refs are left untouched.
    #[instrument(skip(self))]
    pub fn recover_from(
        &self,
        namespace: Namespace,
        plan_id: &str,
        force: bool,
    ) -> BackupResult<PathBuf> {
        let commit = self
            .resolve(namespace, plan_id)?
            .ok_or_else(|| BackupError::NotFound {
                plan_id: plan_id.to_string(),
                namespace,
            })?;

        let dest = self.paths.plan_file(plan_id);
        if dest.exists() && !force {
            return Err(BackupError::Exists { path: dest });
        }

        let contents = self.read_backup_contents(plan_id, &commit)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::WritePlan {
                path: dest.clone(),
                source,
            })?;
        }
        fs::write(&dest, contents).map_err(|source| BackupError::WritePlan {
            path: dest.clone(),
            source,
        })?;
        info!(commit = %commit, path = %dest.display(), "plan restored");
        Ok(dest)
    }

    /// Stored bytes of a plan's record without touching the working tree.
    pub fn read_backup(&self, namespace: Namespace, plan_id: &str) -> BackupResult<Vec<u8>> {
        let commit = self
            .resolve(namespace, plan_id)?
            .ok_or_else(|| BackupError::NotFound {
                plan_id: plan_id.to_string(),
                namespace,
            })?;
        self.read_backup_contents(plan_id, &commit)
    }

    /// Delete the active record. Returns false if there was none.
    #[instrument(skip(self))]
    pub fn cleanup_backup(&self, plan_id: &str) -> BackupResult<bool> {
        let name = Namespace::Active.ref_name(plan_id);
        if !self.exists(Namespace::Active, plan_id)? {
            debug!("no backup ref, nothing to delete");
            return Ok(false);
        }
        self.git.delete_ref(&name)?;
        Ok(true)
    }

    /// Move the active record to `refs/plan-abandoned/`.
    pub fn move_backup_to_abandoned(&self, plan_id: &str) -> BackupResult<MoveOutcome> {
        self.move_between(plan_id, Namespace::Active, Namespace::Abandoned)
    }

    /// Move the abandoned record back to `refs/plan-backups/`.
    pub fn move_backup_to_active(&self, plan_id: &str) -> BackupResult<MoveOutcome> {
        self.move_between(plan_id, Namespace::Abandoned, Namespace::Active)
    }

    /// Reclaim superseded backup commits (and any other unreachable loose
    /// objects) older than `expire`, e.g. `2.weeks.ago` or `now`.
    pub fn prune_unreachable(&self, expire: &str) -> BackupResult<()> {
        self.git.prune_objects(expire)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn move_between(&self, plan_id: &str, from: Namespace, to: Namespace) -> BackupResult<MoveOutcome> {
        let Some(commit) = self.resolve(from, plan_id)? else {
            debug!("no source ref, nothing to move");
            return Ok(MoveOutcome::Missing);
        };
        self.git.update_refs(&[
            RefUpdate::Update {
                name: to.ref_name(plan_id),
                new: commit.clone(),
                old: None,
            },
            RefUpdate::Delete {
                name: from.ref_name(plan_id),
                old: Some(commit.clone()),
            },
        ])?;
        info!(commit = %commit, "backup moved");
        Ok(MoveOutcome::Moved { commit_id: commit })
    }

    /// Build nested trees so the root tree holds `blob` at `rel_path` only.
    fn single_file_tree(&self, blob: &str, rel_path: &str) -> BackupResult<String> {
        let mut components: Vec<&str> = rel_path.split('/').filter(|c| !c.is_empty()).collect();
        let file_name = components.pop().unwrap_or(rel_path);
        let mut tree = self
            .git
            .mktree(&[format!("100644 blob {blob}\t{file_name}")])?;
        for dir in components.iter().rev() {
            tree = self.git.mktree(&[format!("040000 tree {tree}\t{dir}")])?;
        }
        Ok(tree)
    }

    fn read_backup_contents(&self, plan_id: &str, commit: &str) -> BackupResult<Vec<u8>> {
        let rel = self.paths.plan_file_relative(plan_id);
        let files = self.git.ls_tree_files(commit)?;
        // Records written under a different `tasks_dir` still hold a single file.
        let file = files
            .iter()
            .find(|file| file.path == rel)
            .or_else(|| files.first())
            .ok_or_else(|| BackupError::EmptyBackup {
                plan_id: plan_id.to_string(),
                commit_id: commit.to_string(),
            })?;
        Ok(self.git.cat_blob(&file.blob)?)
    }

    fn parse_entry(&self, namespace: Namespace, line: &str) -> Option<BackupEntry> {
        let mut parts = line.split('\t');
        let plan_id = parts.next()?.to_string();
        let commit_id = parts.next()?.to_string();
        let secs: i64 = parts.next()?.trim().parse().ok()?;
        let created_at = DateTime::<Utc>::from_timestamp(secs, 0)?;
        let file_exists = self.paths.plan_file(&plan_id).exists();
        Some(BackupEntry {
            plan_id,
            namespace,
            commit_id,
            created_at,
            file_exists,
        })
    }
}

fn check_plan_id(plan_id: &str) -> BackupResult<()> {
    validate_plan_id(plan_id).map_err(|reason| BackupError::InvalidPlanId {
        plan_id: plan_id.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use crate::io::config::WeftConfig;
    use crate::io::repo::PlanRepo;

    #[test]
    fn backup_commit_is_an_orphan_holding_only_the_plan() {
        let repo = TestRepo::new().expect("repo");
        repo.write_plan("fix-bug", "# Fix Bug\n").expect("plan");
        let store = repo.plan_repo().backups();

        let record = store.create_backup("fix-bug").expect("backup");
        assert_eq!(record.namespace, Namespace::Active);

        let parents = repo
            .git(&["rev-list", "--parents", "-n", "1", &record.commit_id])
            .expect("rev-list");
        assert_eq!(parents.trim(), record.commit_id, "commit must have no parents");

        let files = repo
            .git(&["ls-tree", "-r", "--name-only", &record.commit_id])
            .expect("ls-tree");
        assert_eq!(files.trim(), "tasks/fix-bug.md");

        let message = repo
            .git(&["log", "-1", "--format=%s", &record.commit_id])
            .expect("log");
        assert_eq!(message.trim(), "Backup of plan: fix-bug");
    }

    #[test]
    fn dotted_tasks_dir_stores_canonical_tree_path() {
        let repo = TestRepo::new().expect("repo");
        let cfg = WeftConfig {
            tasks_dir: "./tasks".to_string(),
            ..WeftConfig::default()
        };
        let store = PlanRepo::with_config(repo.root(), cfg).backups();
        repo.write_plan("fix-bug", "# Fix Bug\n").expect("plan");

        let record = store.create_backup("fix-bug").expect("backup");
        let files = repo
            .git(&["ls-tree", "-r", "--name-only", &record.commit_id])
            .expect("ls-tree");
        assert_eq!(files.trim(), "tasks/fix-bug.md");
    }

    #[test]
    fn missing_plan_file_is_a_read_error() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let err = store.create_backup("no-such-plan").expect_err("should fail");
        assert!(matches!(err, BackupError::ReadPlan { .. }), "{err:?}");
        assert!(!store.exists(Namespace::Active, "no-such-plan").expect("exists"));
    }

    #[test]
    fn second_backup_replaces_the_first() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();

        repo.write_plan("fix-bug", "first\n").expect("plan");
        store.create_backup("fix-bug").expect("backup 1");
        repo.write_plan("fix-bug", "second\n").expect("plan");
        let second = store.create_backup("fix-bug").expect("backup 2");

        let entries = store.list_backups(Namespace::Active).expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].commit_id, second.commit_id);
        assert_eq!(
            store.read_backup(Namespace::Active, "fix-bug").expect("read"),
            b"second\n"
        );
    }

    #[test]
    fn list_reports_file_presence_and_sorts_by_id() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        for id in ["zeta", "alpha", "mid"] {
            repo.write_plan(id, &format!("# {id}\n")).expect("plan");
            store.create_backup(id).expect("backup");
        }
        std::fs::remove_file(repo.plan_repo().paths.plan_file("mid")).expect("remove");

        let entries = store.list_backups(Namespace::Active).expect("list");
        let ids: Vec<&str> = entries.iter().map(|e| e.plan_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
        let presence: Vec<bool> = entries.iter().map(|e| e.file_exists).collect();
        assert_eq!(presence, vec![true, false, true]);
        assert!(store.list_backups(Namespace::Abandoned).expect("list").is_empty());
    }

    #[test]
    fn recover_restores_exact_bytes() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let content = "---\nplan_id: fix-bug\nstatus: coding\n---\n\n# Fix Bug\r\n\ttabs and unicode: é\n";
        let path = repo.write_plan("fix-bug", content).expect("plan");
        store.create_backup("fix-bug").expect("backup");
        std::fs::remove_file(&path).expect("remove");

        let restored = store.recover_backup("fix-bug", false).expect("recover");
        assert_eq!(restored, path);
        assert_eq!(std::fs::read_to_string(&restored).expect("read"), content);
    }

    #[test]
    fn recover_refuses_to_overwrite_without_force() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let path = repo.write_plan("fix-bug", "original\n").expect("plan");
        store.create_backup("fix-bug").expect("backup");
        std::fs::write(&path, "edited\n").expect("edit");

        let err = store.recover_backup("fix-bug", false).expect_err("exists");
        assert!(matches!(err, BackupError::Exists { .. }), "{err:?}");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "edited\n");

        store.recover_backup("fix-bug", true).expect("forced recover");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "original\n");
    }

    #[test]
    fn recover_without_backup_is_not_found() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let err = store.recover_backup("fix-bug", false).expect_err("missing");
        assert!(
            matches!(err, BackupError::NotFound { namespace: Namespace::Active, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn cleanup_is_idempotent() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        repo.write_plan("fix-bug", "x\n").expect("plan");
        store.create_backup("fix-bug").expect("backup");

        assert!(store.cleanup_backup("fix-bug").expect("first"));
        assert!(!store.cleanup_backup("fix-bug").expect("second"));
        assert!(!store.exists(Namespace::Active, "fix-bug").expect("exists"));
    }

    #[test]
    fn move_round_trip_preserves_commit_and_exclusivity() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        repo.write_plan("fix-bug", "x\n").expect("plan");
        let record = store.create_backup("fix-bug").expect("backup");

        let moved = store.move_backup_to_abandoned("fix-bug").expect("abandon");
        assert_eq!(
            moved,
            MoveOutcome::Moved {
                commit_id: record.commit_id.clone()
            }
        );
        assert!(!store.exists(Namespace::Active, "fix-bug").expect("active"));
        assert_eq!(
            store.resolve(Namespace::Abandoned, "fix-bug").expect("resolve"),
            Some(record.commit_id.clone())
        );

        store.move_backup_to_active("fix-bug").expect("restore");
        assert!(!store.exists(Namespace::Abandoned, "fix-bug").expect("abandoned"));
        assert_eq!(
            store.resolve(Namespace::Active, "fix-bug").expect("resolve"),
            Some(record.commit_id)
        );
    }

    #[test]
    fn moving_a_missing_backup_is_a_no_op() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        assert_eq!(
            store.move_backup_to_abandoned("fix-bug").expect("move"),
            MoveOutcome::Missing
        );
        assert_eq!(
            store.move_backup_to_active("fix-bug").expect("move"),
            MoveOutcome::Missing
        );
    }

    #[test]
    fn new_backup_clears_abandoned_record() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        repo.write_plan("fix-bug", "old\n").expect("plan");
        store.create_backup("fix-bug").expect("backup");
        store.move_backup_to_abandoned("fix-bug").expect("abandon");

        repo.write_plan("fix-bug", "new\n").expect("plan");
        store.create_backup("fix-bug").expect("backup again");

        assert!(store.exists(Namespace::Active, "fix-bug").expect("active"));
        assert!(!store.exists(Namespace::Abandoned, "fix-bug").expect("abandoned"));
    }

    #[test]
    fn prune_reclaims_superseded_commits() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let git = Git::new(repo.root());

        repo.write_plan("fix-bug", "first\n").expect("plan");
        let first = store.create_backup("fix-bug").expect("backup 1");
        repo.write_plan("fix-bug", "second\n").expect("plan");
        let second = store.create_backup("fix-bug").expect("backup 2");

        store.prune_unreachable("now").expect("prune");
        assert!(!git.object_exists(&first.commit_id).expect("first"));
        assert!(git.object_exists(&second.commit_id).expect("second"));
        assert_eq!(
            store.read_backup(Namespace::Active, "fix-bug").expect("read"),
            b"second\n"
        );
    }

    #[test]
    fn invalid_plan_ids_never_reach_git() {
        let repo = TestRepo::new().expect("repo");
        let store = repo.plan_repo().backups();
        let err = store.exists(Namespace::Active, "a..b").expect_err("invalid");
        assert!(matches!(err, BackupError::InvalidPlanId { .. }), "{err:?}");
    }
}
