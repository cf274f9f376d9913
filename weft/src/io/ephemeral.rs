//! Run and session directories under `.weft/`, and their age-based pruning.
//!
//! Layout: `.weft/{runs,sessions}/<plan_id>/<timestamp>[/<session_type>]`.
//! Only timestamp directories are ever pruned; the plan-level directory goes
//! away once it is empty.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::plan::validate_plan_id;
use crate::error::DirectoryError;

use super::config::RetentionConfig;
use super::git::Git;
use super::paths::{WeftPaths, ensure_weft_gitignore};

pub type DirResult<T> = std::result::Result<T, DirectoryError>;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_FORMAT_FINE: &str = "%Y%m%d-%H%M%S-%6f";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    /// Directories that could not be deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Results of the run and session passes; one failing never skips the other.
#[derive(Debug)]
pub struct PrunePasses {
    pub runs: DirResult<PruneReport>,
    pub sessions: DirResult<PruneReport>,
}

/// Manager for ephemeral directories and worktrees of one repository.
#[derive(Debug, Clone)]
pub struct EphemeralDirs {
    pub(super) git: Git,
    pub(super) paths: WeftPaths,
    runs_retention: Duration,
    sessions_retention: Duration,
}

impl EphemeralDirs {
    pub fn new(git: Git, paths: WeftPaths, retention: &RetentionConfig) -> Self {
        Self {
            git,
            paths,
            runs_retention: days(retention.runs_days),
            sessions_retention: days(retention.sessions_days),
        }
    }

    /// Create `.weft/runs/<plan_id>/<timestamp>`.
    #[instrument(skip(self))]
    pub fn create_run_directory(&self, plan_id: &str) -> DirResult<PathBuf> {
        check_plan_id(plan_id)?;
        self.ensure_gitignore()?;
        let dir = create_timestamped(&self.paths.runs_dir.join(plan_id), Utc::now())?;
        info!(path = %dir.display(), "run directory created");
        Ok(dir)
    }

    /// Create `.weft/sessions/<plan_id>/<timestamp>/<session_type>`.
    #[instrument(skip(self))]
    pub fn create_session_directory(&self, plan_id: &str, session_type: &str) -> DirResult<PathBuf> {
        check_plan_id(plan_id)?;
        if session_type.is_empty()
            || session_type.contains(['/', '\\'])
            || session_type == "."
            || session_type == ".."
        {
            return Err(DirectoryError::Create {
                path: self.paths.sessions_dir.join(plan_id).join(session_type),
                source: std::io::Error::new(
                    ErrorKind::InvalidInput,
                    "session type must be a single path component",
                ),
            });
        }
        self.ensure_gitignore()?;
        let stamp = create_timestamped(&self.paths.sessions_dir.join(plan_id), Utc::now())?;
        let dir = stamp.join(session_type);
        fs::create_dir(&dir).map_err(|source| DirectoryError::Create {
            path: dir.clone(),
            source,
        })?;
        info!(path = %dir.display(), "session directory created");
        Ok(dir)
    }

    /// Prune runs, then sessions, regardless of how the first pass went.
    pub fn prune_all(&self, active: Option<&Path>) -> PrunePasses {
        PrunePasses {
            runs: self.prune_old_runs(active),
            sessions: self.prune_old_sessions(active),
        }
    }

    /// Remove run directories older than the run retention, sparing `active`.
    pub fn prune_old_runs(&self, active: Option<&Path>) -> DirResult<PruneReport> {
        prune_timestamped_dirs(&self.paths.runs_dir, self.runs_retention, active, SystemTime::now())
    }

    /// Remove session directories older than the session retention, sparing `active`.
    pub fn prune_old_sessions(&self, active: Option<&Path>) -> DirResult<PruneReport> {
        prune_timestamped_dirs(
            &self.paths.sessions_dir,
            self.sessions_retention,
            active,
            SystemTime::now(),
        )
    }

    pub(super) fn ensure_gitignore(&self) -> DirResult<()> {
        let path = &self.paths.gitignore_path;
        ensure_weft_gitignore(path).map_err(|source| DirectoryError::Create {
            path: path.clone(),
            source,
        })
    }
}

/// Create `<parent>/<timestamp>`, retrying once with a microsecond suffix.
pub fn create_timestamped(parent: &Path, now: DateTime<Utc>) -> DirResult<PathBuf> {
    fs::create_dir_all(parent).map_err(|source| DirectoryError::Create {
        path: parent.to_path_buf(),
        source,
    })?;

    let dir = parent.join(now.format(TIMESTAMP_FORMAT).to_string());
    match fs::create_dir(&dir) {
        Ok(()) => return Ok(dir),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %dir.display(), "timestamp taken, retrying with microseconds");
        }
        Err(source) => return Err(DirectoryError::Create { path: dir, source }),
    }

    let dir = parent.join(now.format(TIMESTAMP_FORMAT_FINE).to_string());
    fs::create_dir(&dir).map_err(|source| DirectoryError::Create {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Delete `<root>/<plan>/<timestamp>` directories last modified before
/// `now - retention`.
///
/// A directory equal to `active`, or containing it, is always kept.
/// Individual failures are logged and collected; only a pass where every
/// attempted deletion failed is an error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn prune_timestamped_dirs(
    root: &Path,
    retention: Duration,
    active: Option<&Path>,
    now: SystemTime,
) -> DirResult<PruneReport> {
    prune_with(root, retention, active, now, |dir: &Path| fs::remove_dir_all(dir))
}

fn prune_with(
    root: &Path,
    retention: Duration,
    active: Option<&Path>,
    now: SystemTime,
    remove: impl Fn(&Path) -> io::Result<()>,
) -> DirResult<PruneReport> {
    let mut report = PruneReport::default();
    if !root.exists() {
        debug!("nothing to prune");
        return Ok(report);
    }
    let active = active.map(normalize);

    for plan_dir in subdirectories(root)? {
        let stamps = match subdirectories(&plan_dir) {
            Ok(stamps) => stamps,
            Err(err) => {
                warn!(path = %plan_dir.display(), err = %err, "skipping unreadable plan directory");
                continue;
            }
        };
        for dir in stamps {
            if let Some(active) = &active
                && active.starts_with(normalize(&dir))
            {
                debug!(path = %dir.display(), "keeping active directory");
                continue;
            }
            if !is_stale(&dir, retention, now) {
                continue;
            }
            match remove(&dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "pruned");
                    report.removed.push(dir);
                }
                Err(err) => {
                    warn!(path = %dir.display(), err = %err, "failed to prune directory");
                    report.failed.push((dir, err.to_string()));
                }
            }
        }
        remove_if_empty(&plan_dir);
    }

    if report.removed.is_empty()
        && let Some((path, reason)) = report.failed.first()
    {
        return Err(DirectoryError::PruneFailed {
            root: root.to_path_buf(),
            failed: report.failed.len(),
            first: format!("{}: {reason}", path.display()),
        });
    }

    info!(
        removed = report.removed.len(),
        failed = report.failed.len(),
        "prune pass finished"
    );
    Ok(report)
}

fn subdirectories(dir: &Path) -> DirResult<Vec<PathBuf>> {
    let read_err = |source| DirectoryError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn is_stale(dir: &Path, retention: Duration, now: SystemTime) -> bool {
    let modified = match fs::metadata(dir).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(err) => {
            warn!(path = %dir.display(), err = %err, "cannot read mtime, keeping");
            return false;
        }
    };
    // Future mtimes (clock skew) count as fresh.
    now.duration_since(modified)
        .map(|age| age > retention)
        .unwrap_or(false)
}

fn remove_if_empty(dir: &Path) {
    let empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if empty && let Err(err) = fs::remove_dir(dir) {
        debug!(path = %dir.display(), err = %err, "could not remove empty plan directory");
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(SECS_PER_DAY))
}

pub(super) fn check_plan_id(plan_id: &str) -> DirResult<()> {
    validate_plan_id(plan_id).map_err(|reason| DirectoryError::InvalidPlanId {
        plan_id: plan_id.to_string(),
        reason,
    })
}
