//! Typed errors for the store and directory seams.
//!
//! Orchestration code (`abandon`, `recover`, the CLI) wraps these in
//! `anyhow::Error`; callers that need to branch on a failure kind can
//! `downcast_ref` back to the concrete type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::namespace::Namespace;

/// A `git` subprocess could not be spawned or exited non-zero.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("spawn git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// Failures of the backup store.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid plan id '{plan_id}': {reason}")]
    InvalidPlanId { plan_id: String, reason: String },

    #[error("read plan file {}: {source}", path.display())]
    ReadPlan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write plan file {}: {source}", path.display())]
    WritePlan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no backup found for plan '{plan_id}' in {namespace}")]
    NotFound { plan_id: String, namespace: Namespace },

    #[error("plan file {} already exists (use --force to overwrite)", path.display())]
    Exists { path: PathBuf },

    #[error("backup {commit_id} for plan '{plan_id}' does not contain a plan file")]
    EmptyBackup { plan_id: String, commit_id: String },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// A cleanup sub-step's underlying command failed.
///
/// Never raised by the abandon coordinator; each sub-operation converts it
/// into a failed `CleanupResult`.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// Failures of the ephemeral directory manager.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid plan id '{plan_id}': {reason}")]
    InvalidPlanId { plan_id: String, reason: String },

    #[error("create directory {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read directory {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pruning failed: all {failed} deletions under {} failed (first: {first})", root.display())]
    PruneFailed {
        root: PathBuf,
        failed: usize,
        first: String,
    },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Failures of the recover flow.
#[derive(Debug, Error)]
pub enum RecoverError {
    #[error("invalid plan id '{plan_id}': {reason}")]
    InvalidPlanId { plan_id: String, reason: String },

    #[error(
        "no backup for plan '{plan_id}' in {searched}; it exists in {found} (use {hint})"
    )]
    WrongNamespace {
        plan_id: String,
        searched: Namespace,
        found: Namespace,
        hint: &'static str,
    },

    #[error(transparent)]
    Backup(#[from] BackupError),
}
