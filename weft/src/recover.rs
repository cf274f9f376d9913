//! Orchestration for `weft recover`: listing backups and restoring plans.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::namespace::Namespace;
use crate::core::plan::{strip_completion_decorations, validate_plan_id};
use crate::error::RecoverError;
use crate::io::audit_log::{read_entries, read_last_reason};
use crate::io::repo::PlanRepo;

/// Which namespaces `weft recover` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Active,
    Abandoned,
    All,
}

impl ListMode {
    pub fn namespaces(self) -> &'static [Namespace] {
        match self {
            ListMode::Active => &[Namespace::Active],
            ListMode::Abandoned => &[Namespace::Abandoned],
            ListMode::All => &Namespace::ALL,
        }
    }
}

/// One line of the backup listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRow {
    pub plan_id: String,
    pub namespace: Namespace,
    pub commit_id: String,
    pub created_at: DateTime<Utc>,
    pub file_exists: bool,
    /// First line of the last recorded abandon reason (abandoned rows only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Timestamp of that abandon log entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abandoned_at: Option<String>,
}

impl BackupRow {
    /// Decoration shown after the id, also accepted back as input.
    pub fn state(&self) -> &'static str {
        match (self.namespace, self.file_exists) {
            (Namespace::Abandoned, _) => "abandoned",
            (Namespace::Active, true) => "exists",
            (Namespace::Active, false) => "missing",
        }
    }

    pub fn render(&self) -> String {
        let mut line = format!("{} ({})", self.plan_id, self.state());
        if let Some(reason) = &self.reason {
            line.push_str(" - ");
            line.push_str(reason);
        }
        line
    }
}

/// List backups in the selected namespaces, sorted by plan id then namespace.
#[instrument(skip(repo))]
pub fn list_backups(repo: &PlanRepo, mode: ListMode) -> Result<Vec<BackupRow>> {
    let store = repo.backups();
    let needs_log = mode.namespaces().contains(&Namespace::Abandoned);
    let entries = if needs_log {
        read_entries(&repo.paths.audit_log_path)?
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for &namespace in mode.namespaces() {
        for entry in store.list_backups(namespace)? {
            let logged = match namespace {
                Namespace::Active => None,
                Namespace::Abandoned => entries.iter().rev().find(|e| e.plan_id == entry.plan_id),
            };
            let reason = logged
                .and_then(|e| e.reason.lines().next().map(str::to_string))
                .filter(|line| !line.is_empty());
            rows.push(BackupRow {
                plan_id: entry.plan_id,
                namespace,
                commit_id: entry.commit_id,
                created_at: entry.created_at,
                file_exists: entry.file_exists,
                reason,
                abandoned_at: logged.map(|e| e.timestamp.clone()),
            });
        }
    }
    rows.sort_by(|a, b| a.plan_id.cmp(&b.plan_id).then(a.namespace.cmp(&b.namespace)));
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverOptions {
    /// Overwrite an existing plan file.
    pub force: bool,
    /// Recover from `refs/plan-abandoned/` instead of `refs/plan-backups/`.
    pub abandoned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverOutcome {
    pub plan_id: String,
    pub path: PathBuf,
    pub namespace: Namespace,
    /// The backup was moved back from the abandoned namespace.
    pub reactivated: bool,
}

/// Restore a plan file from its backup.
///
/// `raw_id` may carry completion decorations such as ` (missing)`.
#[instrument(skip(repo))]
pub fn recover(
    repo: &PlanRepo,
    raw_id: &str,
    options: RecoverOptions,
) -> Result<RecoverOutcome, RecoverError> {
    let plan_id = strip_completion_decorations(raw_id).to_string();
    validate_plan_id(&plan_id).map_err(|reason| RecoverError::InvalidPlanId {
        plan_id: plan_id.clone(),
        reason,
    })?;

    let namespace = if options.abandoned {
        Namespace::Abandoned
    } else {
        Namespace::Active
    };
    let store = repo.backups();
    if !store.exists(namespace, &plan_id)? && store.exists(namespace.other(), &plan_id)? {
        return Err(RecoverError::WrongNamespace {
            plan_id,
            searched: namespace,
            found: namespace.other(),
            hint: match namespace {
                Namespace::Active => "--abandoned",
                Namespace::Abandoned => "without --abandoned",
            },
        });
    }

    let path = store.recover_from(namespace, &plan_id, options.force)?;
    let reactivated = match namespace {
        Namespace::Active => false,
        Namespace::Abandoned => {
            store.move_backup_to_active(&plan_id)?;
            true
        }
    };
    info!(plan_id = %plan_id, path = %path.display(), reactivated, "plan recovered");
    Ok(RecoverOutcome {
        plan_id,
        path,
        namespace,
        reactivated,
    })
}

/// Reason recorded by the most recent abandonment of `plan_id`, if any.
pub fn parse_abandoned_log(repo: &PlanRepo, plan_id: &str) -> Result<Option<String>> {
    read_last_reason(&repo.paths.audit_log_path, plan_id)
}
