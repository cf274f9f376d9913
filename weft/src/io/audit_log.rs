//! Append-only abandon log on disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::audit::{AuditEntry, format_entry, last_reason, parse_entries};

/// Append one entry, creating the log (and its directory) if needed.
pub fn append_entry(path: &Path, plan_id: &str, reason: &str, at: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(format_entry(plan_id, at, reason).as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    debug!(path = %path.display(), plan_id, "audit entry appended");
    Ok(())
}

/// Every entry in the log; an absent log has none.
pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    match read_log(path)? {
        Some(contents) => Ok(parse_entries(&contents)),
        None => Ok(Vec::new()),
    }
}

/// Reason recorded by the most recent abandonment of `plan_id`.
pub fn read_last_reason(path: &Path, plan_id: &str) -> Result<Option<String>> {
    Ok(read_log(path)?.and_then(|contents| last_reason(&contents, plan_id)))
}

fn read_log(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(contents))
}
