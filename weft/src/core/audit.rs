//! Abandon audit log format.
//!
//! Each entry is a block:
//!
//! ```text
//! ## <plan_id> - <timestamp>
//! <reason, possibly multi-line>
//!
//! ```
//!
//! Reason lines that would read as a heading (`## ...`) are written with a
//! leading backslash, which parsing removes again.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## ([a-zA-Z0-9._-]{3,100}) - (\S+)\s*$").expect("audit heading regex")
});

/// One parsed audit block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub plan_id: String,
    pub timestamp: String,
    pub reason: String,
}

/// Render an audit block for appending.
pub fn format_entry(plan_id: &str, at: DateTime<Utc>, reason: &str) -> String {
    let body: Vec<String> = reason
        .trim_end_matches(['\n', '\r'])
        .lines()
        .map(|line| {
            if is_heading_like(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    format!(
        "## {plan_id} - {}\n{}\n\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        body.join("\n")
    )
}

/// `##` after any number of backslashes.
fn is_heading_like(line: &str) -> bool {
    line.trim_start_matches('\\').starts_with("##")
}

fn unescape(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if is_heading_like(rest) => rest,
        _ => line,
    }
}

/// Parse every block in the log, in file order.
///
/// Lines before the first heading are ignored.
pub fn parse_entries(contents: &str) -> Vec<AuditEntry> {
    let mut entries = Vec::new();
    let mut current: Option<(String, String, Vec<&str>)> = None;

    for line in contents.lines() {
        if let Some(caps) = HEADING_RE.captures(line) {
            if let Some((plan_id, timestamp, body)) = current.take() {
                entries.push(finish(plan_id, timestamp, &body));
            }
            current = Some((caps[1].to_string(), caps[2].to_string(), Vec::new()));
            continue;
        }
        if let Some((_, _, body)) = current.as_mut() {
            body.push(unescape(line));
        }
    }
    if let Some((plan_id, timestamp, body)) = current {
        entries.push(finish(plan_id, timestamp, &body));
    }
    entries
}

/// Reason from the most recent block for `plan_id`.
pub fn last_reason(contents: &str, plan_id: &str) -> Option<String> {
    parse_entries(contents)
        .into_iter()
        .rev()
        .find(|entry| entry.plan_id == plan_id)
        .map(|entry| entry.reason)
}

fn finish(plan_id: String, timestamp: String, body: &[&str]) -> AuditEntry {
    AuditEntry {
        plan_id,
        timestamp,
        reason: body.join("\n").trim().to_string(),
    }
}
