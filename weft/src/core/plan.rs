//! Plan identifiers and lenient front matter reading.
//!
//! Plan files are owned by external flows. We only need the id (to derive ref
//! names and paths) and, for display, the `status` key from the front matter.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static PLAN_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]{3,100}$").expect("plan id regex"));

/// Suffixes shell completion appends to candidates in `weft recover` listings.
const COMPLETION_DECORATIONS: [&str; 3] = [" (missing)", " (exists)", " (abandoned)"];

/// Validate a plan id for use in ref names and file paths.
///
/// Returns the reason on failure so callers can wrap it in their own error type.
pub fn validate_plan_id(plan_id: &str) -> Result<(), String> {
    if !PLAN_ID_RE.is_match(plan_id) {
        return Err("must be 3-100 characters of [a-zA-Z0-9._-]".to_string());
    }
    // git refuses these as ref name components.
    if plan_id.starts_with('.') {
        return Err("must not start with '.'".to_string());
    }
    if plan_id.contains("..") {
        return Err("must not contain '..'".to_string());
    }
    if plan_id.ends_with(".lock") {
        return Err("must not end with '.lock'".to_string());
    }
    Ok(())
}

/// Resolve a CLI target (`fix-bug`, `tasks/fix-bug.md`, `./fix-bug.md`) to a plan id.
pub fn plan_id_from_target(target: &str) -> String {
    let trimmed = target.trim();
    if trimmed.ends_with(".md") || trimmed.contains('/') || trimmed.contains('\\') {
        if let Some(stem) = Path::new(trimmed).file_stem().and_then(|s| s.to_str()) {
            return stem.to_string();
        }
    }
    trimmed.to_string()
}

/// Strip decorations that tab completion attaches to plan ids.
pub fn strip_completion_decorations(input: &str) -> &str {
    let mut value = input.trim();
    for suffix in COMPLETION_DECORATIONS {
        if let Some(stripped) = value.strip_suffix(suffix) {
            value = stripped.trim_end();
        }
    }
    value
}

/// Lifecycle status recorded in a plan's front matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Coding,
    Implemented,
    Done,
    Abandoned,
}

impl PlanStatus {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PlanStatus::Draft),
            "coding" => Some(PlanStatus::Coding),
            "implemented" => Some(PlanStatus::Implemented),
            "done" => Some(PlanStatus::Done),
            "abandoned" => Some(PlanStatus::Abandoned),
            _ => None,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Coding => "coding",
            PlanStatus::Implemented => "implemented",
            PlanStatus::Done => "done",
            PlanStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Read `status` from the YAML front matter, if present and recognised.
pub fn parse_status(contents: &str) -> Option<PlanStatus> {
    front_matter_value(contents, "status").and_then(|v| PlanStatus::parse(&v))
}

fn front_matter_value(contents: &str, wanted: &str) -> Option<String> {
    let front_matter = split_front_matter(contents)?;
    for line in front_matter.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        if key.trim() != wanted {
            continue;
        }
        let mut v = value.trim();
        if v.len() >= 2
            && ((v.starts_with('"') && v.ends_with('"'))
                || (v.starts_with('\'') && v.ends_with('\'')))
        {
            v = &v[1..v.len() - 1];
        }
        if v.is_empty() {
            return None;
        }
        return Some(v.to_string());
    }
    None
}

fn split_front_matter(contents: &str) -> Option<&str> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let after = contents
        .strip_prefix("---\n")
        .or_else(|| contents.strip_prefix("---\r\n"))?;
    let end = after.find("\n---")?;
    Some(&after[..end])
}
