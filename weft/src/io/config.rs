//! Weft configuration stored under `.weft/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weft configuration (TOML).
///
/// Missing fields default to the conventional layout (`tasks/<plan_id>.md`,
/// `weft/<plan_id>` branches, a week of run/session retention).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WeftConfig {
    /// Repository-relative directory holding plan files.
    pub tasks_dir: String,

    /// Repository-relative path of the append-only abandon log.
    pub audit_log: String,

    /// Prefix for plan branches (`<prefix><plan_id>`).
    pub branch_prefix: String,

    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Age in days after which `.weft/runs/<plan>/<ts>` directories are pruned.
    pub runs_days: u64,
    /// Age in days after which `.weft/sessions/<plan>/<ts>` directories are pruned.
    pub sessions_days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            runs_days: 7,
            sessions_days: 7,
        }
    }
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            tasks_dir: "tasks".to_string(),
            audit_log: ".weft/abandoned.md".to_string(),
            branch_prefix: "weft/".to_string(),
            retention: RetentionConfig::default(),
        }
    }
}

impl WeftConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_relative("tasks_dir", &self.tasks_dir)?;
        ensure_relative("audit_log", &self.audit_log)?;
        if self.branch_prefix.trim().is_empty() {
            return Err(anyhow!("branch_prefix must not be empty"));
        }
        if self.branch_prefix.contains(char::is_whitespace) {
            return Err(anyhow!("branch_prefix must not contain whitespace"));
        }
        if self.retention.runs_days == 0 {
            return Err(anyhow!("retention.runs_days must be > 0"));
        }
        if self.retention.sessions_days == 0 {
            return Err(anyhow!("retention.sessions_days must be > 0"));
        }
        Ok(())
    }
}

fn ensure_relative(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    if Path::new(value).is_absolute() {
        return Err(anyhow!("{field} must be relative to the repository root"));
    }
    if value.contains('\\') {
        return Err(anyhow!("{field} must use '/' separators"));
    }
    if value.split('/').any(|c| c == "..") {
        return Err(anyhow!("{field} must not leave the repository root"));
    }
    if relative_components(value).is_empty() {
        return Err(anyhow!("{field} must name a directory below the repository root"));
    }
    Ok(())
}

/// Path components of a repository-relative value, without empty or `.` segments.
pub(crate) fn relative_components(value: &str) -> Vec<&str> {
    value
        .split('/')
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != ".")
        .collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WeftConfig::default()`.
pub fn load_config(path: &Path) -> Result<WeftConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = WeftConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WeftConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WeftConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, WeftConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = WeftConfig {
            tasks_dir: "plans".to_string(),
            retention: RetentionConfig {
                runs_days: 3,
                sessions_days: 30,
            },
            ..WeftConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[retention]\nruns_days = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.retention.runs_days, 2);
        assert_eq!(cfg.retention.sessions_days, 7);
        assert_eq!(cfg.tasks_dir, "tasks");
    }

    #[test]
    fn rejects_zero_retention() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[retention]\nsessions_days = 0\n").expect("write");
        let err = load_config(&path).expect_err("zero retention should fail");
        assert!(format!("{err:#}").contains("sessions_days"));
    }

    #[test]
    fn rejects_tasks_dir_outside_repository() {
        for tasks_dir in ["../plans", "tasks/../../x", "tasks\\win", ".", "./"] {
            let cfg = WeftConfig {
                tasks_dir: tasks_dir.to_string(),
                ..WeftConfig::default()
            };
            assert!(cfg.validate().is_err(), "{tasks_dir}");
        }
    }

    #[test]
    fn dotted_tasks_dir_is_accepted() {
        let cfg = WeftConfig {
            tasks_dir: "./docs/./plans/".to_string(),
            ..WeftConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(relative_components(&cfg.tasks_dir), vec!["docs", "plans"]);
    }

    #[test]
    fn rejects_absolute_tasks_dir() {
        let cfg = WeftConfig {
            tasks_dir: "/abs/tasks".to_string(),
            ..WeftConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
