//! Per-resource cleanup results.

use std::fmt;

use serde::Serialize;

/// The four resources abandon removes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Workspace,
    Branch,
    PlanFile,
    Backup,
}

impl Resource {
    pub const ORDER: [Resource; 4] = [
        Resource::Workspace,
        Resource::Branch,
        Resource::PlanFile,
        Resource::Backup,
    ];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Workspace => "workspace",
            Resource::Branch => "branch",
            Resource::PlanFile => "plan file",
            Resource::Backup => "backup",
        };
        f.write_str(s)
    }
}

/// Outcome of one cleanup sub-operation. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub success: bool,
    /// The resource was already gone; nothing was done.
    pub already_clean: bool,
    pub error_message: Option<String>,
}

impl CleanupResult {
    pub fn cleaned() -> Self {
        Self {
            success: true,
            already_clean: false,
            error_message: None,
        }
    }

    pub fn already_clean() -> Self {
        Self {
            success: true,
            already_clean: true,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            already_clean: false,
            error_message: Some(message.into()),
        }
    }

    /// Short status word for summaries.
    pub fn label(&self) -> &'static str {
        match (self.success, self.already_clean) {
            (false, _) => "failed",
            (true, true) => "already clean",
            (true, false) => "removed",
        }
    }
}
