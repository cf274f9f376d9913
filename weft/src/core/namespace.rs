//! Backup namespaces and their ref prefixes.

use std::fmt;

use serde::Serialize;

/// Where a plan's backup record lives.
///
/// A plan has a record in at most one namespace at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// `refs/plan-backups/`
    Active,
    /// `refs/plan-abandoned/`
    Abandoned,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Active, Namespace::Abandoned];

    /// Ref prefix including the trailing slash.
    pub fn ref_prefix(self) -> &'static str {
        match self {
            Namespace::Active => "refs/plan-backups/",
            Namespace::Abandoned => "refs/plan-abandoned/",
        }
    }

    pub fn ref_name(self, plan_id: &str) -> String {
        format!("{}{plan_id}", self.ref_prefix())
    }

    pub fn other(self) -> Namespace {
        match self {
            Namespace::Active => Namespace::Abandoned,
            Namespace::Abandoned => Namespace::Active,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Namespace::Active => "backups",
            Namespace::Abandoned => "abandoned",
        };
        write!(f, "{name} ({})", self.ref_prefix().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_names_use_namespace_prefix() {
        assert_eq!(
            Namespace::Active.ref_name("fix-bug"),
            "refs/plan-backups/fix-bug"
        );
        assert_eq!(
            Namespace::Abandoned.ref_name("fix-bug"),
            "refs/plan-abandoned/fix-bug"
        );
    }

    #[test]
    fn display_names_the_namespace_and_ref() {
        assert_eq!(
            Namespace::Abandoned.to_string(),
            "abandoned (refs/plan-abandoned)"
        );
        assert_eq!(Namespace::Active.other(), Namespace::Abandoned);
    }
}
