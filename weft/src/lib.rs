//! Plan lifecycle plumbing: git-backed backups, abandon and recovery.
//!
//! A plan is a markdown file (`tasks/<plan_id>.md`) worked on in its own
//! worktree and branch. This crate keeps a recoverable copy of each plan in
//! git's object database and tears down a plan's resources on abandon.
//!
//! - **[`core`]**: Pure logic (plan ids, namespaces, audit format, cleanup
//!   results). No I/O.
//! - **[`io`]**: Side effects (git plumbing, filesystem, config, prompts).
//!
//! Orchestration modules ([`detect`], [`abandon`], [`recover`]) combine the two
//! to implement CLI commands.

pub mod abandon;
pub mod core;
pub mod detect;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recover;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
