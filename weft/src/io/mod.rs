//! I/O helpers for weft commands.

pub mod audit_log;
pub mod backup;
pub mod config;
pub mod confirm;
pub mod ephemeral;
pub mod git;
pub mod paths;
pub mod repo;
pub mod worktree;
