//! Stable exit codes for weft CLI commands.

/// Command succeeded, was a no-op, or was cancelled by the user.
pub const OK: i32 = 0;
/// Hard failure, recovery target missing or in the way, or a partial abandon.
pub const FAILURE: i32 = 1;
