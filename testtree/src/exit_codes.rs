//! Stable exit codes for testtree CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid store, config, snapshot or arguments, or any other error.
pub const INVALID: i32 = 1;
/// `testtree summary` found the framework `failed` or `error`.
pub const FAILED: i32 = 2;
