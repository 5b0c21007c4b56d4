//! Stable exit codes for plangit CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed for any reason not listed below.
pub const FAILURE: i32 = 1;
/// `plangit branch` refused because unrelated work is uncommitted.
pub const DIRTY_WORKTREE: i32 = 3;
/// `plangit bootstrap` was declined in a repository without commits.
pub const NO_COMMITS: i32 = 4;
