//! Version-control layer for plan-driven automation.
//!
//! The crate keeps the same separation throughout:
//!
//! - **[`core`]**: Pure logic (branch names, path cleaning, status and numstat
//!   parsing, diagnostic classification). No I/O.
//! - **[`vcs`]**: The [`vcs::Backend`] capability set, its two implementations
//!   (in-process `git2` and the `git` binary) and the [`vcs::repo::Repo`]
//!   façade that binds one of them per repository.
//!
//! [`plan`] builds the plan lifecycle (branch per plan, completion moves,
//! bootstrapping an empty repository) on top of any backend.

pub mod config;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod vcs;

pub use error::{Error, Result};
