//! Deterministic, pure logic shared by the backends and the plan workflow.
//!
//! Core modules must be free of I/O side effects so they can be tested in
//! isolation from any repository state.

pub mod branch_name;
pub mod diagnostics;
pub mod numstat;
pub mod path;
pub mod porcelain;
