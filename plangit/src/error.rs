//! Error type shared by the backends, the façade and the plan workflow.
//!
//! Benign structural conditions (empty repository, detached HEAD, unresolvable
//! diff base) never surface here; they are normalized to ordinary values by
//! the backends.

use std::io;
use std::path::PathBuf;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path is not inside a recognized (non-bare) repository.
    #[error("not a git repository: {} ({reason})", path.display())]
    InvalidRepository { path: PathBuf, reason: String },

    /// A supplied path resolves outside the repository root.
    #[error("path {} is outside repository {}", path.display(), root.display())]
    PathViolation { path: PathBuf, root: PathBuf },

    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// The git tool reported a genuine error; `stderr` is its diagnostic text.
    #[error("git {command} failed: {stderr}")]
    CommandFailure { command: String, stderr: String },

    #[error("git {command} cancelled")]
    Cancelled { command: String },

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Workflow guard: unrelated uncommitted work would be carried across a branch switch.
    #[error("{message}")]
    DirtyWorktree { branch: String, message: String },

    #[error("repository has no commits; create an initial commit manually")]
    NoCommitsDeclined,

    #[error("no files to commit")]
    NothingToCommit,

    #[error("nothing staged to commit")]
    NothingStaged,

    #[error("invalid config: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn command(args: &[&str], stderr: impl AsRef<str>) -> Self {
        Error::CommandFailure {
            command: args.join(" "),
            stderr: stderr.as_ref().trim().to_string(),
        }
    }
}
