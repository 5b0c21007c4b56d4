//! Version-control backends behind one capability set.
//!
//! [`Backend`] is implemented twice: [`embedded::EmbeddedBackend`] talks to the
//! repository in-process through `git2`, and [`external::ExternalBackend`]
//! drives the `git` binary and parses its output. Both must return equal
//! results for every read-only query against the same on-disk state.
//! Callers hold a [`repo::Repo`] and never branch on which backend is active.

pub mod embedded;
pub mod external;
pub mod process;
pub mod repo;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::core::numstat::DiffStats;
use crate::core::path::clean_relative;
use crate::error::{Error, Result};

/// Branch naming conventions shared by both backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BranchPolicy {
    /// Remote consulted for the symbolic HEAD and remote-tracking bases.
    pub remote: String,
    /// Names treated as the trunk.
    pub primary: Vec<String>,
    /// Local branches probed, in order, when the remote has no HEAD.
    pub default_candidates: Vec<String>,
    /// Returned when nothing else resolves.
    pub default_fallback: String,
}

impl Default for BranchPolicy {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            primary: vec!["main".to_string(), "master".to_string()],
            default_candidates: ["main", "master", "trunk", "develop"]
                .map(String::from)
                .to_vec(),
            default_fallback: "master".to_string(),
        }
    }
}

impl BranchPolicy {
    pub fn is_primary(&self, branch: &str) -> bool {
        self.primary.iter().any(|p| p == branch)
    }

    /// Full ref names tried, in order, when resolving a diff base.
    pub fn base_ref_candidates(&self, base: &str) -> Vec<String> {
        let mut candidates = vec![
            format!("refs/heads/{base}"),
            format!("refs/remotes/{}/{base}", self.remote),
        ];
        if base.contains('/') {
            candidates.push(format!("refs/remotes/{base}"));
        }
        candidates
    }

    pub fn remote_head_ref(&self) -> String {
        format!("refs/remotes/{}/HEAD", self.remote)
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.trim().is_empty() {
            return Err(Error::Config("branches.remote must not be empty".into()));
        }
        if self.primary.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config(
                "branches.primary must name at least one branch".into(),
            ));
        }
        if self.default_candidates.iter().any(|b| b.trim().is_empty()) {
            return Err(Error::Config(
                "branches.default_candidates must not contain empty names".into(),
            ));
        }
        if self.default_fallback.trim().is_empty() {
            return Err(Error::Config(
                "branches.default_fallback must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Capability set every backend implements.
///
/// Paths may be absolute or repository-relative; every implementation runs
/// them through [`normalize_path`] and rejects anything outside [`root`].
///
/// [`root`]: Backend::root
pub trait Backend {
    /// Canonical, symlink-resolved repository root.
    fn root(&self) -> &Path;

    fn policy(&self) -> &BranchPolicy;

    /// Full lowercase hex id of the HEAD commit.
    fn head_hash(&self) -> Result<String>;

    /// `false` for an empty repository; errors only on genuine failures.
    fn has_commits(&self) -> Result<bool>;

    /// Short name of the current branch, `""` when HEAD is detached.
    ///
    /// In an empty repository this is the unborn branch HEAD points at.
    fn current_branch(&self) -> Result<String>;

    fn branch_exists(&self, name: &str) -> bool;

    /// Create `name` at HEAD and switch to it.
    fn create_branch(&self, name: &str) -> Result<()>;

    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// True iff a tracked file has a staged or unstaged change. Untracked files never count.
    fn is_dirty(&self) -> Result<bool>;

    /// True if `path` is untracked, modified, staged or deleted.
    fn file_has_changes(&self, path: &Path) -> Result<bool>;

    /// True if any non-ignored entry other than `path` is dirty, untracked included.
    fn has_changes_other_than(&self, path: &Path) -> Result<bool>;

    /// True if the ignore rules match `path`, regardless of whether it is tracked.
    fn is_ignored(&self, path: &Path) -> Result<bool>;

    fn add(&self, path: &Path) -> Result<()>;

    /// Stage a rename. Fails with [`Error::ReferenceNotFound`] if `src` is not tracked.
    fn move_file(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Commit the stage. Fails with [`Error::NothingStaged`] if it matches HEAD.
    fn commit(&self, message: &str) -> Result<()>;

    /// Stage every non-ignored file and commit. Fails with [`Error::NothingToCommit`].
    fn create_initial_commit(&self, message: &str) -> Result<()>;

    /// Branch name the remote's symbolic HEAD points at, without the remote prefix.
    fn remote_head_branch(&self) -> Option<String>;

    /// Resolve a full ref name (or `HEAD`) to a commit id.
    fn resolve_commit(&self, refname: &str) -> Option<String>;

    /// Stats from the merge base of `base` and HEAD to HEAD, renames disabled.
    fn diff_stats_between(&self, base: &str) -> Result<DiffStats>;

    fn is_main_branch(&self) -> Result<bool> {
        Ok(self.policy().is_primary(&self.current_branch()?))
    }

    /// Best guess at the primary branch. Never fails.
    fn default_branch(&self) -> String {
        let policy = self.policy();
        if let Some(name) = self.remote_head_branch() {
            if self.branch_exists(&name) {
                return name;
            }
            return format!("{}/{name}", policy.remote);
        }
        policy
            .default_candidates
            .iter()
            .find(|candidate| self.branch_exists(candidate))
            .cloned()
            .unwrap_or_else(|| policy.default_fallback.clone())
    }

    /// Diff stats between `base` and HEAD; zero when `base` does not resolve or equals HEAD.
    fn diff_stats(&self, base: &str) -> Result<DiffStats> {
        let Some(head) = self.resolve_commit("HEAD") else {
            return Ok(DiffStats::default());
        };
        let resolved = self
            .policy()
            .base_ref_candidates(base)
            .iter()
            .find_map(|candidate| self.resolve_commit(candidate));
        let Some(base_id) = resolved else {
            debug!(base, "diff base does not resolve");
            return Ok(DiffStats::default());
        };
        if base_id == head {
            return Ok(DiffStats::default());
        }
        self.diff_stats_between(&base_id)
    }
}

/// Normalize `path` to a `/`-separated path relative to `root`.
///
/// Relative input is cleaned lexically. Absolute input has its parent
/// directory canonicalized (the unresolved parent is used if that fails)
/// before being made relative to `root`.
pub fn normalize_path(root: &Path, path: &Path) -> Result<String> {
    let violation = || Error::PathViolation {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };
    if !path.is_absolute() {
        return clean_relative(path).ok_or_else(violation);
    }
    let resolved = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .unwrap_or_else(|_| parent.to_path_buf())
            .join(name),
        _ => path.to_path_buf(),
    };
    let relative = resolved.strip_prefix(root).map_err(|_| violation())?;
    clean_relative(relative).ok_or_else(violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_ref_candidates_are_ordered() {
        let policy = BranchPolicy::default();
        assert_eq!(
            policy.base_ref_candidates("main"),
            vec!["refs/heads/main", "refs/remotes/origin/main"]
        );
        assert_eq!(
            policy.base_ref_candidates("origin/main"),
            vec![
                "refs/heads/origin/main",
                "refs/remotes/origin/origin/main",
                "refs/remotes/origin/main"
            ]
        );
    }

    #[test]
    fn primary_names_match_exactly() {
        let policy = BranchPolicy::default();
        assert!(policy.is_primary("main"));
        assert!(policy.is_primary("master"));
        assert!(!policy.is_primary("main-2"));
        assert!(!policy.is_primary(""));
    }

    #[test]
    fn default_policy_validates() {
        BranchPolicy::default().validate().expect("valid");
        let policy = BranchPolicy {
            primary: Vec::new(),
            ..BranchPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn normalizes_relative_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical");
        assert_eq!(
            normalize_path(&root, Path::new("./docs/plans/a.md")).expect("normalize"),
            "docs/plans/a.md"
        );
        assert!(matches!(
            normalize_path(&root, Path::new("../a.md")),
            Err(Error::PathViolation { .. })
        ));
    }

    #[test]
    fn normalizes_absolute_paths_through_symlinked_parent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical");
        fs::create_dir_all(root.join("docs/plans")).expect("mkdir");
        let link_parent = tempfile::tempdir().expect("tempdir");
        let link = link_parent.path().join("plans-link");
        std::os::unix::fs::symlink(root.join("docs/plans"), &link).expect("symlink");

        assert_eq!(
            normalize_path(&root, &link.join("a.md")).expect("normalize"),
            "docs/plans/a.md"
        );
        assert_eq!(
            normalize_path(&root, &root.join("missing/dir/b.md")).expect("normalize"),
            "missing/dir/b.md"
        );
    }

    #[test]
    fn rejects_absolute_paths_outside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(temp.path()).expect("canonical");
        let other = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            normalize_path(&root, &other.path().join("x.md")),
            Err(Error::PathViolation { .. })
        ));
        assert!(matches!(
            normalize_path(&root, &root),
            Err(Error::PathViolation { .. })
        ));
    }
}
