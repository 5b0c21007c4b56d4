//! Repository façade binding exactly one backend per opened repository.

use std::path::Path;

use tracing::{debug, warn};

use super::embedded::EmbeddedBackend;
use super::external::ExternalBackend;
use super::process::CancelToken;
use super::{Backend, BranchPolicy, DiffStats};
use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, Result};

/// An opened repository. The backend is chosen once, at [`Repo::open`].
pub struct Repo {
    backend: Box<dyn Backend>,
    kind: BackendKind,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("root", &self.backend.root())
            .field("kind", &self.kind)
            .finish()
    }
}

impl Repo {
    /// Open the repository containing `path`.
    ///
    /// Backends from [`BackendConfig::candidates`] are tried in order and the
    /// first that opens wins. If none does, the first candidate's error is
    /// returned.
    pub fn open(path: &Path, config: &BackendConfig, policy: &BranchPolicy) -> Result<Self> {
        Self::open_with_cancel(path, config, policy, None)
    }

    /// Like [`Repo::open`], wiring `cancel` into the external backend.
    pub fn open_with_cancel(
        path: &Path,
        config: &BackendConfig,
        policy: &BranchPolicy,
        cancel: Option<CancelToken>,
    ) -> Result<Self> {
        let mut first_err: Option<Error> = None;
        for kind in config.candidates() {
            match open_backend(kind, path, config, policy, cancel.clone()) {
                Ok(backend) => {
                    debug!(backend = kind.as_str(), root = %backend.root().display(), "repository opened");
                    return Ok(Self { backend, kind });
                }
                Err(err) => {
                    warn!(backend = kind.as_str(), err = %err, "backend failed to open repository");
                    first_err.get_or_insert(err);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| Error::InvalidRepository {
            path: path.to_path_buf(),
            reason: "no backend configured".to_string(),
        }))
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }
}

fn open_backend(
    kind: BackendKind,
    path: &Path,
    config: &BackendConfig,
    policy: &BranchPolicy,
    cancel: Option<CancelToken>,
) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Embedded => Ok(Box::new(EmbeddedBackend::open(path, policy.clone())?)),
        BackendKind::External => {
            let backend = ExternalBackend::open(path, policy.clone(), config.git_command())?;
            Ok(Box::new(match cancel {
                Some(token) => backend.with_cancel(token),
                None => backend,
            }))
        }
    }
}

impl Backend for Repo {
    fn root(&self) -> &Path {
        self.backend.root()
    }

    fn policy(&self) -> &BranchPolicy {
        self.backend.policy()
    }

    fn head_hash(&self) -> Result<String> {
        self.backend.head_hash()
    }

    fn has_commits(&self) -> Result<bool> {
        self.backend.has_commits()
    }

    fn current_branch(&self) -> Result<String> {
        self.backend.current_branch()
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.backend.branch_exists(name)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.backend.create_branch(name)
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.backend.checkout_branch(name)
    }

    fn is_dirty(&self) -> Result<bool> {
        self.backend.is_dirty()
    }

    fn file_has_changes(&self, path: &Path) -> Result<bool> {
        self.backend.file_has_changes(path)
    }

    fn has_changes_other_than(&self, path: &Path) -> Result<bool> {
        self.backend.has_changes_other_than(path)
    }

    fn is_ignored(&self, path: &Path) -> Result<bool> {
        self.backend.is_ignored(path)
    }

    fn add(&self, path: &Path) -> Result<()> {
        self.backend.add(path)
    }

    fn move_file(&self, src: &Path, dst: &Path) -> Result<()> {
        self.backend.move_file(src, dst)
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.backend.commit(message)
    }

    fn create_initial_commit(&self, message: &str) -> Result<()> {
        self.backend.create_initial_commit(message)
    }

    fn remote_head_branch(&self) -> Option<String> {
        self.backend.remote_head_branch()
    }

    fn resolve_commit(&self, refname: &str) -> Option<String> {
        self.backend.resolve_commit(refname)
    }

    fn diff_stats_between(&self, base: &str) -> Result<DiffStats> {
        self.backend.diff_stats_between(base)
    }

    fn is_main_branch(&self) -> Result<bool> {
        self.backend.is_main_branch()
    }

    fn default_branch(&self) -> String {
        self.backend.default_branch()
    }

    fn diff_stats(&self, base: &str) -> Result<DiffStats> {
        self.backend.diff_stats(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn opens_configured_backend() {
        let repo = TestRepo::with_initial_commit();
        for kind in [BackendKind::Embedded, BackendKind::External] {
            let config = BackendConfig {
                kind,
                fallback: false,
                ..BackendConfig::default()
            };
            let opened =
                Repo::open(repo.path(), &config, &BranchPolicy::default()).expect("open");
            assert_eq!(opened.kind(), kind);
            assert_eq!(opened.root(), repo.root());
        }
    }

    #[test]
    fn falls_back_when_git_binary_is_missing() {
        let repo = TestRepo::with_initial_commit();
        let config = BackendConfig {
            kind: BackendKind::External,
            fallback: true,
            git_binary: "/nonexistent/plangit-git".into(),
            ..BackendConfig::default()
        };
        let opened = Repo::open(repo.path(), &config, &BranchPolicy::default()).expect("open");
        assert_eq!(opened.kind(), BackendKind::Embedded);
    }

    #[test]
    fn no_fallback_surfaces_first_error() {
        let repo = TestRepo::with_initial_commit();
        let config = BackendConfig {
            kind: BackendKind::External,
            fallback: false,
            git_binary: "/nonexistent/plangit-git".into(),
            ..BackendConfig::default()
        };
        let err = Repo::open(repo.path(), &config, &BranchPolicy::default())
            .expect_err("missing binary");
        assert!(matches!(err, Error::Io { .. }), "{err:?}");
    }

    #[test]
    fn non_repository_reports_invalid_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Repo::open(temp.path(), &BackendConfig::default(), &BranchPolicy::default())
            .expect_err("not a repo");
        assert!(matches!(err, Error::InvalidRepository { .. }), "{err:?}");
    }

    #[test]
    fn opens_from_subdirectory() {
        let repo = TestRepo::with_initial_commit();
        let sub = repo.path().join("docs/plans");
        std::fs::create_dir_all(&sub).expect("mkdir");
        let opened =
            Repo::open(&sub, &BackendConfig::default(), &BranchPolicy::default()).expect("open");
        assert_eq!(opened.root(), repo.root());
    }
}
