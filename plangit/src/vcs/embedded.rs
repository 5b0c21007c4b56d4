//! In-process backend built on `git2`.
//!
//! Structural conditions are recognized from typed error codes
//! (`ErrorCode::UnbornBranch`) rather than from message text.

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, DiffOptions, ErrorCode, IndexAddOption, Oid, Patch, Reference, Repository,
    Signature, Status, StatusOptions,
};
use tracing::{debug, instrument};

use super::{Backend, BranchPolicy, DiffStats, normalize_path};
use crate::error::{Error, Result};

const FALLBACK_NAME: &str = "plangit";
const FALLBACK_EMAIL: &str = "plangit@localhost";

/// Backend reading and writing repository structures through libgit2.
pub struct EmbeddedBackend {
    repo: Repository,
    root: PathBuf,
    policy: BranchPolicy,
}

impl EmbeddedBackend {
    /// Discover the repository containing `path`.
    pub fn open(path: &Path, policy: BranchPolicy) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRepository {
            path: path.to_path_buf(),
            reason,
        };
        let repo = Repository::discover(path).map_err(|e| invalid(e.message().to_string()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| invalid("bare repository has no working tree".to_string()))?;
        let root = fs::canonicalize(workdir)
            .map_err(|e| Error::io(format!("canonicalize {}", workdir.display()), e))?;
        debug!(root = %root.display(), "opened repository in-process");
        Ok(Self { repo, root, policy })
    }

    fn rel(&self, path: &Path) -> Result<String> {
        normalize_path(&self.root, path)
    }

    /// HEAD reference, or `None` when HEAD points at an unborn branch.
    fn head(&self) -> Result<Option<Reference<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
        }
    }

    /// Non-ignored status entries keyed by their post-rename path.
    fn dirty_paths(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let paths = statuses
            .iter()
            .filter(|entry| entry.status() != Status::CURRENT)
            .map(|entry| {
                if entry.status().contains(Status::INDEX_RENAMED)
                    && let Some(new) = entry.head_to_index().and_then(|d| d.new_file().path())
                {
                    return new.to_string_lossy().into_owned();
                }
                String::from_utf8_lossy(entry.path_bytes()).into_owned()
            })
            .collect();
        Ok(paths)
    }
}

fn is_tracked_change(status: Status) -> bool {
    status.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE
            | Status::WT_MODIFIED
            | Status::WT_DELETED
            | Status::WT_TYPECHANGE
            | Status::WT_RENAMED
            | Status::CONFLICTED,
    )
}

impl Backend for EmbeddedBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn policy(&self) -> &BranchPolicy {
        &self.policy
    }

    fn head_hash(&self) -> Result<String> {
        let head = self
            .head()?
            .ok_or_else(|| Error::ReferenceNotFound("HEAD".to_string()))?;
        Ok(head.peel_to_commit()?.id().to_string())
    }

    fn has_commits(&self) -> Result<bool> {
        match self.head()? {
            Some(head) => {
                head.peel_to_commit()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn current_branch(&self) -> Result<String> {
        if self.repo.head_detached()? {
            return Ok(String::new());
        }
        let head = self.repo.find_reference("HEAD")?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| Error::ReferenceNotFound("HEAD symbolic target".to_string()))?;
        Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string())
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    #[instrument(skip_all, fields(branch = name))]
    fn create_branch(&self, name: &str) -> Result<()> {
        if self.branch_exists(name) {
            return Err(Error::BranchExists(name.to_string()));
        }
        let refname = format!("refs/heads/{name}");
        match self.head()? {
            Some(head) => {
                let commit = head.peel_to_commit()?;
                self.repo.branch(name, &commit, false)?;
            }
            // Unborn HEAD: switching only repoints HEAD, like `git checkout -b`.
            None if Reference::is_valid_name(&refname) => {}
            None => {
                return Err(git2::Error::from_str(&format!("invalid branch name '{name}'")).into());
            }
        }
        self.repo.set_head(&refname)?;
        debug!("created and switched branch");
        Ok(())
    }

    #[instrument(skip_all, fields(branch = name))]
    fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::ReferenceNotFound(format!("refs/heads/{name}")))?;
        let reference = branch.into_reference();
        let refname = reference
            .name()
            .ok_or_else(|| git2::Error::from_str("branch ref name is not utf-8"))?
            .to_string();
        let commit = reference.peel_to_commit()?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))?;
        self.repo.set_head(&refname)?;
        debug!("checked out branch");
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses.iter().any(|entry| is_tracked_change(entry.status())))
    }

    fn file_has_changes(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .pathspec(rel.as_str())
            .disable_pathspec_match(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .any(|entry| entry.status() != Status::CURRENT))
    }

    fn has_changes_other_than(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        Ok(self.dirty_paths()?.iter().any(|p| *p != rel))
    }

    fn is_ignored(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        Ok(self.repo.is_path_ignored(Path::new(&rel))?)
    }

    #[instrument(skip_all)]
    fn add(&self, path: &Path) -> Result<()> {
        let rel = self.rel(path)?;
        let abs = self.root.join(&rel);
        let mut index = self.repo.index()?;
        if abs.is_dir() {
            index.add_all([rel.as_str()], IndexAddOption::DEFAULT, None)?;
        } else if abs.symlink_metadata().is_ok() {
            index.add_path(Path::new(&rel))?;
        } else if index.get_path(Path::new(&rel), 0).is_some() {
            index.remove_path(Path::new(&rel))?;
        } else {
            return Err(Error::ReferenceNotFound(rel));
        }
        index.write()?;
        debug!(path = %rel, "staged");
        Ok(())
    }

    #[instrument(skip_all)]
    fn move_file(&self, src: &Path, dst: &Path) -> Result<()> {
        let src_rel = self.rel(src)?;
        let dst_rel = self.rel(dst)?;
        let src_abs = self.root.join(&src_rel);
        let dst_abs = self.root.join(&dst_rel);

        let mut index = self.repo.index()?;
        let mut entry = index
            .get_path(Path::new(&src_rel), 0)
            .ok_or_else(|| Error::ReferenceNotFound(src_rel.clone()))?;
        if src_abs.symlink_metadata().is_err() {
            return Err(Error::ReferenceNotFound(src_rel));
        }
        if dst_abs.symlink_metadata().is_ok() {
            return Err(Error::io(
                format!("move {src_rel} -> {dst_rel}"),
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        fs::rename(&src_abs, &dst_abs)
            .map_err(|e| Error::io(format!("move {src_rel} -> {dst_rel}"), e))?;

        // Keep the staged blob, as `git mv` does; only the path changes.
        entry.path = dst_rel.clone().into_bytes();
        index.remove_path(Path::new(&src_rel))?;
        index.add(&entry)?;
        index.write()?;
        debug!(from = %src_rel, to = %dst_rel, "moved");
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let parent = match self.head()? {
            Some(head) => Some(head.peel_to_commit()?),
            None => None,
        };
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            return Err(Error::NothingStaged);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        debug!(commit = %oid, "committed");
        Ok(())
    }

    #[instrument(skip_all)]
    fn create_initial_commit(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.write()?;
        match self.commit(message) {
            Err(Error::NothingStaged) => Err(Error::NothingToCommit),
            other => other,
        }
    }

    fn remote_head_branch(&self) -> Option<String> {
        let reference = self
            .repo
            .find_reference(&self.policy.remote_head_ref())
            .ok()?;
        let target = reference.symbolic_target()?;
        let prefix = format!("refs/remotes/{}/", self.policy.remote);
        target.strip_prefix(&prefix).map(str::to_string)
    }

    fn resolve_commit(&self, refname: &str) -> Option<String> {
        let object = self.repo.revparse_single(refname).ok()?;
        let commit = object.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }

    fn diff_stats_between(&self, base: &str) -> Result<DiffStats> {
        let base_id = Oid::from_str(base)?;
        let head = self
            .head()?
            .ok_or_else(|| Error::ReferenceNotFound("HEAD".to_string()))?
            .peel_to_commit()?;
        // Unrelated histories have no merge base; diff against the base itself.
        let from = match self.repo.merge_base(base_id, head.id()) {
            Ok(id) => id,
            Err(e) if e.code() == ErrorCode::NotFound => base_id,
            Err(e) => return Err(e.into()),
        };
        let old_tree = self.repo.find_commit(from)?.tree()?;
        let new_tree = head.tree()?;
        let mut opts = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

        let mut stats = DiffStats::default();
        for idx in 0..diff.deltas().len() {
            let lines = match Patch::from_diff(&diff, idx)? {
                Some(patch) if !patch.delta().flags().is_binary() => {
                    let (_, added, deleted) = patch.line_stats()?;
                    Some((added, deleted))
                }
                _ => None,
            };
            stats.record(lines);
        }
        Ok(stats)
    }
}
