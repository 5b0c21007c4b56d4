//! Plan file lifecycle on top of a [`Backend`].
//!
//! Multi-step operations here are not transactional. Each step is a separate
//! mutation, and re-running an operation after a partial failure converges:
//! a second `create_branch_for_plan` checks out the branch it already created
//! and re-evaluates whether the plan still needs committing, and a second
//! `move_plan_to_completed` commits a move that already happened on disk.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::branch_name::branch_name_for_plan;
use crate::error::{Error, Result};
use crate::vcs::Backend;

/// Fire-and-forget progress sink for user-facing messages.
pub trait Progress {
    fn report(&self, message: fmt::Arguments<'_>);
}

impl<F> Progress for F
where
    F: Fn(fmt::Arguments<'_>),
{
    fn report(&self, message: fmt::Arguments<'_>) {
        self(message);
    }
}

/// Forwards progress to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn report(&self, message: fmt::Arguments<'_>) {
        info!("{message}");
    }
}

pub const DEFAULT_COMPLETED_DIR: &str = "completed";
pub const INITIAL_COMMIT_MESSAGE: &str = "initial commit";

pub struct PlanWorkflow<'a> {
    repo: &'a dyn Backend,
    progress: &'a dyn Progress,
    completed_dir: String,
}

impl<'a> PlanWorkflow<'a> {
    pub fn new(repo: &'a dyn Backend, progress: &'a dyn Progress) -> Self {
        Self {
            repo,
            progress,
            completed_dir: DEFAULT_COMPLETED_DIR.to_string(),
        }
    }

    /// Directory name, next to the plan file, that finished plans move into.
    pub fn with_completed_dir(mut self, dir: impl Into<String>) -> Self {
        self.completed_dir = dir.into();
        self
    }

    /// Move off a primary branch onto the plan's own branch.
    ///
    /// Does nothing when already on a non-primary branch. Refuses with
    /// [`Error::DirtyWorktree`] when anything besides the plan file is
    /// uncommitted. If the plan file itself has changes it is committed on
    /// the target branch.
    #[instrument(skip_all, fields(plan = %plan.display()))]
    pub fn create_branch_for_plan(&self, plan: &Path) -> Result<()> {
        if !self.repo.is_main_branch()? {
            debug!("already on a feature branch");
            return Ok(());
        }

        let branch = branch_name_for_plan(plan);
        if self.repo.has_changes_other_than(plan)? {
            return Err(Error::DirtyWorktree {
                message: dirty_worktree_message(&branch, plan),
                branch,
            });
        }

        let plan_changed = self.repo.file_has_changes(plan)?;

        if self.repo.branch_exists(&branch) {
            self.progress
                .report(format_args!("switching to existing branch: {branch}"));
            self.repo.checkout_branch(&branch)?;
        } else {
            self.progress
                .report(format_args!("creating branch: {branch}"));
            self.repo.create_branch(&branch)?;
        }

        if plan_changed {
            self.repo.add(plan)?;
            self.repo.commit(&format!("add plan: {branch}"))?;
            info!(branch = %branch, "committed plan file");
        }
        Ok(())
    }

    /// Move a finished plan into the completed directory and commit the move.
    #[instrument(skip_all, fields(plan = %plan.display()))]
    pub fn move_plan_to_completed(&self, plan: &Path) -> Result<()> {
        let src = self.absolute(plan);
        let (Some(dir), Some(file_name)) = (src.parent(), src.file_name()) else {
            return Err(Error::PathViolation {
                path: plan.to_path_buf(),
                root: self.repo.root().to_path_buf(),
            });
        };
        let completed = dir.join(&self.completed_dir);
        fs::create_dir_all(&completed)
            .map_err(|e| Error::io(format!("create {}", completed.display()), e))?;
        let dst = completed.join(file_name);

        if !src.exists() && dst.exists() {
            debug!("plan already moved, staging and committing");
            self.repo.add(&dst)?;
            // Records a tracked deletion; fails once the deletion is already staged.
            if let Err(err) = self.repo.add(&src) {
                debug!(err = %err, "source not staged for removal");
            }
        } else {
            match self.repo.move_file(&src, &dst) {
                Ok(()) => {}
                Err(Error::ReferenceNotFound(what)) => {
                    debug!(source = %what, "plan is untracked, renaming on disk");
                    self.rename_untracked(&src, &dst)?;
                }
                Err(err) => return Err(err),
            }
        }

        let name = file_name.to_string_lossy();
        self.repo.commit(&format!("move completed plan: {name}"))?;
        self.progress.report(format_args!(
            "moved plan to {}",
            dst.strip_prefix(self.repo.root()).unwrap_or(&dst).display()
        ));
        Ok(())
    }

    /// Make sure HEAD is born, asking `confirm` before creating a commit.
    #[instrument(skip_all)]
    pub fn ensure_has_commits(&self, confirm: impl FnOnce() -> bool) -> Result<()> {
        if self.repo.has_commits()? {
            return Ok(());
        }
        if !confirm() {
            return Err(Error::NoCommitsDeclined);
        }
        self.repo.create_initial_commit(INITIAL_COMMIT_MESSAGE)?;
        self.progress.report(format_args!("created initial commit"));
        Ok(())
    }

    /// Append `pattern` to the root `.gitignore` unless `probe` is already ignored.
    ///
    /// Returns whether the file was changed.
    #[instrument(skip_all, fields(pattern = pattern))]
    pub fn ensure_ignored(&self, pattern: &str, probe: &Path) -> Result<bool> {
        if self.repo.is_ignored(probe)? {
            debug!("already ignored");
            return Ok(false);
        }
        let path = self.repo.root().join(".gitignore");
        let needs_newline = match fs::read(&path) {
            Ok(existing) => existing.last().is_some_and(|b| *b != b'\n'),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::io(format!("read {}", path.display()), e)),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(format!("open {}", path.display()), e))?;
        let line = if needs_newline {
            format!("\n{pattern}\n")
        } else {
            format!("{pattern}\n")
        };
        file.write_all(line.as_bytes())
            .map_err(|e| Error::io(format!("append {}", path.display()), e))?;
        self.progress
            .report(format_args!("added {pattern} to .gitignore"));
        Ok(true)
    }

    fn rename_untracked(&self, src: &Path, dst: &Path) -> Result<()> {
        let context = || format!("rename {} to {}", src.display(), dst.display());
        if dst.exists() {
            return Err(Error::io(
                context(),
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        fs::rename(src, dst).map_err(|e| Error::io(context(), e))?;
        if let Err(err) = self.repo.add(dst) {
            warn!(path = %dst.display(), err = %err, "failed to stage moved plan");
        }
        Ok(())
    }

    fn absolute(&self, plan: &Path) -> PathBuf {
        if plan.is_absolute() {
            plan.to_path_buf()
        } else {
            self.repo.root().join(plan)
        }
    }
}

fn dirty_worktree_message(branch: &str, plan: &Path) -> String {
    format!(
        "cannot create branch {branch}: the worktree has uncommitted changes besides {}\n\
         \n\
         switching branches would carry those uncommitted changes along.\n\
         to continue, either:\n  \
         - stash them: git stash push --include-untracked\n  \
         - commit them first\n  \
         - or run in review-only mode, which works on the current branch",
        plan.display()
    )
}
