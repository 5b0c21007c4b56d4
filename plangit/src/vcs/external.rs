//! Backend driving the `git` command-line tool.
//!
//! Every call runs with the repository root as working directory and a fixed
//! `C` locale so diagnostic text can be classified (see
//! [`crate::core::diagnostics`]). Machine-oriented formats are used wherever
//! git offers one: porcelain v1 status, `--numstat`, full ref names.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, trace};

use super::process::{CancelToken, CommandOutput, Interrupted, run_command};
use super::{Backend, BranchPolicy, DiffStats, normalize_path};
use crate::core::diagnostics::{Benign, Probe, classify};
use crate::core::numstat::parse_numstat;
use crate::core::porcelain::{StatusEntry, parse_status};
use crate::error::{Error, Result};

/// Environment applied to every git invocation.
const GIT_ENV: &[(&str, &str)] = &[
    ("LC_ALL", "C"),
    ("LANG", "C"),
    ("LANGUAGE", "C"),
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_OPTIONAL_LOCKS", "0"),
    ("GIT_LITERAL_PATHSPECS", "1"),
];

/// How the git binary is invoked.
#[derive(Debug, Clone)]
pub struct GitCommand {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: Duration::from_secs(60),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Backend that shells out to `git` and parses its output.
#[derive(Debug)]
pub struct ExternalBackend {
    root: PathBuf,
    policy: BranchPolicy,
    git: GitCommand,
    cancel: Option<CancelToken>,
}

impl ExternalBackend {
    /// Locate the working tree containing `path` with `git rev-parse --show-toplevel`.
    pub fn open(path: &Path, policy: BranchPolicy, git: GitCommand) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRepository {
            path: path.to_path_buf(),
            reason,
        };
        if !path.exists() {
            return Err(invalid("path does not exist".to_string()));
        }
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };
        let args = ["rev-parse", "--show-toplevel"];
        let out = exec(&git, dir, &args, None)?;
        if !out.status.success() {
            return Err(invalid(out.stderr_text().trim().to_string()));
        }
        let toplevel = out.stdout_text().trim().to_string();
        if toplevel.is_empty() {
            return Err(invalid("no working tree".to_string()));
        }
        let root = fs::canonicalize(&toplevel)
            .map_err(|e| Error::io(format!("canonicalize {toplevel}"), e))?;
        debug!(root = %root.display(), "opened repository via git binary");
        Ok(Self {
            root,
            policy,
            git,
            cancel: None,
        })
    }

    /// Abort in-flight and future git calls once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn rel(&self, path: &Path) -> Result<String> {
        normalize_path(&self.root, path)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        exec(&self.git, &self.root, args, self.cancel.as_ref())
    }

    /// Run and require a zero exit; returns stdout.
    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let out = self.run(args)?;
        if !out.status.success() {
            return Err(Error::command(args, out.stderr_text()));
        }
        if out.stdout_truncated > 0 {
            return Err(Error::command(
                args,
                format!(
                    "output truncated: {} bytes over the {}-byte limit",
                    out.stdout_truncated, self.git.output_limit_bytes
                ),
            ));
        }
        Ok(out.stdout_text())
    }

    fn status(&self, args: &[&str]) -> Result<Vec<StatusEntry>> {
        let stdout = self.run_checked(args)?;
        parse_status(&stdout).map_err(|msg| Error::command(args, msg))
    }

    /// `Some(id)` for a born HEAD, `None` for an empty repository.
    fn head_id(&self) -> Result<Option<String>> {
        let args = ["rev-parse", "HEAD"];
        let out = self.run(&args)?;
        if out.status.success() {
            let id = out.stdout_text().trim().to_string();
            self.verify_commit(&id)?;
            return Ok(Some(id));
        }
        let stderr = out.stderr_text();
        match classify(Probe::HeadLookup, &stderr) {
            Some(Benign::EmptyRepository) => Ok(None),
            _ => Err(Error::command(&args, stderr)),
        }
    }

    /// `rev-parse HEAD` trusts the ref file; the object itself must exist.
    fn verify_commit(&self, id: &str) -> Result<()> {
        let object = format!("{id}^{{commit}}");
        let args = ["cat-file", "-e", object.as_str()];
        let out = self.run(&args)?;
        if out.status.success() {
            return Ok(());
        }
        let stderr = out.stderr_text();
        if stderr.trim().is_empty() {
            return Err(Error::command(&args, format!("HEAD points at missing commit {id}")));
        }
        Err(Error::command(&args, stderr))
    }

    /// `true` when the diff between the index and HEAD is empty.
    fn stage_is_empty(&self) -> Result<bool> {
        let args = ["diff", "--cached", "--quiet"];
        let out = self.run(&args)?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::command(&args, out.stderr_text())),
        }
    }
}

fn exec(
    git: &GitCommand,
    cwd: &Path,
    args: &[&str],
    cancel: Option<&CancelToken>,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(&git.binary);
    cmd.args(args).current_dir(cwd);
    for (key, value) in GIT_ENV {
        cmd.env(key, value);
    }
    trace!(args = ?args, "git");
    run_command(cmd, git.timeout, git.output_limit_bytes, cancel).map_err(|reason| match reason {
        Interrupted::Cancelled => Error::Cancelled {
            command: args.join(" "),
        },
        Interrupted::TimedOut => Error::command(
            args,
            format!("timed out after {}s", git.timeout.as_secs()),
        ),
        Interrupted::Spawn(e) => Error::io(
            format!("spawn {} {}", git.binary.display(), args.join(" ")),
            e,
        ),
        Interrupted::Wait(e) => Error::io(format!("wait for git {}", args.join(" ")), e),
        Interrupted::Read(e) => Error::io(format!("read output of git {}", args.join(" ")), e),
    })
}

impl Backend for ExternalBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn policy(&self) -> &BranchPolicy {
        &self.policy
    }

    fn head_hash(&self) -> Result<String> {
        self.head_id()?
            .ok_or_else(|| Error::ReferenceNotFound("HEAD".to_string()))
    }

    fn has_commits(&self) -> Result<bool> {
        Ok(self.head_id()?.is_some())
    }

    fn current_branch(&self) -> Result<String> {
        let args = ["symbolic-ref", "HEAD"];
        let out = self.run(&args)?;
        if out.status.success() {
            let full = out.stdout_text().trim().to_string();
            return Ok(full
                .strip_prefix("refs/heads/")
                .map(str::to_string)
                .unwrap_or(full));
        }
        let stderr = out.stderr_text();
        match classify(Probe::SymbolicHead, &stderr) {
            Some(Benign::DetachedHead) => Ok(String::new()),
            _ => Err(Error::command(&args, stderr)),
        }
    }

    fn branch_exists(&self, name: &str) -> bool {
        let refname = format!("refs/heads/{name}");
        self.run(&["show-ref", "--verify", "--quiet", &refname])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    #[instrument(skip_all, fields(branch = name))]
    fn create_branch(&self, name: &str) -> Result<()> {
        if self.branch_exists(name) {
            return Err(Error::BranchExists(name.to_string()));
        }
        self.run_checked(&["checkout", "-b", name])?;
        debug!("created and switched branch");
        Ok(())
    }

    #[instrument(skip_all, fields(branch = name))]
    fn checkout_branch(&self, name: &str) -> Result<()> {
        if !self.branch_exists(name) {
            return Err(Error::ReferenceNotFound(format!("refs/heads/{name}")));
        }
        self.run_checked(&["checkout", name, "--"])?;
        debug!("checked out branch");
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        let entries = self.status(&["status", "--porcelain=v1", "--untracked-files=no"])?;
        Ok(entries.iter().any(StatusEntry::is_tracked_change))
    }

    fn file_has_changes(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        let entries = self.status(&[
            "status",
            "--porcelain=v1",
            "--untracked-files=all",
            "--",
            &rel,
        ])?;
        Ok(entries.iter().any(|e| !e.is_ignored()))
    }

    fn has_changes_other_than(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        let entries = self.status(&["status", "--porcelain=v1", "--untracked-files=all"])?;
        Ok(entries.iter().any(|e| !e.is_ignored() && e.path != rel))
    }

    fn is_ignored(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        let args = ["check-ignore", "--quiet", "--no-index", "--", &rel];
        let out = self.run(&args)?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::command(&args, out.stderr_text())),
        }
    }

    #[instrument(skip_all)]
    fn add(&self, path: &Path) -> Result<()> {
        let rel = self.rel(path)?;
        self.run_checked(&["add", "--", &rel])?;
        debug!(path = %rel, "staged");
        Ok(())
    }

    #[instrument(skip_all)]
    fn move_file(&self, src: &Path, dst: &Path) -> Result<()> {
        let src_rel = self.rel(src)?;
        let dst_rel = self.rel(dst)?;
        let tracked = self.run(&["ls-files", "--error-unmatch", "--", &src_rel])?;
        if !tracked.status.success() {
            return Err(Error::ReferenceNotFound(src_rel));
        }
        self.run_checked(&["mv", "--", &src_rel, &dst_rel])?;
        debug!(from = %src_rel, to = %dst_rel, "moved");
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit(&self, message: &str) -> Result<()> {
        if self.stage_is_empty()? {
            return Err(Error::NothingStaged);
        }
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        debug!("committed");
        Ok(())
    }

    #[instrument(skip_all)]
    fn create_initial_commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["add", "--all"])?;
        match self.commit(message) {
            Err(Error::NothingStaged) => Err(Error::NothingToCommit),
            other => other,
        }
    }

    fn remote_head_branch(&self) -> Option<String> {
        let remote_head = self.policy.remote_head_ref();
        let out = self
            .run(&["symbolic-ref", "--quiet", &remote_head])
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let prefix = format!("refs/remotes/{}/", self.policy.remote);
        out.stdout_text()
            .trim()
            .strip_prefix(&prefix)
            .map(str::to_string)
    }

    fn resolve_commit(&self, refname: &str) -> Option<String> {
        let spec = format!("{refname}^{{commit}}");
        let out = self
            .run(&["rev-parse", "--verify", "--quiet", &spec])
            .ok()?;
        if !out.status.success() {
            return None;
        }
        Some(out.stdout_text().trim().to_string())
    }

    fn diff_stats_between(&self, base: &str) -> Result<DiffStats> {
        let merge_base = self.run(&["merge-base", base, "HEAD"])?;
        // Exit 1 means unrelated histories; diff against the base itself.
        let from = match merge_base.status.code() {
            Some(0) => merge_base.stdout_text().trim().to_string(),
            Some(1) => base.to_string(),
            _ => {
                return Err(Error::command(
                    &["merge-base", base, "HEAD"],
                    merge_base.stderr_text(),
                ));
            }
        };
        let args = [
            "diff",
            "--numstat",
            "--no-renames",
            "--no-textconv",
            "--no-ext-diff",
            &from,
            "HEAD",
        ];
        let stdout = self.run_checked(&args)?;
        parse_numstat(&stdout).map_err(|msg| Error::command(&args, msg))
    }
}
