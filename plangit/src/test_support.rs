//! Test-only helpers for building repositories in known states.
//!
//! Fixtures are built with the `git` binary so neither backend under test
//! participates in producing the state it is asked about.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::config::{BackendConfig, BackendKind};
use crate::vcs::BranchPolicy;
use crate::vcs::repo::Repo;

/// A throwaway repository in a temp directory.
pub struct TestRepo {
    dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Empty repository whose HEAD points at the unborn `main` branch.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize tempdir");
        let repo = Self { dir, root };
        repo.git(&["init", "--quiet"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "Plangit Test"]);
        repo.git(&["config", "user.email", "test@plangit.invalid"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "core.autocrlf", "false"]);
        repo
    }

    /// Repository on `main` with one commit containing `README.md`.
    pub fn with_initial_commit() -> Self {
        let repo = Self::new();
        repo.write("README.md", "# test\n");
        repo.commit_all("initial commit");
        repo
    }

    /// Path as handed out by the temp dir (may contain symlinks).
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Canonical root, as reported by the backends.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Run git in the repository and return trimmed stdout. Panics on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .expect("spawn git");
        assert!(
            out.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.join(rel)).expect("read file")
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "--all"]);
        self.git(&["commit", "--quiet", "-m", message]);
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn current_branch(&self) -> String {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn last_commit_message(&self) -> String {
        self.git(&["log", "-1", "--format=%s"])
    }

    pub fn commit_count(&self) -> usize {
        self.git(&["rev-list", "--count", "HEAD"])
            .parse()
            .expect("commit count")
    }

    /// Open with one backend and no fallback.
    pub fn open(&self, kind: BackendKind) -> Repo {
        let config = BackendConfig {
            kind,
            fallback: false,
            ..BackendConfig::default()
        };
        Repo::open(self.path(), &config, &BranchPolicy::default()).expect("open repo")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Both backend kinds, for parity loops.
pub const BACKENDS: [BackendKind; 2] = [BackendKind::Embedded, BackendKind::External];

/// A named fixture state.
pub struct Fixture {
    pub name: &'static str,
    pub repo: TestRepo,
}

/// Committed repository with no pending changes.
pub fn clean() -> TestRepo {
    let repo = TestRepo::with_initial_commit();
    repo.write("docs/plans/2024-01-15-my-feature.md", "# plan\n");
    repo.commit_all("add plan");
    repo
}

/// One modified and one staged tracked file.
pub fn dirty_tracked() -> TestRepo {
    let repo = clean();
    repo.write("README.md", "# changed\n");
    repo.write("src/lib.rs", "pub fn f() {}\n");
    repo.git(&["add", "src/lib.rs"]);
    repo
}

/// Only untracked files, one nested in a new directory.
pub fn untracked_only() -> TestRepo {
    let repo = clean();
    repo.write("notes.txt", "scratch\n");
    repo.write("scratch/deep/more.txt", "scratch\n");
    repo
}

/// Ignore rules committed, ignored files present, one ignored path tracked.
pub fn ignored() -> TestRepo {
    let repo = TestRepo::with_initial_commit();
    repo.write("tracked.log", "tracked before ignore\n");
    repo.commit_all("track a log");
    repo.write(".gitignore", "*.log\ntarget/\n");
    repo.commit_all("ignore logs");
    repo.write("debug.log", "noise\n");
    repo.write("target/out.bin", "bin\n");
    repo
}

/// HEAD detached at the previous commit.
pub fn detached() -> TestRepo {
    let repo = clean();
    repo.git(&["checkout", "--quiet", "--detach", "HEAD~1"]);
    repo
}

/// On `feature` with one extra commit on top of `main`.
pub fn feature_branch() -> TestRepo {
    let repo = clean();
    repo.git(&["checkout", "--quiet", "-b", "feature"]);
    repo.write("feature.txt", "a\nb\nc\n");
    repo.commit_all("feature work");
    repo
}

/// `main` points at a commit id with no object behind it.
pub fn corrupt_head() -> TestRepo {
    let repo = clean();
    fs::write(
        repo.join(".git/refs/heads/main"),
        format!("{}\n", "1".repeat(40)),
    )
    .expect("write ref");
    repo
}

/// No commits at all.
pub fn empty() -> TestRepo {
    TestRepo::new()
}

/// Every parity fixture, each in its own repository.
pub fn all_fixtures() -> Vec<Fixture> {
    vec![
        Fixture { name: "clean", repo: clean() },
        Fixture { name: "dirty-tracked", repo: dirty_tracked() },
        Fixture { name: "untracked-only", repo: untracked_only() },
        Fixture { name: "ignored", repo: ignored() },
        Fixture { name: "detached", repo: detached() },
        Fixture { name: "feature-branch", repo: feature_branch() },
        Fixture { name: "empty", repo: empty() },
    ]
}
