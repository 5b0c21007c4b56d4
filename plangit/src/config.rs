//! Configuration stored in `.plangit.toml` at the repository root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::vcs::BranchPolicy;
use crate::vcs::external::GitCommand;

/// File name looked up at the repository root when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = ".plangit.toml";

/// plangit configuration (TOML).
///
/// Missing fields default to the values below, so an empty or absent file is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PlanConfig {
    pub backend: BackendConfig,
    pub branches: BranchPolicy,
    pub plans: PlansConfig,
}

/// Which backend implementation to bind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process through libgit2.
    #[default]
    Embedded,
    /// Subprocess calls to the `git` binary.
    External,
}

impl BackendKind {
    pub fn other(self) -> Self {
        match self {
            BackendKind::Embedded => BackendKind::External,
            BackendKind::External => BackendKind::Embedded,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Embedded => "embedded",
            BackendKind::External => "external",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Try the other backend when `kind` fails to open the repository.
    pub fallback: bool,

    /// Program used by the external backend.
    pub git_binary: PathBuf,

    /// Per-invocation deadline for the external backend.
    pub command_timeout_secs: u64,

    /// Captured stdout/stderr beyond this many bytes is discarded.
    pub output_limit_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            fallback: true,
            git_binary: PathBuf::from("git"),
            command_timeout_secs: 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl BackendConfig {
    /// Ordered list of backends `Repo::open` tries.
    pub fn candidates(&self) -> Vec<BackendKind> {
        if self.fallback {
            vec![self.kind, self.kind.other()]
        } else {
            vec![self.kind]
        }
    }

    pub fn git_command(&self) -> GitCommand {
        GitCommand {
            binary: self.git_binary.clone(),
            timeout: Duration::from_secs(self.command_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlansConfig {
    /// Directory, next to the plan file, that finished plans move into.
    pub completed_dir: String,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            completed_dir: "completed".to_string(),
        }
    }
}

impl PlanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend.git_binary.as_os_str().is_empty() {
            return Err(anyhow!("backend.git_binary must not be empty"));
        }
        if self.backend.command_timeout_secs == 0 {
            return Err(anyhow!("backend.command_timeout_secs must be > 0"));
        }
        if self.backend.output_limit_bytes == 0 {
            return Err(anyhow!("backend.output_limit_bytes must be > 0"));
        }
        self.branches.validate()?;
        let dir = self.plans.completed_dir.trim();
        if dir.is_empty() || dir == "." || dir == ".." {
            return Err(anyhow!("plans.completed_dir must name a directory"));
        }
        if dir.contains('/') || dir.contains('\\') {
            return Err(anyhow!(
                "plans.completed_dir must not contain path separators"
            ));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlanConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlanConfig> {
    if !path.exists() {
        let cfg = PlanConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlanConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlanConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
