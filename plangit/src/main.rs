//! Command-line driver for the plangit library.
//!
//! Each subcommand opens the repository once, runs one library operation and
//! maps the outcome to a stable exit code (see [`plangit::exit_codes`]).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plangit::config::{BackendKind, CONFIG_FILE_NAME, PlanConfig, load_config, write_config};
use plangit::exit_codes;
use plangit::plan::PlanWorkflow;
use plangit::vcs::Backend;
use plangit::vcs::repo::Repo;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "plangit",
    version,
    about = "Branch, commit and archive plan files in a git repository"
)]
struct Cli {
    /// Directory inside the repository (defaults to the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Config file (defaults to `.plangit.toml` at the repository root).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Switch from a primary branch to the plan's branch, committing the plan.
    Branch { plan: PathBuf },
    /// Move a finished plan into the completed directory and commit.
    Complete { plan: PathBuf },
    /// Create an initial commit if the repository has none.
    Bootstrap {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Print `files additions deletions` between BASE and HEAD.
    DiffStats { base: String },
    /// Print repository and backend details.
    Info,
    /// Append PATTERN to .gitignore unless PROBE is already ignored.
    Ignore { pattern: String, probe: PathBuf },
    /// Write the effective configuration, with every default spelled out.
    InitConfig {
        /// Replace an existing config file.
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    plangit::logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<plangit::Error>() {
        Some(plangit::Error::DirtyWorktree { .. }) => exit_codes::DIRTY_WORKTREE,
        Some(plangit::Error::NoCommitsDeclined) => exit_codes::NO_COMMITS,
        _ => exit_codes::FAILURE,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("read current directory")?;
    let start = match &cli.repo {
        Some(dir) => cwd.join(dir),
        None => cwd.clone(),
    };

    let config_path = match &cli.config {
        Some(path) => cwd.join(path),
        None => {
            let defaults = PlanConfig::default();
            Repo::open(&start, &defaults.backend, &defaults.branches)?
                .root()
                .join(CONFIG_FILE_NAME)
        }
    };
    let file_config = load_config(&config_path)?;
    let mut config = file_config.clone();
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
        config.backend.fallback = false;
    }

    let repo = Repo::open(&start, &config.backend, &config.branches)?;
    debug!(backend = repo.kind().as_str(), config = %config_path.display(), "ready");
    let report = |message: std::fmt::Arguments<'_>| println!("{message}");
    let workflow = PlanWorkflow::new(&repo, &report)
        .with_completed_dir(config.plans.completed_dir.clone());

    match cli.command {
        Command::Branch { plan } => workflow.create_branch_for_plan(&cwd.join(plan))?,
        Command::Complete { plan } => workflow.move_plan_to_completed(&cwd.join(plan))?,
        Command::Bootstrap { yes } => workflow.ensure_has_commits(|| yes || confirm_stdin())?,
        Command::DiffStats { base } => {
            let stats = repo.diff_stats(&base)?;
            println!("{} {} {}", stats.files, stats.additions, stats.deletions);
        }
        Command::Info => print_info(&repo)?,
        Command::Ignore { pattern, probe } => {
            workflow.ensure_ignored(&pattern, &cwd.join(probe))?;
        }
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to rewrite it)",
                    config_path.display()
                );
            }
            write_config(&config_path, &file_config)?;
            println!("wrote {}", config_path.display());
        }
    }
    Ok(())
}

fn print_info(repo: &Repo) -> Result<()> {
    let head = if repo.has_commits()? {
        repo.head_hash()?
    } else {
        "(no commits)".to_string()
    };
    let branch = repo.current_branch()?;
    println!("root: {}", repo.root().display());
    println!("backend: {}", repo.kind().as_str());
    println!("head: {head}");
    println!(
        "branch: {}",
        if branch.is_empty() { "(detached)" } else { &branch }
    );
    println!("default branch: {}", repo.default_branch());
    println!("dirty: {}", repo.is_dirty()?);
    Ok(())
}

fn confirm_stdin() -> bool {
    print!("repository has no commits. create an initial commit now? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
