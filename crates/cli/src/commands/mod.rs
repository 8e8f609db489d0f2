// CLI subcommand dispatch.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use jobe_engine::config::JobeConfig;
use jobe_engine::git::{GitRepo, ProcessCommandExecutor};

pub mod hook;
pub mod init;
pub mod jobs;
pub mod show;
pub mod worker;

#[derive(Subcommand)]
pub enum Command {
    /// Create a job repository with its push hook and baseline
    Init(init::InitArgs),
    /// Handle a push (run by the repository's post-receive hook)
    Hook(hook::HookArgs),
    /// Run one job (started in the background by `hook`)
    Worker(worker::WorkerArgs),
    /// List jobs and their status
    Jobs(jobs::JobsArgs),
    /// Show the result of one job
    Show(show::ShowArgs),
}

impl Command {
    /// Log level used when neither `--verbose` nor `RUST_LOG` is given. Hook
    /// output is relayed to the pushing client, so it stays quiet.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Command::Worker(_) => "info",
            Command::Init(_) | Command::Hook(_) | Command::Jobs(_) | Command::Show(_) => "warn",
        }
    }
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args),
        Command::Hook(args) => hook::run(args),
        Command::Worker(args) => worker::run(args),
        Command::Jobs(args) => jobs::run(args),
        Command::Show(args) => show::run(args),
    }
}

/// The path does not hold a git repository.
#[derive(Debug)]
pub struct RepositoryNotFound {
    pub path: PathBuf,
}

impl fmt::Display for RepositoryNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no job repository found at `{}`", self.path.display())
    }
}

impl std::error::Error for RepositoryNotFound {}

/// An opened job repository and its configuration.
pub struct Store {
    pub path: PathBuf,
    pub config: JobeConfig,
    pub repo: GitRepo<ProcessCommandExecutor>,
}

/// Open the repository at `path` (default: the current directory).
pub fn open_store(path: Option<PathBuf>) -> anyhow::Result<Store> {
    let path = resolve_path(path)?;
    let config = JobeConfig::load(&path)
        .with_context(|| format!("failed to load config for `{}`", path.display()))?;
    let repo = GitRepo::with_executor(&path, &config.git_program, ProcessCommandExecutor);
    if repo.verify().is_err() {
        return Err(RepositoryNotFound { path }.into());
    }
    Ok(Store { path, config, repo })
}

pub fn resolve_path(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let provided = path.unwrap_or_else(|| PathBuf::from("."));
    let absolute = if provided.is_absolute() {
        provided
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(provided))
            .context("failed to resolve current working directory")?
    };
    Ok(normalize(&absolute))
}

/// Drop `.` components so paths handed to workers and printed to users are
/// clean. `..` is left alone.
fn normalize(path: &Path) -> PathBuf {
    path.components().filter(|component| !matches!(component, Component::CurDir)).collect()
}
