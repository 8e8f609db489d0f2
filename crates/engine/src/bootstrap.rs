// Creating a job store: a bare repository whose intake branch holds the
// baseline commit, a `jobe.toml`, and the push hook that runs the handler.

use std::io;
use std::path::{Path, PathBuf};

use jobe_common::descriptor::baseline_template;
use thiserror::Error;
use tracing::info;

use crate::config::{config_path, ConfigError, JobeConfig};
use crate::git::{CommitIdentity, Git, GitError, GitRepo, ProcessCommandExecutor, PushRef};

pub const HOOK_NAME: &str = "post-receive";

const SCRATCH_PREFIX: &str = "jobe-init-";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("cannot prepare `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("git failed while creating the store")]
    Git(#[from] GitError),

    #[error("cannot write the repository config")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReport {
    pub path: PathBuf,
    /// Baseline commit on the intake branch. `None` if the branch existed.
    pub seeded: Option<String>,
    pub hook: Option<PathBuf>,
}

/// Create (or complete) a job store at `path`.
///
/// Safe to rerun: an existing repository, config file or intake branch is
/// kept as is. `hook_program` is the `jobe` binary the hook should exec; no
/// hook is installed without one.
pub fn init_store(
    path: &Path,
    config: &JobeConfig,
    hook_program: Option<&Path>,
) -> Result<StoreReport, BootstrapError> {
    std::fs::create_dir_all(path)
        .map_err(|source| BootstrapError::Io { path: path.to_path_buf(), source })?;

    let git = Git::with_executor(&config.git_program, path, ProcessCommandExecutor);
    git.run(["init", "--bare", "--quiet", "."])?;
    let head = format!("refs/heads/{}", config.intake_branch);
    git.run(["symbolic-ref", "HEAD", head.as_str()])?;

    let config_file = config_path(path);
    if !config_file.exists() {
        config.save_to(&config_file)?;
    }

    let repo = GitRepo::with_executor(path, &config.git_program, ProcessCommandExecutor);
    let seeded = match repo.branch_head(&config.intake_branch)? {
        Some(_) => None,
        None => Some(seed_baseline(&repo, config)?),
    };

    let hook = match hook_program {
        Some(program) => Some(install_hook(path, program)?),
        None => None,
    };

    info!(path = %path.display(), ?seeded, "job store ready");
    Ok(StoreReport { path: path.to_path_buf(), seeded, hook })
}

fn seed_baseline(repo: &GitRepo, config: &JobeConfig) -> Result<String, BootstrapError> {
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir()
        .map_err(|source| BootstrapError::Io { path: std::env::temp_dir(), source })?;
    let workspace =
        repo.clone_workspace(scratch.path(), CommitIdentity::from(&config.identity))?;

    workspace.write_file(&config.descriptor_file, baseline_template()).map_err(|source| {
        BootstrapError::Io { path: scratch.path().join(&config.descriptor_file), source }
    })?;
    workspace.add(&[config.descriptor_file.as_str()])?;
    let commit = workspace.commit("jobe: baseline")?;

    let intake = format!("refs/heads/{}", config.intake_branch);
    workspace.push(&[PushRef::create("HEAD", intake)])?;
    Ok(commit)
}

/// Write an executable `hooks/post-receive` that hands every push to
/// `<program> hook`.
pub fn install_hook(repo_path: &Path, program: &Path) -> Result<PathBuf, BootstrapError> {
    let hooks = repo_path.join("hooks");
    let hook_path = hooks.join(HOOK_NAME);
    let io_error = |source| BootstrapError::Io { path: hook_path.clone(), source };

    std::fs::create_dir_all(&hooks).map_err(io_error)?;
    std::fs::write(&hook_path, hook_script(program)).map_err(io_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755))
            .map_err(io_error)?;
    }
    Ok(hook_path)
}

fn hook_script(program: &Path) -> String {
    let quoted = program.to_string_lossy().replace('\'', r"'\''");
    format!("#!/bin/sh\n# Installed by `jobe init`.\nexec '{quoted}' hook\n")
}
