// Hands accepted jobs to detached worker processes.
//
// The handler must return while the job is still waiting for its start time,
// so the worker is a separate process in its own process group with no
// handle back to the hook: stdin is closed and both output streams go to a
// per-job log file. Nothing here waits on the child.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, SecondsFormat, Utc};
use jobe_common::job_id::JobId;
use tracing::{debug, info};

use crate::config::JobeConfig;
use crate::error::DispatchError;
use crate::git::command::HOOK_ENVIRONMENT;

/// Overrides the worker executable, mostly for tests and wrapped installs.
pub const WORKER_BIN_ENV: &str = "JOBE_BIN";

/// Everything a worker needs to find and run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub job_id: JobId,
    pub repo_path: PathBuf,
    pub submitted_at: DateTime<Utc>,
    pub verbose: bool,
}

pub trait Dispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for &D {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        (**self).dispatch(request)
    }
}

/// Starts `<program> worker ...` as a detached OS process.
#[derive(Debug, Clone)]
pub struct ProcessDispatcher {
    program: PathBuf,
    log_dir: PathBuf,
}

impl ProcessDispatcher {
    pub fn new(program: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), log_dir: log_dir.into() }
    }

    /// Resolve the worker program from `JOBE_BIN`, the config, then the
    /// running executable.
    pub fn from_config(repo_path: &Path, config: &JobeConfig) -> Result<Self, DispatchError> {
        let program = match std::env::var_os(WORKER_BIN_ENV).filter(|value| !value.is_empty()) {
            Some(explicit) => PathBuf::from(explicit),
            None => match &config.worker_program {
                Some(configured) => configured.clone(),
                None => std::env::current_exe().map_err(DispatchError::WorkerProgram)?,
            },
        };
        Ok(Self::new(program, config.log_dir_for(repo_path)))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn log_path(&self, job_id: &JobId) -> PathBuf {
        self.log_dir.join(format!("{job_id}.log"))
    }

    pub fn worker_args(request: &DispatchRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "worker".into(),
            "--repo".into(),
            request.repo_path.clone().into_os_string(),
            "--submitted-at".into(),
            request.submitted_at.to_rfc3339_opts(SecondsFormat::Micros, true).into(),
        ];
        if request.verbose {
            args.push("--verbose".into());
        }
        args.push(request.job_id.as_str().into());
        args
    }
}

impl Dispatcher for ProcessDispatcher {
    fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        std::fs::create_dir_all(&self.log_dir).map_err(|source| DispatchError::LogFile {
            path: self.log_dir.clone(),
            source,
        })?;
        let log_path = self.log_path(&request.job_id);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| DispatchError::LogFile { path: log_path.clone(), source })?;
        let log_err = log
            .try_clone()
            .map_err(|source| DispatchError::LogFile { path: log_path.clone(), source })?;

        let mut command = Command::new(&self.program);
        command
            .args(Self::worker_args(request))
            .current_dir(&request.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for name in HOOK_ENVIRONMENT {
            command.env_remove(name);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!(program = %self.program.display(), job = %request.job_id, "spawning worker");
        let child = command.spawn().map_err(|source| DispatchError::Spawn {
            job_id: request.job_id.clone(),
            program: self.program.clone(),
            source,
        })?;

        info!(
            job = %request.job_id,
            pid = child.id(),
            log = %log_path.display(),
            "worker dispatched"
        );
        Ok(())
    }
}
