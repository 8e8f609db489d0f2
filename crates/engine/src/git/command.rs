use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

/// Variables git exports to hooks. Left in place they would point nested git
/// invocations at the hook's repository instead of their own working tree.
pub(crate) const HOOK_ENVIRONMENT: &[&str] = &[
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_PREFIX",
    "GIT_OBJECT_DIRECTORY",
    "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    "GIT_QUARANTINE_PATH",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    UnexpectedOutput { command: String, output: String },
}

impl Display for GitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
            GitError::UnexpectedOutput { command, output } => {
                write!(f, "`{command}` produced unexpected output: {}", output.trim())
            }
        }
    }
}

impl Error for GitError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let mut command = Command::new(program);
        command.args(args).current_dir(cwd).stdin(Stdio::null());
        command.env("GIT_TERMINAL_PROMPT", "0");
        for name in HOOK_ENVIRONMENT {
            command.env_remove(name);
        }

        let output = command.output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs git subcommands in one directory.
#[derive(Debug, Clone)]
pub struct Git<E = ProcessCommandExecutor> {
    program: String,
    cwd: PathBuf,
    executor: E,
}

impl Git<ProcessCommandExecutor> {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self::with_executor("git", cwd, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> Git<E> {
    pub fn with_executor(program: impl Into<String>, cwd: impl Into<PathBuf>, executor: E) -> Self {
        Self { program: program.into(), cwd: cwd.into(), executor }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run a subcommand and fail unless it exits 0.
    pub fn run<I, S>(&self, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = collect_args(args);
        let command = self.describe(&args);
        let result = self.execute(&command, &args)?;

        if result.success {
            return Ok(GitOutput { stdout: result.stdout, stderr: result.stderr });
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitError::CommandFailed { command, code: result.code, stderr })
    }

    /// Run a subcommand whose exit status is the answer (`cat-file -e`,
    /// `diff --quiet`). Only a failure to spawn is an error.
    pub fn probe<I, S>(&self, args: I) -> Result<bool, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = collect_args(args);
        let command = self.describe(&args);
        Ok(self.execute(&command, &args)?.success)
    }

    fn execute(&self, command: &str, args: &[String]) -> Result<CommandResult, GitError> {
        debug!(cwd = %self.cwd.display(), %command, "running git");
        self.executor.execute(&self.program, args, &self.cwd).map_err(|error| {
            GitError::SpawnFailed { command: command.to_string(), message: error.to_string() }
        })
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }
}

fn collect_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter().map(|arg| arg.as_ref().to_string_lossy().into_owned()).collect()
}
