// Runs the job command.
//
// Output goes straight to files rather than pipes, so a command that fills
// its output can never stall on a reader. The command leads its own process
// group; on timeout the whole group is killed, which takes anything the
// shell forked along with it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::git::command::HOOK_ENVIRONMENT;

/// Where the command's output streams are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command finished on its own. `code` is `None` when it died from
    /// `signal`.
    Exited { code: Option<i32>, signal: Option<i32> },
    /// The time limit expired and the command was killed.
    TimedOut,
}

/// Run `<shell> -c <command>` in `cwd`, bounded by `limit` when given.
///
/// An error means the command could not be started or waited on at all.
pub async fn run_command(
    shell: &str,
    command: &str,
    cwd: &Path,
    output: &OutputPaths,
    limit: Option<Duration>,
) -> io::Result<CommandOutcome> {
    let stdout = File::create(&output.stdout)?;
    let stderr = File::create(&output.stderr)?;

    let mut process = Command::new(shell);
    process
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    for name in HOOK_ENVIRONMENT {
        process.env_remove(name);
    }
    #[cfg(unix)]
    {
        process.process_group(0);
    }

    let mut child = process.spawn()?;
    debug!(pid = child.id(), %command, "job command started");

    let Some(limit) = limit else {
        return child.wait().await.map(exited);
    };
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => status.map(exited),
        Err(_) => {
            kill_group(&mut child).await;
            Ok(CommandOutcome::TimedOut)
        }
    }
}

fn exited(status: ExitStatus) -> CommandOutcome {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;
    CommandOutcome::Exited { code: status.code(), signal }
}

async fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(errno) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(pid, %errno, "failed to kill job process group");
            }
        }
    }
    if let Err(error) = child.kill().await {
        debug!(%error, "job command already gone");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn paths(dir: &Path) -> OutputPaths {
        OutputPaths { stdout: dir.join("stdout.log"), stderr: dir.join("stderr.log") }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = paths(dir.path());

        let outcome = run_command("sh", "echo hello; echo oops >&2", dir.path(), &output, None)
            .await
            .unwrap();

        assert_eq!(outcome, CommandOutcome::Exited { code: Some(0), signal: None });
        assert_eq!(std::fs::read_to_string(&output.stdout).unwrap(), "hello\n");
        assert_eq!(std::fs::read_to_string(&output.stderr).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_command("sh", "exit 3", dir.path(), &paths(dir.path()), None)
            .await
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Exited { code: Some(3), signal: None });
    }

    #[tokio::test]
    async fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "payload").unwrap();
        let output = paths(dir.path());

        run_command("sh", "cat input.txt", dir.path(), &output, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&output.stdout).unwrap(), "payload");
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();

        let outcome = run_command(
            "sh",
            "echo partial; sleep 100",
            dir.path(),
            &paths(dir.path()),
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();

        assert_eq!(outcome, CommandOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
        let stdout = std::fs::read_to_string(dir.path().join("stdout.log")).unwrap();
        assert_eq!(stdout, "partial\n");
    }

    #[tokio::test]
    async fn missing_shell_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            run_command("/no/such/shell", "true", dir.path(), &paths(dir.path()), None).await;
        assert!(result.is_err());
    }
}
