// The execution worker: one detached process per accepted job.
//
// It clones the job branch into a private workspace, sleeps until the
// scheduled start, runs the command, and appends exactly one result commit
// to the job branch. Nothing here is reported back to the client; a
// `Failed` run only leaves a trace in the worker's log.

pub mod exec;
pub mod schedule;

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use jobe_common::descriptor::{read_descriptor, JobSpec, MalformedDescriptor};
use jobe_common::job_id::JobId;
use jobe_common::result::{JobStatus, ResultRecord};
use tracing::{error, info, warn};

use crate::config::JobeConfig;
use crate::error::WorkerError;
use crate::git::{
    CommandExecutor, CommitIdentity, GitRepo, ProcessCommandExecutor, PushRef, Workspace,
};
use exec::{run_command, CommandOutcome, OutputPaths};

const SCRATCH_PREFIX: &str = "jobe-work-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    WorkspacePrepared,
    Waiting,
    Running,
    ResultCommitted,
    Failed,
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Spawned => "spawned",
            WorkerState::WorkspacePrepared => "workspace_prepared",
            WorkerState::Waiting => "waiting",
            WorkerState::Running => "running",
            WorkerState::ResultCommitted => "result_committed",
            WorkerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a worker run ended.
#[derive(Debug)]
pub struct WorkerReport {
    pub job_id: JobId,
    /// Either `ResultCommitted` or `Failed`.
    pub state: WorkerState,
    /// The record that was published, when one was.
    pub record: Option<ResultRecord>,
    pub error: Option<WorkerError>,
    /// Every state the worker passed through, in order.
    pub history: Vec<WorkerState>,
}

pub struct ExecutionWorker<E = ProcessCommandExecutor> {
    repo: GitRepo<E>,
    config: JobeConfig,
    job_id: JobId,
    submitted_at: Option<DateTime<Utc>>,
    history: Vec<WorkerState>,
}

impl<E: CommandExecutor + Clone> ExecutionWorker<E> {
    /// `submitted_at` anchors relative start times; without it the job
    /// commit's committer time is used.
    pub fn new(
        repo: GitRepo<E>,
        config: JobeConfig,
        job_id: JobId,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { repo, config, job_id, submitted_at, history: vec![WorkerState::Spawned] }
    }

    pub fn state(&self) -> WorkerState {
        self.history.last().copied().unwrap_or(WorkerState::Spawned)
    }

    pub async fn run(mut self) -> WorkerReport {
        info!(job = %self.job_id, "worker started");
        let (record, error) = match self.execute().await {
            Ok(record) => {
                self.transition(WorkerState::ResultCommitted);
                (Some(record), None)
            }
            Err(failure) => {
                error!(job = %self.job_id, state = %self.state(), error = %failure, "job failed");
                self.transition(WorkerState::Failed);
                (None, Some(failure))
            }
        };
        let state = self.state();
        WorkerReport { job_id: self.job_id, state, record, error, history: self.history }
    }

    async fn execute(&mut self) -> Result<ResultRecord, WorkerError> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(WorkerError::Scratch)?;
        let workspace = self
            .repo
            .clone_workspace(scratch.path(), CommitIdentity::from(&self.config.identity))
            .map_err(WorkerError::Checkout)?;
        workspace.checkout_branch(self.job_id.as_str()).map_err(WorkerError::Checkout)?;
        let head = workspace.head().map_err(WorkerError::Checkout)?;
        let submitted_at = match self.submitted_at {
            Some(submitted_at) => submitted_at,
            None => workspace.commit_time(&head).map_err(WorkerError::Checkout)?,
        };
        self.transition(WorkerState::WorkspacePrepared);

        // Result files must never overwrite submitted ones.
        let reserved = &self.config.results.dir;
        if !reserved.is_empty() && workspace.root().join(reserved).exists() {
            return Err(WorkerError::ReservedPath(reserved.clone()));
        }

        let record = match read_descriptor(workspace.root(), &self.config.descriptor_file) {
            Ok(spec) => self.run_job(&workspace, &spec, submitted_at).await?,
            Err(malformed) => self.descriptor_error(submitted_at, &malformed),
        };

        self.publish(&workspace, &head, &record)?;
        Ok(record)
    }

    async fn run_job(
        &mut self,
        workspace: &Workspace<E>,
        spec: &JobSpec,
        submitted_at: DateTime<Utc>,
    ) -> Result<ResultRecord, WorkerError> {
        let scheduled_at = spec.start_time.resolve(submitted_at);
        self.transition(WorkerState::Waiting);
        info!(job = %self.job_id, %scheduled_at, "waiting for start time");
        schedule::wait_until(scheduled_at).await;

        self.transition(WorkerState::Running);
        let results = &self.config.results;
        let output = OutputPaths {
            stdout: workspace.root().join(results.path(&results.stdout)),
            stderr: workspace.root().join(results.path(&results.stderr)),
        };
        if let Some(dir) = output.stdout.parent() {
            std::fs::create_dir_all(dir).map_err(WorkerError::RecordResult)?;
        }
        let started_at = Utc::now();
        let outcome =
            run_command(&self.config.shell, &spec.run, workspace.root(), &output, spec.timeout)
                .await
                .map_err(WorkerError::Execution)?;
        let finished_at = Utc::now();

        let (status, exit_code, error) = match outcome {
            CommandOutcome::Exited { code: Some(0), .. } => (JobStatus::Succeeded, Some(0), None),
            CommandOutcome::Exited { code: Some(code), .. } => {
                (JobStatus::Failed, Some(code), None)
            }
            CommandOutcome::Exited { code: None, signal } => {
                let reason = match signal {
                    Some(signal) => format!("killed by signal {signal}"),
                    None => "terminated without an exit code".to_string(),
                };
                (JobStatus::Failed, None, Some(reason))
            }
            CommandOutcome::TimedOut => {
                let limit = spec.timeout.map(|limit| limit.as_secs()).unwrap_or_default();
                warn!(job = %self.job_id, limit, "job timed out");
                (JobStatus::TimedOut, None, Some(format!("timed out after {limit}s")))
            }
        };
        info!(job = %self.job_id, status = status.as_str(), ?exit_code, "job finished");

        Ok(ResultRecord {
            job_id: self.job_id.to_string(),
            status,
            exit_code,
            command: Some(spec.run.clone()),
            submitted_at,
            scheduled_at: Some(scheduled_at),
            started_at: Some(started_at),
            finished_at,
            error,
        })
    }

    fn descriptor_error(
        &self,
        submitted_at: DateTime<Utc>,
        malformed: &MalformedDescriptor,
    ) -> ResultRecord {
        warn!(job = %self.job_id, error = %malformed, "not running job with malformed descriptor");
        ResultRecord {
            job_id: self.job_id.to_string(),
            status: JobStatus::DescriptorError,
            exit_code: None,
            command: None,
            submitted_at,
            scheduled_at: None,
            started_at: None,
            finished_at: Utc::now(),
            error: Some(malformed.to_string()),
        }
    }

    /// Commit the result files with whatever the command left behind and
    /// push the commit onto the job branch.
    fn publish(
        &self,
        workspace: &Workspace<E>,
        head: &str,
        record: &ResultRecord,
    ) -> Result<(), WorkerError> {
        let results = &self.config.results;
        workspace
            .write_file(&results.path(&results.exit_code), &record.exit_marker())
            .map_err(WorkerError::RecordResult)?;
        let serialized = record.to_toml().map_err(WorkerError::SerializeResult)?;
        workspace
            .write_file(&results.path(&results.record), &serialized)
            .map_err(WorkerError::RecordResult)?;

        workspace.add_all().map_err(WorkerError::ResultPublish)?;
        let message = format!("job {}: {}", self.job_id, record.status.as_str());
        let result_commit = workspace.commit(&message).map_err(WorkerError::ResultPublish)?;
        workspace
            .push(&[PushRef::update("HEAD", self.job_id.branch_ref(), head)])
            .map_err(WorkerError::ResultPublish)?;

        info!(job = %self.job_id, commit = %result_commit, "result published");
        Ok(())
    }

    fn transition(&mut self, next: WorkerState) {
        info!(job = %self.job_id, from = %self.state(), to = %next, "worker state");
        self.history.push(next);
    }
}
