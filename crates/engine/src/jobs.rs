// Read-only views over the job branches of a repository.

use jobe_common::job_id::JobId;
use jobe_common::result::{JobStatus, ResultRecord};
use serde::Serialize;
use thiserror::Error;

use crate::config::JobeConfig;
use crate::git::{CommandExecutor, GitError, GitRepo};

#[derive(Debug, Error)]
pub enum JobLookupError {
    #[error("no job branch named `{0}`")]
    UnknownJob(String),

    #[error("cannot read job branches")]
    Git(#[from] GitError),

    #[error("result record of job {job_id} is not valid")]
    InvalidRecord {
        job_id: String,
        #[source]
        source: toml::de::Error,
    },
}

/// One job branch and, once its result commit exists, how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub commit: String,
    pub status: Option<JobStatus>,
}

impl JobSummary {
    pub fn state(&self) -> &'static str {
        self.status.map(JobStatus::as_str).unwrap_or("pending")
    }
}

/// Every branch except the intake branch, sorted by name.
pub fn list_jobs<E: CommandExecutor + Clone>(
    repo: &GitRepo<E>,
    config: &JobeConfig,
) -> Result<Vec<JobSummary>, JobLookupError> {
    let mut jobs = Vec::new();
    for branch in repo.branches()? {
        if branch.name == config.intake_branch {
            continue;
        }
        let status = match read_record(repo, config, &branch.name, &branch.commit) {
            Ok(record) => record.map(|record| record.status),
            Err(JobLookupError::InvalidRecord { .. }) => None,
            Err(other) => return Err(other),
        };
        jobs.push(JobSummary { job_id: branch.name, commit: branch.commit, status });
    }
    Ok(jobs)
}

/// The result record of `job_id`, or `None` while the job has not finished.
pub fn job_result<E: CommandExecutor + Clone>(
    repo: &GitRepo<E>,
    config: &JobeConfig,
    job_id: &JobId,
) -> Result<Option<ResultRecord>, JobLookupError> {
    let head = repo
        .branch_head(job_id.as_str())?
        .ok_or_else(|| JobLookupError::UnknownJob(job_id.to_string()))?;
    read_record(repo, config, job_id.as_str(), &head)
}

fn read_record<E: CommandExecutor + Clone>(
    repo: &GitRepo<E>,
    config: &JobeConfig,
    job_id: &str,
    commit: &str,
) -> Result<Option<ResultRecord>, JobLookupError> {
    let path = config.results.path(&config.results.record);
    let Some(text) = repo.read_file(commit, &path)? else {
        return Ok(None);
    };
    let record = ResultRecord::from_toml(&text)
        .map_err(|source| JobLookupError::InvalidRecord { job_id: job_id.to_string(), source })?;
    // A record naming another job was not written by this job's worker.
    Ok((record.job_id == job_id).then_some(record))
}
