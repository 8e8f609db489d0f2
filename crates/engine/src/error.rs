// Failure taxonomy of the submission pipeline.
//
// Only `SubmissionRejected` reaches a human synchronously (through the push
// that triggered it). Everything else ends up as repository state or in a
// worker log.

use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use jobe_common::job_id::{JobId, JobIdError};
use thiserror::Error;

use crate::git::GitError;

/// Step of the submission handler that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Inspect,
    Checkout,
    Reset,
    Push,
    Restore,
}

impl Display for SubmissionStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            SubmissionStage::Inspect => "inspecting the pushed commit",
            SubmissionStage::Checkout => "checking out the submission",
            SubmissionStage::Reset => "resetting the intake branch",
            SubmissionStage::Push => "pushing the job branch",
            SubmissionStage::Restore => "restoring the intake branch",
        };
        f.write_str(stage)
    }
}

/// The push could not be turned into a job. The handler puts the intake
/// branch back before reporting this.
#[derive(Debug, Error)]
pub enum SubmissionRejected {
    #[error("submission {commit} rejected while {stage}")]
    Git {
        commit: String,
        stage: SubmissionStage,
        #[source]
        source: GitError,
    },

    #[error("submission {commit} rejected while {stage}")]
    Io {
        commit: String,
        stage: SubmissionStage,
        #[source]
        source: io::Error,
    },

    #[error("submission {commit} rejected: cannot derive a job id")]
    InvalidIdentity {
        commit: String,
        #[source]
        source: JobIdError,
    },

    #[error("submission {commit} rejected: no unused job id after {attempts} attempts")]
    IdentityExhausted { commit: String, attempts: usize },
}

/// The worker for an accepted job could not be started. The job branch
/// exists but will never receive a result.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot locate the worker executable")]
    WorkerProgram(#[source] io::Error),

    #[error("cannot open worker log `{path}`")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn worker `{program}` for job {job_id}")]
    Spawn {
        job_id: JobId,
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a worker ended in `Failed`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot create a scratch directory for the workspace")]
    Scratch(#[source] io::Error),

    #[error("cannot check out the job branch")]
    Checkout(#[source] GitError),

    #[error("submission contains `{0}`, which is reserved for results")]
    ReservedPath(String),

    #[error("cannot run the job command")]
    Execution(#[source] io::Error),

    #[error("cannot write result files")]
    RecordResult(#[source] io::Error),

    #[error("cannot serialize the result record")]
    SerializeResult(#[source] toml::ser::Error),

    #[error("failed to publish the result")]
    ResultPublish(#[source] GitError),
}
