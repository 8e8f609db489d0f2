// Consistent exit codes for the jobe CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = submission rejected
//   11 = job repository not found

use jobe_engine::error::SubmissionRejected;
use jobe_engine::jobs::JobLookupError;

use crate::commands::RepositoryNotFound;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Rejected = 10,
    NotFound = 11,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.is::<SubmissionRejected>() {
                return Self::Rejected;
            }
            if cause.is::<RepositoryNotFound>() {
                return Self::NotFound;
            }
            if let Some(JobLookupError::UnknownJob(_)) = cause.downcast_ref::<JobLookupError>() {
                return Self::Usage;
            }
        }
        Self::Error
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::Rejected.code(), 10);
        assert_eq!(ExitCode::NotFound.code(), 11);
    }

    #[test]
    fn rejected_submission_in_chain() {
        let err = anyhow::Error::new(SubmissionRejected::IdentityExhausted {
            commit: "3f5a9c2".into(),
            attempts: 8,
        })
        .context("push handling failed");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Rejected);
    }

    #[test]
    fn missing_repository_is_not_found() {
        let err = anyhow::Error::new(RepositoryNotFound { path: PathBuf::from("/srv/nope.git") });
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[test]
    fn unknown_job_is_usage() {
        let err = anyhow::Error::new(JobLookupError::UnknownJob("x-1234567".into()));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn from_error_generic_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
