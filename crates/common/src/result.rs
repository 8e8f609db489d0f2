// Result record committed onto a job branch next to the captured output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of a job, as recorded in its result commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The command exited with status 0.
    Succeeded,
    /// The command exited non-zero or was killed by a signal.
    Failed,
    /// The command outlived its `timeout` and was killed.
    TimedOut,
    /// The descriptor could not be parsed; nothing was run.
    DescriptorError,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::DescriptorError => "descriptor_error",
        }
    }
}

/// Everything a client needs to know about a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Contents of the exit-status marker file: the numeric exit code when the
    /// command exited normally, otherwise the status name.
    pub fn exit_marker(&self) -> String {
        match (self.status, self.exit_code) {
            (JobStatus::Succeeded | JobStatus::Failed, Some(code)) => format!("{code}\n"),
            (status, _) => format!("{}\n", status.as_str()),
        }
    }
}
