// `jobe show`: print the result record of one job.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use jobe_common::job_id::JobId;
use jobe_common::result::ResultRecord;
use jobe_engine::jobs::job_result;
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Job to show.
    #[arg(value_name = "JOB_ID")]
    job_id: String,

    /// Repository path (defaults to current directory).
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub job_id: String,
    pub state: String,
    pub result: Option<ResultRecord>,
}

pub fn run(args: ShowArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match lookup(args) {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn lookup(args: ShowArgs) -> anyhow::Result<ShowResult> {
    let job_id = JobId::parse(&args.job_id).context("invalid job id")?;
    let store = super::open_store(args.repo)?;
    let record = job_result(&store.repo, &store.config, &job_id)?;
    Ok(ShowResult {
        job_id: job_id.to_string(),
        state: record.as_ref().map_or("pending", |record| record.status.as_str()).to_string(),
        result: record,
    })
}

fn format_human(result: &ShowResult) -> String {
    let Some(record) = &result.result else {
        return format!("job {}: pending", result.job_id);
    };
    let mut lines = vec![format!("job {}: {}", result.job_id, result.state)];
    if let Some(command) = &record.command {
        lines.push(format!("  command:    {command}"));
    }
    if let Some(code) = record.exit_code {
        lines.push(format!("  exit code:  {code}"));
    }
    lines.push(format!("  submitted:  {}", record.submitted_at.to_rfc3339()));
    if let Some(started) = record.started_at {
        lines.push(format!("  started:    {}", started.to_rfc3339()));
    }
    lines.push(format!("  finished:   {}", record.finished_at.to_rfc3339()));
    if let Some(error) = &record.error {
        lines.push(format!("  error:      {error}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use jobe_common::result::JobStatus;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn pending_job_is_one_line() {
        let result =
            ShowResult { job_id: "7-3f5a9c2".into(), state: "pending".into(), result: None };
        assert_eq!(format_human(&result), "job 7-3f5a9c2: pending");
    }

    #[test]
    fn descriptor_error_shows_the_reason() {
        let result = ShowResult {
            job_id: "7-3f5a9c2".into(),
            state: "descriptor_error".into(),
            result: Some(ResultRecord {
                job_id: "7-3f5a9c2".into(),
                status: JobStatus::DescriptorError,
                exit_code: None,
                command: None,
                submitted_at: at("2026-03-01T10:00:00Z"),
                scheduled_at: None,
                started_at: None,
                finished_at: at("2026-03-01T10:00:01Z"),
                error: Some("descriptor is missing the required `run` key".into()),
            }),
        };

        let text = format_human(&result);

        assert!(text.starts_with("job 7-3f5a9c2: descriptor_error\n"));
        assert!(text.contains("  error:      descriptor is missing the required `run` key"));
        assert!(!text.contains("exit code"));
        assert!(text.contains("  finished:   2026-03-01T10:00:01+00:00"));
    }
}
