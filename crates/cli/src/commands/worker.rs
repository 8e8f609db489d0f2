// `jobe worker`: run one job. Started detached by the hook, with its output
// going to the job's log file.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Args;
use jobe_common::job_id::JobId;
use jobe_engine::worker::{ExecutionWorker, WorkerReport, WorkerState};

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Job to run.
    #[arg(value_name = "JOB_ID")]
    job_id: String,

    /// Repository path (defaults to current directory).
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,

    /// When the job was submitted (RFC 3339). Relative start times count
    /// from here; defaults to the job commit's time.
    #[arg(long, value_name = "TIME")]
    submitted_at: Option<DateTime<Utc>>,
}

pub fn run(args: WorkerArgs) -> anyhow::Result<()> {
    let job_id = JobId::parse(&args.job_id).context("invalid job id")?;
    let store = super::open_store(args.repo)?;
    let worker = ExecutionWorker::new(store.repo, store.config, job_id, args.submitted_at);

    let report = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(worker.run());

    println!("{}", format_human(&report));
    if report.state == WorkerState::Failed {
        match report.error {
            Some(error) => return Err(error).context(format!("job {} failed", report.job_id)),
            None => bail!("job {} failed", report.job_id),
        }
    }
    Ok(())
}

fn format_human(report: &WorkerReport) -> String {
    let history: Vec<String> = report.history.iter().map(ToString::to_string).collect();
    let mut line = format!("job {}: {}", report.job_id, history.join(" -> "));
    if let Some(record) = &report.record {
        line.push_str(&format!(" ({})", record.status.as_str()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobe_common::result::{JobStatus, ResultRecord};

    #[test]
    fn human_summary_lists_states_and_status() {
        let job_id = JobId::parse("20260301100000000000-3f5a9c2").unwrap();
        let now = Utc::now();
        let report = WorkerReport {
            job_id: job_id.clone(),
            state: WorkerState::ResultCommitted,
            record: Some(ResultRecord {
                job_id: job_id.to_string(),
                status: JobStatus::Succeeded,
                exit_code: Some(0),
                command: Some("true".into()),
                submitted_at: now,
                scheduled_at: Some(now),
                started_at: Some(now),
                finished_at: now,
                error: None,
            }),
            error: None,
            history: vec![
                WorkerState::Spawned,
                WorkerState::WorkspacePrepared,
                WorkerState::Waiting,
                WorkerState::Running,
                WorkerState::ResultCommitted,
            ],
        };

        assert_eq!(
            format_human(&report),
            "job 20260301100000000000-3f5a9c2: spawned -> workspace_prepared -> waiting -> \
             running -> result_committed (succeeded)"
        );
    }
}
