// `jobe jobs`: list job branches with their status.

use std::path::PathBuf;

use clap::Args;
use jobe_engine::jobs::{list_jobs, JobSummary};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Repository path (defaults to current directory).
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: JobsArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = super::open_store(args.repo).and_then(|store| {
        list_jobs(&store.repo, &store.config).map_err(anyhow::Error::from)
    });
    match result {
        Ok(jobs) => {
            output::print_output(format, &jobs, |jobs| format_human(jobs))?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn format_human(jobs: &[JobSummary]) -> String {
    if jobs.is_empty() {
        return "No jobs.".to_string();
    }
    let width = jobs.iter().map(|job| job.job_id.len()).max().unwrap_or(0);
    jobs.iter()
        .map(|job| format!("{:<width$}  {:.7}  {}", job.job_id, job.commit, job.state()))
        .collect::<Vec<_>>()
        .join("\n")
}
