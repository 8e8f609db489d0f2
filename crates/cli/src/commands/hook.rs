// `jobe hook`: the repository's post-receive hook.
//
// Reads `<old> <new> <ref>` lines from stdin. Whatever this command prints
// is relayed to the pushing client, and a non-zero exit is how a rejected
// submission is reported.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use jobe_common::refs::parse_ref_updates;
use jobe_engine::dispatcher::ProcessDispatcher;
use jobe_engine::submission::{HookReport, SubmissionHandler, SubmissionOutcome};
use tracing::debug;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct HookArgs {
    /// Repository path (defaults to the current directory, where git runs
    /// hooks).
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,
}

pub fn run(args: HookArgs) -> anyhow::Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input).context("failed to read ref updates from stdin")?;

    match handle_push(args, &input) {
        Ok((report, intake)) => {
            let mut out = io::stdout().lock();
            write!(out, "{}", format_report(&report, &intake))?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(OutputFormat::Human, &error);
            Err(error)
        }
    }
}

fn handle_push(args: HookArgs, input: &str) -> anyhow::Result<(HookReport, String)> {
    let updates = parse_ref_updates(input).context("malformed hook input")?;
    debug!(updates = updates.len(), "hook invoked");
    let store = super::open_store(args.repo)?;
    let dispatcher = ProcessDispatcher::from_config(&store.path, &store.config)
        .context("cannot prepare the worker launcher")?;
    let intake = store.config.intake_branch.clone();

    let handler = SubmissionHandler::new(store.repo, store.config, dispatcher);
    let report = handler.handle(&updates)?;
    Ok((report, intake))
}

/// Text shown to the pushing client.
fn format_report(report: &HookReport, intake: &str) -> String {
    let mut lines = Vec::new();
    for outcome in &report.outcomes {
        let SubmissionOutcome::Accepted(job) = outcome else {
            continue;
        };
        lines.push(format!("jobe: accepted job {}", job.job_id));
        if let Err(malformed) = &job.descriptor {
            lines.push(format!("jobe: warning: {malformed}; the job will record the error"));
        }
        if let Some(dispatch_error) = &job.dispatch_error {
            lines.push(format!("jobe: warning: {dispatch_error}; the job will not run"));
        }
        lines.push("jobe: fetch the job and its result with:".to_string());
        lines.push(format!("jobe:   git fetch && git checkout {}", job.job_id));
    }
    if report.outcomes.is_empty() && !report.ignored.is_empty() {
        lines.push(format!("jobe: no job submitted; push to `{intake}` to submit a job"));
    }
    lines.iter().map(|line| format!("{line}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobe_common::descriptor::{JobSpec, MalformedDescriptor};
    use jobe_common::job_id::JobId;
    use jobe_common::refs::RefUpdate;
    use jobe_engine::submission::AcceptedJob;

    const COMMIT: &str = "3f5a9c2e1b7d4f6a8c0e2b4d6f8a0c2e4b6d8f0a";

    fn accepted(descriptor: Result<JobSpec, MalformedDescriptor>) -> SubmissionOutcome {
        SubmissionOutcome::Accepted(AcceptedJob {
            job_id: JobId::new(None, "20260301100000000000", COMMIT).unwrap(),
            commit: COMMIT.to_string(),
            reset_commit: Some("4444444444444444444444444444444444444444".to_string()),
            submitted_at: Utc::now(),
            descriptor,
            dispatch_error: None,
        })
    }

    #[test]
    fn accepted_job_prints_id_and_checkout_hint() {
        let report = HookReport {
            outcomes: vec![accepted(Ok(JobSpec::new("echo hello")))],
            ignored: vec![],
        };

        let text = format_report(&report, "master");

        assert!(text.contains("jobe: accepted job 20260301100000000000-3f5a9c2\n"));
        assert!(text.contains("git fetch && git checkout 20260301100000000000-3f5a9c2\n"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn malformed_descriptor_is_a_warning() {
        let report = HookReport {
            outcomes: vec![accepted(Err(MalformedDescriptor::MissingRun))],
            ignored: vec![],
        };

        let text = format_report(&report, "master");

        assert!(text.contains("warning: descriptor is missing the required `run` key"));
    }

    #[test]
    fn other_branches_get_a_hint() {
        let report = HookReport {
            outcomes: vec![],
            ignored: vec![RefUpdate::new("0".repeat(40), COMMIT, "refs/heads/feature")],
        };

        let text = format_report(&report, "master");

        assert_eq!(text, "jobe: no job submitted; push to `master` to submit a job\n");
    }

    #[test]
    fn baseline_push_prints_nothing() {
        let report = HookReport {
            outcomes: vec![SubmissionOutcome::Baseline { commit: COMMIT.to_string() }],
            ignored: vec![RefUpdate::new("0".repeat(40), COMMIT, "refs/heads/job")],
        };

        assert_eq!(format_report(&report, "master"), "");
    }
}
