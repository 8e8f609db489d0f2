// `jobe init`: create a job repository.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use jobe_engine::bootstrap::{init_store, StoreReport};
use jobe_engine::config::JobeConfig;
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Path of the bare repository to create.
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Branch that accepts job submissions.
    #[arg(long, value_name = "NAME", default_value = "master")]
    intake_branch: String,

    /// Don't install the post-receive hook.
    #[arg(long)]
    no_hook: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub path: String,
    pub intake_branch: String,
    pub baseline: Option<String>,
    pub hook: Option<String>,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match initialize(args) {
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

fn initialize(args: InitArgs) -> anyhow::Result<InitResult> {
    let path = super::resolve_path(Some(args.path))?;
    let config = JobeConfig { intake_branch: args.intake_branch, ..JobeConfig::default() };
    let hook_program = if args.no_hook {
        None
    } else {
        Some(std::env::current_exe().context("cannot locate the jobe executable for the hook")?)
    };

    let report: StoreReport = init_store(&path, &config, hook_program.as_deref())
        .with_context(|| format!("failed to initialize `{}`", path.display()))?;

    Ok(InitResult {
        path: report.path.display().to_string(),
        intake_branch: config.intake_branch,
        baseline: report.seeded,
        hook: report.hook.map(|hook| hook.display().to_string()),
    })
}

fn format_human(result: &InitResult) -> String {
    let mut lines = vec![format!("Initialized job repository at {}", result.path)];
    match &result.baseline {
        Some(commit) => {
            lines.push(format!("Seeded `{}` with baseline {commit}", result.intake_branch))
        }
        None => lines.push(format!("Kept existing `{}` branch", result.intake_branch)),
    }
    match &result.hook {
        Some(hook) => lines.push(format!("Installed hook {hook}")),
        None => lines.push("No hook installed; pushes will not create jobs".to_string()),
    }
    lines.push(format!(
        "Submit jobs with: git clone {} && edit jobe.ini && git push origin {}",
        result.path, result.intake_branch
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_output_mentions_baseline_and_hook() {
        let result = InitResult {
            path: "/srv/jobs.git".into(),
            intake_branch: "master".into(),
            baseline: Some("4444444".into()),
            hook: Some("/srv/jobs.git/hooks/post-receive".into()),
        };

        let text = format_human(&result);

        assert!(text.starts_with("Initialized job repository at /srv/jobs.git"));
        assert!(text.contains("Seeded `master` with baseline 4444444"));
        assert!(text.contains("Installed hook /srv/jobs.git/hooks/post-receive"));
    }

    #[test]
    fn human_output_warns_without_hook() {
        let result = InitResult {
            path: "/srv/jobs.git".into(),
            intake_branch: "intake".into(),
            baseline: None,
            hook: None,
        };

        let text = format_human(&result);

        assert!(text.contains("Kept existing `intake` branch"));
        assert!(text.contains("No hook installed"));
    }
}
