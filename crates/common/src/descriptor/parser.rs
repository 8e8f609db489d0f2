// Line-oriented `jobe.ini` parser.
//
// Grammar: optional `[section]` headers, `#`/`;` comments, and `key = value`
// (or `key: value`) pairs. Only keys outside any section or inside `[jobe]`
// are read. Unknown keys are ignored; the last occurrence of a key wins.

use std::time::Duration;

use super::{JobSpec, MalformedDescriptor, StartTime};

const JOBE_SECTION: &str = "jobe";

#[derive(Debug, Default)]
struct DescriptorDraft {
    run: Option<String>,
    start_time: Option<String>,
    timeout: Option<String>,
    name: Option<String>,
    verbose: Option<String>,
    detach: Option<String>,
}

pub fn parse_descriptor(text: &str) -> Result<JobSpec, MalformedDescriptor> {
    let mut draft = DescriptorDraft::default();
    let mut in_jobe_section = true;

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_jobe_section = section.trim().eq_ignore_ascii_case(JOBE_SECTION);
            continue;
        }

        let (key, value) =
            split_key_value(line).ok_or(MalformedDescriptor::InvalidLine { line: index + 1 })?;
        if !in_jobe_section {
            continue;
        }

        let value = value.to_string();
        match key.to_ascii_lowercase().as_str() {
            "run" | "command" => draft.run = Some(value),
            "start_time" | "run_at" => draft.start_time = Some(value),
            "timeout" => draft.timeout = Some(value),
            "name" => draft.name = Some(value),
            "verbose" => draft.verbose = Some(value),
            "detach" => draft.detach = Some(value),
            _ => {}
        }
    }

    build_spec(draft)
}

fn build_spec(draft: DescriptorDraft) -> Result<JobSpec, MalformedDescriptor> {
    let run = draft.run.filter(|run| !run.is_empty()).ok_or(MalformedDescriptor::MissingRun)?;

    let start_time = match draft.start_time {
        Some(raw) => StartTime::parse(&raw)?,
        None => StartTime::Immediate,
    };

    let timeout = draft.timeout.map(|raw| parse_timeout(&raw)).transpose()?;
    let name = draft.name.filter(|name| !name.is_empty());
    let verbose =
        draft.verbose.map(|raw| parse_bool("verbose", &raw)).transpose()?.unwrap_or(false);
    let detach = draft.detach.map(|raw| parse_bool("detach", &raw)).transpose()?.unwrap_or(true);

    Ok(JobSpec { run, start_time, timeout, name, verbose, detach })
}

/// Split at the first `=` or `:`, whichever comes first.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let delimiter = line.find(['=', ':'])?;
    let key = line[..delimiter].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[delimiter + 1..].trim()))
}

fn parse_timeout(raw: &str) -> Result<Duration, MalformedDescriptor> {
    match raw.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(MalformedDescriptor::InvalidTimeout(raw.to_string())),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, MalformedDescriptor> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(MalformedDescriptor::InvalidBoolean {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
