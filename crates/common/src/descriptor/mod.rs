// Job descriptor: the `jobe.ini` file that turns a pushed tree into a job.
//
// The parsed form is derived data. The worker recomputes it from the job
// branch, so nothing here is ever persisted separately.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

pub mod parser;

pub use parser::parse_descriptor;

/// File name the handler and worker look for at the root of a submission.
pub const DESCRIPTOR_FILE: &str = "jobe.ini";

/// Naive timestamp layouts accepted for `start_time`, interpreted in the
/// server's local timezone.
const NAIVE_DATETIME_FORMATS: &[&str] =
    &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

const BASELINE_TEMPLATE: &str = r#"[jobe]
# Command to execute, run with `sh -c` from the root of your submission.
# It can refer to any file pushed alongside this descriptor (e.g. sh build.sh).
run = uname -a

# When to start: `+<seconds>` after submission, or an ISO-8601 timestamp
# (server timezone unless an offset is given). A time in the past runs
# immediately.
start_time = +0

# Optional: stop the job after this many seconds.
# timeout = 3600

# Optional: base name for the job branch.
# name = nightly

# Print debug information in the worker log.
verbose = no
"#;

/// The descriptor written to the intake branch on every reset.
///
/// Baseline detection compares against these exact bytes.
pub fn baseline_template() -> &'static str {
    BASELINE_TEMPLATE
}

/// Read and parse the descriptor at the root of a checked-out tree.
pub fn read_descriptor(root: &Path, file_name: &str) -> Result<JobSpec, MalformedDescriptor> {
    match std::fs::read_to_string(root.join(file_name)) {
        Ok(text) => parse_descriptor(&text),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(MalformedDescriptor::Missing(file_name.to_string()))
        }
        Err(error) => Err(MalformedDescriptor::Unreadable {
            file: file_name.to_string(),
            message: error.to_string(),
        }),
    }
}

/// Reasons a descriptor cannot be turned into a [`JobSpec`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedDescriptor {
    #[error("descriptor file `{0}` is missing from the submission")]
    Missing(String),

    #[error("descriptor file `{file}` could not be read: {message}")]
    Unreadable { file: String, message: String },

    #[error("descriptor is missing the required `run` key")]
    MissingRun,

    #[error("unparsable start_time `{0}`: expected `+<seconds>` or an ISO-8601 timestamp")]
    InvalidStartTime(String),

    #[error("invalid timeout `{0}`: expected a positive number of seconds")]
    InvalidTimeout(String),

    #[error("invalid boolean `{value}` for `{key}`")]
    InvalidBoolean { key: String, value: String },

    #[error("line {line}: expected `key = value`")]
    InvalidLine { line: usize },
}

/// When a job should leave the `Waiting` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// Run as soon as the workspace is ready.
    Immediate,
    /// Run this long after the submission was accepted.
    After(Duration),
    /// Run at an absolute instant.
    At(DateTime<Utc>),
}

impl Default for StartTime {
    fn default() -> Self {
        Self::Immediate
    }
}

impl StartTime {
    /// Parse a `start_time` value.
    ///
    /// Accepts `now`, `+<seconds>`, RFC 3339 timestamps with an offset, and
    /// naive ISO-8601 timestamps in local time (`2000-01-01T12:00:00.0`).
    pub fn parse(raw: &str) -> Result<Self, MalformedDescriptor> {
        let value = raw.trim();
        let invalid = || MalformedDescriptor::InvalidStartTime(value.to_string());

        if value.is_empty() || value.eq_ignore_ascii_case("now") {
            return Ok(Self::Immediate);
        }

        if let Some(seconds) = value.strip_prefix('+') {
            let seconds: u64 = seconds.trim().parse().map_err(|_| invalid())?;
            return Ok(Self::After(Duration::from_secs(seconds)));
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self::At(at.with_timezone(&Utc)));
        }

        let naive = NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(invalid)?;

        // `earliest` picks the first instant for ambiguous (DST fold) times and
        // yields None for times that do not exist locally.
        let local = Local.from_local_datetime(&naive).earliest().ok_or_else(invalid)?;
        Ok(Self::At(local.with_timezone(&Utc)))
    }

    /// The absolute instant this start time refers to for a job submitted at
    /// `submitted_at`.
    pub fn resolve(&self, submitted_at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Immediate => submitted_at,
            Self::After(delay) => chrono::Duration::from_std(*delay)
                .ok()
                .and_then(|delay| submitted_at.checked_add_signed(delay))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Self::At(at) => *at,
        }
    }
}

/// Parsed job descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Shell command executed inside the workspace.
    pub run: String,
    pub start_time: StartTime,
    /// Upper bound for the `Running` state.
    pub timeout: Option<Duration>,
    /// Optional base name prepended to the job identity.
    pub name: Option<String>,
    /// Raise the worker's log level to debug.
    pub verbose: bool,
    /// Accepted for compatibility. The handler never waits on a job.
    pub detach: bool,
}

impl JobSpec {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            start_time: StartTime::Immediate,
            timeout: None,
            name: None,
            verbose: false,
            detach: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn submitted() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn empty_and_now_are_immediate() {
        assert_eq!(StartTime::parse("").unwrap(), StartTime::Immediate);
        assert_eq!(StartTime::parse("  NOW ").unwrap(), StartTime::Immediate);
    }

    #[test]
    fn relative_start_is_measured_from_submission() {
        let start = StartTime::parse("+90").unwrap();
        assert_eq!(start, StartTime::After(Duration::from_secs(90)));
        assert_eq!(start.resolve(submitted()), submitted() + chrono::Duration::seconds(90));
    }

    #[test]
    fn plus_zero_resolves_to_submission_time() {
        assert_eq!(StartTime::parse("+0").unwrap().resolve(submitted()), submitted());
    }

    #[test]
    fn rfc3339_offsets_are_honoured() {
        let start = StartTime::parse("2026-03-01T12:30:00+02:00").unwrap();
        let StartTime::At(at) = start else { panic!("expected absolute start, got {start:?}") };
        assert_eq!(at.hour(), 10);
        assert_eq!(at.minute(), 30);
    }

    #[test]
    fn naive_timestamp_from_sample_config_parses() {
        let start = StartTime::parse("2000-01-01T12:00:00.0").unwrap();
        assert!(matches!(start, StartTime::At(at) if at < submitted()));
    }

    #[test]
    fn date_only_is_accepted() {
        assert!(matches!(StartTime::parse("2001-02-03").unwrap(), StartTime::At(_)));
    }

    #[test]
    fn garbage_start_times_are_rejected() {
        for raw in ["tomorrow", "+ten", "+-5", "2026-13-01T00:00:00"] {
            assert_eq!(
                StartTime::parse(raw),
                Err(MalformedDescriptor::InvalidStartTime(raw.to_string())),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn huge_relative_delay_saturates() {
        let start = StartTime::After(Duration::from_secs(u64::MAX));
        assert_eq!(start.resolve(submitted()), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn read_descriptor_reports_missing_file() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let dir = tmp.path();

        assert_eq!(
            read_descriptor(dir, "absent.ini"),
            Err(MalformedDescriptor::Missing("absent.ini".into()))
        );

        std::fs::write(dir.join("present.ini"), "run = echo hi\n").unwrap();
        assert_eq!(read_descriptor(dir, "present.ini").unwrap().run, "echo hi");
    }

    #[test]
    fn baseline_template_is_a_valid_descriptor() {
        let spec = parse_descriptor(baseline_template()).expect("template should parse");
        assert_eq!(spec.run, "uname -a");
        assert_eq!(spec.start_time, StartTime::After(Duration::ZERO));
        assert!(!spec.verbose);
    }
}
