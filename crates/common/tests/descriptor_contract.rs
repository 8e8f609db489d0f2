use std::time::Duration;

use chrono::{Local, NaiveDate, TimeZone, Utc};
use jobe_common::descriptor::{baseline_template, parse_descriptor, StartTime};
use jobe_common::job_id::JobId;

/// Descriptor layout written by earlier jobe releases.
const LEGACY_DESCRIPTOR: &str = "[jobe]
# Command to execute
command = uname -a

# Base name of your results branch
name = run_date

# Don't wait for the job to complete
detach = yes

# Time to execute the command (server timezone).
run_at = 2000-01-01T12:00:00.0

# Print all debug information
verbose = no
";

#[test]
fn baseline_template_is_a_runnable_descriptor() {
    let spec = parse_descriptor(baseline_template()).expect("baseline should parse");
    assert_eq!(spec.run, "uname -a");
    assert_eq!(spec.start_time, StartTime::After(Duration::ZERO));
    assert_eq!(spec.timeout, None);
    assert_eq!(spec.name, None);
    assert!(!spec.verbose);
}

#[test]
fn legacy_descriptor_keys_are_understood() {
    let spec = parse_descriptor(LEGACY_DESCRIPTOR).expect("legacy descriptor should parse");

    assert_eq!(spec.run, "uname -a");
    assert_eq!(spec.name.as_deref(), Some("run_date"));
    assert!(spec.detach);
    assert!(!spec.verbose);

    let naive = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
    let expected = Local.from_local_datetime(&naive).earliest().unwrap().with_timezone(&Utc);
    assert_eq!(spec.start_time, StartTime::At(expected));
}

#[test]
fn legacy_start_time_in_the_past_resolves_before_submission() {
    let spec = parse_descriptor(LEGACY_DESCRIPTOR).unwrap();
    let submitted_at = Utc::now();
    assert!(spec.start_time.resolve(submitted_at) < submitted_at);
}

#[test]
fn legacy_name_becomes_the_job_branch_prefix() {
    let spec = parse_descriptor(LEGACY_DESCRIPTOR).unwrap();
    let id = JobId::new(
        spec.name.as_deref(),
        "20260301100000000000",
        "3f5a9c2e1b7d4f6a8c0e2b4d6f8a0c2e4b6d8f0a",
    )
    .unwrap();
    assert_eq!(id.as_str(), "run_date-20260301100000000000-3f5a9c2");
}
