// Job identity disambiguators.
//
// A disambiguator is a UTC timestamp with microsecond resolution taken from a
// single process-wide atomic, so values handed out by one process are
// strictly increasing even when the clock stalls or steps backwards. Separate
// processes can still produce the same value; the handler's create-lease on
// the job branch catches that and asks for the next one.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use jobe_common::job_id::{JobId, JobIdError};

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";

static GLOBAL: JobIdAllocator = JobIdAllocator::new();

#[derive(Debug, Default)]
pub struct JobIdAllocator {
    last_micros: AtomicI64,
}

impl JobIdAllocator {
    pub const fn new() -> Self {
        Self { last_micros: AtomicI64::new(0) }
    }

    /// An allocator whose first stamp is `micros + 1`, regardless of the clock.
    #[cfg(test)]
    pub(crate) const fn starting_after(micros: i64) -> Self {
        Self { last_micros: AtomicI64::new(micros) }
    }

    /// The allocator shared by every handler in this process.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn next_disambiguator(&self) -> String {
        self.next_at(Utc::now())
    }

    /// Allocate a job identity for `commit`.
    pub fn allocate(&self, name: Option<&str>, commit: &str) -> Result<JobId, JobIdError> {
        JobId::new(name, &self.next_disambiguator(), commit)
    }

    fn next_at(&self, now: DateTime<Utc>) -> String {
        let now_micros = now.timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Acquire);
        loop {
            let candidate = now_micros.max(last.saturating_add(1));
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return format_stamp(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

fn format_stamp(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|stamp| stamp.format(STAMP_FORMAT).to_string())
        .unwrap_or_else(|| micros.to_string())
}
