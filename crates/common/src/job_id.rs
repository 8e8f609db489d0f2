// Job identities: `[<name>-]<disambiguator>-<short-commit-id>`.
//
// A job identity doubles as the job branch name, so it must be a valid,
// single-component git ref name.

use std::fmt;

use thiserror::Error;

/// Hex digits of the commit id kept in a job identity.
pub const SHORT_COMMIT_LEN: usize = 7;

/// Longest accepted identity, well below filesystem name limits for loose refs.
const MAX_JOB_ID_LEN: usize = 200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobIdError {
    #[error("job id is empty")]
    Empty,

    #[error("job id exceeds {MAX_JOB_ID_LEN} characters")]
    TooLong,

    #[error("job id contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("job id `{0}` is not a valid branch name")]
    InvalidBranchName(String),

    #[error("`{0}` is not a commit id")]
    InvalidCommit(String),
}

/// Unique handle for one submission. Also the name of its job branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
    /// Build an identity from an optional base name, a disambiguator and the
    /// submission's commit id.
    ///
    /// The name is shortened as far as needed for the identity to stay within
    /// the length limit; a name alone never makes an identity invalid.
    pub fn new(name: Option<&str>, disambiguator: &str, commit: &str) -> Result<Self, JobIdError> {
        let short = short_commit(commit)?;
        let room = MAX_JOB_ID_LEN.saturating_sub(disambiguator.len() + SHORT_COMMIT_LEN + 2);
        let prefix = name
            .map(|name| truncate_name(sanitize_name(name), room))
            .filter(|name| !name.is_empty());
        let raw = match prefix {
            Some(prefix) => format!("{prefix}-{disambiguator}-{short}"),
            None => format!("{disambiguator}-{short}"),
        };
        Self::parse(&raw)
    }

    /// Validate an identity received from the command line or a branch list.
    pub fn parse(raw: &str) -> Result<Self, JobIdError> {
        if raw.is_empty() {
            return Err(JobIdError::Empty);
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(JobIdError::TooLong);
        }
        if let Some(invalid) =
            raw.chars().find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
        {
            return Err(JobIdError::InvalidCharacter(invalid));
        }
        if raw.starts_with(['-', '.'])
            || raw.ends_with('.')
            || raw.ends_with(".lock")
            || raw.contains("..")
        {
            return Err(JobIdError::InvalidBranchName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified ref of the job branch.
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Abbreviate a full hex commit id to [`SHORT_COMMIT_LEN`] characters.
pub fn short_commit(commit: &str) -> Result<&str, JobIdError> {
    let commit = commit.trim();
    if commit.len() < SHORT_COMMIT_LEN || !commit.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(JobIdError::InvalidCommit(commit.to_string()));
    }
    Ok(&commit[..SHORT_COMMIT_LEN])
}

/// Cut a sanitized name to at most `max` bytes without leaving a trailing
/// separator.
fn truncate_name(mut name: String, max: usize) -> String {
    // Sanitized names are ASCII, so any byte offset is a char boundary.
    name.truncate(max);
    let kept = name.trim_end_matches('-').len();
    name.truncate(kept);
    name
}

/// Reduce a user supplied job name to branch-safe characters.
///
/// - Lowercases ASCII letters
/// - Keeps alphanumerics and `_`, turns everything else into `-`
/// - Collapses runs of `-` and strips them from both ends
pub fn sanitize_name(name: &str) -> String {
    let raw: String = name
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '-' })
        .collect();

    raw.split('-').filter(|part| !part.is_empty()).collect::<Vec<_>>().join("-")
}
