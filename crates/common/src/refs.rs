// Ref updates as reported to a `post-receive` hook on stdin:
// `<old-oid> SP <new-oid> SP <refname> LF`, one line per updated ref.

use thiserror::Error;

const BRANCH_PREFIX: &str = "refs/heads/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefUpdateParseError {
    #[error("line {line}: expected `<old> <new> <ref>`, got `{text}`")]
    Malformed { line: usize, text: String },

    #[error("line {line}: `{oid}` is not an object id")]
    InvalidOid { line: usize, oid: String },
}

/// One accepted ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old: String,
    pub new: String,
    pub refname: String,
}

impl RefUpdate {
    pub fn new(old: impl Into<String>, new: impl Into<String>, refname: impl Into<String>) -> Self {
        Self { old: old.into(), new: new.into(), refname: refname.into() }
    }

    /// Parse a single hook input line. `line_number` is only used for errors.
    pub fn parse_line(text: &str, line_number: usize) -> Result<Self, RefUpdateParseError> {
        let mut fields = text.split_whitespace();
        let (Some(old), Some(new), Some(refname), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(RefUpdateParseError::Malformed {
                line: line_number,
                text: text.to_string(),
            });
        };

        for oid in [old, new] {
            if !is_oid(oid) {
                return Err(RefUpdateParseError::InvalidOid {
                    line: line_number,
                    oid: oid.to_string(),
                });
            }
        }

        Ok(Self::new(old, new, refname))
    }

    /// Branch name when the ref lives under `refs/heads/`.
    pub fn branch(&self) -> Option<&str> {
        self.refname.strip_prefix(BRANCH_PREFIX)
    }

    pub fn is_branch(&self, name: &str) -> bool {
        self.branch() == Some(name)
    }

    /// The ref was deleted by this push.
    pub fn is_delete(&self) -> bool {
        is_zero_oid(&self.new)
    }

    /// The ref did not exist before this push.
    pub fn is_create(&self) -> bool {
        is_zero_oid(&self.old)
    }
}

/// Parse the full stdin of a `post-receive` hook, skipping blank lines.
pub fn parse_ref_updates(input: &str) -> Result<Vec<RefUpdate>, RefUpdateParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| RefUpdate::parse_line(line.trim(), index + 1))
        .collect()
}

/// True for the all-zero object id git uses for "no object" (SHA-1 or SHA-256).
pub fn is_zero_oid(oid: &str) -> bool {
    !oid.is_empty() && oid.bytes().all(|byte| byte == b'0')
}

fn is_oid(oid: &str) -> bool {
    matches!(oid.len(), 40 | 64) && oid.chars().all(|ch| ch.is_ascii_hexdigit())
}
