// The repository store: the bare repository that receives pushes, plus the
// private clones (workspaces) the handler and workers stage commits in.
//
// All writes reach the bare repository through `git push` with explicit
// leases, so the store's compare-and-swap ref update is the only
// synchronization the engine relies on.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::command::{CommandExecutor, Git, GitError, GitOutput, ProcessCommandExecutor};
use crate::config::IdentityConfig;

const BRANCH_PREFIX: &str = "refs/heads/";
const REMOTE: &str = "origin";

/// Author/committer for commits made by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl From<&IdentityConfig> for CommitIdentity {
    fn from(config: &IdentityConfig) -> Self {
        Self { name: config.name.clone(), email: config.email.clone() }
    }
}

/// Expected value of a ref on the remote before a push may update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lease {
    /// The ref must not exist yet.
    Absent,
    /// The ref must still point at this commit.
    At(String),
}

/// One ref update in a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRef {
    pub source: String,
    pub destination: String,
    pub lease: Lease,
}

impl PushRef {
    /// Create `destination`, failing if it already exists.
    pub fn create(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self { source: source.into(), destination: destination.into(), lease: Lease::Absent }
    }

    /// Move `destination`, failing unless it still points at `expected`.
    pub fn update(
        source: impl Into<String>,
        destination: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            lease: Lease::At(expected.into()),
        }
    }

    fn lease_arg(&self) -> String {
        match &self.lease {
            Lease::Absent => format!("--force-with-lease={}:", self.destination),
            Lease::At(expected) => format!("--force-with-lease={}:{expected}", self.destination),
        }
    }

    fn refspec(&self) -> String {
        format!("{}:{}", self.source, self.destination)
    }
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub name: String,
    pub commit: String,
}

/// The bare repository that receives pushes.
#[derive(Debug, Clone)]
pub struct GitRepo<E = ProcessCommandExecutor> {
    path: PathBuf,
    git: Git<E>,
}

impl GitRepo<ProcessCommandExecutor> {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_executor(path, "git", ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor + Clone> GitRepo<E> {
    pub fn with_executor(
        path: impl Into<PathBuf>,
        program: impl Into<String>,
        executor: E,
    ) -> Self {
        let path = path.into();
        let git = Git::with_executor(program, path.clone(), executor);
        Self { path, git }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail unless `path` is a git repository.
    pub fn verify(&self) -> Result<(), GitError> {
        self.git.run(["rev-parse", "--git-dir"]).map(|_| ())
    }

    /// Full commit id for `rev`.
    pub fn resolve_commit(&self, rev: &str) -> Result<String, GitError> {
        let spec = format!("{rev}^{{commit}}");
        let output = self.git.run(["rev-parse", "--verify", spec.as_str()])?;
        Ok(output.stdout.trim().to_string())
    }

    /// Commit the branch points at, or `None` when it doesn't exist.
    pub fn branch_head(&self, branch: &str) -> Result<Option<String>, GitError> {
        let refname = format!("{BRANCH_PREFIX}{branch}");
        let output =
            self.git.run(["for-each-ref", "--format=%(objectname) %(refname)", refname.as_str()])?;
        Ok(output.stdout.lines().find_map(|line| {
            let (commit, name) = line.split_once(' ')?;
            (name == refname).then(|| commit.to_string())
        }))
    }

    /// Move `branch` to `commit` directly in this repository, failing unless
    /// it still points at `expected`.
    pub fn update_branch(
        &self,
        branch: &str,
        commit: &str,
        expected: &str,
        reason: &str,
    ) -> Result<(), GitError> {
        let refname = format!("{BRANCH_PREFIX}{branch}");
        self.git.run(["update-ref", "-m", reason, refname.as_str(), commit, expected]).map(|_| ())
    }

    /// Every branch in the repository, sorted by name.
    pub fn branches(&self) -> Result<Vec<BranchHead>, GitError> {
        let output = self.git.run([
            "for-each-ref",
            "--sort=refname",
            "--format=%(objectname) %(refname)",
            "refs/heads/",
        ])?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let (commit, refname) = line.split_once(' ')?;
                let name = refname.strip_prefix(BRANCH_PREFIX)?;
                Some(BranchHead { name: name.to_string(), commit: commit.to_string() })
            })
            .collect())
    }

    /// Paths of all files in the tree of `rev`.
    pub fn list_files(&self, rev: &str) -> Result<Vec<String>, GitError> {
        let output = self.git.run(["ls-tree", "-r", "-z", "--name-only", rev])?;
        Ok(output.stdout.split('\0').filter(|path| !path.is_empty()).map(str::to_string).collect())
    }

    /// Contents of `path` at `rev`, or `None` if the file isn't there.
    pub fn read_file(&self, rev: &str, path: &str) -> Result<Option<String>, GitError> {
        let object = format!("{rev}:{path}");
        if !self.git.probe(["cat-file", "-e", object.as_str()])? {
            return Ok(None);
        }
        Ok(Some(self.git.run(["cat-file", "blob", object.as_str()])?.stdout))
    }

    /// Committer timestamp of `rev`.
    pub fn commit_time(&self, rev: &str) -> Result<DateTime<Utc>, GitError> {
        commit_time(&self.git, rev)
    }

    /// Number of commits reachable from `to` but not from `from`.
    pub fn count_commits(&self, from: &str, to: &str) -> Result<usize, GitError> {
        let range = format!("{from}..{to}");
        let output = self.git.run(["rev-list", "--count", range.as_str()])?;
        output.stdout.trim().parse().map_err(|_| GitError::UnexpectedOutput {
            command: format!("git rev-list --count {range}"),
            output: output.stdout.clone(),
        })
    }

    /// Clone into `destination` (which must not exist or be empty) without
    /// populating the working tree.
    pub fn clone_workspace(
        &self,
        destination: &Path,
        identity: CommitIdentity,
    ) -> Result<Workspace<E>, GitError> {
        let source = self.path.to_string_lossy().into_owned();
        let target = destination.to_string_lossy().into_owned();
        self.git.run(["clone", "--quiet", "--no-checkout", source.as_str(), target.as_str()])?;

        let git = Git::with_executor(self.git.program(), destination, self.git.executor().clone());
        Ok(Workspace { root: destination.to_path_buf(), git, identity })
    }
}

/// A private clone of the repository. Owned by exactly one handler run or
/// worker.
#[derive(Debug, Clone)]
pub struct Workspace<E = ProcessCommandExecutor> {
    root: PathBuf,
    git: Git<E>,
    identity: CommitIdentity,
}

impl<E: CommandExecutor> Workspace<E> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Point HEAD at `rev` and make index and working tree match it exactly.
    pub fn checkout_detached(&self, rev: &str) -> Result<(), GitError> {
        self.git.run(["checkout", "--quiet", "--force", "--detach", rev]).map(|_| ())
    }

    /// Check out a local branch tracking the remote branch of the same name.
    pub fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        let upstream = format!("refs/remotes/{REMOTE}/{branch}");
        self.git
            .run(["checkout", "--quiet", "--force", "-B", branch, upstream.as_str()])
            .map(|_| ())
    }

    pub fn head(&self) -> Result<String, GitError> {
        Ok(self.git.run(["rev-parse", "HEAD"])?.stdout.trim().to_string())
    }

    pub fn commit_time(&self, rev: &str) -> Result<DateTime<Utc>, GitError> {
        commit_time(&self.git, rev)
    }

    /// Remove every tracked file from the index and the working tree.
    pub fn remove_tracked(&self) -> Result<(), GitError> {
        self.git.run(["rm", "-r", "-q", "--ignore-unmatch", "--", "."]).map(|_| ())
    }

    /// Write a file relative to the workspace root, creating parent directories.
    pub fn write_file(&self, relative: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn add<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), GitError> {
        let mut args = vec!["add".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.git.run(args).map(|_| ())
    }

    /// Stage everything, including deletions and untracked files.
    pub fn add_all(&self) -> Result<(), GitError> {
        self.git.run(["add", "-A"]).map(|_| ())
    }

    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        Ok(!self.git.probe(["diff", "--cached", "--quiet"])?)
    }

    /// Commit the index and return the new commit id.
    pub fn commit(&self, message: &str) -> Result<String, GitError> {
        let name = format!("user.name={}", self.identity.name);
        let email = format!("user.email={}", self.identity.email);
        self.git.run([
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--no-verify",
            "-m",
            message,
        ])?;
        self.head()
    }

    /// Push `refs` to the repository this workspace was cloned from. Several
    /// refs are pushed as one atomic transaction.
    pub fn push(&self, refs: &[PushRef]) -> Result<GitOutput, GitError> {
        let mut args = vec!["push".to_string(), "--porcelain".to_string()];
        if refs.len() > 1 {
            args.push("--atomic".to_string());
        }
        args.extend(refs.iter().map(PushRef::lease_arg));
        args.push(REMOTE.to_string());
        args.extend(refs.iter().map(PushRef::refspec));
        self.git.run(args)
    }
}

fn commit_time<E: CommandExecutor>(git: &Git<E>, rev: &str) -> Result<DateTime<Utc>, GitError> {
    let output = git.run(["show", "-s", "--format=%ct", rev])?;
    let raw = output.stdout.trim();
    raw.parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .ok_or_else(|| GitError::UnexpectedOutput {
            command: format!("{} show -s --format=%ct {rev}", git.program()),
            output: raw.to_string(),
        })
}
