// The submission handler: turns an intake-branch push into a job branch and
// puts the intake branch back to its baseline.
//
// The handler stages the reset commit in a private clone and publishes job
// branch and reset together in one atomic push whose leases require the job
// branch to be absent and the intake branch to still point at the
// submission. Either both refs move or neither.
//
// The hook runs after git has already accepted the push, so a rejected
// submission is undone by moving the intake branch back to where it was,
// again only if it still points at the rejected commit.

use chrono::{DateTime, Utc};
use jobe_common::descriptor::{baseline_template, read_descriptor, JobSpec, MalformedDescriptor};
use jobe_common::job_id::{short_commit, JobId};
use jobe_common::refs::RefUpdate;
use tracing::{debug, error, info, warn};

use crate::config::JobeConfig;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::{DispatchError, SubmissionRejected, SubmissionStage};
use crate::git::{
    CommandExecutor, CommitIdentity, GitError, GitRepo, ProcessCommandExecutor, PushRef, Workspace,
};
use crate::identity::JobIdAllocator;

const SCRATCH_PREFIX: &str = "jobe-submit-";

/// A submission that now has a job branch.
#[derive(Debug)]
pub struct AcceptedJob {
    pub job_id: JobId,
    pub commit: String,
    /// The reset commit this run put on the intake branch. `None` when a
    /// later push had already moved the intake branch, which leaves the reset
    /// to that push's handler.
    pub reset_commit: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub descriptor: Result<JobSpec, MalformedDescriptor>,
    /// The job branch exists either way; a dispatch failure only means no
    /// worker will ever publish a result for it.
    pub dispatch_error: Option<DispatchError>,
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Accepted(AcceptedJob),
    /// The pushed tree already is the baseline. Nothing to do.
    Baseline { commit: String },
}

/// What one hook invocation did with each ref update it was given.
#[derive(Debug, Default)]
pub struct HookReport {
    pub outcomes: Vec<SubmissionOutcome>,
    pub ignored: Vec<RefUpdate>,
}

impl HookReport {
    pub fn accepted(&self) -> impl Iterator<Item = &AcceptedJob> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            SubmissionOutcome::Accepted(job) => Some(job),
            SubmissionOutcome::Baseline { .. } => None,
        })
    }
}

enum PublishFailure {
    /// The job branch already exists: another process drew the same id.
    Collision,
    Git(GitError),
}

impl From<GitError> for PublishFailure {
    fn from(error: GitError) -> Self {
        PublishFailure::Git(error)
    }
}

pub struct SubmissionHandler<D, E = ProcessCommandExecutor> {
    repo: GitRepo<E>,
    config: JobeConfig,
    dispatcher: D,
    allocator: &'static JobIdAllocator,
}

impl<D: Dispatcher, E: CommandExecutor + Clone> SubmissionHandler<D, E> {
    pub fn new(repo: GitRepo<E>, config: JobeConfig, dispatcher: D) -> Self {
        Self::with_allocator(repo, config, dispatcher, JobIdAllocator::global())
    }

    pub fn with_allocator(
        repo: GitRepo<E>,
        config: JobeConfig,
        dispatcher: D,
        allocator: &'static JobIdAllocator,
    ) -> Self {
        Self { repo, config, dispatcher, allocator }
    }

    pub fn config(&self) -> &JobeConfig {
        &self.config
    }

    /// Process the ref updates of one push. Updates to anything but the
    /// intake branch, and deletions of it, are ignored.
    pub fn handle(&self, updates: &[RefUpdate]) -> Result<HookReport, SubmissionRejected> {
        let mut report = HookReport::default();
        for update in updates {
            if !update.is_branch(&self.config.intake_branch) || update.is_delete() {
                debug!(refname = %update.refname, "ignoring ref update");
                report.ignored.push(update.clone());
                continue;
            }
            match self.submit(&update.new) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(rejected) => {
                    self.restore_intake(update);
                    return Err(rejected);
                }
            }
        }
        Ok(report)
    }

    /// Turn the intake commit `commit` into a job.
    pub fn submit(&self, commit: &str) -> Result<SubmissionOutcome, SubmissionRejected> {
        let submitted_at = Utc::now();
        if self.is_baseline(commit)? {
            debug!(%commit, "intake already at baseline");
            return Ok(SubmissionOutcome::Baseline { commit: commit.to_string() });
        }

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(|source| io_rejected(commit, SubmissionStage::Checkout, source))?;
        let workspace = self
            .repo
            .clone_workspace(scratch.path(), CommitIdentity::from(&self.config.identity))
            .and_then(|workspace| workspace.checkout_detached(commit).map(|()| workspace))
            .map_err(|source| git_rejected(commit, SubmissionStage::Checkout, source))?;

        let descriptor = read_descriptor(workspace.root(), &self.config.descriptor_file);
        if let Err(malformed) = &descriptor {
            warn!(%commit, error = %malformed, "malformed descriptor; job will record the error");
        }
        let name = descriptor.as_ref().ok().and_then(|spec| spec.name.clone());

        for attempt in 1..=self.config.max_id_attempts {
            let job_id = self.allocator.allocate(name.as_deref(), commit).map_err(|source| {
                SubmissionRejected::InvalidIdentity { commit: commit.to_string(), source }
            })?;

            let message = format!("reset after job {job_id}");
            let reset = self.prepare_reset(&workspace, commit, &message)?;
            if reset.is_none() {
                warn!(job = %job_id, %commit, "submission already matches the baseline tree");
            }

            match self.publish(&workspace, commit, &job_id, reset.as_deref()) {
                Ok(reset_commit) => {
                    info!(job = %job_id, %commit, "job branch created");
                    let dispatch_error =
                        self.dispatch(&job_id, submitted_at, &descriptor).err();
                    return Ok(SubmissionOutcome::Accepted(AcceptedJob {
                        job_id,
                        commit: commit.to_string(),
                        reset_commit,
                        submitted_at,
                        descriptor,
                        dispatch_error,
                    }));
                }
                Err(PublishFailure::Collision) => {
                    warn!(job = %job_id, attempt, "job id already taken, drawing another");
                }
                Err(PublishFailure::Git(source)) => {
                    return Err(git_rejected(commit, SubmissionStage::Push, source));
                }
            }
        }

        Err(SubmissionRejected::IdentityExhausted {
            commit: commit.to_string(),
            attempts: self.config.max_id_attempts,
        })
    }

    fn is_baseline(&self, commit: &str) -> Result<bool, SubmissionRejected> {
        let inspect = |source| git_rejected(commit, SubmissionStage::Inspect, source);
        let files = self.repo.list_files(commit).map_err(inspect)?;
        if files != [self.config.descriptor_file.as_str()] {
            return Ok(false);
        }
        let contents =
            self.repo.read_file(commit, &self.config.descriptor_file).map_err(inspect)?;
        Ok(contents.as_deref() == Some(baseline_template()))
    }

    /// Stage the baseline on top of `commit` and commit it. `None` if there
    /// is nothing to reset.
    fn prepare_reset(
        &self,
        workspace: &Workspace<E>,
        commit: &str,
        message: &str,
    ) -> Result<Option<String>, SubmissionRejected> {
        let reset = |source| git_rejected(commit, SubmissionStage::Reset, source);
        workspace.checkout_detached(commit).map_err(reset)?;
        workspace.remove_tracked().map_err(reset)?;
        workspace
            .write_file(&self.config.descriptor_file, baseline_template())
            .map_err(|source| io_rejected(commit, SubmissionStage::Reset, source))?;
        workspace.add(&[self.config.descriptor_file.as_str()]).map_err(reset)?;
        if !workspace.has_staged_changes().map_err(reset)? {
            return Ok(None);
        }
        workspace.commit(message).map(Some).map_err(reset)
    }

    /// Undo a rejected push. The intake branch goes back to its previous
    /// commit, or onto the baseline when the push created it. Failing to do
    /// so is only logged; the rejection itself is what the client sees.
    fn restore_intake(&self, update: &RefUpdate) {
        let rejected = update.new.as_str();
        let restored = if update.is_create() {
            self.restore_baseline(rejected)
        } else {
            self.repo
                .update_branch(
                    &self.config.intake_branch,
                    &update.old,
                    rejected,
                    "jobe: restore intake after rejected submission",
                )
                .map(|()| update.old.clone())
                .map_err(|source| git_rejected(rejected, SubmissionStage::Restore, source))
        };
        match restored {
            Ok(commit) => warn!(%rejected, restored = %commit, "intake branch restored"),
            Err(error) => error!(%rejected, %error, "intake branch could not be restored"),
        }
    }

    fn restore_baseline(&self, rejected: &str) -> Result<String, SubmissionRejected> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(|source| io_rejected(rejected, SubmissionStage::Restore, source))?;
        let restore = |source| git_rejected(rejected, SubmissionStage::Restore, source);
        let workspace = self
            .repo
            .clone_workspace(scratch.path(), CommitIdentity::from(&self.config.identity))
            .map_err(restore)?;
        let short = short_commit(rejected).unwrap_or(rejected);
        let message = format!("reset after rejected submission {short}");
        let Some(reset) = self.prepare_reset(&workspace, rejected, &message)? else {
            return Ok(rejected.to_string());
        };
        let intake_ref = format!("refs/heads/{}", self.config.intake_branch);
        workspace.push(&[PushRef::update(reset.as_str(), intake_ref, rejected)]).map_err(restore)?;
        Ok(reset)
    }

    fn publish(
        &self,
        workspace: &Workspace<E>,
        commit: &str,
        job_id: &JobId,
        reset: Option<&str>,
    ) -> Result<Option<String>, PublishFailure> {
        let job_ref = job_id.branch_ref();
        let intake = &self.config.intake_branch;
        let intake_ref = format!("refs/heads/{intake}");
        let mut refs = vec![PushRef::create(commit, job_ref.as_str())];
        if let Some(reset) = reset {
            refs.push(PushRef::update(reset, intake_ref, commit));
        }

        let push_error = match workspace.push(&refs) {
            Ok(_) => return Ok(reset.map(str::to_string)),
            Err(error) => error,
        };
        if self.repo.branch_head(job_id.as_str())?.is_some() {
            return Err(PublishFailure::Collision);
        }
        if reset.is_none() || self.repo.branch_head(intake)?.as_deref() == Some(commit) {
            return Err(PublishFailure::Git(push_error));
        }

        // A later push already replaced the submission on the intake branch.
        // Its own handler run resets the branch; this one only records the job.
        info!(job = %job_id, %commit, "intake moved on, publishing job branch alone");
        match workspace.push(&[PushRef::create(commit, job_ref)]) {
            Ok(_) => Ok(None),
            Err(error) => {
                if self.repo.branch_head(job_id.as_str())?.is_some() {
                    Err(PublishFailure::Collision)
                } else {
                    Err(PublishFailure::Git(error))
                }
            }
        }
    }

    fn dispatch(
        &self,
        job_id: &JobId,
        submitted_at: DateTime<Utc>,
        descriptor: &Result<JobSpec, MalformedDescriptor>,
    ) -> Result<(), DispatchError> {
        let request = DispatchRequest {
            job_id: job_id.clone(),
            repo_path: self.repo.path().to_path_buf(),
            submitted_at,
            verbose: descriptor.as_ref().is_ok_and(|spec| spec.verbose),
        };
        self.dispatcher.dispatch(&request).inspect_err(|dispatch_error| {
            error!(job = %job_id, error = %dispatch_error, "worker spawn failed; job will not run");
        })
    }
}

fn git_rejected(commit: &str, stage: SubmissionStage, source: GitError) -> SubmissionRejected {
    SubmissionRejected::Git { commit: commit.to_string(), stage, source }
}

fn io_rejected(commit: &str, stage: SubmissionStage, source: std::io::Error) -> SubmissionRejected {
    SubmissionRejected::Io { commit: commit.to_string(), stage, source }
}
