// Narrow wrapper around the git executable: the repository store the rest of
// the engine talks to.

pub mod command;
pub mod repo;

pub use command::{
    CommandExecutor, CommandResult, Git, GitError, GitOutput, ProcessCommandExecutor,
};
pub use repo::{CommitIdentity, GitRepo, Lease, PushRef, Workspace};
