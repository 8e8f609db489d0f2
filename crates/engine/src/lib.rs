pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod git;
pub mod identity;
pub mod jobs;
pub mod submission;
pub mod worker;
