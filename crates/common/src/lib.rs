// jobe-common: descriptor grammar, job identities and result records shared by
// the engine and the CLI.

pub mod descriptor;
pub mod job_id;
pub mod refs;
pub mod result;
