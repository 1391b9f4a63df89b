//! Subcommand implementations. Each returns the process exit code.

pub mod build;
pub mod info;
pub mod run;
