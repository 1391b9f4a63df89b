//! Failures with dedicated exit codes.

use pexr_core::types::RequirementError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a requirement that does not parse.
pub const EXIT_INVALID_REQUIREMENT: i32 = 100;
/// Exit code for a `--source-dir` that could not be built.
pub const EXIT_SOURCE_BUILD: i32 = 101;

/// Failures that carry their own exit code.
#[derive(Error, Debug)]
pub enum CliError {
    /// A `-r` value did not parse.
    #[error("Invalid requirement '{spec}': {reason}")]
    InvalidRequirement {
        /// The value as given.
        spec: String,
        /// Parser error.
        #[source]
        reason: RequirementError,
    },

    /// A `--source-dir` project failed to build.
    #[error("Could not build {}: {reason}", dir.display())]
    SourceBuild {
        /// Project directory.
        dir: PathBuf,
        /// Build failure, with log tail.
        reason: String,
    },
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::InvalidRequirement { .. }) => EXIT_INVALID_REQUIREMENT,
        Some(CliError::SourceBuild { .. }) => EXIT_SOURCE_BUILD,
        None => 1,
    }
}
