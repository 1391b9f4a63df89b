//! Wiring shared by the commands.

pub mod error;
pub mod pipeline;

pub use error::{CliError, exit_code};
pub use pipeline::Pipeline;
