//! Engine for building and running self-contained Python application bundles.
//!
//! The pipeline, leaf first:
//! - [`fetcher`]: list candidate artifacts for a project from local
//!   directories, find-links pages and simple indexes.
//! - [`translator`]: turn a candidate into an installed [`Package`], building
//!   source distributions through an [`installer::Installer`], with results
//!   memoized by the [`cache`].
//! - [`obtainer`]: pick the best candidate for one requirement.
//! - [`resolver`]: close a set of requirements over their dependencies.
//! - [`bundle`]: freeze packages and sources into a bundle, and bootstrap a
//!   bundle back into a runnable environment.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod installer;
pub mod interpreter;
pub mod io;
pub mod obtainer;
pub mod package;
pub mod paths;
pub mod reporter;
pub mod resolver;
pub mod translator;

pub use config::Settings;
pub use package::Package;
pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// Re-export of the shared schema types.
pub mod types {
    pub use pexr_schema::*;
}

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pexr-core/", env!("CARGO_PKG_VERSION"));
