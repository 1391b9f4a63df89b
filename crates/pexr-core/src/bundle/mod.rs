//! Bundle assembly and the run-time bootstrap.

pub mod bootstrap;
pub mod builder;
pub mod launcher;

pub use bootstrap::{Bootstrap, BootstrapError, Environment, RuntimeOptions, RuntimeResolver};
pub use builder::{BuilderError, BundleBuilder, DEFAULT_HEADER};
pub use launcher::{LaunchError, Launcher, ProcessLauncher};
