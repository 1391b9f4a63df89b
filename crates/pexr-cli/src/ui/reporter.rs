//! Progress lines on stderr.
//!
//! Stdout is left to the bundle and to `pexr info`.

use crossterm::style::Stylize;
use pexr_core::Package;
use pexr_core::Reporter;
use pexr_core::types::{PackageName, Requirement, Version};

/// Writes progress to stderr. Routine events only show when verbose.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    /// Show routine events only when `verbose`.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn detail(&self, line: &str) {
        if self.verbose {
            eprintln!("  {}", line.dark_grey());
        }
    }
}

impl Reporter for ConsoleReporter {
    fn resolving(&self, requirement: &Requirement) {
        self.detail(&format!("resolving {requirement}"));
    }

    fn obtained(&self, package: &Package) {
        eprintln!(
            "  {} {} {}",
            "+".green(),
            package.name.as_str().bold(),
            format!("{} ({})", package.version, package.format).dark_grey()
        );
    }

    fn downloading(&self, url: &str) {
        self.detail(&format!("downloading {url}"));
    }

    fn building(&self, name: &PackageName, version: &Version) {
        eprintln!("  {} {name} {version}", "building".yellow());
    }

    fn cache_hit(&self, name: &PackageName, version: &Version) {
        self.detail(&format!("cached {name} {version}"));
    }

    fn info(&self, msg: &str) {
        eprintln!("{msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }
}
