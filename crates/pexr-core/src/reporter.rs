//! Reporter trait for dependency injection
//!
//! This trait allows core logic to report progress and status without
//! being coupled to a specific terminal implementation.

use crate::package::Package;
use crate::types::{PackageName, Requirement, Version};

/// Sink for user-facing progress events.
pub trait Reporter: Send + Sync {
    /// A requirement is about to be obtained.
    fn resolving(&self, requirement: &Requirement);

    /// A package was locked into the resolved set.
    fn obtained(&self, package: &Package);

    /// A remote artifact is being downloaded.
    fn downloading(&self, url: &str);

    /// A source distribution is being built.
    fn building(&self, name: &PackageName, version: &Version);

    /// A translation was served from the cache.
    fn cache_hit(&self, name: &PackageName, version: &Version);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn resolving(&self, requirement: &Requirement) {
        (**self).resolving(requirement);
    }
    fn obtained(&self, package: &Package) {
        (**self).obtained(package);
    }
    fn downloading(&self, url: &str) {
        (**self).downloading(url);
    }
    fn building(&self, name: &PackageName, version: &Version) {
        (**self).building(name, version);
    }
    fn cache_hit(&self, name: &PackageName, version: &Version) {
        (**self).cache_hit(name, version);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., bootstrap, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn resolving(&self, _: &Requirement) {}
    fn obtained(&self, _: &Package) {}
    fn downloading(&self, _: &str) {}
    fn building(&self, _: &PackageName, _: &Version) {}
    fn cache_hit(&self, _: &PackageName, _: &Version) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
