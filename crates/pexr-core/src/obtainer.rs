//! Choosing one package for one requirement.

use async_trait::async_trait;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::Reporter;
use crate::fetcher::Fetcher;
use crate::package::{Package, artifact_precedence};
use crate::translator::{Translation, Translator};
use crate::types::{Artifact, Blake3Hash, PackageFormat, PackageName, PlatformTag, Requirement};

/// Why a requirement produced no package.
#[derive(Error, Debug)]
pub enum ObtainError {
    /// No candidate survived filtering and translation.
    #[error("No distribution found satisfying '{0}'")]
    NotFound(Requirement),

    /// Every fetcher failed for the name.
    #[error("Could not query any repository for '{name}': {detail}")]
    FetchFailed {
        /// Project queried.
        name: PackageName,
        /// Joined fetcher errors.
        detail: String,
    },
}

/// Produces a package for a requirement.
#[async_trait]
pub trait Obtain: Send + Sync + std::fmt::Debug {
    /// The best available package satisfying `requirement`.
    async fn obtain(&self, requirement: &Requirement) -> Result<Package, ObtainError>;
}

/// Which artifact formats are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPolicy {
    /// Accept wheels.
    pub wheels: bool,
    /// Accept eggs.
    pub eggs: bool,
    /// Accept source distributions (they will be built).
    pub sources: bool,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            wheels: true,
            eggs: true,
            sources: true,
        }
    }
}

impl FormatPolicy {
    /// Whether `format` is acceptable.
    pub fn allows(self, format: PackageFormat) -> bool {
        match format {
            PackageFormat::Wheel => self.wheels,
            PackageFormat::Egg => self.eggs,
            PackageFormat::Source => self.sources,
        }
    }
}

/// Collects candidates from every fetcher, then translates them best first.
#[derive(Clone)]
pub struct Obtainer {
    fetchers: Vec<Arc<dyn Fetcher>>,
    translator: Arc<dyn Translator>,
    target: PlatformTag,
    policy: FormatPolicy,
    work_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Obtainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obtainer")
            .field("fetchers", &self.fetchers)
            .field("translator", &self.translator)
            .field("target", &self.target)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Obtainer {
    /// Obtain from `fetchers` (queried in order) through `translator`.
    /// Uncached translations install under `work_dir`.
    pub fn new(
        fetchers: Vec<Arc<dyn Fetcher>>,
        translator: Arc<dyn Translator>,
        target: PlatformTag,
        work_dir: impl Into<PathBuf>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            fetchers,
            translator,
            target,
            policy: FormatPolicy::default(),
            work_dir: work_dir.into(),
            reporter,
        }
    }

    /// Restrict acceptable formats.
    pub fn with_policy(mut self, policy: FormatPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every acceptable candidate for `requirement`, best first. Equal
    /// precedence keeps fetcher order.
    ///
    /// # Errors
    ///
    /// Returns [`ObtainError::FetchFailed`] only when every fetcher failed.
    pub async fn candidates(&self, requirement: &Requirement) -> Result<Vec<Artifact>, ObtainError> {
        let results = join_all(self.fetchers.iter().map(|f| f.candidates(&requirement.name))).await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for (fetcher, result) in self.fetchers.iter().zip(results) {
            match result {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    tracing::warn!(fetcher = %fetcher.key(), name = %requirement.name, error = %e, "repository lookup failed");
                    failures.push(format!("{}: {e}", fetcher.key()));
                }
            }
        }
        if !self.fetchers.is_empty() && failures.len() == self.fetchers.len() {
            return Err(ObtainError::FetchFailed {
                name: requirement.name.clone(),
                detail: failures.join("; "),
            });
        }

        candidates.retain(|a| {
            a.name == requirement.name
                && self.policy.allows(a.format)
                && a.compatible_with(&self.target)
                && requirement.contains(&a.version)
        });
        candidates.sort_by(|a, b| artifact_precedence(b, a));
        Ok(candidates)
    }

    fn dest_for(&self, artifact: &Artifact) -> PathBuf {
        let id = Blake3Hash::compute(artifact.location.to_string().as_bytes());
        self.work_dir
            .join(format!("{}.{}", artifact.filename, id.short(12)))
    }
}

#[async_trait]
impl Obtain for Obtainer {
    async fn obtain(&self, requirement: &Requirement) -> Result<Package, ObtainError> {
        self.reporter.resolving(requirement);
        let candidates = self.candidates(requirement).await?;
        tracing::debug!(%requirement, count = candidates.len(), "ranked candidates");

        for artifact in &candidates {
            let dest = self.dest_for(artifact);
            if dest.exists() {
                tokio::fs::remove_dir_all(&dest).await.ok();
            }
            match self.translator.translate(artifact, &dest).await {
                Translation::Success(package) if package.satisfies(requirement) => {
                    tracing::debug!(%requirement, package = %package, "obtained");
                    return Ok(package);
                }
                Translation::Success(package) => {
                    tracing::debug!(%requirement, package = %package, "translated package does not satisfy, trying next");
                }
                Translation::NotApplicable => {
                    tracing::debug!(artifact = %artifact.filename, "no translator for candidate");
                }
                Translation::Failure(e) => {
                    self.reporter
                        .warning(&format!("Skipping {}: {e}", artifact.filename));
                    tracing::warn!(artifact = %artifact.filename, error = %e, "candidate failed to translate");
                }
            }
        }
        Err(ObtainError::NotFound(requirement.clone()))
    }
}
