//! Turning candidate artifacts into installed packages.
//!
//! A [`Translator`] answers with one of three outcomes: the package, "not my
//! format" ([`Translation::NotApplicable`]), or a failure that disqualifies the
//! candidate. Translators are composed, not subclassed:
//!
//! ```text
//! CachingTranslator
//!   └── ChainedTranslator [wheel, egg, source]
//!                                        └── Installer + [wheel, egg]
//! ```

pub mod caching;
pub mod egg;
pub mod source;
pub mod wheel;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::CacheError;
use crate::installer::BuildFailure;
use crate::io::download::DownloadError;
use crate::io::extract::ExtractError;
use crate::package::Package;
use crate::types::{Artifact, PlatformTag};

pub use caching::CachingTranslator;
pub use egg::EggTranslator;
pub use source::SourceTranslator;
pub use wheel::WheelTranslator;

/// Why a translator that accepted an artifact could not install it.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// Fetching the artifact failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Unpacking failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A source distribution did not build.
    #[error(transparent)]
    Build(#[from] BuildFailure),

    /// Reading or committing a cache entry failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Other filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dependency metadata could not be read.
    #[error("Bad metadata in {artifact}: {message}")]
    Metadata {
        /// Artifact file name.
        artifact: String,
        /// What was wrong.
        message: String,
    },

    /// The built artifact was not a format any binary translator takes.
    #[error("No translator accepted {0}")]
    Unhandled(String),

    /// A blocking task panicked or was cancelled.
    #[error("Translation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of translating one artifact.
#[derive(Debug)]
pub enum Translation {
    /// The artifact was installed.
    Success(Package),
    /// This translator does not handle the artifact's format.
    NotApplicable,
    /// The translator handles the format but could not produce a package.
    Failure(TranslateError),
}

impl Translation {
    /// Whether this is a [`Translation::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<Package, TranslateError>> for Translation {
    fn from(result: Result<Package, TranslateError>) -> Self {
        match result {
            Ok(package) => Self::Success(package),
            Err(e) => Self::Failure(e),
        }
    }
}

/// Installs an artifact into a directory.
#[async_trait]
pub trait Translator: Send + Sync + std::fmt::Debug {
    /// Install `artifact` into the empty directory `dest`.
    async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation;
}

/// The tag a package is recorded under: the first of the artifact's tags
/// that runs on `target`, else its first tag.
pub fn select_tag(artifact: &Artifact, target: &PlatformTag) -> PlatformTag {
    artifact
        .tags
        .iter()
        .find(|tag| tag.compatible_with(target))
        .or_else(|| artifact.tags.first())
        .cloned()
        .unwrap_or_else(PlatformTag::any)
}

/// Tries each translator in order until one applies.
#[derive(Debug, Clone, Default)]
pub struct ChainedTranslator {
    translators: Vec<Arc<dyn Translator>>,
}

impl ChainedTranslator {
    /// Chain `translators` in priority order.
    pub fn new(translators: Vec<Arc<dyn Translator>>) -> Self {
        Self { translators }
    }
}

#[async_trait]
impl Translator for ChainedTranslator {
    async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation {
        for translator in &self.translators {
            match translator.translate(artifact, dest).await {
                Translation::NotApplicable => {}
                outcome => return outcome,
            }
        }
        Translation::NotApplicable
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Location, PackageFormat};
    use std::io::Write;
    use std::path::PathBuf;

    /// Write a zip with the given entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    pub(crate) fn local(path: PathBuf) -> Artifact {
        Artifact::from_location(Location::Local(path)).unwrap()
    }

    #[derive(Debug)]
    struct Fixed(Option<PackageFormat>);

    #[async_trait]
    impl Translator for Fixed {
        async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation {
            match self.0 {
                Some(format) if format == artifact.format => Translation::Success(Package {
                    name: artifact.name.clone(),
                    version: artifact.version.clone(),
                    format,
                    tag: PlatformTag::any(),
                    origin: artifact.location.clone(),
                    path: dest.to_path_buf(),
                    requires: Vec::new(),
                }),
                Some(_) => Translation::NotApplicable,
                None => Translation::Failure(TranslateError::Unhandled(artifact.filename.clone())),
            }
        }
    }

    #[tokio::test]
    async fn chain_falls_through_not_applicable_only() {
        let wheel = local(PathBuf::from("/r/foo-1.0-py3-none-any.whl"));
        let sdist = local(PathBuf::from("/r/foo-1.0.tar.gz"));
        let chain = ChainedTranslator::new(vec![
            Arc::new(Fixed(Some(PackageFormat::Wheel))),
            Arc::new(Fixed(None)),
            Arc::new(Fixed(Some(PackageFormat::Source))),
        ]);

        assert!(chain.translate(&wheel, Path::new("/d")).await.is_success());
        // The failing middle translator stops the chain before the source one.
        assert!(matches!(
            chain.translate(&sdist, Path::new("/d")).await,
            Translation::Failure(_)
        ));
        assert!(matches!(
            ChainedTranslator::default().translate(&sdist, Path::new("/d")).await,
            Translation::NotApplicable
        ));
    }

    #[test]
    fn select_tag_prefers_compatible() {
        let artifact = local(PathBuf::from(
            "/r/foo-1.0-cp39-cp39-manylinux1_x86_64.macosx_10_9_x86_64.whl",
        ));
        let mac: PlatformTag = "macosx-x86_64-cpython-3.9-cp39".parse().unwrap();
        assert_eq!(select_tag(&artifact, &mac).os.value(), Some("macosx"));
        let win: PlatformTag = "windows-x86_64-cpython-3.9-cp39".parse().unwrap();
        assert_eq!(select_tag(&artifact, &win), artifact.tags[0]);
    }
}
