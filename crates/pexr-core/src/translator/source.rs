//! Source distribution translation: unpack, build, then install the result
//! with the binary translators.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{TranslateError, Translation, Translator};
use crate::Reporter;
use crate::installer::Installer;
use crate::io::download::Downloader;
use crate::io::extract;
use crate::types::{Artifact, Location, PackageFormat, Target};

/// Builds sdists through an [`Installer`].
#[derive(Clone)]
pub struct SourceTranslator {
    downloader: Downloader,
    installer: Arc<dyn Installer>,
    binary: Arc<dyn Translator>,
    target: Target,
    work_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for SourceTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTranslator")
            .field("installer", &self.installer)
            .field("target", &self.target)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl SourceTranslator {
    /// Build with `installer` and install its output with `binary`.
    /// Sources are unpacked in temporary directories under `work_dir`.
    pub fn new(
        downloader: Downloader,
        installer: Arc<dyn Installer>,
        binary: Arc<dyn Translator>,
        target: Target,
        work_dir: impl Into<PathBuf>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            downloader,
            installer,
            binary,
            target,
            work_dir: work_dir.into(),
            reporter,
        }
    }

    async fn build(&self, artifact: &Artifact) -> Result<(tempfile::TempDir, Artifact), TranslateError> {
        let archive = self.downloader.fetch(artifact, self.reporter.as_ref()).await?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("pexr-sdist-")
            .tempdir_in(&self.work_dir)?;
        let unpack = scratch.path().to_path_buf();
        let tree = tokio::task::spawn_blocking(move || {
            extract::extract_auto(&archive, &unpack)?;
            Ok::<_, TranslateError>(extract::source_root(&unpack)?)
        })
        .await??;

        self.reporter.building(&artifact.name, &artifact.version);
        let built = self.installer.build(&tree, &self.target.interpreter).await?;

        let built_artifact = Artifact::from_location(Location::Local(built.clone()))
            .filter(|a| a.format != PackageFormat::Source)
            .ok_or_else(|| TranslateError::Metadata {
                artifact: artifact.filename.clone(),
                message: format!("build produced unrecognized file {}", built.display()),
            })?;
        if built_artifact.name != artifact.name {
            return Err(TranslateError::Metadata {
                artifact: artifact.filename.clone(),
                message: format!("build produced a distribution for '{}'", built_artifact.name),
            });
        }
        Ok((scratch, built_artifact))
    }
}

#[async_trait]
impl Translator for SourceTranslator {
    async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation {
        if artifact.format != PackageFormat::Source {
            return Translation::NotApplicable;
        }
        // `_scratch` keeps the unpacked tree alive until the binary is installed.
        let (_scratch, built) = match self.build(artifact).await {
            Ok(built) => built,
            Err(e) => return Translation::Failure(e),
        };
        match self.binary.translate(&built, dest).await {
            Translation::Success(mut package) => {
                // Recorded as the sdist it came from, built for exactly this target.
                package.format = PackageFormat::Source;
                package.origin = artifact.location.clone();
                package.tag = self.target.tag();
                package.version = artifact.version.clone();
                Translation::Success(package)
            }
            Translation::NotApplicable => {
                Translation::Failure(TranslateError::Unhandled(built.filename))
            }
            failure @ Translation::Failure(_) => failure,
        }
    }
}
