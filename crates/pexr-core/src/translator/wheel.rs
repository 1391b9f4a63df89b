//! Wheel installation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{TranslateError, Translation, Translator, select_tag};
use crate::Reporter;
use crate::io::download::Downloader;
use crate::io::extract;
use crate::package::Package;
use crate::types::{Artifact, PackageFormat, PlatformTag, Requirement};

/// Unpacks `.whl` files and reads `Requires-Dist` from their metadata.
#[derive(Clone)]
pub struct WheelTranslator {
    downloader: Downloader,
    target: PlatformTag,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for WheelTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WheelTranslator")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl WheelTranslator {
    /// Install wheels selected for `target`.
    pub fn new(downloader: Downloader, target: PlatformTag, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            downloader,
            target,
            reporter,
        }
    }
}

#[async_trait]
impl Translator for WheelTranslator {
    async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation {
        if artifact.format != PackageFormat::Wheel {
            return Translation::NotApplicable;
        }
        let archive = match self.downloader.fetch(artifact, self.reporter.as_ref()).await {
            Ok(path) => path,
            Err(e) => return Translation::Failure(e.into()),
        };
        let filename = artifact.filename.clone();
        let into = dest.to_path_buf();
        let requires = tokio::task::spawn_blocking(move || install_wheel(&archive, &into, &filename))
            .await
            .map_err(TranslateError::from)
            .and_then(|r| r);
        let requires = match requires {
            Ok(requires) => requires,
            Err(e) => return Translation::Failure(e),
        };
        tracing::debug!(wheel = %artifact.filename, deps = requires.len(), "installed wheel");
        Translation::Success(Package {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            format: PackageFormat::Wheel,
            tag: select_tag(artifact, &self.target),
            origin: artifact.location.clone(),
            path: dest.to_path_buf(),
            requires,
        })
    }
}

fn install_wheel(archive: &Path, dest: &Path, filename: &str) -> Result<Vec<Requirement>, TranslateError> {
    extract::extract_zip(archive, dest)?;
    hoist_data_libs(dest)?;

    let metadata = find_dist_info(dest)
        .map(|d| d.join("METADATA"))
        .filter(|p| p.is_file())
        .ok_or_else(|| TranslateError::Metadata {
            artifact: filename.to_string(),
            message: "missing .dist-info/METADATA".to_string(),
        })?;
    let text = std::fs::read_to_string(&metadata)?;
    Ok(parse_requires_dist(&text, filename))
}

fn find_dist_info(dir: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.extension().is_some_and(|e| e == "dist-info"))
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Move `*.data/purelib` and `*.data/platlib` contents to the import root.
fn hoist_data_libs(dest: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dest)? {
        let data = entry?.path();
        if !(data.is_dir() && data.extension().is_some_and(|e| e == "data")) {
            continue;
        }
        for scheme in ["purelib", "platlib"] {
            let lib = data.join(scheme);
            if !lib.is_dir() {
                continue;
            }
            for item in std::fs::read_dir(&lib)? {
                let item = item?;
                let target = dest.join(item.file_name());
                if target.exists() {
                    tracing::warn!(path = %target.display(), "wheel data entry shadows an existing file, skipping");
                    continue;
                }
                std::fs::rename(item.path(), target)?;
            }
            std::fs::remove_dir_all(&lib)?;
        }
    }
    Ok(())
}

/// `Requires-Dist` headers of a core metadata file. Unparsable entries are
/// logged and skipped.
pub fn parse_requires_dist(metadata: &str, source: &str) -> Vec<Requirement> {
    metadata
        .lines()
        // Headers end at the first blank line; the description follows.
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.strip_prefix("Requires-Dist:"))
        .filter_map(|value| match value.trim().parse::<Requirement>() {
            Ok(req) => Some(req),
            Err(e) => {
                tracing::warn!(%source, requirement = value.trim(), error = %e, "skipping unparsable dependency");
                None
            }
        })
        .collect()
}
