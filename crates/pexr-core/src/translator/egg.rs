//! Egg installation.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{TranslateError, Translation, Translator, select_tag};
use crate::Reporter;
use crate::io::download::Downloader;
use crate::io::extract;
use crate::package::Package;
use crate::types::{Artifact, MarkerExpr, PackageFormat, PlatformTag, Requirement};

/// Unpacks `.egg` files and reads `EGG-INFO/requires.txt`.
#[derive(Clone)]
pub struct EggTranslator {
    downloader: Downloader,
    target: PlatformTag,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for EggTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EggTranslator")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl EggTranslator {
    /// Install eggs selected for `target`.
    pub fn new(downloader: Downloader, target: PlatformTag, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            downloader,
            target,
            reporter,
        }
    }
}

#[async_trait]
impl Translator for EggTranslator {
    async fn translate(&self, artifact: &Artifact, dest: &Path) -> Translation {
        if artifact.format != PackageFormat::Egg {
            return Translation::NotApplicable;
        }
        let archive = match self.downloader.fetch(artifact, self.reporter.as_ref()).await {
            Ok(path) => path,
            Err(e) => return Translation::Failure(e.into()),
        };
        let filename = artifact.filename.clone();
        let into = dest.to_path_buf();
        let requires = tokio::task::spawn_blocking(move || {
            extract::extract_zip(&archive, &into)?;
            let requires_txt = into.join("EGG-INFO").join("requires.txt");
            if !requires_txt.is_file() {
                return Ok(Vec::new());
            }
            let text = std::fs::read_to_string(requires_txt)?;
            parse_requires_txt(&text, &filename)
        })
        .await
        .map_err(TranslateError::from)
        .and_then(|r| r);

        match requires {
            Ok(requires) => Translation::Success(Package {
                name: artifact.name.clone(),
                version: artifact.version.clone(),
                format: PackageFormat::Egg,
                tag: select_tag(artifact, &self.target),
                origin: artifact.location.clone(),
                path: dest.to_path_buf(),
                requires,
            }),
            Err(e) => Translation::Failure(e),
        }
    }
}

/// Parse a setuptools `requires.txt`.
///
/// Section headers gate the requirements that follow them:
/// `[name]` becomes `extra == "name"`, `[:marker]` becomes the marker, and
/// `[name:marker]` requires both.
///
/// # Errors
///
/// Returns [`TranslateError::Metadata`] for a malformed section header.
/// Malformed requirement lines are logged and skipped.
pub fn parse_requires_txt(text: &str, source: &str) -> Result<Vec<Requirement>, TranslateError> {
    let bad_section = |header: &str, message: String| TranslateError::Metadata {
        artifact: source.to_string(),
        message: format!("section [{header}]: {message}"),
    };

    let mut section: Option<MarkerExpr> = None;
    let mut requires = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let (extra, marker) = header.split_once(':').unwrap_or((header, ""));
            let gate = match (extra.trim(), marker.trim()) {
                ("", "") => None,
                (extra, "") => Some(format!("extra == \"{extra}\"")),
                ("", marker) => Some(marker.to_string()),
                (extra, marker) => Some(format!("({marker}) and extra == \"{extra}\"")),
            };
            section = gate
                .map(|g| g.parse::<MarkerExpr>())
                .transpose()
                .map_err(|e| bad_section(header, e.to_string()))?;
            continue;
        }
        let mut req: Requirement = match line.parse() {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(%source, requirement = line, error = %e, "skipping unparsable dependency");
                continue;
            }
        };
        if let Some(gate) = &section {
            req.marker = Some(match req.marker.take() {
                Some(own) => MarkerExpr::And(Box::new(own), Box::new(gate.clone())),
                None => gate.clone(),
            });
        }
        requires.push(req);
    }
    Ok(requires)
}
