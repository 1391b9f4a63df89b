//! Installed, translated distributions.

use crate::types::{
    Artifact, Location, PackageFormat, PackageName, PlatformTag, Requirement, Version,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// A distribution unpacked into an importable directory.
///
/// Ordering is precedence order: format first (wheel > egg > source), then
/// version, then origin so that the order is total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Project name.
    pub name: PackageName,
    /// Project version.
    pub version: Version,
    /// Format of the artifact this package was translated from.
    pub format: PackageFormat,
    /// Compatibility tag the package was selected under.
    pub tag: PlatformTag,
    /// Artifact the package came from.
    pub origin: Location,
    /// Installed directory (import root).
    pub path: PathBuf,
    /// Declared dependencies, markers unevaluated.
    #[serde(default)]
    pub requires: Vec<Requirement>,
}

impl Package {
    /// Whether this package satisfies `requirement` (name and version).
    /// Pre-releases are admitted.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.name == requirement.name && requirement.contains(&self.version)
    }

    /// Pinned `name==version` requirement for this package.
    pub fn as_requirement(&self) -> Requirement {
        let mut req = Requirement::any(self.name.clone());
        if let Ok(specifiers) = format!("=={}", self.version).parse() {
            req.specifiers = specifiers;
        }
        req
    }

    /// Directory name used for this package inside a bundle.
    pub fn dist_name(&self) -> String {
        self.origin.filename().unwrap_or_else(|| {
            format!(
                "{}-{}.{}",
                self.name.as_filename_component(),
                self.version,
                self.format
            )
        })
    }

    fn precedence_key(&self) -> (PackageFormat, &Version, &Location, &PackageName) {
        (self.format, &self.version, &self.origin, &self.name)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_key() == other.precedence_key()
    }
}

impl Eq for Package {}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_key().cmp(&other.precedence_key())
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.format)
    }
}

/// Compare two artifacts by precedence: format, then version.
pub fn artifact_precedence(a: &Artifact, b: &Artifact) -> Ordering {
    (a.format, &a.version).cmp(&(b.format, &b.version))
}
