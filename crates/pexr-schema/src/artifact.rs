//! Artifact locations and filename parsing.
//!
//! Repositories only ever tell us a location; everything else about a
//! candidate (project, version, format, compatibility tags, expected digest)
//! is inferred from its filename and URL fragment.

use crate::hash::Sha256Hash;
use crate::platform::PlatformTag;
use crate::types::PackageName;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Installable artifact format. Variant order is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Source distribution that must be built.
    Source,
    /// Binary egg.
    Egg,
    /// Binary wheel.
    Wheel,
}

impl PackageFormat {
    /// Lowercase name used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Egg => "egg",
            Self::Wheel => "wheel",
        }
    }
}

impl std::fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact lives: on disk or behind a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Location {
    /// A local file.
    Local(PathBuf),
    /// An http(s) or file URL.
    Remote(String),
}

impl Location {
    /// Last path component of the location, ignoring query and fragment.
    pub fn filename(&self) -> Option<String> {
        match self {
            Self::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(url) => {
                let url = url.split(['#', '?']).next().unwrap_or(url);
                let name = url.rsplit('/').next().filter(|n| !n.is_empty())?;
                Some(name.replace("%2B", "+").replace("%2b", "+"))
            }
        }
    }

    /// The local path, if this location is on disk.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        if s.contains("://") {
            Self::Remote(s)
        } else {
            Self::Local(PathBuf::from(s))
        }
    }
}

impl FromStr for Location {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl From<Location> for String {
    fn from(l: Location) -> Self {
        l.to_string()
    }
}

/// A candidate artifact discovered by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where to fetch it from (URL fragment removed).
    pub location: Location,
    /// Basename the metadata below was inferred from.
    pub filename: String,
    /// Project name.
    pub name: PackageName,
    /// Project version.
    pub version: Version,
    /// Inferred format.
    pub format: PackageFormat,
    /// Compatibility tags; sources carry a single all-`Any` tag.
    pub tags: Vec<PlatformTag>,
    /// Digest advertised by the repository, verified after download.
    pub sha256: Option<Sha256Hash>,
}

const SDIST_SUFFIXES: [&str; 4] = [".tar.gz", ".tgz", ".tar", ".zip"];

impl Artifact {
    /// Infer an artifact from a location. Returns `None` for files that are
    /// not recognizable distributions.
    pub fn from_location(location: Location) -> Option<Self> {
        let (location, sha256) = match location {
            Location::Remote(url) => match url.split_once('#') {
                Some((base, fragment)) => {
                    let sha = fragment
                        .split('&')
                        .find_map(|kv| kv.strip_prefix("sha256="))
                        .and_then(|hex| Sha256Hash::new(hex).ok());
                    (Location::Remote(base.to_string()), sha)
                }
                None => (Location::Remote(url), None),
            },
            local @ Location::Local(_) => (local, None),
        };
        let filename = location.filename()?;
        let (name, version, format, tags) = parse_filename(&filename)?;
        Some(Self {
            location,
            filename,
            name,
            version,
            format,
            tags,
            sha256,
        })
    }

    /// Whether any of the artifact's tags can run on `target`.
    pub fn compatible_with(&self, target: &PlatformTag) -> bool {
        self.tags.iter().any(|tag| tag.compatible_with(target))
    }
}

type ParsedFilename = (PackageName, Version, PackageFormat, Vec<PlatformTag>);

/// Split an artifact basename into its project, version, format and tags.
pub fn parse_filename(filename: &str) -> Option<ParsedFilename> {
    if let Some(stem) = filename.strip_suffix(".whl") {
        return parse_wheel(stem);
    }
    if let Some(stem) = filename.strip_suffix(".egg") {
        return parse_egg(stem);
    }
    let lower = filename.to_ascii_lowercase();
    SDIST_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .and_then(|suffix| parse_sdist(&filename[..filename.len() - suffix.len()]))
}

/// `name-version(-build)?-python-abi-platform`
fn parse_wheel(stem: &str) -> Option<ParsedFilename> {
    let parts: Vec<&str> = stem.split('-').collect();
    if !(parts.len() == 5 || parts.len() == 6) {
        return None;
    }
    let n = parts.len();
    let version = parts[1].parse().ok()?;
    let tags = PlatformTag::from_wheel_tags(parts[n - 3], parts[n - 2], parts[n - 1]);
    Some((PackageName::new(parts[0]), version, PackageFormat::Wheel, tags))
}

/// `name-version-pyX.Y(-platform)?`
fn parse_egg(stem: &str) -> Option<ParsedFilename> {
    let mut parts = stem.splitn(4, '-');
    let name = parts.next()?;
    let version = parts.next()?.parse().ok()?;
    let python = parts.next()?.strip_prefix("py")?;
    let platform = parts.next();
    Some((
        PackageName::new(name),
        version,
        PackageFormat::Egg,
        vec![PlatformTag::from_egg(python, platform)],
    ))
}

/// `name-version`, split at the first `-` followed by a digit.
fn parse_sdist(stem: &str) -> Option<ParsedFilename> {
    let split = stem
        .char_indices()
        .zip(stem.chars().skip(1))
        .find(|((_, c), next)| *c == '-' && next.is_ascii_digit())
        .map(|((i, _), _)| i)?;
    let version = stem[split + 1..].parse().ok()?;
    Some((
        PackageName::new(&stem[..split]),
        version,
        PackageFormat::Source,
        vec![PlatformTag::any()],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TagValue;

    fn remote(url: &str) -> Artifact {
        Artifact::from_location(Location::Remote(url.to_string())).unwrap()
    }

    #[test]
    fn parses_wheels() {
        let a = remote("https://files.example/simplejson-3.19.1-cp39-cp39-manylinux_2_17_x86_64.whl");
        assert_eq!(a.name, "simplejson");
        assert_eq!(a.version.to_string(), "3.19.1");
        assert_eq!(a.format, PackageFormat::Wheel);
        assert_eq!(a.tags[0].os, TagValue::Is("linux".into()));

        let build_tag = parse_filename("foo_bar-1.0-1-py3-none-any.whl").unwrap();
        assert_eq!(build_tag.0, "foo-bar");
    }

    #[test]
    fn parses_eggs() {
        let (name, version, format, tags) =
            parse_filename("setuptools-0.6c11-py2.7-macosx-10.9-x86_64.egg").unwrap();
        assert_eq!(name, "setuptools");
        assert_eq!(version.to_string(), "0.6rc11");
        assert_eq!(format, PackageFormat::Egg);
        assert_eq!(tags[0].python, TagValue::Is("2.7".into()));
        assert_eq!(tags[0].arch, TagValue::Is("x86_64".into()));

        let pure = parse_filename("six-1.16.0-py3.9.egg").unwrap();
        assert_eq!(pure.3[0].os, TagValue::Any);
    }

    #[test]
    fn parses_sdists() {
        let (name, version, format, tags) = parse_filename("python-dateutil-2.8.2.tar.gz").unwrap();
        assert_eq!(name, "python-dateutil");
        assert_eq!(version.to_string(), "2.8.2");
        assert_eq!(format, PackageFormat::Source);
        assert_eq!(tags, vec![PlatformTag::any()]);
        assert!(parse_filename("foo-1.0.zip").is_some());
        assert!(parse_filename("foo-1.0.tgz").is_some());
    }

    #[test]
    fn ignores_unrecognized_files() {
        assert!(parse_filename("README.md").is_none());
        assert!(parse_filename("foo.tar.gz").is_none());
        assert!(parse_filename("foo-latest.tar.gz").is_none());
        assert!(parse_filename("not-a-wheel.whl").is_none());
    }

    #[test]
    fn keeps_sha256_fragment_and_strips_it_from_location() {
        let sha = "a".repeat(64);
        let a = remote(&format!("https://host/pkgs/foo-1.0.tar.gz#sha256={sha}"));
        assert_eq!(a.sha256.unwrap().as_str(), sha);
        assert_eq!(a.location.to_string(), "https://host/pkgs/foo-1.0.tar.gz");
    }

    #[test]
    fn format_precedence_order() {
        assert!(PackageFormat::Wheel > PackageFormat::Egg);
        assert!(PackageFormat::Egg > PackageFormat::Source);
    }

    #[test]
    fn location_string_forms() {
        let local: Location = "/tmp/repo/foo-1.0.tar.gz".parse().unwrap();
        assert_eq!(local.filename().as_deref(), Some("foo-1.0.tar.gz"));
        assert!(local.as_path().is_some());
        let url: Location = "https://host/a/foo-1.0%2Blocal.tar.gz?x=1".parse().unwrap();
        assert_eq!(url.filename().as_deref(), Some("foo-1.0+local.tar.gz"));
    }
}
