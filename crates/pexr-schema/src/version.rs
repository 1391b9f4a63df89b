//! Release versions and version specifiers.
//!
//! Supports the PEP 440 shapes that show up in artifact filenames and
//! dependency declarations:
//! - Releases: `1.0`, `2.0.1`, `1!2.0`
//! - Pre-releases: `1.0a1`, `1.0b2`, `1.0rc1` (and the `alpha`/`beta`/`c` spellings)
//! - Post/dev releases: `1.0.post1`, `1.0-1`, `1.0.dev3`
//! - Local labels: `1.0+ubuntu1`
//!
//! Specifiers: `==`, `!=`, `>=`, `<=`, `>`, `<`, `~=`, `===`, and `==1.2.*`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors produced while parsing versions or specifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string is not a recognizable release version.
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    /// The string is not a recognizable version specifier.
    #[error("Invalid version specifier: '{0}'")]
    InvalidSpecifier(String),
}

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^v?(?:(?P<epoch>[0-9]+)!)?",
        r"(?P<release>[0-9]+(?:\.[0-9]+)*)",
        r"(?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)[-_.]?(?P<pre_n>[0-9]+)?)?",
        r"(?:-(?P<post_n1>[0-9]+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)?",
        r"(?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?",
        r"(?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?$",
    ))
    .expect("version pattern is valid")
});

/// Pre-release marker. Variant order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    /// `aN`
    Alpha(u64),
    /// `bN`
    Beta(u64),
    /// `rcN`
    Rc(u64),
}

/// A parsed release version with PEP 440 ordering.
///
/// Equality and ordering ignore trailing zero release segments, so
/// `1.0 == 1.0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

/// Sort slot used to place absent components before or after present ones.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Slot<T> {
    Low,
    At(T),
    High,
}

type SortKey<'a> = (
    u64,
    &'a [u64],
    Slot<PreRelease>,
    Slot<u64>,
    Slot<u64>,
    Slot<&'a str>,
);

impl Version {
    /// Build a plain release version from numeric segments.
    pub fn from_release(release: &[u64]) -> Self {
        Self {
            epoch: 0,
            release: if release.is_empty() {
                vec![0]
            } else {
                release.to_vec()
            },
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// Numeric release segments (`[1, 2, 3]` for `1.2.3`).
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Whether this is a pre-release or development release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Copy of this version with the local label removed.
    pub fn without_local(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }

    /// Whether the leading release segments equal `prefix` (missing segments
    /// count as zero).
    pub fn release_starts_with(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, want)| self.release.get(i).copied().unwrap_or(0) == *want)
    }

    fn sort_key(&self) -> SortKey<'_> {
        let mut end = self.release.len();
        while end > 1 && self.release[end - 1] == 0 {
            end -= 1;
        }

        // A bare dev release (1.0.dev1) sorts before every pre-release of 1.0.
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => Slot::Low,
            (Some(pre), _, _) => Slot::At(pre),
            (None, _, _) => Slot::High,
        };
        let post = self.post.map_or(Slot::Low, Slot::At);
        let dev = self.dev.map_or(Slot::High, Slot::At);
        let local = self.local.as_deref().map_or(Slot::Low, Slot::At);

        (self.epoch, &self.release[..end], pre, post, dev, local)
    }
}

fn parse_number(s: &str, original: &str) -> Result<u64, VersionError> {
    s.parse::<u64>()
        .map_err(|_| VersionError::InvalidVersion(original.to_string()))
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let caps = VERSION_RE
            .captures(&lowered)
            .ok_or_else(|| VersionError::InvalidVersion(s.to_string()))?;

        let epoch = match caps.name("epoch") {
            Some(m) => parse_number(m.as_str(), s)?,
            None => 0,
        };

        let release = caps["release"]
            .split('.')
            .map(|seg| parse_number(seg, s))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let n = match caps.name("pre_n") {
                    Some(m) => parse_number(m.as_str(), s)?,
                    None => 0,
                };
                Some(match label.as_str() {
                    "a" | "alpha" => PreRelease::Alpha(n),
                    "b" | "beta" => PreRelease::Beta(n),
                    _ => PreRelease::Rc(n),
                })
            }
            None => None,
        };

        let post = if let Some(m) = caps.name("post_n1") {
            Some(parse_number(m.as_str(), s)?)
        } else if caps.name("post_l").is_some() {
            match caps.name("post_n2") {
                Some(m) => Some(parse_number(m.as_str(), s)?),
                None => Some(0),
            }
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            match caps.name("dev_n") {
                Some(m) => Some(parse_number(m.as_str(), s)?),
                None => Some(0),
            }
        } else {
            None
        };

        let local = caps.name("local").map(|m| m.as_str().replace(['-', '_'], "."));

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", release.join("."))?;
        match self.pre {
            Some(PreRelease::Alpha(n)) => write!(f, "a{n}")?,
            Some(PreRelease::Beta(n)) => write!(f, "b{n}")?,
            Some(PreRelease::Rc(n)) => write!(f, "rc{n}")?,
            None => {}
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Comparison operator of a [`VersionSpecifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>=`
    GreaterEqual,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `~=`
    Compatible,
    /// `===`
    ArbitraryEqual,
}

impl Operator {
    /// Operators in longest-token-first order, for prefix parsing.
    const TOKENS: [(&'static str, Operator); 8] = [
        ("===", Operator::ArbitraryEqual),
        ("~=", Operator::Compatible),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        ("<=", Operator::LessEqual),
        (">=", Operator::GreaterEqual),
        ("<", Operator::Less),
        (">", Operator::Greater),
    ];

    /// The operator's textual form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::Compatible => "~=",
            Self::ArbitraryEqual => "===",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single version constraint such as `>=1.2` or `==2.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
    raw: String,
    wildcard: bool,
}

impl VersionSpecifier {
    /// The comparison operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The version operand (the prefix, for wildcard specifiers).
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Test whether `candidate` satisfies this constraint.
    pub fn contains(&self, candidate: &Version) -> bool {
        match self.operator {
            Operator::Equal => self.matches_exactly(candidate),
            Operator::NotEqual => !self.matches_exactly(candidate),
            Operator::GreaterEqual => candidate >= &self.version,
            Operator::LessEqual => candidate.without_local() <= self.version,
            Operator::Greater => candidate > &self.version,
            Operator::Less => candidate.without_local() < self.version,
            Operator::Compatible => {
                let release = self.version.release();
                let prefix = &release[..release.len().saturating_sub(1).max(1)];
                candidate >= &self.version
                    && candidate.epoch == self.version.epoch
                    && candidate.release_starts_with(prefix)
            }
            Operator::ArbitraryEqual => candidate.to_string() == self.raw,
        }
    }

    fn matches_exactly(&self, candidate: &Version) -> bool {
        if self.wildcard {
            return candidate.epoch == self.version.epoch
                && candidate.release_starts_with(self.version.release());
        }
        if self.version.local.is_none() {
            candidate.without_local() == self.version
        } else {
            candidate == &self.version
        }
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (operator, rest) = Operator::TOKENS
            .iter()
            .find_map(|(token, op)| trimmed.strip_prefix(token).map(|rest| (*op, rest)))
            // A bare version is an exact pin.
            .unwrap_or((Operator::Equal, trimmed));

        let raw = rest.trim().to_string();
        if raw.is_empty() {
            return Err(VersionError::InvalidSpecifier(s.to_string()));
        }

        let (text, wildcard) = match raw.strip_suffix(".*") {
            Some(prefix) if matches!(operator, Operator::Equal | Operator::NotEqual) => {
                (prefix, true)
            }
            Some(_) => return Err(VersionError::InvalidSpecifier(s.to_string())),
            None => (raw.as_str(), false),
        };

        let version: Version = text
            .parse()
            .map_err(|_| VersionError::InvalidSpecifier(s.to_string()))?;

        if operator == Operator::Compatible && version.release().len() < 2 {
            return Err(VersionError::InvalidSpecifier(s.to_string()));
        }

        Ok(Self {
            operator,
            version,
            raw,
            wildcard,
        })
    }
}

impl std::fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.operator, self.raw)
    }
}

/// A conjunction of [`VersionSpecifier`]s; empty means "any version".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Whether no constraint is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the individual constraints.
    pub fn iter(&self) -> std::slice::Iter<'_, VersionSpecifier> {
        self.0.iter()
    }

    /// Test whether `candidate` satisfies every constraint.
    pub fn contains(&self, candidate: &Version) -> bool {
        self.0.iter().all(|spec| spec.contains(candidate))
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl std::fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl TryFrom<String> for VersionSpecifiers {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VersionSpecifiers> for String {
    fn from(v: VersionSpecifiers) -> Self {
        v.to_string()
    }
}
