//! Dependency requirements: `name[extras] specifiers ; marker`.

use crate::markers::{MarkerEnvironment, MarkerError, MarkerExpr};
use crate::types::PackageName;
use crate::version::{Version, VersionError, VersionSpecifiers};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a requirement string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    /// Nothing but whitespace (or a bare marker).
    #[error("Empty requirement")]
    Empty,

    /// The project name is missing or malformed.
    #[error("Invalid requirement '{0}': expected a project name")]
    InvalidName(String),

    /// An unterminated or malformed `[extras]` list.
    #[error("Invalid extras in requirement '{0}'")]
    InvalidExtras(String),

    /// The version constraint failed to parse.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The environment marker failed to parse.
    #[error(transparent)]
    Marker(#[from] MarkerError),
}

/// A parsed, immutable dependency requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Requirement {
    /// Normalized project name.
    pub name: PackageName,
    /// Requested extras, normalized, in declaration order.
    pub extras: Vec<String>,
    /// Version constraints; empty admits every version.
    pub specifiers: VersionSpecifiers,
    /// Environment marker gating this requirement.
    pub marker: Option<MarkerExpr>,
}

impl Requirement {
    /// A requirement on any version of `name`.
    pub fn any(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            extras: Vec::new(),
            specifiers: VersionSpecifiers::default(),
            marker: None,
        }
    }

    /// Whether `version` satisfies the version constraints.
    pub fn contains(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }

    /// Whether this requirement applies on `env`, given the extras requested
    /// for the package that declared it. Requirements without a marker
    /// always apply.
    pub fn applies_to(&self, env: &MarkerEnvironment, extras: &[String]) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extras))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, marker) = match s.split_once(';') {
            Some((head, marker)) => (head.trim(), Some(marker.trim())),
            None => (s.trim(), None),
        };
        if head.is_empty() {
            return Err(RequirementError::Empty);
        }

        let name_len = head.find(|c: char| !is_name_char(c)).unwrap_or(head.len());
        let raw_name = &head[..name_len];
        if !raw_name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(RequirementError::InvalidName(s.to_string()));
        }
        let mut rest = head[name_len..].trim_start();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| RequirementError::InvalidExtras(s.to_string()))?;
            for extra in after[..close].split(',').map(str::trim) {
                if extra.is_empty() {
                    continue;
                }
                if !extra.chars().all(is_name_char) {
                    return Err(RequirementError::InvalidExtras(s.to_string()));
                }
                extras.push(PackageName::new(extra).to_string());
            }
            rest = after[close + 1..].trim_start();
        }

        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        let specifiers: VersionSpecifiers = rest.parse()?;

        let marker = match marker {
            Some(m) if !m.is_empty() => Some(m.parse::<MarkerExpr>()?),
            _ => None,
        };

        Ok(Self {
            name: PackageName::new(raw_name),
            extras,
            specifiers,
            marker,
        })
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        write!(f, "{}", self.specifiers)?;
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Requirement {
    type Error = RequirementError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Requirement> for String {
    fn from(r: Requirement) -> Self {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_form() {
        let req: Requirement = "Requests[Socks, security] >=2.0,<3 ; python_version >= '3'"
            .parse()
            .unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.extras, vec!["socks", "security"]);
        assert!(req.contains(&"2.31.0".parse().unwrap()));
        assert!(!req.contains(&"3.0".parse().unwrap()));
        assert!(req.marker.is_some());
        assert_eq!(
            req.to_string(),
            "requests[socks,security]>=2.0,<3; python_version >= \"3\""
        );
    }

    #[test]
    fn parses_bare_and_parenthesized_forms() {
        let bare: Requirement = "six".parse().unwrap();
        assert!(bare.specifiers.is_empty());
        assert_eq!(bare, Requirement::any("six"));

        let paren: Requirement = "zope.interface (>=4.0)".parse().unwrap();
        assert_eq!(paren.name, "zope-interface");
        assert_eq!(paren.to_string(), "zope-interface>=4.0");
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!("".parse::<Requirement>(), Err(RequirementError::Empty));
        assert!(matches!(
            ">=1.0".parse::<Requirement>(),
            Err(RequirementError::InvalidName(_))
        ));
        assert!(matches!(
            "foo[bar".parse::<Requirement>(),
            Err(RequirementError::InvalidExtras(_))
        ));
        assert!(matches!(
            "foo>=banana".parse::<Requirement>(),
            Err(RequirementError::Version(_))
        ));
    }

    #[test]
    fn marker_gates_applicability() {
        let env = MarkerEnvironment {
            sys_platform: "linux".into(),
            ..MarkerEnvironment::default()
        };
        let win: Requirement = "pywin32; sys_platform == 'win32'".parse().unwrap();
        assert!(!win.applies_to(&env, &[]));
        let extra: Requirement = "PySocks; extra == 'socks'".parse().unwrap();
        assert!(!extra.applies_to(&env, &[]));
        assert!(extra.applies_to(&env, &["socks".to_string()]));
    }

    #[test]
    fn serializes_as_string() {
        let req: Requirement = "flask>=2".parse().unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, "\"flask>=2\"");
        assert_eq!(serde_json::from_str::<Requirement>(&json).unwrap(), req);
    }
}
