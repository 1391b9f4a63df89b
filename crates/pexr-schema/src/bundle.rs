//! `PEXR-INFO`: the metadata document stored inside every bundle.

use crate::artifact::Location;
use crate::platform::InterpreterIdentity;
use crate::requirement::Requirement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Archive path of the metadata document.
pub const BUNDLE_INFO_PATH: &str = "PEXR-INFO";

/// Archive directory holding embedded distributions, one subdirectory each.
pub const DEPS_DIR: &str = ".deps";

/// Errors produced while parsing an entry point.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid entry point '{0}': expected 'module' or 'module:callable'")]
pub struct InvalidEntryPoint(pub String);

/// What the bundle runs: a module, or a callable inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryPoint {
    /// Dotted module path.
    pub module: String,
    /// Attribute to call after importing `module`.
    pub callable: Option<String>,
}

fn is_dotted_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            part.starts_with(|c: char| c.is_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
}

impl FromStr for EntryPoint {
    type Err = InvalidEntryPoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, callable) = match s.trim().split_once(':') {
            Some((module, callable)) => (module, Some(callable)),
            None => (s.trim(), None),
        };
        if !is_dotted_path(module) || callable.is_some_and(|c| !is_dotted_path(c)) {
            return Err(InvalidEntryPoint(s.to_string()));
        }
        Ok(Self {
            module: module.to_string(),
            callable: callable.map(str::to_string),
        })
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.callable {
            Some(callable) => write!(f, "{}:{callable}", self.module),
            None => f.write_str(&self.module),
        }
    }
}

impl TryFrom<String> for EntryPoint {
    type Error = InvalidEntryPoint;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntryPoint> for String {
    fn from(e: EntryPoint) -> Self {
        e.to_string()
    }
}

/// A requirement recorded in the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementEntry {
    /// The requirement as resolved at build time.
    pub requirement: Requirement,
    /// Artifact the requirement was satisfied from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Re-resolve at run time instead of trusting the embedded copy.
    #[serde(default)]
    pub dynamic: bool,
    /// Repository to consult when re-resolving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Where and with what the bundle was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProperties {
    /// Build host platform (`linux-x86_64`).
    #[serde(default)]
    pub platform: String,
    /// Build interpreter identity.
    #[serde(default)]
    pub interpreter: String,
    /// Version of the tool that froze the bundle.
    #[serde(default)]
    pub builder_version: String,
    /// RFC 3339 build time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

/// Bundle metadata, serialized as JSON at [`BUNDLE_INFO_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    /// Interpreter the bundle was built for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<InterpreterIdentity>,
    /// Requirements, in resolution order.
    #[serde(default)]
    pub requirements: Vec<RequirementEntry>,
    /// Embedded distribution directory name -> content hash.
    #[serde(default)]
    pub distributions: BTreeMap<String, String>,
    /// What to run; `None` starts an interactive interpreter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<EntryPoint>,
    /// Whether code may be imported straight out of the archive.
    #[serde(default = "default_true")]
    pub zip_safe: bool,
    /// Extract to the cache even when zip-safe.
    #[serde(default)]
    pub always_write_cache: bool,
    /// Continue when a requirement cannot be satisfied at run time.
    #[serde(default)]
    pub ignore_errors: bool,
    /// Append the ambient import path instead of isolating.
    #[serde(default)]
    pub inherit_path: bool,
    /// Hash over the user sources, keys the code extraction directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
    /// Build provenance.
    #[serde(default)]
    pub build_properties: BuildProperties,
}

fn default_true() -> bool {
    true
}

impl Default for BundleInfo {
    fn default() -> Self {
        Self {
            interpreter: None,
            requirements: Vec::new(),
            distributions: BTreeMap::new(),
            entry_point: None,
            zip_safe: true,
            always_write_cache: false,
            ignore_errors: false,
            inherit_path: false,
            code_hash: None,
            build_properties: BuildProperties::default(),
        }
    }
}

impl BundleInfo {
    /// Record a requirement, replacing an earlier entry for the same project.
    pub fn add_requirement(&mut self, entry: RequirementEntry) {
        match self
            .requirements
            .iter_mut()
            .find(|e| e.requirement.name == entry.requirement.name)
        {
            Some(existing) => *existing = entry,
            None => self.requirements.push(entry),
        }
    }

    /// Record an embedded distribution and its content hash.
    pub fn add_distribution(&mut self, dist_dir: impl Into<String>, hash: impl Into<String>) {
        self.distributions.insert(dist_dir.into(), hash.into());
    }

    /// Pretty JSON for embedding in the archive.
    ///
    /// # Errors
    ///
    /// Returns a serialization error (never expected for this type).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse the embedded document.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid `PEXR-INFO` document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
