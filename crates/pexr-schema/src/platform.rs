//! Platform and interpreter descriptors, and artifact compatibility tags.
//!
//! Wheel filenames and egg suffixes describe what they run on with a zoo of
//! spellings (`manylinux2014_x86_64`, `macosx_10_9_universal2`, `win_amd64`,
//! `linux-x86_64`). Everything is normalized into a [`PlatformTag`] whose
//! fields are either a concrete value or [`TagValue::Any`], so compatibility
//! against the build target is a field-by-field test.

use crate::markers::MarkerEnvironment;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing platform or interpreter strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Not a recognizable `os-arch` platform string.
    #[error("Invalid platform '{0}'")]
    InvalidPlatform(String),

    /// Not a recognizable `Implementation-X.Y.Z` interpreter identity.
    #[error("Invalid interpreter identity '{0}'")]
    InvalidInterpreter(String),

    /// Not a recognizable rendered tag.
    #[error("Invalid platform tag '{0}'")]
    InvalidTag(String),
}

/// One field of a [`PlatformTag`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagValue {
    /// Matches every target.
    Any,
    /// Matches only this normalized value.
    Is(String),
}

impl TagValue {
    fn is(value: impl Into<String>) -> Self {
        Self::Is(value.into())
    }

    fn matches(&self, target: &TagValue) -> bool {
        match (self, target) {
            (Self::Is(want), Self::Is(have)) => want == have,
            _ => true,
        }
    }

    /// The concrete value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Is(v) => Some(v),
        }
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Is(v) => f.write_str(v),
        }
    }
}

/// Normalized `(os, arch, implementation, python, abi)` compatibility tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformTag {
    /// `linux`, `macosx`, `windows`
    pub os: TagValue,
    /// `x86_64`, `arm64`, `x86`
    pub arch: TagValue,
    /// `cpython`, `pypy`
    pub implementation: TagValue,
    /// Python version prefix: `3`, `3.9`
    pub python: TagValue,
    /// `cp39`, `abi3`
    pub abi: TagValue,
}

impl PlatformTag {
    /// A tag that runs everywhere (pure-Python, version-agnostic).
    pub fn any() -> Self {
        Self {
            os: TagValue::Any,
            arch: TagValue::Any,
            implementation: TagValue::Any,
            python: TagValue::Any,
            abi: TagValue::Any,
        }
    }

    /// Expand a wheel's `python-abi-platform` triple into tags. Each part may
    /// be a `.`-separated compressed set (`py2.py3`).
    pub fn from_wheel_tags(python: &str, abi: &str, platform: &str) -> Vec<Self> {
        let mut tags = Vec::new();
        for py in python.split('.') {
            let (implementation, python) = parse_python_tag(py);
            for abi in abi.split('.') {
                let abi = match abi.to_ascii_lowercase().as_str() {
                    "none" => TagValue::Any,
                    other => TagValue::is(other),
                };
                for plat in platform.split('.') {
                    let (os, arch) = parse_platform_tag(plat);
                    let tag = Self {
                        os,
                        arch,
                        implementation: implementation.clone(),
                        python: python.clone(),
                        abi: abi.clone(),
                    };
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
            }
        }
        tags
    }

    /// Tag for an egg built for `python` (`2.7`, `3.9`) and an optional
    /// platform suffix (`linux-x86_64`, `macosx-10.9-x86_64`).
    pub fn from_egg(python: &str, platform: Option<&str>) -> Self {
        let (os, arch) = match platform {
            Some(plat) => parse_platform_tag(&plat.replace(['-', '.'], "_")),
            None => (TagValue::Any, TagValue::Any),
        };
        Self {
            os,
            arch,
            implementation: TagValue::Any,
            python: TagValue::is(python),
            abi: TagValue::Any,
        }
    }

    /// Whether an artifact carrying this tag can run on `target`.
    pub fn compatible_with(&self, target: &PlatformTag) -> bool {
        let stable_abi = self.abi.value() == Some("abi3");
        let python = match (&self.python, &target.python) {
            // abi3 builds run on every later minor of the same major.
            (TagValue::Is(want), TagValue::Is(have)) if stable_abi => {
                let want = version_segments(want);
                let have = version_segments(have);
                want.first() == have.first() && have >= want
            }
            (TagValue::Is(want), TagValue::Is(have)) => {
                have == want || have.starts_with(&format!("{want}."))
            }
            _ => true,
        };
        let abi = if stable_abi {
            TagValue::is("cpython").matches(&target.implementation)
        } else {
            self.abi.matches(&target.abi)
        };
        self.os.matches(&target.os)
            && self.arch.matches(&target.arch)
            && self.implementation.matches(&target.implementation)
            && python
            && abi
    }
}

impl std::fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.os, self.arch, self.implementation, self.python, self.abi
        )
    }
}

impl FromStr for PlatformTag {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<TagValue> = s
            .split('-')
            .map(|p| match p {
                "*" => TagValue::Any,
                v => TagValue::is(v),
            })
            .collect();
        let [os, arch, implementation, python, abi]: [TagValue; 5] = parts
            .try_into()
            .map_err(|_| PlatformError::InvalidTag(s.to_string()))?;
        Ok(Self {
            os,
            arch,
            implementation,
            python,
            abi,
        })
    }
}

impl TryFrom<String> for PlatformTag {
    type Error = PlatformError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PlatformTag> for String {
    fn from(t: PlatformTag) -> Self {
        t.to_string()
    }
}

fn version_segments(v: &str) -> Vec<u64> {
    v.split('.').filter_map(|s| s.parse().ok()).collect()
}

/// `cp39` -> (`cpython`, `3.9`); `py3` -> (any, `3`); `py2.py3` is split
/// by the caller.
fn parse_python_tag(tag: &str) -> (TagValue, TagValue) {
    let tag = tag.to_ascii_lowercase();
    let digits_at = tag.find(|c: char| c.is_ascii_digit()).unwrap_or(tag.len());
    let (prefix, digits) = tag.split_at(digits_at);
    let implementation = match prefix {
        "py" | "" => TagValue::Any,
        "cp" => TagValue::is("cpython"),
        "pp" => TagValue::is("pypy"),
        "ip" => TagValue::is("ironpython"),
        "jy" => TagValue::is("jython"),
        other => TagValue::is(other),
    };
    let python = match digits.len() {
        0 => TagValue::Any,
        1 => TagValue::is(digits),
        _ => TagValue::Is(format!("{}.{}", &digits[..1], &digits[1..])),
    };
    (implementation, python)
}

fn normalize_os(os: &str) -> TagValue {
    let os = os.to_ascii_lowercase();
    if os.starts_with("manylinux") || os.starts_with("musllinux") || os.starts_with("linux") {
        TagValue::is("linux")
    } else if os.starts_with("macosx") || os == "darwin" || os == "macos" {
        TagValue::is("macosx")
    } else if os.starts_with("win") {
        TagValue::is("windows")
    } else {
        TagValue::Is(os)
    }
}

fn normalize_arch(arch: &str) -> TagValue {
    let arch = arch.to_ascii_lowercase();
    match arch.as_str() {
        "amd64" | "x86_64" | "x64" => TagValue::is("x86_64"),
        "aarch64" | "arm64" => TagValue::is("arm64"),
        "i386" | "i686" | "x86" | "win32" => TagValue::is("x86"),
        "intel" => TagValue::Any,
        a if a.starts_with("universal") || a.starts_with("fat") => TagValue::Any,
        _ => TagValue::Is(arch),
    }
}

/// `manylinux_2_17_x86_64` -> (`linux`, `x86_64`); `any` -> (any, any).
fn parse_platform_tag(plat: &str) -> (TagValue, TagValue) {
    let plat = plat.to_ascii_lowercase();
    match plat.as_str() {
        "any" => return (TagValue::Any, TagValue::Any),
        "win32" => return (TagValue::is("windows"), TagValue::is("x86")),
        _ => {}
    }
    let mut segments = plat.split('_');
    let os = segments.next().unwrap_or_default();
    // Drop version segments such as the `2_17` of manylinux or `10_9` of macosx.
    let arch: Vec<&str> = segments
        .skip_while(|s| s.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let arch = if arch.is_empty() {
        TagValue::Any
    } else {
        normalize_arch(&arch.join("_"))
    };
    (normalize_os(os), arch)
}

/// A concrete operating system and CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    /// Normalized OS (`linux`, `macosx`, `windows`).
    pub os: String,
    /// Normalized architecture (`x86_64`, `arm64`).
    pub arch: String,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "macosx",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    fn sys_platform(&self) -> &str {
        match self.os.as_str() {
            "macosx" => "darwin",
            "windows" => "win32",
            other => other,
        }
    }

    fn platform_system(&self) -> String {
        match self.os.as_str() {
            "macosx" => "Darwin".to_string(),
            other => {
                let mut chars = other.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_ascii_uppercase().to_string() + chars.as_str()
                })
            }
        }
    }

    fn platform_machine(&self) -> &str {
        match (self.os.as_str(), self.arch.as_str()) {
            ("linux", "arm64") => "aarch64",
            ("windows", "x86_64") => "AMD64",
            (_, arch) => arch,
        }
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    /// Accepts `current`, `os-arch`, `os-version-arch`, or a wheel platform tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "current" {
            return Ok(Self::current());
        }
        match parse_platform_tag(&s.replace(['-', '.'], "_")) {
            (TagValue::Is(os), TagValue::Is(arch)) => Ok(Self { os, arch }),
            _ => Err(PlatformError::InvalidPlatform(s.to_string())),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl TryFrom<String> for Platform {
    type Error = PlatformError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.to_string()
    }
}

/// Interpreter implementation and full version, rendered `CPython-3.9.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterpreterIdentity {
    /// `CPython`, `PyPy`
    pub implementation: String,
    /// Release segments of the interpreter version.
    pub version: Vec<u64>,
}

impl InterpreterIdentity {
    /// `3.9`
    pub fn python_version(&self) -> String {
        self.version
            .iter()
            .take(2)
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `3.9.1`
    pub fn full_version(&self) -> String {
        self.version
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Lowercased implementation name (`cpython`).
    pub fn implementation_name(&self) -> String {
        self.implementation.to_ascii_lowercase()
    }

    /// Two-letter tag prefix used in wheel names (`cp`, `pp`).
    pub fn impl_tag(&self) -> &'static str {
        match self.implementation_name().as_str() {
            "cpython" => "cp",
            "pypy" => "pp",
            "ironpython" => "ip",
            "jython" => "jy",
            _ => "py",
        }
    }

    /// ABI tag this interpreter produces (`cp39`).
    pub fn abi_tag(&self) -> String {
        format!("{}{}", self.impl_tag(), self.python_version().replace('.', ""))
    }

    /// Executable name for `#!/usr/bin/env <name>` lines (`python3.9`, `pypy`).
    pub fn hashbang_name(&self) -> String {
        match self.implementation_name().as_str() {
            "pypy" => "pypy".to_string(),
            "jython" => "jython".to_string(),
            _ => format!("python{}", self.python_version()),
        }
    }
}

impl FromStr for InterpreterIdentity {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PlatformError::InvalidInterpreter(s.to_string());
        let (implementation, version) = s.trim().split_once('-').ok_or_else(err)?;
        if implementation.is_empty() {
            return Err(err());
        }
        let version = version
            .split('.')
            .map(|seg| seg.parse::<u64>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            implementation: implementation.to_string(),
            version,
        })
    }
}

impl std::fmt::Display for InterpreterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.implementation, self.full_version())
    }
}

impl TryFrom<String> for InterpreterIdentity {
    type Error = PlatformError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InterpreterIdentity> for String {
    fn from(i: InterpreterIdentity) -> Self {
        i.to_string()
    }
}

/// The platform and interpreter a build or bootstrap is aimed at.
///
/// Computed once at startup and handed to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// OS and architecture.
    pub platform: Platform,
    /// Interpreter identity.
    pub interpreter: InterpreterIdentity,
}

impl Target {
    /// Combine a platform and interpreter into a target.
    pub fn new(platform: Platform, interpreter: InterpreterIdentity) -> Self {
        Self {
            platform,
            interpreter,
        }
    }

    /// Fully concrete tag describing this target.
    pub fn tag(&self) -> PlatformTag {
        PlatformTag {
            os: TagValue::is(&self.platform.os),
            arch: TagValue::is(&self.platform.arch),
            implementation: TagValue::Is(self.interpreter.implementation_name()),
            python: TagValue::Is(self.interpreter.python_version()),
            abi: TagValue::Is(self.interpreter.abi_tag()),
        }
    }

    /// Values for evaluating environment markers on this target.
    pub fn marker_environment(&self) -> MarkerEnvironment {
        MarkerEnvironment {
            python_version: self.interpreter.python_version(),
            python_full_version: self.interpreter.full_version(),
            sys_platform: self.platform.sys_platform().to_string(),
            platform_system: self.platform.platform_system(),
            platform_machine: self.platform.platform_machine().to_string(),
            os_name: if self.platform.os == "windows" {
                "nt".to_string()
            } else {
                "posix".to_string()
            },
            implementation_name: self.interpreter.implementation_name(),
            platform_python_implementation: self.interpreter.implementation.clone(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.interpreter, self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(platform: &str, interpreter: &str) -> PlatformTag {
        Target::new(platform.parse().unwrap(), interpreter.parse().unwrap()).tag()
    }

    #[test]
    fn wheel_platform_aliases_normalize() {
        let tags = PlatformTag::from_wheel_tags("cp39", "cp39", "manylinux_2_17_x86_64");
        assert_eq!(tags[0].os, TagValue::is("linux"));
        assert_eq!(tags[0].arch, TagValue::is("x86_64"));
        assert_eq!(tags[0].python, TagValue::is("3.9"));

        let win = PlatformTag::from_wheel_tags("cp310", "cp310", "win_amd64");
        assert_eq!(win[0].os, TagValue::is("windows"));
        assert_eq!(win[0].arch, TagValue::is("x86_64"));
        assert_eq!(win[0].python, TagValue::is("3.10"));

        let mac = PlatformTag::from_wheel_tags("cp311", "abi3", "macosx_10_9_universal2");
        assert_eq!(mac[0].os, TagValue::is("macosx"));
        assert_eq!(mac[0].arch, TagValue::Any);
    }

    #[test]
    fn compressed_tag_sets_expand() {
        let tags = PlatformTag::from_wheel_tags("py2.py3", "none", "any");
        assert_eq!(tags.len(), 2);
        assert!(tags.iter().all(|t| t.abi == TagValue::Any && t.os == TagValue::Any));
    }

    #[test]
    fn compatibility_matches_concrete_fields() {
        let linux39 = target("linux-x86_64", "CPython-3.9.1");
        let pure = PlatformTag::from_wheel_tags("py3", "none", "any");
        assert!(pure[0].compatible_with(&linux39));

        let native = PlatformTag::from_wheel_tags("cp39", "cp39", "manylinux2014_x86_64");
        assert!(native[0].compatible_with(&linux39));
        assert!(!native[0].compatible_with(&target("macosx-10.9-x86_64", "CPython-3.9.1")));
        assert!(!native[0].compatible_with(&target("linux-x86_64", "CPython-3.10.0")));
        assert!(!native[0].compatible_with(&target("linux-x86_64", "PyPy-3.9.0")));
    }

    #[test]
    fn python_version_matches_by_segment_prefix() {
        let py3 = PlatformTag::from_egg("3", None);
        let py31 = PlatformTag::from_egg("3.1", None);
        let t = target("linux-x86_64", "CPython-3.10.2");
        assert!(py3.compatible_with(&t));
        assert!(!py31.compatible_with(&t));
    }

    #[test]
    fn abi3_matches_any_cpython() {
        let tags = PlatformTag::from_wheel_tags("cp37", "abi3", "linux_x86_64");
        assert!(tags[0].compatible_with(&target("linux-x86_64", "CPython-3.11.0")));
        assert!(!tags[0].compatible_with(&target("linux-x86_64", "CPython-3.6.9")));
        assert!(!tags[0].compatible_with(&target("linux-x86_64", "PyPy-3.11.0")));
    }

    #[test]
    fn egg_platforms_parse() {
        let egg = PlatformTag::from_egg("2.7", Some("macosx-10.9-x86_64"));
        assert_eq!(egg.os, TagValue::is("macosx"));
        assert_eq!(egg.arch, TagValue::is("x86_64"));
    }

    #[test]
    fn tag_display_roundtrips() {
        let tag = target("linux-x86_64", "CPython-3.9.1");
        assert_eq!(tag.to_string(), "linux-x86_64-cpython-3.9-cp39");
        assert_eq!(tag.to_string().parse::<PlatformTag>().unwrap(), tag);
        assert_eq!(PlatformTag::any().to_string(), "*-*-*-*-*");
    }

    #[test]
    fn interpreter_identity() {
        let id: InterpreterIdentity = "CPython-3.9.1".parse().unwrap();
        assert_eq!(id.python_version(), "3.9");
        assert_eq!(id.abi_tag(), "cp39");
        assert_eq!(id.hashbang_name(), "python3.9");
        assert_eq!(id.to_string(), "CPython-3.9.1");
        assert!("CPython".parse::<InterpreterIdentity>().is_err());
        assert!("CPython-3.x".parse::<InterpreterIdentity>().is_err());
    }

    #[test]
    fn marker_environment_for_darwin() {
        let t = Target::new(
            "macosx-11.0-arm64".parse().unwrap(),
            "CPython-3.11.4".parse().unwrap(),
        );
        let env = t.marker_environment();
        assert_eq!(env.sys_platform, "darwin");
        assert_eq!(env.platform_system, "Darwin");
        assert_eq!(env.platform_machine, "arm64");
        assert_eq!(env.os_name, "posix");
        assert_eq!(env.python_full_version, "3.11.4");
    }

    #[test]
    fn platform_strings() {
        let p: Platform = "linux-x86_64".parse().unwrap();
        assert_eq!(p.to_string(), "linux-x86_64");
        assert!("linux".parse::<Platform>().is_err());
        assert_eq!("current".parse::<Platform>().unwrap(), Platform::current());
    }
}
