//! User settings loaded from `~/.pexr/config.toml`.
//!
//! Every field is optional in the file; anything missing takes its default.
//! Command-line flags are layered on top by the CLI.
//!
//! ```toml
//! indices = ["https://pypi.org/simple"]
//! repos = ["/srv/wheels", "https://example.com/links.html"]
//! use_wheel = true
//! allow_builds = true
//! parallelism = 8
//! build_timeout_secs = 600
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default simple-repository index.
pub const DEFAULT_INDEX: &str = "https://pypi.org/simple";

/// Resolved settings for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Simple-API index base URLs, queried in order.
    pub indices: Vec<String>,
    /// Local directories or find-links pages, queried before indices.
    pub repos: Vec<String>,
    /// Whether to consult `indices` at all.
    pub use_index: bool,
    /// Whether wheels are acceptable candidates.
    pub use_wheel: bool,
    /// Whether source distributions may be built.
    pub allow_builds: bool,
    /// Maximum concurrent obtains per resolver round.
    pub parallelism: usize,
    /// Cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Abort `setup.py` builds after this many seconds.
    pub build_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            indices: vec![DEFAULT_INDEX.to_string()],
            repos: Vec::new(),
            use_index: true,
            use_wheel: true,
            allow_builds: true,
            parallelism: num_cpus::get(),
            cache_dir: None,
            build_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load `~/.pexr/config.toml`, or defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = crate::paths::config_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Effective cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(crate::paths::cache_path)
    }

    /// Build timeout as a duration.
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }

    /// Effective parallelism (never zero).
    pub fn parallelism(&self) -> usize {
        self.parallelism.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "use_wheel = false\nrepos = [\"/srv/wheels\"]\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert!(!settings.use_wheel);
        assert_eq!(settings.repos, vec!["/srv/wheels"]);
        assert_eq!(settings.indices, vec![DEFAULT_INDEX]);
        assert!(settings.allow_builds);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "parallelism = \"lots\"").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn parallelism_is_never_zero() {
        let settings = Settings {
            parallelism: 0,
            ..Settings::default()
        };
        assert_eq!(settings.parallelism(), 1);
    }
}
