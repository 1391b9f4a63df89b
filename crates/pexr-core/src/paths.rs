//! Well-known locations under `PEXR_HOME`.

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the pexr home directory, or None if the user's home cannot be resolved.
pub fn try_pexr_home() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os("PEXR_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".pexr"))
}

/// Returns the canonical pexr home directory (`~/.pexr`).
///
/// Falls back to the system temp directory when no home can be resolved
/// (sandboxed CI users, `nobody`).
pub fn pexr_home() -> PathBuf {
    try_pexr_home().unwrap_or_else(|| std::env::temp_dir().join("pexr"))
}

/// Settings file: ~/.pexr/config.toml
pub fn config_path() -> PathBuf {
    pexr_home().join("config.toml")
}

/// Artifact and build cache: ~/.pexr/cache
pub fn cache_path() -> PathBuf {
    pexr_home().join("cache")
}

/// Bundle extraction root: ~/.pexr/root
pub fn root_path() -> PathBuf {
    pexr_home().join("root")
}

/// Logs directory: ~/.pexr/logs
pub fn log_dir() -> PathBuf {
    pexr_home().join("logs")
}

/// Temp path: ~/.pexr/tmp (same volume as the cache, so renames are atomic)
pub fn tmp_path() -> PathBuf {
    pexr_home().join("tmp")
}

/// Timestamped log filename for a build of `name`.
pub fn build_log_name(name: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    format!("build-{name}-{timestamp}.log")
}

/// Generate a build log path for a source tree
pub fn build_log_path(name: &str) -> PathBuf {
    log_dir().join(build_log_name(name))
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split(['#', '?'])
        .next()
        .unwrap_or(url)
        .split('/')
        .next_back()
        .unwrap_or("")
}
