//! Building source trees into binary distributions.
//!
//! Every build runs with a sanitised environment: host variables are
//! cleared and only the minimal set needed by `setup.py` is injected.
//!
//! | Variable | Value |
//! |---|---|
//! | `PATH` | `/usr/local/bin:/usr/bin:/bin` |
//! | `HOME` | The source tree |
//! | `LANG` | `C.UTF-8` |
//! | `SOURCE_DATE_EPOCH` | `0` |
//! | `PYTHONHASHSEED` | `0` |
//! | `PYTHONDONTWRITEBYTECODE` | `1` |

use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;
use walkdir::WalkDir;

use crate::types::{Blake3Hash, InterpreterIdentity, PlatformTag};

const SOURCE_DATE_EPOCH: &str = "0";
const SANITISED_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Directory inside the source tree that receives built artifacts.
const DIST_DIR: &str = ".pexr-dist";

/// A source tree could not be turned into a binary distribution.
#[derive(Error, Debug)]
#[error("failed to build {}: {reason}", tree.display())]
pub struct BuildFailure {
    /// The source tree that was being built.
    pub tree: PathBuf,
    /// Build log, when the build got far enough to write one.
    pub log: Option<PathBuf>,
    /// Short description of what went wrong.
    pub reason: String,
    /// Last lines of the build log.
    pub tail: Option<String>,
}

impl BuildFailure {
    fn new(tree: &Path, reason: impl Into<String>) -> Self {
        Self {
            tree: tree.to_path_buf(),
            log: None,
            reason: reason.into(),
            tail: None,
        }
    }
}

/// Turns an unpacked source distribution into a wheel or egg.
#[async_trait]
pub trait Installer: Send + Sync + std::fmt::Debug {
    /// Build `source_tree` for `interpreter` and return the path of the
    /// produced binary artifact.
    async fn build(
        &self,
        source_tree: &Path,
        interpreter: &InterpreterIdentity,
    ) -> Result<PathBuf, BuildFailure>;
}

/// Runs `python setup.py bdist_wheel` (or `bdist_egg`).
#[derive(Debug, Clone)]
pub struct SetupPyInstaller {
    python: PathBuf,
    wheels: bool,
    timeout: Option<Duration>,
    log_dir: PathBuf,
}

impl SetupPyInstaller {
    /// Build with the interpreter binary at `python`.
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            wheels: true,
            timeout: None,
            log_dir: crate::paths::log_dir(),
        }
    }

    /// Produce wheels (`true`, default) or eggs.
    pub fn wheels(mut self, wheels: bool) -> Self {
        self.wheels = wheels;
        self
    }

    /// Kill builds that run longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Write build logs under `dir`.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    fn build_blocking(&self, tree: &Path) -> Result<PathBuf, BuildFailure> {
        if !tree.join("setup.py").is_file() {
            return Err(BuildFailure::new(tree, "no setup.py in source tree"));
        }
        let io = |e: std::io::Error| BuildFailure::new(tree, e.to_string());

        let dist_dir = tree.join(DIST_DIR);
        if dist_dir.exists() {
            std::fs::remove_dir_all(&dist_dir).map_err(io)?;
        }
        std::fs::create_dir_all(&dist_dir).map_err(io)?;
        std::fs::create_dir_all(&self.log_dir).map_err(io)?;

        let name = tree
            .file_name()
            .map_or_else(|| "source".to_string(), |n| n.to_string_lossy().into_owned());
        let log_path = self.log_dir.join(crate::paths::build_log_name(&name));
        let log_file = std::fs::File::create(&log_path).map_err(io)?;

        let command = if self.wheels { "bdist_wheel" } else { "bdist_egg" };
        tracing::debug!(tree = %tree.display(), command, log = %log_path.display(), "running setup.py");

        let mut cmd = Command::new(&self.python);
        // Start from a blank slate so host env vars never leak in.
        cmd.env_clear();
        cmd.arg("setup.py")
            .arg(command)
            .arg("--dist-dir")
            .arg(&dist_dir)
            .current_dir(tree)
            .env("PATH", SANITISED_PATH)
            .env("HOME", tree)
            .env("LANG", "C.UTF-8")
            .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
            .env("PYTHONHASHSEED", "0")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone().map_err(io)?))
            .stderr(Stdio::from(log_file));

        let fail = |reason: String| BuildFailure {
            tree: tree.to_path_buf(),
            log: Some(log_path.clone()),
            tail: read_last_lines(&log_path, 20).ok(),
            reason,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| fail(format!("cannot run {}: {e}", self.python.display())))?;
        let status = match self.timeout {
            Some(limit) => match child.wait_timeout(limit).map_err(io)? {
                Some(status) => status,
                None => {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(fail(format!("timed out after {}s", limit.as_secs())));
                }
            },
            None => child.wait().map_err(io)?,
        };
        if !status.success() {
            return Err(fail(format!("setup.py exited with {status}")));
        }

        let mut built: Vec<PathBuf> = std::fs::read_dir(&dist_dir)
            .map_err(io)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "whl" || ext == "egg")
            })
            .collect();
        built.sort();
        built
            .into_iter()
            .next()
            .ok_or_else(|| fail("setup.py produced no distribution".to_string()))
    }
}

#[async_trait]
impl Installer for SetupPyInstaller {
    async fn build(
        &self,
        source_tree: &Path,
        interpreter: &InterpreterIdentity,
    ) -> Result<PathBuf, BuildFailure> {
        tracing::info!(tree = %source_tree.display(), %interpreter, "building source distribution");
        let this = self.clone();
        let tree = source_tree.to_path_buf();
        tokio::task::spawn_blocking(move || this.build_blocking(&tree))
            .await
            .map_err(|e| BuildFailure::new(source_tree, format!("build task panicked: {e}")))?
    }
}

/// Memoizes another installer by the content of the source tree.
///
/// Results live in `<dir>/<key>/<artifact>`, where the key hashes every file
/// in the tree together with the target tag and interpreter.
#[derive(Debug, Clone)]
pub struct CachedInstaller {
    inner: Arc<dyn Installer>,
    dir: PathBuf,
    tag: PlatformTag,
}

impl CachedInstaller {
    /// Cache builds of `inner` under `dir` for `tag`.
    pub fn new(inner: Arc<dyn Installer>, dir: impl Into<PathBuf>, tag: PlatformTag) -> Self {
        Self {
            inner,
            dir: dir.into(),
            tag,
        }
    }

    fn lookup(entry: &Path) -> Option<PathBuf> {
        std::fs::read_dir(entry)
            .ok()?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .find(|p| p.is_file())
    }
}

/// BLAKE3 over the relative paths and contents of every file in `tree`,
/// skipping previous build output.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn hash_tree(tree: &Path) -> std::io::Result<Blake3Hash> {
    let mut hasher = blake3::Hasher::new();
    let entries = WalkDir::new(tree)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != DIST_DIR);
    for entry in entries {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(tree).unwrap_or(entry.path());
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        let mut file = std::fs::File::open(entry.path())?;
        std::io::copy(&mut file, &mut hasher)?;
    }
    Ok(Blake3Hash::from_hasher(&hasher))
}

#[async_trait]
impl Installer for CachedInstaller {
    async fn build(
        &self,
        source_tree: &Path,
        interpreter: &InterpreterIdentity,
    ) -> Result<PathBuf, BuildFailure> {
        let tree = source_tree.to_path_buf();
        let content = tokio::task::spawn_blocking(move || hash_tree(&tree))
            .await
            .map_err(|e| BuildFailure::new(source_tree, e.to_string()))?
            .map_err(|e| BuildFailure::new(source_tree, e.to_string()))?;
        let key = Blake3Hash::compute(format!("{content}:{}:{interpreter}", self.tag).as_bytes());
        let entry = self.dir.join(key.short(32));

        if let Some(hit) = Self::lookup(&entry) {
            tracing::debug!(tree = %source_tree.display(), artifact = %hit.display(), "build cache hit");
            return Ok(hit);
        }

        let built = self.inner.build(source_tree, interpreter).await?;
        let io = |e: std::io::Error| BuildFailure::new(source_tree, e.to_string());
        let file_name = built
            .file_name()
            .ok_or_else(|| BuildFailure::new(source_tree, "built artifact has no file name"))?;

        let staging = self
            .dir
            .join(format!(".staging-{}-{}", key.short(16), std::process::id()));
        std::fs::create_dir_all(&staging).map_err(io)?;
        std::fs::copy(&built, staging.join(file_name)).map_err(io)?;
        if std::fs::rename(&staging, &entry).is_err() {
            // Another build of the same tree won the race.
            std::fs::remove_dir_all(&staging).ok();
        }
        Self::lookup(&entry)
            .ok_or_else(|| BuildFailure::new(source_tree, "build cache entry vanished"))
    }
}

/// Read the last N lines from a file without loading all of it.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = std::fs::File::open(path)?;
    let file_len = file.metadata()?.len();
    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    let buffer = String::from_utf8_lossy(&buffer);

    // Drop the partial first line when we started mid-file.
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&*buffer, |idx| &buffer[idx + 1..])
    } else {
        &*buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Installer double that writes a fixed file and counts invocations.
    #[derive(Debug, Default)]
    pub(crate) struct CountingInstaller {
        pub(crate) calls: AtomicUsize,
    }

    #[async_trait]
    impl Installer for CountingInstaller {
        async fn build(
            &self,
            source_tree: &Path,
            _: &InterpreterIdentity,
        ) -> Result<PathBuf, BuildFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = source_tree.join(DIST_DIR).join("foo-1.0-py3-none-any.whl");
            std::fs::create_dir_all(out.parent().unwrap()).unwrap();
            std::fs::write(&out, b"built").unwrap();
            Ok(out)
        }
    }

    fn cpython() -> InterpreterIdentity {
        "CPython-3.11.4".parse().unwrap()
    }

    #[cfg(unix)]
    fn fake_python(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("python");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn source_tree(dir: &Path) -> PathBuf {
        let tree = dir.join("foo-1.0");
        std::fs::create_dir_all(&tree).unwrap();
        std::fs::write(tree.join("setup.py"), "from setuptools import setup\n").unwrap();
        tree
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn setup_py_build_returns_artifact_with_clean_env() {
        let tmp = tempfile::tempdir().unwrap();
        // $4 is the --dist-dir argument.
        let python = fake_python(
            tmp.path(),
            r#"test "$SOURCE_DATE_EPOCH" = 0 || exit 3
test -z "$CARGO" || exit 4
echo building "$2"
touch "$4/foo-1.0-py3-none-any.whl""#,
        );
        let tree = source_tree(tmp.path());
        let installer = SetupPyInstaller::new(python).log_dir(tmp.path().join("logs"));

        let built = installer.build(&tree, &cpython()).await.unwrap();
        assert_eq!(built, tree.join(DIST_DIR).join("foo-1.0-py3-none-any.whl"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn setup_py_failure_keeps_log_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let python = fake_python(tmp.path(), "echo 'error: no compiler'\nexit 1");
        let tree = source_tree(tmp.path());
        let installer = SetupPyInstaller::new(python).log_dir(tmp.path().join("logs"));

        let err = installer.build(&tree, &cpython()).await.unwrap_err();
        assert!(err.log.as_ref().unwrap().exists());
        assert_eq!(err.tail.as_deref(), Some("error: no compiler"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn setup_py_timeout_kills_build() {
        let tmp = tempfile::tempdir().unwrap();
        let python = fake_python(tmp.path(), "sleep 10");
        let tree = source_tree(tmp.path());
        let installer = SetupPyInstaller::new(python)
            .log_dir(tmp.path().join("logs"))
            .timeout(Some(Duration::from_millis(200)));

        let err = installer.build(&tree, &cpython()).await.unwrap_err();
        assert!(err.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_setup_py_is_a_build_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = SetupPyInstaller::new("/nonexistent/python");
        let err = installer.build(tmp.path(), &cpython()).await.unwrap_err();
        assert!(err.reason.contains("setup.py"));
        assert!(err.log.is_none());
    }

    #[tokio::test]
    async fn cached_installer_reuses_identical_trees() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = source_tree(tmp.path());
        let inner = Arc::new(CountingInstaller::default());
        let cached = CachedInstaller::new(inner.clone(), tmp.path().join("builds"), PlatformTag::any());

        let first = cached.build(&tree, &cpython()).await.unwrap();
        let second = cached.build(&tree, &cpython()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        std::fs::write(tree.join("setup.py"), "changed").unwrap();
        cached.build(&tree, &cpython()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hash_tree_ignores_build_output() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = source_tree(tmp.path());
        let before = hash_tree(&tree).unwrap();
        std::fs::create_dir_all(tree.join(DIST_DIR)).unwrap();
        std::fs::write(tree.join(DIST_DIR).join("x.whl"), b"x").unwrap();
        assert_eq!(hash_tree(&tree).unwrap(), before);
    }

    #[test]
    fn read_last_lines_returns_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("build.log");
        let body: String = (0..50).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, body).unwrap();
        assert_eq!(read_last_lines(&log, 2).unwrap(), "line 48\nline 49");
    }
}
