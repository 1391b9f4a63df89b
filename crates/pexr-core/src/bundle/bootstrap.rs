//! Turning a bundle file back into a runnable environment.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::launcher::{LaunchError, Launcher};
use crate::io::extract::{self, ExtractError};
use crate::resolver::{ResolveError, Resolver};
use crate::types::artifact::parse_filename;
use crate::types::{BUNDLE_INFO_PATH, BundleInfo, DEPS_DIR, EntryPoint, Requirement, RequirementEntry, ZIP_MAGIC};

/// Failures opening, activating or running a bundle.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Reading the bundle or the extraction root failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No header line followed by a zip.
    #[error("{0} is not a bundle")]
    NotABundle(PathBuf),

    /// The embedded zip is unreadable.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// `PEXR-INFO` is missing or malformed.
    #[error("Invalid PEXR-INFO: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Extraction needs the code hash recorded at freeze time.
    #[error("Bundle has no code hash; it was not frozen")]
    MissingCodeHash,

    /// Unpacking into the extraction root failed.
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// A `PEXR_*` variable has an unusable value.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Value as found.
        value: String,
    },

    /// Requirements nothing satisfies, with errors not ignored.
    #[error("Unsatisfied requirements: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    UnsatisfiedRequirement(Vec<Requirement>),

    /// Run-time resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The interpreter could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn io_at(path: &Path) -> impl Fn(std::io::Error) -> BootstrapError + '_ {
    move |source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolves requirements the bundle does not embed, at run time.
#[async_trait]
pub trait RuntimeResolver: Send + Sync {
    /// Import paths for packages satisfying `requirements`.
    ///
    /// # Errors
    ///
    /// Returns the resolution failure.
    async fn resolve_paths(&self, requirements: &[Requirement]) -> Result<Vec<PathBuf>, ResolveError>;
}

#[async_trait]
impl RuntimeResolver for Resolver {
    async fn resolve_paths(&self, requirements: &[Requirement]) -> Result<Vec<PathBuf>, ResolveError> {
        Ok(self
            .resolve(requirements)
            .await?
            .into_iter()
            .map(|package| package.path)
            .collect())
    }
}

/// Run-time overrides, normally read from `PEXR_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Extraction root (`PEXR_ROOT`); defaults to [`crate::root_path`].
    pub root: Option<PathBuf>,
    /// Entry point override (`PEXR_MODULE`).
    pub module: Option<EntryPoint>,
    /// Ignore the entry point and start an interactive interpreter
    /// (`PEXR_INTERPRETER=1`).
    pub interactive: bool,
    /// Override of the bundle's `inherit_path` (`PEXR_INHERIT_PATH`).
    pub inherit_path: Option<bool>,
    /// Override of the bundle's `ignore_errors` (`PEXR_IGNORE_ERRORS`).
    pub ignore_errors: Option<bool>,
    /// Interpreter binary (`PEXR_PYTHON`).
    pub python: Option<PathBuf>,
    /// Ambient import path (`PYTHONPATH`), appended when inheriting.
    pub ambient_path: Vec<PathBuf>,
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, BootstrapError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(BootstrapError::InvalidOverride {
            var,
            value: value.to_string(),
        }),
    }
}

impl RuntimeOptions {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidOverride`] for malformed values.
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_vars(std::env::vars_os().map(|(k, v)| {
            (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned())
        }))
    }

    /// Read overrides from `(name, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidOverride`] for malformed values.
    pub fn from_vars<I>(vars: I) -> Result<Self, BootstrapError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut options = Self::default();
        for (name, value) in vars {
            match name.as_str() {
                "PEXR_ROOT" => options.root = Some(PathBuf::from(value)),
                "PEXR_MODULE" => {
                    options.module = Some(value.parse().map_err(|_| BootstrapError::InvalidOverride {
                        var: "PEXR_MODULE",
                        value: value.clone(),
                    })?);
                }
                "PEXR_INTERPRETER" => options.interactive = parse_flag("PEXR_INTERPRETER", &value)?,
                "PEXR_INHERIT_PATH" => options.inherit_path = Some(parse_flag("PEXR_INHERIT_PATH", &value)?),
                "PEXR_IGNORE_ERRORS" => options.ignore_errors = Some(parse_flag("PEXR_IGNORE_ERRORS", &value)?),
                "PEXR_PYTHON" => options.python = Some(PathBuf::from(value)),
                "PYTHONPATH" => options.ambient_path = std::env::split_paths(&value).collect(),
                _ => {}
            }
        }
        Ok(options)
    }
}

/// An activated bundle: what to run and with which import path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Interpreter binary.
    pub python: PathBuf,
    /// Ordered import path: bundle code, then distributions, then any
    /// inherited entries.
    pub python_path: Vec<PathBuf>,
    /// What to run; `None` is an interactive interpreter.
    pub entry_point: Option<EntryPoint>,
    /// Whether the ambient site-packages are excluded.
    pub isolated: bool,
    /// Requirements skipped because `ignore_errors` was set.
    pub skipped: Vec<Requirement>,
}

/// Part of the archive to materialize on disk.
#[derive(Debug, Clone)]
enum Subtree {
    Code,
    Dist(String),
}

impl Subtree {
    fn accepts(&self, path: &Path) -> bool {
        match self {
            Self::Code => !path.starts_with(DEPS_DIR) && path != Path::new(BUNDLE_INFO_PATH),
            Self::Dist(dist) => path.starts_with(Path::new(DEPS_DIR).join(dist)),
        }
    }

    fn root_in(&self, tree: &Path) -> PathBuf {
        match self {
            Self::Code => tree.to_path_buf(),
            Self::Dist(dist) => tree.join(DEPS_DIR).join(dist),
        }
    }
}

/// Extract `subtree` into `dest` through a staging directory beside it.
/// If another process wins the rename, its copy is kept.
fn extract_atomically(archive: &[u8], subtree: &Subtree, dest: &Path) -> Result<PathBuf, BootstrapError> {
    let parent = dest.parent().unwrap_or(dest);
    std::fs::create_dir_all(parent).map_err(io_at(parent))?;
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(io_at(parent))?;
    let tree = staging.path().join("tree");
    extract::extract_zip_reader(Cursor::new(archive), &tree, |p| subtree.accepts(p))?;

    let root = subtree.root_in(&tree);
    std::fs::create_dir_all(&root).map_err(io_at(&root))?;
    match std::fs::rename(&root, dest) {
        Ok(()) => tracing::debug!(path = %dest.display(), "extracted"),
        Err(_) if dest.is_dir() => {
            tracing::debug!(path = %dest.display(), "extracted concurrently, reusing");
        }
        Err(e) => return Err(io_at(dest)(e)),
    }
    Ok(dest.to_path_buf())
}

fn default_python(info: &BundleInfo) -> PathBuf {
    info.interpreter
        .as_ref()
        .and_then(|id| which::which(id.hashbang_name()).ok())
        .or_else(|| which::which("python3").ok())
        .unwrap_or_else(|| PathBuf::from("python3"))
}

/// An opened bundle file.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    path: PathBuf,
    archive: Arc<Vec<u8>>,
    info: BundleInfo,
}

impl Bootstrap {
    /// Open `path`, skipping its header line, and read its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::NotABundle`] if the file is neither a
    /// header-prefixed nor a bare zip, or an error if `PEXR-INFO` is missing
    /// or malformed.
    pub fn open(path: &Path) -> Result<Self, BootstrapError> {
        let bytes = std::fs::read(path).map_err(io_at(path))?;
        let start = if bytes.starts_with(b"#!") {
            bytes
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| i + 1)
                .ok_or_else(|| BootstrapError::NotABundle(path.to_path_buf()))?
        } else {
            0
        };
        if !bytes[start..].starts_with(&ZIP_MAGIC) {
            return Err(BootstrapError::NotABundle(path.to_path_buf()));
        }
        let archive = bytes[start..].to_vec();

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.as_slice()))?;
        let mut document = Vec::new();
        zip.by_name(BUNDLE_INFO_PATH)?
            .read_to_end(&mut document)
            .map_err(io_at(path))?;
        let info = BundleInfo::from_json(&document)?;

        Ok(Self {
            path: path.to_path_buf(),
            archive: Arc::new(archive),
            info,
        })
    }

    /// The bundle's metadata.
    pub fn info(&self) -> &BundleInfo {
        &self.info
    }

    /// Path the bundle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embedded distribution that satisfies `entry`: the one recorded at its
    /// pinned location, else any whose name parses to a matching version.
    fn embedded_dist(&self, entry: &RequirementEntry) -> Option<&str> {
        let pinned = entry.location.as_ref().and_then(crate::types::Location::filename);
        self.info
            .distributions
            .keys()
            .find(|dist| pinned.as_deref() == Some(dist.as_str()))
            .or_else(|| {
                self.info.distributions.keys().find(|dist| {
                    parse_filename(dist).is_some_and(|(name, version, _, _)| {
                        name == entry.requirement.name && entry.requirement.contains(&version)
                    })
                })
            })
            .map(String::as_str)
    }

    async fn materialize(&self, subtree: Subtree, dest: PathBuf) -> Result<PathBuf, BootstrapError> {
        if dest.is_dir() {
            return Ok(dest);
        }
        tracing::info!(path = %dest.display(), "extracting bundle contents");
        let archive = Arc::clone(&self.archive);
        tokio::task::spawn_blocking(move || extract_atomically(&archive, &subtree, &dest)).await?
    }

    /// Build the run-time environment.
    ///
    /// Zip-safe bundles are imported in place. Others are extracted under
    /// the root once per content hash and reused afterwards. Requirements
    /// without an embedded distribution go to `resolver`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::UnsatisfiedRequirement`] when requirements
    /// remain unresolved and errors are not ignored, or an extraction error.
    pub async fn activate(
        &self,
        options: &RuntimeOptions,
        resolver: Option<&dyn RuntimeResolver>,
    ) -> Result<Environment, BootstrapError> {
        let info = &self.info;
        let inherit = options.inherit_path.unwrap_or(info.inherit_path);
        let ignore_errors = options.ignore_errors.unwrap_or(info.ignore_errors);
        let extract = !info.zip_safe || info.always_write_cache;
        let root = options.root.clone().unwrap_or_else(crate::root_path);

        let mut python_path = Vec::new();
        if extract {
            let code_hash = info.code_hash.as_ref().ok_or(BootstrapError::MissingCodeHash)?;
            python_path.push(self.materialize(Subtree::Code, root.join("code").join(code_hash)).await?);
        } else {
            python_path.push(self.path.clone());
        }

        let mut dists: Vec<&str> = Vec::new();
        let mut unresolved: Vec<Requirement> = Vec::new();
        for entry in &info.requirements {
            match self.embedded_dist(entry).filter(|_| !entry.dynamic) {
                Some(dist) if !dists.contains(&dist) => dists.push(dist),
                Some(_) => {}
                None => unresolved.push(entry.requirement.clone()),
            }
        }
        let referenced: BTreeSet<&str> = dists.iter().copied().collect();
        dists.extend(info.distributions.keys().map(String::as_str).filter(|d| !referenced.contains(d)));

        for dist in dists {
            let path = if extract {
                let hash = &info.distributions[dist];
                self.materialize(Subtree::Dist(dist.to_string()), root.join("install").join(format!("{dist}.{hash}")))
                    .await?
            } else {
                self.path.join(DEPS_DIR).join(dist)
            };
            python_path.push(path);
        }

        let mut skipped = Vec::new();
        if !unresolved.is_empty() {
            let outcome = match resolver {
                Some(resolver) => resolver.resolve_paths(&unresolved).await.map_err(BootstrapError::from),
                None => Err(BootstrapError::UnsatisfiedRequirement(unresolved.clone())),
            };
            match outcome {
                Ok(paths) => python_path.extend(paths),
                Err(e) if ignore_errors => {
                    for requirement in &unresolved {
                        tracing::warn!(%requirement, error = %e, "skipping unsatisfied requirement");
                    }
                    skipped = unresolved;
                }
                Err(e) => return Err(e),
            }
        }

        if inherit {
            python_path.extend(options.ambient_path.iter().cloned());
        }

        let entry_point = if options.interactive {
            None
        } else {
            options.module.clone().or_else(|| info.entry_point.clone())
        };

        Ok(Environment {
            python: options.python.clone().unwrap_or_else(|| default_python(info)),
            python_path,
            entry_point,
            isolated: !inherit,
            skipped,
        })
    }

    /// Activate and hand off to `launcher`. Returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns activation errors, or [`BootstrapError::Launch`] if the
    /// interpreter cannot be started.
    pub async fn run(
        &self,
        options: &RuntimeOptions,
        resolver: Option<&dyn RuntimeResolver>,
        launcher: &dyn Launcher,
        args: &[String],
    ) -> Result<i32, BootstrapError> {
        let env = self.activate(options, resolver).await?;
        tracing::debug!(bundle = %self.path.display(), entry_point = ?env.entry_point, "running bundle");
        Ok(launcher.launch(&env, args)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleBuilder;
    use crate::package::Package;
    use crate::types::{Location, PackageFormat, PlatformTag};
    use std::sync::Mutex;

    fn package(dir: &Path, name: &str, version: &str) -> Package {
        let root = dir.join(format!("{name}-{version}"));
        std::fs::create_dir_all(root.join(name)).unwrap();
        std::fs::write(root.join(name).join("__init__.py"), format!("VERSION = '{version}'")).unwrap();
        Package {
            name: name.into(),
            version: version.parse().unwrap(),
            format: PackageFormat::Wheel,
            tag: PlatformTag::any(),
            origin: Location::Remote(format!("https://h/{name}-{version}-py3-none-any.whl")),
            path: root,
            requires: Vec::new(),
        }
    }

    fn bundle(dir: &Path, zip_safe: bool) -> PathBuf {
        let src = dir.join("main.py");
        std::fs::write(&src, "print('hi')").unwrap();
        let mut builder = BundleBuilder::new(Some("CPython-3.11.4".parse().unwrap()));
        builder.add_source(&src, "app/main.py").unwrap();
        builder.add_package(&package(dir, "foo", "1.0")).unwrap();
        builder.set_entry_point(Some("app.main".parse().unwrap())).unwrap();
        builder.set_zip_safe(zip_safe).unwrap();
        let dest = dir.join("app.pexr");
        builder.freeze(&dest).unwrap();
        dest
    }

    fn options(root: &Path) -> RuntimeOptions {
        RuntimeOptions {
            root: Some(root.to_path_buf()),
            python: Some(PathBuf::from("/usr/bin/python3")),
            ..RuntimeOptions::default()
        }
    }

    #[test]
    fn open_rejects_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
        assert!(matches!(Bootstrap::open(&path), Err(BootstrapError::NotABundle(_))));
    }

    #[tokio::test]
    async fn zip_safe_bundles_import_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let path = bundle(tmp.path(), true);
        let boot = Bootstrap::open(&path).unwrap();
        let env = boot.activate(&options(&tmp.path().join("root")), None).await.unwrap();
        assert_eq!(
            env.python_path,
            [path.clone(), path.join(".deps/foo-1.0-py3-none-any.whl")]
        );
        assert!(env.isolated);
        assert_eq!(env.entry_point.unwrap().to_string(), "app.main");
        assert!(!tmp.path().join("root").exists());
    }

    #[tokio::test]
    async fn extraction_happens_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let boot = Bootstrap::open(&bundle(tmp.path(), false)).unwrap();

        let env = boot.activate(&options(&root), None).await.unwrap();
        let code = &env.python_path[0];
        let dist = &env.python_path[1];
        assert!(code.starts_with(root.join("code")));
        assert!(code.join("app/main.py").is_file());
        assert!(code.join("app/__init__.py").is_file());
        assert!(!code.join(".deps").exists());
        assert!(dist.join("foo/__init__.py").is_file());

        std::fs::write(dist.join("sentinel"), "").unwrap();
        let again = boot.activate(&options(&root), None).await.unwrap();
        assert_eq!(again, env);
        assert!(dist.join("sentinel").exists());

        let leftovers: Vec<_> = std::fs::read_dir(root.join("install"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[derive(Default)]
    struct FakeResolver {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RuntimeResolver for FakeResolver {
        async fn resolve_paths(&self, requirements: &[Requirement]) -> Result<Vec<PathBuf>, ResolveError> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(requirements.iter().map(ToString::to_string));
            match requirements.iter().find(|r| r.name == "missing") {
                Some(r) => Err(ResolveError::UnresolvedRequirement(r.name.clone())),
                None => Ok(vec![PathBuf::from("/resolved")]),
            }
        }
    }

    fn bundle_with_dynamic(dir: &Path, name: &str) -> Bootstrap {
        let mut builder = BundleBuilder::new(None);
        builder.add_requirement(name.parse().unwrap(), true, None).unwrap();
        let dest = dir.join("dyn.pexr");
        builder.freeze(&dest).unwrap();
        Bootstrap::open(&dest).unwrap()
    }

    #[tokio::test]
    async fn unsatisfied_requirements_abort_unless_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = bundle_with_dynamic(tmp.path(), "bar>=2");
        let opts = options(&tmp.path().join("root"));

        let err = boot.activate(&opts, None).await.unwrap_err();
        assert!(matches!(err, BootstrapError::UnsatisfiedRequirement(ref r) if r[0].name == "bar"));

        let ignoring = RuntimeOptions {
            ignore_errors: Some(true),
            ..opts
        };
        let env = boot.activate(&ignoring, None).await.unwrap();
        assert_eq!(env.skipped[0].to_string(), "bar>=2");
        assert_eq!(env.python_path.len(), 1);
    }

    #[tokio::test]
    async fn runtime_resolver_fills_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = bundle_with_dynamic(tmp.path(), "bar");
        let resolver = FakeResolver::default();
        let env = boot
            .activate(&options(&tmp.path().join("root")), Some(&resolver))
            .await
            .unwrap();
        assert_eq!(env.python_path.last().unwrap(), Path::new("/resolved"));
        assert_eq!(*resolver.seen.lock().unwrap(), ["bar"]);

        let boot = bundle_with_dynamic(tmp.path(), "missing");
        let err = boot
            .activate(&options(&tmp.path().join("root")), Some(&resolver))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Resolve(_)));
    }

    /// Serves `bar` from a directory on disk and nothing else.
    #[derive(Debug)]
    struct LocalBar {
        dir: PathBuf,
    }

    #[async_trait]
    impl crate::obtainer::Obtain for LocalBar {
        async fn obtain(&self, requirement: &Requirement) -> Result<Package, crate::obtainer::ObtainError> {
            if requirement.name != "bar" {
                return Err(crate::obtainer::ObtainError::NotFound(requirement.clone()));
            }
            Ok(package(&self.dir, "bar", "2.1"))
        }
    }

    #[tokio::test]
    async fn pipeline_resolver_serves_dynamic_requirements() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(
            Arc::new(LocalBar {
                dir: tmp.path().join("site"),
            }),
            crate::types::MarkerEnvironment::default(),
        );
        let opts = options(&tmp.path().join("root"));

        let boot = bundle_with_dynamic(tmp.path(), "bar>=2");
        let env = boot.activate(&opts, Some(&resolver)).await.unwrap();
        assert_eq!(env.python_path.last().unwrap(), &tmp.path().join("site/bar-2.1"));

        let boot = bundle_with_dynamic(tmp.path(), "baz");
        let err = boot.activate(&opts, Some(&resolver)).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Resolve(ResolveError::UnresolvedRequirement(ref n)) if n == "baz"
        ));
    }

    #[tokio::test]
    async fn overrides_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = Bootstrap::open(&bundle(tmp.path(), true)).unwrap();
        let opts = RuntimeOptions {
            inherit_path: Some(true),
            interactive: true,
            ambient_path: vec![PathBuf::from("/site")],
            ..options(&tmp.path().join("root"))
        };
        let env = boot.activate(&opts, None).await.unwrap();
        assert!(!env.isolated);
        assert!(env.entry_point.is_none());
        assert_eq!(env.python_path.last().unwrap(), Path::new("/site"));
    }

    #[test]
    fn options_from_vars() {
        let vars = [
            ("PEXR_ROOT", "/tmp/r"),
            ("PEXR_MODULE", "tool.cli:main"),
            ("PEXR_INHERIT_PATH", "true"),
            ("PEXR_IGNORE_ERRORS", "0"),
            ("PYTHONPATH", "/a:/b"),
            ("HOME", "/home/x"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string()));
        let opts = RuntimeOptions::from_vars(vars).unwrap();
        assert_eq!(opts.root.as_deref(), Some(Path::new("/tmp/r")));
        assert_eq!(opts.module.unwrap().callable.as_deref(), Some("main"));
        assert_eq!(opts.inherit_path, Some(true));
        assert_eq!(opts.ignore_errors, Some(false));
        assert_eq!(opts.ambient_path, [PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(!opts.interactive);

        let bad = RuntimeOptions::from_vars([("PEXR_INTERPRETER".to_string(), "maybe".to_string())]);
        assert!(matches!(bad, Err(BootstrapError::InvalidOverride { var: "PEXR_INTERPRETER", .. })));
    }

    #[derive(Debug, Default)]
    struct Recording {
        launched: Mutex<Vec<Environment>>,
    }

    impl Launcher for Recording {
        fn launch(&self, env: &Environment, args: &[String]) -> Result<i32, LaunchError> {
            assert_eq!(args, ["--help"]);
            self.launched.lock().unwrap().push(env.clone());
            Ok(3)
        }
    }

    #[tokio::test]
    async fn run_hands_off_to_launcher() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = Bootstrap::open(&bundle(tmp.path(), true)).unwrap();
        let launcher = Recording::default();
        let code = boot
            .run(&options(&tmp.path().join("root")), None, &launcher, &["--help".to_string()])
            .await
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }
}
