//! Assembling a bundle.
//!
//! A bundle is a `#!` header line followed by a zip archive:
//!
//! ```text
//! #!/usr/bin/env pexr-boot
//! PK..  PEXR-INFO
//!       app/__init__.py, app/main.py      user sources
//!       .deps/<dist>/...                  one directory per distribution
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::cache::ENTRY_MARKER;
use crate::package::Package;
use crate::types::{
    Artifact, BUNDLE_INFO_PATH, Blake3Hash, BuildProperties, BundleInfo, DEPS_DIR, EntryPoint,
    InterpreterIdentity, Location, PackageFormat, Platform, Requirement, RequirementEntry,
};

/// Header written when no interpreter-specific one is configured.
pub const DEFAULT_HEADER: &str = "#!/usr/bin/env pexr-boot";

const NAMESPACE_INIT: &str = "__path__ = __import__('pkgutil').extend_path(__path__, __name__)\n";

/// Errors from assembling or freezing a bundle.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Mutation after [`BundleBuilder::freeze`].
    #[error("Bundle is frozen and can no longer be modified")]
    Frozen,

    /// Reading inputs or writing the bundle failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Archive path is absolute, empty or climbs out of the root.
    #[error("Invalid bundle path '{0}'")]
    InvalidPath(String),

    /// A second executable was set.
    #[error("Bundle already has an executable ({0})")]
    DuplicateExecutable(String),

    /// File name is not a wheel or egg.
    #[error("Not a binary distribution: {0}")]
    NotADistribution(PathBuf),

    /// Zip writer failure.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Metadata serialization failure.
    #[error("Cannot encode PEXR-INFO: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_at(path: &Path) -> impl Fn(std::io::Error) -> BuilderError + '_ {
    move |source| BuilderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an archive entry is, for hashing and `__init__.py` generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Source,
    Resource,
    Executable,
    Generated,
    Dist,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    mode: u32,
    label: Label,
}

/// Normalize a `/`-separated archive path, rejecting anything that could
/// escape the archive root.
fn archive_path(raw: &str) -> Result<String, BuilderError> {
    let mut parts = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(BuilderError::InvalidPath(raw.to_string())),
        }
    }
    if parts.is_empty() {
        return Err(BuilderError::InvalidPath(raw.to_string()));
    }
    Ok(parts.join("/"))
}

fn file_mode(meta: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return 0o755;
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    0o644
}

/// Mutable bundle under construction. Frozen by [`BundleBuilder::freeze`].
#[derive(Debug)]
pub struct BundleBuilder {
    info: BundleInfo,
    entries: BTreeMap<String, Entry>,
    header: String,
    platform: Platform,
    executable: Option<String>,
    frozen: bool,
}

impl BundleBuilder {
    /// Start an empty bundle for `interpreter`.
    pub fn new(interpreter: Option<InterpreterIdentity>) -> Self {
        Self {
            info: BundleInfo {
                interpreter,
                ..BundleInfo::default()
            },
            entries: BTreeMap::new(),
            header: DEFAULT_HEADER.to_string(),
            platform: Platform::current(),
            executable: None,
            frozen: false,
        }
    }

    /// Use `header` (without trailing newline) as the first line.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Record `platform` as the build platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Metadata as it stands.
    pub fn info(&self) -> &BundleInfo {
        &self.info
    }

    /// Whether [`BundleBuilder::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<(), BuilderError> {
        if self.frozen {
            Err(BuilderError::Frozen)
        } else {
            Ok(())
        }
    }

    fn add_file(&mut self, file: &Path, bundle_path: &str, label: Label) -> Result<String, BuilderError> {
        self.ensure_mutable()?;
        let path = archive_path(bundle_path)?;
        let meta = std::fs::metadata(file).map_err(io_at(file))?;
        let data = std::fs::read(file).map_err(io_at(file))?;
        self.entries.insert(
            path.clone(),
            Entry {
                data,
                mode: file_mode(&meta),
                label,
            },
        );
        Ok(path)
    }

    /// Add user code at `bundle_path`. Missing parent `__init__.py` files are
    /// generated at freeze time.
    ///
    /// # Errors
    ///
    /// Returns an error if frozen, if `bundle_path` is invalid, or if `file`
    /// cannot be read.
    pub fn add_source(&mut self, file: &Path, bundle_path: &str) -> Result<(), BuilderError> {
        self.add_file(file, bundle_path, Label::Source).map(drop)
    }

    /// Add a data file at `bundle_path`.
    ///
    /// # Errors
    ///
    /// As [`BundleBuilder::add_source`].
    pub fn add_resource(&mut self, file: &Path, bundle_path: &str) -> Result<(), BuilderError> {
        self.add_file(file, bundle_path, Label::Resource).map(drop)
    }

    /// Add a script and make its module the entry point. `bundle_path`
    /// defaults to the file's name.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::DuplicateExecutable`] if one was already set.
    pub fn set_executable(&mut self, file: &Path, bundle_path: Option<&str>) -> Result<(), BuilderError> {
        if let Some(existing) = &self.executable {
            return Err(BuilderError::DuplicateExecutable(existing.clone()));
        }
        let default_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BuilderError::InvalidPath(file.display().to_string()))?;
        let path = self.add_file(file, bundle_path.unwrap_or(&default_name), Label::Executable)?;
        let module = path.strip_suffix(".py").unwrap_or(&path).replace('/', ".");
        self.info.entry_point = Some(
            module
                .parse()
                .map_err(|_| BuilderError::InvalidPath(path.clone()))?,
        );
        self.executable = Some(path);
        Ok(())
    }

    /// Record a requirement for run-time checking.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn add_requirement(
        &mut self,
        requirement: Requirement,
        dynamic: bool,
        repo: Option<String>,
    ) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.add_requirement(RequirementEntry {
            requirement,
            location: None,
            dynamic,
            repo,
        });
        Ok(())
    }

    fn add_dist_tree(&mut self, dist_name: &str, mut files: Vec<(String, Vec<u8>, u32)>) -> String {
        let mut hasher = blake3::Hasher::new();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        for (rel, data, mode) in files {
            hasher.update(rel.as_bytes());
            hasher.update(&[0]);
            hasher.update(&data);
            self.entries.insert(
                format!("{DEPS_DIR}/{dist_name}/{rel}"),
                Entry {
                    data,
                    mode,
                    label: Label::Dist,
                },
            );
        }
        let hash = Blake3Hash::from_hasher(&hasher).as_str().to_string();
        self.info.add_distribution(dist_name, hash.clone());
        hash
    }

    /// Embed an installed package under `.deps/<dist>/` and pin it.
    /// Returns the distribution directory name.
    ///
    /// # Errors
    ///
    /// Returns an error if frozen or the package directory cannot be read.
    pub fn add_package(&mut self, package: &Package) -> Result<String, BuilderError> {
        self.ensure_mutable()?;
        let dist_name = package.dist_name();
        let files = read_tree(&package.path)?;
        let hash = self.add_dist_tree(&dist_name, files);
        tracing::debug!(package = %package, dist = %dist_name, %hash, "embedded package");
        self.info.add_requirement(RequirementEntry {
            requirement: package.as_requirement(),
            location: Some(package.origin.clone()),
            dynamic: false,
            repo: None,
        });
        Ok(dist_name)
    }

    /// Embed a built wheel or egg (file, or unpacked directory named like
    /// one) and pin it. Returns the distribution directory name.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::NotADistribution`] if the name does not parse
    /// as a wheel or egg.
    pub fn add_dist_location(&mut self, location: &Path) -> Result<String, BuilderError> {
        self.ensure_mutable()?;
        let artifact = Artifact::from_location(Location::Local(location.to_path_buf()))
            .filter(|a| a.format != PackageFormat::Source)
            .ok_or_else(|| BuilderError::NotADistribution(location.to_path_buf()))?;
        let files = if location.is_dir() {
            read_tree(location)?
        } else {
            read_zip(location)?
        };
        let dist_name = artifact.filename.clone();
        self.add_dist_tree(&dist_name, files);

        let mut requirement = Requirement::any(artifact.name.clone());
        requirement.specifiers = format!("=={}", artifact.version)
            .parse()
            .map_err(|_| BuilderError::NotADistribution(location.to_path_buf()))?;
        self.info.add_requirement(RequirementEntry {
            requirement,
            location: Some(artifact.location),
            dynamic: false,
            repo: None,
        });
        Ok(dist_name)
    }

    /// Run `entry_point` when the bundle executes.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn set_entry_point(&mut self, entry_point: Option<EntryPoint>) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.entry_point = entry_point;
        Ok(())
    }

    /// Whether code may be imported directly from the archive.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn set_zip_safe(&mut self, zip_safe: bool) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.zip_safe = zip_safe;
        Ok(())
    }

    /// Whether unsatisfied requirements are skipped at run time.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn set_ignore_errors(&mut self, ignore_errors: bool) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.ignore_errors = ignore_errors;
        Ok(())
    }

    /// Whether the ambient import path is appended at run time.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn set_inherit_path(&mut self, inherit_path: bool) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.inherit_path = inherit_path;
        Ok(())
    }

    /// Whether to extract even zip-safe bundles.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Frozen`] after freezing.
    pub fn set_always_write_cache(&mut self, always: bool) -> Result<(), BuilderError> {
        self.ensure_mutable()?;
        self.info.always_write_cache = always;
        Ok(())
    }

    /// Generate `__init__.py` for source directories that lack one.
    fn prepare_inits(&mut self) {
        let sources: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.label, Label::Source | Label::Executable))
            .map(|(path, _)| path.clone())
            .collect();
        let mut missing = BTreeSet::new();
        for path in &sources {
            let parts: Vec<&str> = path.split('/').collect();
            for k in 1..parts.len() {
                let init = format!("{}/__init__.py", parts[..k].join("/"));
                if !self.entries.contains_key(&init) {
                    missing.insert(init);
                }
            }
        }
        for init in missing {
            self.entries.insert(
                init,
                Entry {
                    data: NAMESPACE_INIT.as_bytes().to_vec(),
                    mode: 0o644,
                    label: Label::Generated,
                },
            );
        }
    }

    fn code_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (path, entry) in &self.entries {
            if entry.label == Label::Dist {
                continue;
            }
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&entry.data);
        }
        Blake3Hash::from_hasher(&hasher).as_str().to_string()
    }

    fn finalize(&mut self) {
        if self.frozen {
            return;
        }
        self.prepare_inits();
        self.info.code_hash = Some(self.code_hash());
        self.info.build_properties = BuildProperties {
            platform: self.platform.to_string(),
            interpreter: self
                .info
                .interpreter
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            builder_version: env!("CARGO_PKG_VERSION").to_string(),
            built_at: Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        };
        self.frozen = true;
    }

    fn to_zip(&self) -> Result<Vec<u8>, BuilderError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let base = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        zip.start_file(BUNDLE_INFO_PATH, base.unix_permissions(0o644))?;
        zip.write_all(self.info.to_json()?.as_bytes())
            .map_err(io_at(Path::new(BUNDLE_INFO_PATH)))?;
        for (path, entry) in &self.entries {
            zip.start_file(path.as_str(), base.unix_permissions(entry.mode))?;
            zip.write_all(&entry.data).map_err(io_at(Path::new(path)))?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Freeze the builder and write the bundle to `dest`.
    ///
    /// The file is written to `<dest>~` and renamed into place, then made
    /// executable. Calling again rewrites the same content.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be encoded or written.
    pub fn freeze(&mut self, dest: &Path) -> Result<&BundleInfo, BuilderError> {
        self.finalize();
        let archive = self.to_zip()?;

        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(io_at(parent))?;

        // Staged beside `dest`; deleted on drop if anything fails before
        // `persist`.
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".partial")
            .tempfile_in(parent)
            .map_err(io_at(parent))?;
        let staged_path = staged.path().to_path_buf();
        staged
            .write_all(format!("{}\n", self.header).as_bytes())
            .and_then(|()| staged.write_all(&archive))
            .and_then(|()| staged.as_file().sync_all())
            .map_err(io_at(&staged_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o755))
                .map_err(io_at(&staged_path))?;
        }

        staged.persist(dest).map_err(|e| BuilderError::Io {
            path: dest.to_path_buf(),
            source: e.error,
        })?;

        tracing::info!(
            path = %dest.display(),
            entries = self.entries.len(),
            dists = self.info.distributions.len(),
            "bundle written"
        );
        Ok(&self.info)
    }
}

/// Every file under `dir` as `(relative path, bytes, mode)`, skipping the
/// cache entry marker.
fn read_tree(dir: &Path) -> Result<Vec<(String, Vec<u8>, u32)>, BuilderError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BuilderError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() || entry.file_name() == ENTRY_MARKER {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| BuilderError::InvalidPath(entry.path().display().to_string()))?;
        let rel = archive_path(&rel.to_string_lossy())?;
        let meta = entry.metadata().map_err(|e| BuilderError::Io {
            path: entry.path().to_path_buf(),
            source: e.into(),
        })?;
        let data = std::fs::read(entry.path()).map_err(io_at(entry.path()))?;
        files.push((rel, data, file_mode(&meta)));
    }
    Ok(files)
}

/// Every file in a zip archive as `(path, bytes, mode)`.
fn read_zip(path: &Path) -> Result<Vec<(String, Vec<u8>, u32)>, BuilderError> {
    let file = std::fs::File::open(path).map_err(io_at(path))?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let rel = archive_path(&name.to_string_lossy())?;
        let mode = entry.unix_mode().map_or(0o644, |m| m & 0o777);
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(io_at(path))?;
        files.push((rel, data, mode));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlatformTag;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn read_archive(bundle: &Path) -> (String, zip::ZipArchive<Cursor<Vec<u8>>>) {
        let bytes = std::fs::read(bundle).unwrap();
        let split = bytes.iter().position(|b| *b == b'\n').unwrap();
        let header = String::from_utf8(bytes[..split].to_vec()).unwrap();
        let zip = zip::ZipArchive::new(Cursor::new(bytes[split + 1..].to_vec())).unwrap();
        (header, zip)
    }

    fn package(dir: &Path) -> Package {
        write(&dir.join("foo/__init__.py"), "x = 1");
        write(&dir.join(ENTRY_MARKER), "{}");
        Package {
            name: "foo".into(),
            version: "1.0".parse().unwrap(),
            format: PackageFormat::Wheel,
            tag: PlatformTag::any(),
            origin: Location::Remote("https://h/foo-1.0-py3-none-any.whl".to_string()),
            path: dir.to_path_buf(),
            requires: Vec::new(),
        }
    }

    #[test]
    fn freeze_writes_header_sorted_entries_and_inits() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("main.py"), "print('hi')");
        let pkg = package(&tmp.path().join("pkg"));

        let mut builder = BundleBuilder::new(Some("CPython-3.11.4".parse().unwrap()));
        builder.add_source(&src.join("main.py"), "app/cli/main.py").unwrap();
        builder.add_resource(&src.join("main.py"), "data/blob.txt").unwrap();
        let dist = builder.add_package(&pkg).unwrap();
        assert_eq!(dist, "foo-1.0-py3-none-any.whl");
        builder.set_entry_point(Some("app.cli.main:run".parse().unwrap())).unwrap();

        let dest = tmp.path().join("out/app.pexr");
        let info = builder.freeze(&dest).unwrap().clone();
        assert_eq!(std::fs::read_dir(tmp.path().join("out")).unwrap().count(), 1);
        assert!(info.code_hash.is_some());
        assert_eq!(info.requirements[0].requirement.to_string(), "foo==1.0");
        assert_eq!(info.distributions.len(), 1);

        let (header, mut zip) = read_archive(&dest);
        assert_eq!(header, DEFAULT_HEADER);
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        let mut sorted = names[1..].to_vec();
        sorted.sort();
        assert_eq!(names[0], BUNDLE_INFO_PATH);
        assert_eq!(names[1..], sorted[..]);
        assert!(names.contains(&"app/__init__.py".to_string()));
        assert!(names.contains(&"app/cli/__init__.py".to_string()));
        assert!(!names.contains(&"data/__init__.py".to_string()));
        assert!(names.contains(&".deps/foo-1.0-py3-none-any.whl/foo/__init__.py".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(ENTRY_MARKER)));

        let mut stored = String::new();
        zip.by_name(BUNDLE_INFO_PATH).unwrap().read_to_string(&mut stored).unwrap();
        assert_eq!(BundleInfo::from_json(stored.as_bytes()).unwrap(), info);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn frozen_builder_rejects_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut builder = BundleBuilder::new(None);
        builder.freeze(&tmp.path().join("a.pexr")).unwrap();
        assert!(builder.is_frozen());
        assert!(matches!(builder.set_zip_safe(false), Err(BuilderError::Frozen)));
        assert!(matches!(
            builder.add_requirement("foo".parse().unwrap(), false, None),
            Err(BuilderError::Frozen)
        ));
        // Freezing again is allowed and rewrites the same metadata.
        let again = builder.freeze(&tmp.path().join("b.pexr")).unwrap();
        assert!(again.code_hash.is_some());
    }

    #[test]
    fn custom_header_replaces_existing_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("app.pexr");
        std::fs::write(&dest, b"old").unwrap();
        BundleBuilder::new(None)
            .with_header("#!/usr/bin/env python3.11")
            .freeze(&dest)
            .unwrap();
        let (header, _) = read_archive(&dest);
        assert_eq!(header, "#!/usr/bin/env python3.11");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_freeze_leaves_no_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        let dest = tmp.path().join("app.pexr");
        write(&dest.join("occupied"), "");

        let err = BundleBuilder::new(None).freeze(&dest).unwrap_err();
        assert!(matches!(err, BuilderError::Io { ref path, .. } if path == &dest));
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, ["app.pexr"]);
    }

    #[test]
    fn executable_sets_entry_point_once() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("tool.py");
        write(&script, "print()");
        let mut builder = BundleBuilder::new(None);
        builder.set_executable(&script, Some("bin/tool.py")).unwrap();
        assert_eq!(builder.info().entry_point.as_ref().unwrap().to_string(), "bin.tool");
        assert!(matches!(
            builder.set_executable(&script, None),
            Err(BuilderError::DuplicateExecutable(_))
        ));
    }

    #[test]
    fn dist_locations_are_embedded_and_pinned() {
        let tmp = tempfile::tempdir().unwrap();
        let wheel = tmp.path().join("bar-2.1-py3-none-any.whl");
        crate::translator::tests::write_zip(&wheel, &[("bar.py", ""), ("bar-2.1.dist-info/METADATA", "")]);

        let mut builder = BundleBuilder::new(None);
        let dist = builder.add_dist_location(&wheel).unwrap();
        assert_eq!(dist, "bar-2.1-py3-none-any.whl");
        assert_eq!(builder.info().requirements[0].requirement.to_string(), "bar==2.1");
        assert!(matches!(
            builder.add_dist_location(&tmp.path().join("bar-2.1.tar.gz")),
            Err(BuilderError::NotADistribution(_))
        ));
    }

    #[test]
    fn rejects_escaping_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("x.py");
        write(&file, "");
        let mut builder = BundleBuilder::new(None);
        assert!(matches!(
            builder.add_source(&file, "../x.py"),
            Err(BuilderError::InvalidPath(_))
        ));
        assert!(matches!(
            builder.add_source(&file, "/etc/x.py"),
            Err(BuilderError::InvalidPath(_))
        ));
    }
}
