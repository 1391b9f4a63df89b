//! Translation cache.
//!
//! An entry is an installed package directory keyed by
//! `(name, version, format, tag)`. Entries are written once, by staging the
//! directory next to its final location and renaming it into place, and are
//! never mutated afterwards. A lookup whose directory has disappeared is a
//! miss.

use fs4::fs_std::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::package::Package;
use crate::types::{Blake3Hash, PackageFormat, PackageName, PlatformTag, Version};

/// Marker file that makes a directory a committed cache entry.
pub const ENTRY_MARKER: &str = ".pexr-entry.json";

/// Translation cache failures.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure inside the cache.
    #[error("Cache IO error at {path}: {source}")]
    Io {
        /// Path being touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The entry marker could not be serialized.
    #[error("Cannot encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_at(path: &Path) -> impl Fn(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Project name.
    pub name: PackageName,
    /// Project version.
    pub version: Version,
    /// Format of the source artifact.
    pub format: PackageFormat,
    /// Compatibility tag the translation was made for.
    pub tag: PlatformTag,
}

impl CacheKey {
    /// Build a key from its parts.
    pub fn new(name: PackageName, version: Version, format: PackageFormat, tag: PlatformTag) -> Self {
        Self {
            name,
            version,
            format,
            tag,
        }
    }

    /// Directory name for this key.
    ///
    /// The readable prefix is for humans; the hash suffix keeps distinct keys
    /// distinct even when their readable forms collide.
    pub fn encode(&self) -> String {
        let tag = self.tag.to_string().replace('*', "any");
        let canonical = format!("{}\0{}\0{}\0{}", self.name, self.version, self.format, self.tag);
        format!(
            "{}-{}-{}-{}-{}",
            self.name.as_filename_component(),
            self.version,
            self.format,
            tag,
            Blake3Hash::compute(canonical.as_bytes()).short(16)
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({}, {})", self.name, self.version, self.format, self.tag)
    }
}

/// Storage for translated packages.
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Look up a committed entry. Missing or damaged entries are misses.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store itself cannot be read.
    fn get(&self, key: &CacheKey) -> Result<Option<Package>, CacheError>;

    /// A fresh, empty directory to translate into before [`CacheStore::put`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn staging_dir(&self, key: &CacheKey) -> Result<PathBuf, CacheError>;

    /// Commit a staged directory. Returns the package as stored, with its
    /// path pointing at the committed entry. If another writer committed the
    /// same key first, the staged copy is discarded and theirs is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn put(&self, key: &CacheKey, staged: &Path, package: Package) -> Result<Package, CacheError>;

    /// Exclusive ownership of `key` among every user of this store, held
    /// until the returned guard drops. Blocks while another holder has it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken.
    fn lock_entry(&self, _key: &CacheKey) -> Result<EntryLock, CacheError> {
        Ok(EntryLock::default())
    }

    /// Throw away a staging directory after a failed translation.
    fn discard(&self, staged: &Path) {
        if let Err(e) = std::fs::remove_dir_all(staged) {
            tracing::debug!(path = %staged.display(), error = %e, "failed to remove staging dir");
        }
    }
}

/// Guard returned by [`CacheStore::lock_entry`]. Stores that are private to
/// one process hand out an empty guard.
#[derive(Debug, Default)]
pub struct EntryLock {
    _file: Option<File>,
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn new_staging_dir(root: &Path, key: &CacheKey) -> Result<PathBuf, CacheError> {
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = root.join(format!(
        ".staging-{}-{}-{seq}",
        key.encode(),
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).map_err(io_at(&dir))?;
    Ok(dir)
}

/// Process-local store, for tests and one-shot runs.
#[derive(Debug)]
pub struct MemoryCache {
    root: PathBuf,
    entries: Mutex<HashMap<CacheKey, Package>>,
}

impl MemoryCache {
    /// Keep entry directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Package>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).filter(|p| p.path.exists()).cloned())
    }

    fn staging_dir(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        new_staging_dir(&self.root, key)
    }

    fn put(&self, key: &CacheKey, staged: &Path, mut package: Package) -> Result<Package, CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(key).filter(|p| p.path.exists()) {
            self.discard(staged);
            return Ok(existing.clone());
        }
        let dest = self.root.join(key.encode());
        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(io_at(&dest))?;
        }
        std::fs::rename(staged, &dest).map_err(io_at(&dest))?;
        package.path = dest;
        entries.insert(key.clone(), package.clone());
        Ok(package)
    }
}

/// On-disk store at `<cache>/installed/<encoded key>/`.
///
/// Safe to share between processes. Translations of one key are serialized
/// by a file lock at `<cache>/.locks/<encoded key>.lock`, commits are a
/// single directory rename, and a writer that loses the race adopts the
/// winner's entry.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
    locks: PathBuf,
}

impl FsCache {
    /// Store entries under `<cache_dir>/installed`.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            root: cache_dir.join("installed"),
            locks: cache_dir.join(".locks"),
        }
    }

    fn read_entry(dir: &Path) -> Option<Package> {
        let bytes = std::fs::read(dir.join(ENTRY_MARKER)).ok()?;
        match serde_json::from_slice::<Package>(&bytes) {
            Ok(mut package) => {
                // The cache may have been moved since the entry was written.
                package.path = dir.to_path_buf();
                Some(package)
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "ignoring damaged cache entry");
                None
            }
        }
    }
}

impl CacheStore for FsCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Package>, CacheError> {
        let dir = self.root.join(key.encode());
        if !dir.is_dir() {
            return Ok(None);
        }
        Ok(Self::read_entry(&dir))
    }

    fn staging_dir(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        new_staging_dir(&self.root, key)
    }

    fn lock_entry(&self, key: &CacheKey) -> Result<EntryLock, CacheError> {
        std::fs::create_dir_all(&self.locks).map_err(io_at(&self.locks))?;
        let path = self.locks.join(format!("{}.lock", key.encode()));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_at(&path))?;
        file.lock_exclusive().map_err(io_at(&path))?;
        tracing::debug!(key = %key, "acquired cache entry lock");
        Ok(EntryLock { _file: Some(file) })
    }

    fn put(&self, key: &CacheKey, staged: &Path, mut package: Package) -> Result<Package, CacheError> {
        let dest = self.root.join(key.encode());
        package.path.clone_from(&dest);
        let marker = staged.join(ENTRY_MARKER);
        std::fs::write(&marker, serde_json::to_vec_pretty(&package)?).map_err(io_at(&marker))?;

        if std::fs::rename(staged, &dest).is_ok() {
            tracing::debug!(key = %key, path = %dest.display(), "committed cache entry");
            return Ok(package);
        }
        if let Some(winner) = Self::read_entry(&dest) {
            tracing::debug!(key = %key, "lost cache commit race, adopting existing entry");
            self.discard(staged);
            return Ok(winner);
        }
        // A directory without a valid marker is left over from an interrupted
        // writer; replace it.
        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(io_at(&dest))?;
        }
        std::fs::rename(staged, &dest).map_err(io_at(&dest))?;
        Ok(package)
    }
}

/// Per-key async mutexes, so concurrent misses on one key run once.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + std::hash::Hash + Clone> KeyedLocks<K> {
    /// Wait for exclusive ownership of `key`.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Forget locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
