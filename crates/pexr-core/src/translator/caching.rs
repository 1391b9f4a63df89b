//! Memoizing translator.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{Translation, Translator, select_tag};
use crate::Reporter;
use super::TranslateError;
use crate::cache::{CacheKey, CacheStore, EntryLock, KeyedLocks};
use crate::types::{Artifact, PackageFormat, PlatformTag};

/// Serves translations from a [`CacheStore`], translating through `inner`
/// only on a miss.
///
/// Entries live where the store puts them, so the `dest` handed to
/// [`Translator::translate`] is not used. Concurrent misses on the same key
/// are serialized, within this process by an async lock and across every
/// user of the store by [`CacheStore::lock_entry`]; the second waiter finds
/// the first one's entry.
pub struct CachingTranslator {
    inner: Arc<dyn Translator>,
    store: Arc<dyn CacheStore>,
    locks: KeyedLocks<CacheKey>,
    target: PlatformTag,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for CachingTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingTranslator")
            .field("inner", &self.inner)
            .field("store", &self.store)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CachingTranslator {
    /// Cache `inner`'s results in `store`, keyed for `target`.
    pub fn new(
        inner: Arc<dyn Translator>,
        store: Arc<dyn CacheStore>,
        target: PlatformTag,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            inner,
            store,
            locks: KeyedLocks::default(),
            target,
            reporter,
        }
    }

    /// Cache key for `artifact`. Sources are built for the target, so they
    /// are keyed by it.
    pub fn key_for(&self, artifact: &Artifact) -> CacheKey {
        let tag = match artifact.format {
            PackageFormat::Source => self.target.clone(),
            _ => select_tag(artifact, &self.target),
        };
        CacheKey::new(artifact.name.clone(), artifact.version.clone(), artifact.format, tag)
    }

    fn lookup(&self, key: &CacheKey) -> Option<Translation> {
        match self.store.get(key) {
            Ok(Some(package)) => {
                tracing::debug!(%key, "translation cache hit");
                self.reporter.cache_hit(&package.name, &package.version);
                Some(Translation::Success(package))
            }
            Ok(None) => None,
            Err(e) => Some(Translation::Failure(e.into())),
        }
    }

    async fn lock_entry(&self, key: &CacheKey) -> Result<EntryLock, TranslateError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        let lock = tokio::task::spawn_blocking(move || store.lock_entry(&key)).await??;
        Ok(lock)
    }
}

#[async_trait]
impl Translator for CachingTranslator {
    async fn translate(&self, artifact: &Artifact, _dest: &Path) -> Translation {
        let key = self.key_for(artifact);
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        let _guard = self.locks.lock(&key).await;
        let _entry_lock = match self.lock_entry(&key).await {
            Ok(lock) => lock,
            Err(e) => return Translation::Failure(e),
        };
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }

        let staged = match self.store.staging_dir(&key) {
            Ok(dir) => dir,
            Err(e) => return Translation::Failure(e.into()),
        };
        match self.inner.translate(artifact, &staged).await {
            Translation::Success(package) => match self.store.put(&key, &staged, package) {
                Ok(stored) => Translation::Success(stored),
                Err(e) => {
                    self.store.discard(&staged);
                    Translation::Failure(e.into())
                }
            },
            other => {
                self.store.discard(&staged);
                other
            }
        }
    }
}
