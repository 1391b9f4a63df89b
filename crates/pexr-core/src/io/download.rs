//! Async artifact download with streaming SHA256 verification.
//!
//! Remote artifacts land in `<cache>/downloads/<url hash>/<filename>` and are
//! reused on later runs. Local artifacts are used in place.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::Reporter;
use crate::types::{Artifact, Blake3Hash, Location, Sha256Hash};

/// Errors fetching an artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport failure or error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the download failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content does not match the link's `#sha256=`.
    #[error("Hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Artifact URL.
        url: String,
        /// Digest from the link.
        expected: Sha256Hash,
        /// Digest of what arrived.
        actual: Sha256Hash,
    },

    /// A local artifact is gone.
    #[error("Artifact not found: {0}")]
    Missing(String),
}

/// Fetches artifacts into a local download directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    dir: PathBuf,
}

impl Downloader {
    /// Create a downloader that stores files under `dir`.
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    /// Return a local path holding `artifact`, downloading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Missing`] for local paths that do not exist,
    /// [`DownloadError::HashMismatch`] when the advertised digest does not
    /// match, or the underlying HTTP / IO error.
    pub async fn fetch(
        &self,
        artifact: &Artifact,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, DownloadError> {
        let url = match &artifact.location {
            Location::Local(path) => return local(path),
            Location::Remote(url) => url,
        };
        if let Some(path) = url
            .strip_prefix("file://")
            .and_then(|_| reqwest::Url::parse(url).ok())
            .and_then(|u| u.to_file_path().ok())
        {
            return local(&path);
        }

        let dest = self
            .dir
            .join(Blake3Hash::compute(url.as_bytes()).short(16))
            .join(&artifact.filename);

        if dest.exists() {
            match &artifact.sha256 {
                None => return Ok(dest),
                Some(expected) if &hash_file(&dest).await? == expected => {
                    tracing::debug!(path = %dest.display(), "download cache hit");
                    return Ok(dest);
                }
                Some(_) => {
                    tracing::warn!(path = %dest.display(), "cached download is corrupt, refetching");
                    tokio::fs::remove_file(&dest).await?;
                }
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        reporter.downloading(url);
        let part = dest.with_file_name(format!("{}.part", artifact.filename));
        let result = download_and_verify(&self.client, url, &part, artifact.sha256.as_ref()).await;
        match result {
            Ok(_) => {
                tokio::fs::rename(&part, &dest).await?;
                Ok(dest)
            }
            Err(e) => {
                tokio::fs::remove_file(&part).await.ok();
                Err(e)
            }
        }
    }
}

fn local(path: &Path) -> Result<PathBuf, DownloadError> {
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(DownloadError::Missing(path.display().to_string()))
    }
}

/// SHA256 of a file on disk.
async fn hash_file(path: &Path) -> Result<Sha256Hash, DownloadError> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        let mut file = std::fs::File::open(&path)?;
        std::io::copy(&mut file, &mut hasher)?;
        Ok::<_, std::io::Error>(hasher.finalize())
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(Sha256Hash::from_digest(&digest))
}

/// Perform a simple, sequential download with streaming verification.
///
/// # Errors
///
/// Returns an error on HTTP failure, IO failure, or a digest mismatch (in
/// which case `dest` is removed).
pub async fn download_and_verify(
    client: &Client,
    url: &str,
    dest: &Path,
    expected_hash: Option<&Sha256Hash>,
) -> Result<Sha256Hash, DownloadError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?
        .error_for_status()?;

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
    }

    file.flush().await?;
    let actual_hash = Sha256Hash::from_digest(&hasher.finalize());

    if let Some(expected) = expected_hash {
        if &actual_hash != expected {
            tokio::fs::remove_file(dest).await.ok();
            return Err(DownloadError::HashMismatch {
                url: url.to_string(),
                expected: expected.clone(),
                actual: actual_hash,
            });
        }
    }

    Ok(actual_hash)
}
