//! Candidate discovery.
//!
//! A [`Fetcher`] answers one question: which artifacts might provide a given
//! project? Nothing is downloaded here; candidates are inferred from
//! filenames in a directory listing or the anchors of an HTML page.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::types::{Artifact, Location, PackageName};

/// A single fetcher's failure. Logged, never fatal on its own.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Request failed or returned an error status.
    #[error("HTTP error from {url}: {source}")]
    Http {
        /// Page requested.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// A local repository could not be listed.
    #[error("Cannot read repository {path}: {source}")]
    Io {
        /// Repository directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configured URL does not parse.
    #[error("Invalid repository URL '{0}'")]
    InvalidUrl(String),
}

/// A source of candidate artifacts.
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Identifier used in logs (`dir:/srv/wheels`, `index:https://…`).
    fn key(&self) -> String;

    /// Artifacts that might provide `name`, in source-priority order.
    async fn candidates(&self, name: &PackageName) -> Result<Vec<Artifact>, FetchError>;
}

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("anchor pattern is valid")
});

/// Resolve every anchor on `page` against `base` and keep the recognizable
/// distributions.
pub fn parse_links(base: &Url, page: &str) -> Vec<Artifact> {
    ANCHOR_RE
        .captures_iter(page)
        .filter_map(|caps| {
            let href = caps[1].replace("&amp;", "&");
            let url = base.join(&href).ok()?;
            Artifact::from_location(Location::Remote(url.to_string()))
        })
        .collect()
}

fn for_project(artifacts: impl IntoIterator<Item = Artifact>, name: &PackageName) -> Vec<Artifact> {
    artifacts.into_iter().filter(|a| &a.name == name).collect()
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|_| FetchError::InvalidUrl(raw.to_string()))
}

async fn get_page(client: &Client, url: &Url) -> Result<Option<String>, FetchError> {
    let http = |source| FetchError::Http {
        url: url.to_string(),
        source,
    };
    let resp = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await
        .map_err(http)?;
    // A project the index has never heard of is an empty listing, not an error.
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let resp = resp.error_for_status().map_err(http)?;
    resp.text().await.map(Some).map_err(http)
}

/// Lists a local directory of distributions.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    /// Fetch from `dir` (not recursive).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Fetcher for DirectoryFetcher {
    fn key(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    async fn candidates(&self, name: &PackageName) -> Result<Vec<Artifact>, FetchError> {
        let io = |source| FetchError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            paths.push(entry.path());
        }
        // Directory order is arbitrary; sort for deterministic candidate order.
        paths.sort();
        Ok(for_project(
            paths
                .into_iter()
                .filter_map(|p| Artifact::from_location(Location::Local(p))),
            name,
        ))
    }
}

/// Reads a single "find-links" HTML page listing distributions.
///
/// The page is fetched once and reused for every project.
#[derive(Debug)]
pub struct LinksFetcher {
    client: Client,
    url: Url,
    page: OnceCell<Vec<Artifact>>,
}

impl LinksFetcher {
    /// Fetch from the page at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `url` does not parse.
    pub fn new(client: Client, url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client,
            url: parse_url(url)?,
            page: OnceCell::new(),
        })
    }
}

#[async_trait]
impl Fetcher for LinksFetcher {
    fn key(&self) -> String {
        format!("links:{}", self.url)
    }

    async fn candidates(&self, name: &PackageName) -> Result<Vec<Artifact>, FetchError> {
        let all = self
            .page
            .get_or_try_init(|| async {
                let page = get_page(&self.client, &self.url).await?.unwrap_or_default();
                let links = parse_links(&self.url, &page);
                tracing::debug!(url = %self.url, count = links.len(), "parsed find-links page");
                Ok::<_, FetchError>(links)
            })
            .await?;
        Ok(for_project(all.iter().cloned(), name))
    }
}

/// Queries a simple-repository index at `<index>/<project>/`.
#[derive(Debug, Clone)]
pub struct IndexFetcher {
    client: Client,
    base: Url,
}

impl IndexFetcher {
    /// Query the index rooted at `base` (e.g. `https://pypi.org/simple`).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `base` does not parse.
    pub fn new(client: Client, base: &str) -> Result<Self, FetchError> {
        let base = format!("{}/", base.trim_end_matches('/'));
        Ok(Self {
            client,
            base: parse_url(&base)?,
        })
    }
}

#[async_trait]
impl Fetcher for IndexFetcher {
    fn key(&self) -> String {
        format!("index:{}", self.base)
    }

    async fn candidates(&self, name: &PackageName) -> Result<Vec<Artifact>, FetchError> {
        let url = self
            .base
            .join(&format!("{name}/"))
            .map_err(|_| FetchError::InvalidUrl(format!("{}{name}/", self.base)))?;
        let Some(page) = get_page(&self.client, &url).await? else {
            tracing::debug!(%url, "project not on index");
            return Ok(Vec::new());
        };
        Ok(for_project(parse_links(&url, &page), name))
    }
}

/// Build fetchers from repository strings: URLs become [`LinksFetcher`]s,
/// anything else a [`DirectoryFetcher`]; then one [`IndexFetcher`] per index.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] for a malformed URL.
pub fn from_settings(
    client: &Client,
    repos: &[String],
    indices: &[String],
) -> Result<Vec<std::sync::Arc<dyn Fetcher>>, FetchError> {
    let mut fetchers: Vec<std::sync::Arc<dyn Fetcher>> = Vec::new();
    for repo in repos {
        if repo.starts_with("http://") || repo.starts_with("https://") {
            fetchers.push(std::sync::Arc::new(LinksFetcher::new(client.clone(), repo)?));
        } else {
            fetchers.push(std::sync::Arc::new(DirectoryFetcher::new(repo)));
        }
    }
    for index in indices {
        fetchers.push(std::sync::Arc::new(IndexFetcher::new(client.clone(), index)?));
    }
    Ok(fetchers)
}
