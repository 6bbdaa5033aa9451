//! Reloadable whitelist registry.
//!
//! Readers load the current snapshot without locking; a reload builds a new
//! [`Whitelist`] in isolation and swaps it in with a single store, so a
//! lookup sees either the old or the new mapping in full. Failed reloads
//! leave both the live mapping and the persisted file untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use url::Url;

use super::error::WhitelistError;
use super::snapshot::{MirrorTarget, Whitelist};

/// Where a reload reads the whitelist from.
#[derive(Debug, Clone)]
pub enum WhitelistSource {
    /// The registry's own whitelist file.
    LocalFile,
    /// A raw-content URL; the download replaces the local file.
    RemoteUrl(Url),
}

pub struct WhitelistRegistry {
    current: ArcSwap<Whitelist>,
    path: PathBuf,
    client: reqwest::Client,
    /// Keeps file writes and swaps of concurrent reloads in the same order.
    reload_lock: Mutex<()>,
}

impl WhitelistRegistry {
    /// Creates an empty registry backed by the whitelist file at `path`.
    pub fn new(path: impl Into<PathBuf>, http_timeout: Duration) -> Result<Self, WhitelistError> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("gau/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(WhitelistError::HttpClient)?;

        Ok(Self {
            current: ArcSwap::from_pointee(Whitelist::default()),
            path: path.into(),
            client,
            reload_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Targets for a source, or `None` if the source is not whitelisted.
    pub fn lookup(&self, source: &str) -> Option<Vec<MirrorTarget>> {
        self.current.load().targets(source).map(<[MirrorTarget]>::to_vec)
    }

    pub fn snapshot(&self) -> Arc<Whitelist> {
        self.current.load_full()
    }

    /// Installs a whitelist directly, returning the previous one.
    pub fn replace(&self, whitelist: Whitelist) -> Arc<Whitelist> {
        self.current.swap(Arc::new(whitelist))
    }

    /// Rebuilds the mapping from `source`. Returns the number of whitelisted
    /// source repositories now in effect.
    pub async fn reload(&self, source: WhitelistSource) -> Result<usize, WhitelistError> {
        let _guard = self.reload_lock.lock().await;

        let whitelist = match source {
            WhitelistSource::LocalFile => self.read_local().await?,
            WhitelistSource::RemoteUrl(url) => self.fetch_remote(&url).await?,
        };

        let count = whitelist.len();
        self.replace(whitelist);
        log::info!(
            "Whitelist reloaded: {} repositories from {}",
            count,
            self.path.display()
        );
        Ok(count)
    }

    async fn read_local(&self) -> Result<Whitelist, WhitelistError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| WhitelistError::ReadFile {
                path: self.path.clone(),
                source: e,
            })?;
        Whitelist::from_json_slice(&bytes)
    }

    /// Downloads, validates, then persists. The file is only overwritten
    /// once the content is known to parse.
    async fn fetch_remote(&self, url: &Url) -> Result<Whitelist, WhitelistError> {
        log::info!("Fetching whitelist from {}", url);

        let fetch_err = |e: reqwest::Error| WhitelistError::Fetch {
            url: url.to_string(),
            source: e,
        };

        let response = self.client.get(url.clone()).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WhitelistError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(fetch_err)?;

        let whitelist = Whitelist::from_json_slice(&body)?;
        self.persist(&body).await?;
        Ok(whitelist)
    }

    async fn persist(&self, bytes: &[u8]) -> Result<(), WhitelistError> {
        let write_err = |e: std::io::Error| WhitelistError::WriteFile {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)
    }
}
