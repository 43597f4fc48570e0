//! Remote pack network client.
//!
//! The remote protocol is two unauthenticated GETs: `{base}/index.json`
//! returning the pack manifest, and `{base}/{file}` returning one pack
//! payload. Both are best-effort: any transport, status, or decode failure
//! is logged and surfaced as `None`, never as an error - the core flow must
//! not block on the network.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Manifest of pack files available remotely. Fetched fresh every time,
/// never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct PackIndex {
    pub packs: Vec<String>,
}

/// One downloadable pack payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePack {
    pub id: String,
    pub name: String,
    pub ideas: Vec<String>,
}

/// Internal transport errors; callers of the trait only ever see `None`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Seam over the remote pack network so tests can script responses.
#[async_trait]
pub trait PackFetcher: Send + Sync {
    /// The current manifest, or `None` when the network has nothing for us.
    async fn fetch_index(&self) -> Option<PackIndex>;

    /// One pack payload by file name, same fail-soft contract.
    async fn fetch_pack(&self, file: &str) -> Option<RemotePack>;
}

/// HTTP fetcher against a fixed base location.
pub struct HttpPackFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPackFetcher {
    /// Build a fetcher for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Transport` when the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn index_url(&self) -> String {
        format!("{}/index.json", self.base_url)
    }

    fn pack_url(&self, file: &str) -> String {
        format!("{}/{file}", self.base_url)
    }

    /// GET a JSON document, bypassing intermediary caches: the manifest may
    /// change at any time and packs are downloaded once and owned locally.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        debug!(%url, "fetching remote pack data");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PackFetcher for HttpPackFetcher {
    async fn fetch_index(&self) -> Option<PackIndex> {
        let url = self.index_url();
        match self.get_json(&url).await {
            Ok(index) => Some(index),
            Err(err) => {
                warn!(%url, error = %err, "pack index unavailable");
                None
            }
        }
    }

    async fn fetch_pack(&self, file: &str) -> Option<RemotePack> {
        let url = self.pack_url(file);
        match self.get_json(&url).await {
            Ok(pack) => Some(pack),
            Err(err) => {
                warn!(%url, error = %err, "pack download failed");
                None
            }
        }
    }
}
