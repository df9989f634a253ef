//! HTTP fetcher for arXiv source bundles and PDFs

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::Fetcher;
use crate::config::{DownloadConfig, RetryConfig, StorageConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::fetch_with_retry;
use crate::types::ItemId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArtifactKind {
    Source,
    Rendered,
}

/// Fetches artifacts over HTTP, spacing requests by the configured interval
///
/// Requests from all callers share one pacing gate, so concurrent fetches
/// still respect the remote's rate limit.
pub struct ArxivFetcher {
    client: reqwest::Client,
    source_url_base: Url,
    rendered_url_base: Url,
    storage: StorageConfig,
    request_interval: Duration,
    min_rendered_bytes: u64,
    retry: RetryConfig,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivFetcher {
    /// Build a fetcher from the download and storage settings
    pub fn new(download: &DownloadConfig, storage: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download.timeout)
            .user_agent(&download.user_agent)
            .build()?;

        Ok(Self {
            client,
            source_url_base: parse_base(&download.source_url_base, "download.source_url_base")?,
            rendered_url_base: parse_base(
                &download.rendered_url_base,
                "download.rendered_url_base",
            )?,
            storage: storage.clone(),
            request_interval: download.request_interval,
            min_rendered_bytes: download.min_rendered_bytes,
            retry: download.retry.clone(),
            last_request: Mutex::new(None),
        })
    }

    /// Wait until `request_interval` has passed since the previous request
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.request_interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(
                    wait_ms = (ready_at - now).as_millis(),
                    "rate limiting remote request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn url_for(&self, item: &ItemId, kind: ArtifactKind) -> Result<Url> {
        let base = match kind {
            ArtifactKind::Source => &self.source_url_base,
            ArtifactKind::Rendered => &self.rendered_url_base,
        };
        base.join(item.as_str()).map_err(|e| Error::Config {
            message: format!("cannot build URL for {}: {}", item, e),
            key: None,
        })
    }

    async fn fetch(&self, item: &ItemId, kind: ArtifactKind) -> Result<PathBuf> {
        let url = self.url_for(item, kind)?;
        let dest = match kind {
            ArtifactKind::Source => self.storage.source_archive_path(item.as_str()),
            ArtifactKind::Rendered => self.storage.rendered_path(item.as_str()),
        };

        let size = fetch_with_retry(&self.retry, || self.fetch_once(&url, &dest, kind)).await?;

        info!(item_id = %item, ?kind, %url, size, dest = ?dest, "artifact fetched");
        Ok(dest)
    }

    async fn fetch_once(&self, url: &Url, dest: &Path, kind: ArtifactKind) -> Result<u64> {
        self.pace().await;
        debug!(%url, ?kind, "requesting artifact");

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match kind {
            ArtifactKind::Rendered if !content_type.contains("pdf") => {
                remove_stale(dest).await;
                return Err(Error::Fetch(FetchError::ContentType {
                    url: url.to_string(),
                    content_type,
                    expected: "application/pdf",
                }));
            }
            // An HTML page in place of a bundle is an error page
            ArtifactKind::Source if content_type.starts_with("text/html") => {
                return Err(Error::Fetch(FetchError::ContentType {
                    url: url.to_string(),
                    content_type,
                    expected: "an archive",
                }));
            }
            _ => {}
        }

        let body = response.bytes().await?;
        let size = body.len() as u64;

        if kind == ArtifactKind::Rendered && size < self.min_rendered_bytes {
            remove_stale(dest).await;
            return Err(Error::Fetch(FetchError::TooSmall {
                url: url.to_string(),
                size,
                min: self.min_rendered_bytes,
            }));
        }

        write_atomically(dest, &body).await?;
        Ok(size)
    }
}

#[async_trait]
impl Fetcher for ArxivFetcher {
    async fn fetch_source(&self, item: &ItemId) -> Result<PathBuf> {
        self.fetch(item, ArtifactKind::Source).await
    }

    async fn fetch_rendered(&self, item: &ItemId) -> Result<PathBuf> {
        self.fetch(item, ArtifactKind::Rendered).await
    }
}

fn parse_base(raw: &str, key: &str) -> Result<Url> {
    // Url::join drops the last segment unless the base ends with a slash
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| Error::Config {
        message: format!("invalid URL '{}': {}", raw, e),
        key: Some(key.to_string()),
    })
}

async fn write_atomically(dest: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

async fn remove_stale(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => warn!(path = ?dest, "removed invalid artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?dest, error = %e, "failed to remove invalid artifact"),
    }
}
