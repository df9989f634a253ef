//! Fetcher seam

use async_trait::async_trait;
use std::path::PathBuf;

use crate::Result;
use crate::types::ItemId;

/// Source of item artifacts
///
/// Both operations store the artifact on disk and return its path. Failures
/// are reported as errors; transient ones classify as retryable through
/// [`IsRetryable`](crate::retry::IsRetryable).
///
/// # Examples
///
/// ```no_run
/// use metastudy::fetch::{ArxivFetcher, Fetcher};
/// use metastudy::config::Config;
/// use metastudy::types::ItemId;
///
/// # async fn example() -> metastudy::Result<()> {
/// let config = Config::default();
/// let fetcher = ArxivFetcher::new(&config.download, &config.storage)?;
/// let archive = fetcher.fetch_source(&ItemId::parse("2401.01234v2")?).await?;
/// println!("stored at {}", archive.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the source archive of `item`
    async fn fetch_source(&self, item: &ItemId) -> Result<PathBuf>;

    /// Fetch the rendered document (PDF) of `item`
    async fn fetch_rendered(&self, item: &ItemId) -> Result<PathBuf>;
}
