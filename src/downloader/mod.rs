//! Download orchestration
//!
//! [`DownloadOrchestrator`] walks Pending items from the download queue and,
//! per item, tries the acquisition strategies of [`strategy::STRATEGIES`] in
//! order until one succeeds:
//! - [`strategy`] - The ordered fallback chain
//! - [`artifacts`] - Detection of artifacts acquired by an earlier run,
//!   including fallback markers naming the previous version used
//!
//! Items are processed one after another and strategy attempts for an item
//! never overlap.

mod artifacts;
pub mod strategy;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use artifacts::{existing_artifact, record_fallback};
pub use strategy::{Artifact, Strategy, TargetVersion};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::StorageConfig;
use crate::db::QueueStore;
use crate::error::{Error, ExtractionError, Result};
use crate::extraction::ArchiveExtractor;
use crate::fetch::Fetcher;
use crate::types::{DownloadStats, DownloadStatus, ItemId};

/// Drives the download fallback chain over queued items
pub struct DownloadOrchestrator {
    store: Arc<dyn QueueStore>,
    fetcher: Arc<dyn Fetcher>,
    extractor: ArchiveExtractor,
    storage: StorageConfig,
}

impl DownloadOrchestrator {
    /// Create an orchestrator
    pub fn new(
        store: Arc<dyn QueueStore>,
        fetcher: Arc<dyn Fetcher>,
        extractor: ArchiveExtractor,
        storage: StorageConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            storage,
        }
    }

    /// Claim up to `limit` Pending items and process them
    ///
    /// Per-item failures end up as Failed statuses and counters. The run is
    /// aborted only when the store cannot hand out work or an archive tries
    /// to escape its scratch directory.
    pub async fn run(&self, limit: usize) -> Result<DownloadStats> {
        let items = self.store.claim_pending_downloads(limit).await?;
        info!(limit, claimed = items.len(), "download batch claimed");

        let mut stats = self.run_items(&items).await?;
        stats.requested = limit;
        Ok(stats)
    }

    /// Process the given item ids
    pub async fn run_items(&self, item_ids: &[String]) -> Result<DownloadStats> {
        let mut stats = DownloadStats {
            requested: item_ids.len(),
            ..DownloadStats::default()
        };

        for raw in item_ids {
            stats.attempted += 1;
            let status = match self.process_item(raw).await {
                Ok(status) => status,
                Err(e) => {
                    error!(item_id = %raw, error = %e, "aborting download batch");
                    self.record_status(raw, DownloadStatus::Failed).await;
                    return Err(e);
                }
            };

            if !self.record_status(raw, status).await {
                stats.unrecorded += 1;
            }
            match status {
                DownloadStatus::Completed => stats.completed += 1,
                _ => stats.failed += 1,
            }
        }

        info!(
            requested = stats.requested,
            attempted = stats.attempted,
            completed = stats.completed,
            failed = stats.failed,
            unrecorded = stats.unrecorded,
            "download batch finished"
        );
        if stats.unrecorded > 0 {
            warn!(
                unrecorded = stats.unrecorded,
                "some statuses were not stored; queue and counters disagree"
            );
        }
        Ok(stats)
    }

    /// Acquire one item
    ///
    /// Returns the status to record. An `Err` is only returned for fatal
    /// conditions.
    async fn process_item(&self, raw: &str) -> Result<DownloadStatus> {
        let item = match ItemId::parse(raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(item_id = %raw, error = %e, "unparsable item id");
                return Ok(DownloadStatus::Failed);
            }
        };

        if let Some(path) = existing_artifact(&self.storage, &item).await {
            info!(item_id = %item, path = ?path, "artifact already present, skipping fetch");
            return Ok(DownloadStatus::Completed);
        }

        for (attempt, (strategy, target)) in strategy::plan(&item).into_iter().enumerate() {
            match self.attempt(strategy, &target).await {
                Ok(path) => {
                    if strategy.version == TargetVersion::Previous {
                        record_fallback(&self.storage, &item, &target).await;
                    }
                    info!(
                        item_id = %item,
                        %strategy,
                        target = %target,
                        attempt = attempt + 1,
                        path = ?path,
                        "item acquired"
                    );
                    return Ok(DownloadStatus::Completed);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        item_id = %item,
                        %strategy,
                        target = %target,
                        attempt = attempt + 1,
                        error = %e,
                        "strategy failed"
                    );
                }
            }
        }

        warn!(item_id = %item, "all strategies failed");
        Ok(DownloadStatus::Failed)
    }

    async fn attempt(&self, strategy: Strategy, target: &ItemId) -> Result<PathBuf> {
        match strategy.artifact {
            Artifact::Rendered => self.fetcher.fetch_rendered(target).await,
            Artifact::Source => {
                let archive = self.fetcher.fetch_source(target).await?;
                match self
                    .extractor
                    .extract_primary_document(&archive, target.as_str())
                    .await
                {
                    Ok(Some(document)) => Ok(document),
                    Ok(None) => {
                        warn!(
                            item_id = %target,
                            archive = ?archive,
                            "source fetched but no primary document found"
                        );
                        Ok(archive)
                    }
                    Err(e @ Error::Extraction(ExtractionError::UnsafeEntry { .. })) => {
                        discard_archive(&archive).await;
                        Err(e)
                    }
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        warn!(
                            item_id = %target,
                            archive = ?archive,
                            error = %e,
                            "source fetched but could not be unpacked"
                        );
                        Ok(archive)
                    }
                }
            }
        }
    }

    /// Store the final status of an item; `false` when the store refused it
    async fn record_status(&self, item_id: &str, status: DownloadStatus) -> bool {
        match self.store.set_download_status(item_id, status).await {
            Ok(()) => true,
            Err(e) => {
                error!(item_id, %status, error = %e, "failed to record download status");
                false
            }
        }
    }
}

/// Remove an archive rejected by the entry checks
async fn discard_archive(archive: &Path) {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => warn!(archive = ?archive, "rejected source archive deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(archive = ?archive, error = %e, "failed to delete rejected source archive"),
    }
}
