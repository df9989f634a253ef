//! Top-level handle wiring the store, fetcher, extractor and backend

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{Database, QueueStore, TableCounts};
use crate::downloader::DownloadOrchestrator;
use crate::error::Result;
use crate::extraction::ArchiveExtractor;
use crate::fetch::{ArxivFetcher, Fetcher};
use crate::labeling::LabelingPipeline;
use crate::llm::{ChatBackend, Classifier, build_backend};
use crate::types::{DownloadStats, LabelId, LabelingStats, QueueStats, QuestionId};

/// Acquisition and labeling engine
///
/// Both entry points are independent batch runs over the same database.
/// Do not run two download batches against one database at the same time:
/// claiming does not mark items in flight.
pub struct Metastudy {
    config: Arc<Config>,
    db: Arc<Database>,
    fetcher: Arc<dyn Fetcher>,
    backend: Arc<dyn ChatBackend>,
}

impl Metastudy {
    /// Open the database and construct the fetcher and backend from `config`
    ///
    /// Fails when the configuration is invalid or the backend cannot be
    /// constructed.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(ArxivFetcher::new(&config.download, &config.storage)?);
        let backend = build_backend(&config.llm)?;
        Self::with_components(config, fetcher, backend).await
    }

    /// Like [`new`](Self::new) with caller-provided fetcher and backend
    pub async fn with_components(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        tracing::info!(
            database = ?config.persistence.database_path,
            provider = backend.provider(),
            "metastudy ready"
        );
        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            fetcher,
            backend,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Underlying database, for catalog seeding and inspection
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn store(&self) -> Arc<dyn QueueStore> {
        self.db.clone()
    }

    /// Build a download orchestrator over this handle's components
    pub fn download_orchestrator(&self) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            self.store(),
            self.fetcher.clone(),
            ArchiveExtractor::from_config(&self.config.storage),
            self.config.storage.clone(),
        )
    }

    /// Build a labeling pipeline with the configured concurrency
    pub fn labeling_pipeline(&self) -> LabelingPipeline {
        LabelingPipeline::new(
            self.store(),
            Classifier::new(self.backend.clone()),
            self.config.labeling.concurrency,
        )
    }

    /// Process up to `limit` Pending download items (default `download.max_items`)
    pub async fn run_downloads(&self, limit: Option<usize>) -> Result<DownloadStats> {
        let limit = limit.unwrap_or(self.config.download.max_items);
        self.download_orchestrator().run(limit).await
    }

    /// Process up to `max_jobs` labeling jobs (default `labeling.max_jobs`)
    pub async fn run_labeling(&self, max_jobs: Option<usize>) -> Result<LabelingStats> {
        self.run_labeling_until(max_jobs, CancellationToken::new())
            .await
    }

    /// Like [`run_labeling`](Self::run_labeling), stopping when `cancel` fires
    pub async fn run_labeling_until(
        &self,
        max_jobs: Option<usize>,
        cancel: CancellationToken,
    ) -> Result<LabelingStats> {
        let max_jobs = max_jobs.unwrap_or(self.config.labeling.max_jobs);
        self.labeling_pipeline().run_until(max_jobs, cancel).await
    }

    /// Queue labeling jobs for `question_id`; see [`Database::prepare_labeling`]
    pub async fn prepare_labeling(
        &self,
        question_id: QuestionId,
        date_after: Option<&str>,
        categories: &[String],
    ) -> Result<usize> {
        self.db
            .prepare_labeling(question_id, date_after, categories)
            .await
    }

    /// Queue downloads for items carrying `label_id`; see [`Database::prepare_downloads`]
    pub async fn prepare_downloads(&self, label_id: LabelId) -> Result<usize> {
        self.db.prepare_downloads(label_id).await
    }

    /// Queue depths by status
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.db.download_queue_stats().await
    }

    /// Row counts per table
    pub async fn table_counts(&self) -> Result<TableCounts> {
        self.db.table_counts().await
    }

    /// Close the database pool
    pub async fn close(&self) {
        self.db.pool().close().await;
    }
}
