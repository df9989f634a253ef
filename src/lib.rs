//! # metastudy
//!
//! Queue-driven acquisition and labeling engine for a corpus of versioned
//! documents.
//!
//! ## Design Philosophy
//!
//! metastudy is designed to be:
//! - **Queue-driven** - Work lives in SQLite queues; every run claims from them
//! - **Failure-local** - One bad item or job never aborts a batch
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Pluggable** - Fetching, storage and classification sit behind traits
//!
//! Two batch runs share one database:
//! - [`DownloadOrchestrator`] tries source archive, rendered PDF, then both
//!   for the previous version, until one succeeds
//! - [`LabelingPipeline`] pops labeling jobs, classifies them with bounded
//!   concurrency and stores affirmative verdicts
//!
//! ## Quick Start
//!
//! ```no_run
//! use metastudy::{Config, Metastudy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metastudy = Metastudy::new(Config::default()).await?;
//!
//!     let downloads = metastudy.run_downloads(Some(20)).await?;
//!     println!("{} of {} items acquired", downloads.completed, downloads.attempted);
//!
//!     let labeling = metastudy.run_labeling(None).await?;
//!     println!("{} labels applied", labeling.labeled);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download orchestration with ordered fallback strategies
pub mod downloader;
/// Top-level handle
pub mod engine;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Remote artifact fetching
pub mod fetch;
/// Labeling pipeline
pub mod labeling;
/// Classification backends and the classifier
pub mod llm;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, QueueStore};
pub use downloader::DownloadOrchestrator;
pub use error::{BackendError, DatabaseError, Error, ExtractionError, FetchError, Result};
pub use extraction::ArchiveExtractor;
pub use fetch::{ArxivFetcher, Fetcher};
pub use labeling::LabelingPipeline;
pub use engine::Metastudy;
pub use llm::{ChatBackend, ChatMessage, Classifier, build_backend};
pub use types::{
    DownloadStats, DownloadStatus, ItemId, ItemText, LabelId, LabelingJob, LabelingStats,
    Question, QuestionId, QueueStats, Verdict,
};

use tokio_util::sync::CancellationToken;

/// Run a labeling batch that stops on a termination signal
///
/// Jobs already popped but not committed when the signal arrives are lost
/// and must be re-enqueued.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use metastudy::{Config, Metastudy, run_labeling_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let metastudy = Metastudy::new(Config::default()).await?;
///     let stats = run_labeling_with_shutdown(&metastudy, None).await?;
///     println!("{stats:?}");
///     Ok(())
/// }
/// ```
pub async fn run_labeling_with_shutdown(
    metastudy: &Metastudy,
    max_jobs: Option<usize>,
) -> Result<LabelingStats> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    let result = metastudy.run_labeling_until(max_jobs, cancel).await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
