//! Queue store seam used by the orchestrator and the labeling pipeline.

use async_trait::async_trait;

use crate::Result;
use crate::types::{DownloadStatus, ItemText, LabelId, LabelingJob, Question, QuestionId};

use super::Database;

/// Persistent store of pending download and labeling work
///
/// Only [`pop_next_labeling_job`](QueueStore::pop_next_labeling_job) needs to
/// be atomic; the other operations are idempotent updates on distinct keys and
/// may be called concurrently.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Up to `n` Pending download items, oldest first, without marking them in-flight
    async fn claim_pending_downloads(&self, n: usize) -> Result<Vec<String>>;

    /// Record the outcome of a download attempt
    async fn set_download_status(&self, item_id: &str, status: DownloadStatus) -> Result<()>;

    /// Atomically remove and return one labeling job
    async fn pop_next_labeling_job(&self) -> Result<Option<LabelingJob>>;

    /// Resolve a question
    async fn get_question(&self, question_id: QuestionId) -> Result<Option<Question>>;

    /// Resolve the classification input text of an item
    async fn get_item_text(&self, item_id: &str) -> Result<Option<ItemText>>;

    /// Insert or update the (item, label) association with the latest confidence
    async fn upsert_label(
        &self,
        item_id: &str,
        label_id: LabelId,
        confidence: Option<f64>,
    ) -> Result<()>;
}

#[async_trait]
impl QueueStore for Database {
    async fn claim_pending_downloads(&self, n: usize) -> Result<Vec<String>> {
        Database::claim_pending_downloads(self, n).await
    }

    async fn set_download_status(&self, item_id: &str, status: DownloadStatus) -> Result<()> {
        Database::set_download_status(self, item_id, status).await
    }

    async fn pop_next_labeling_job(&self) -> Result<Option<LabelingJob>> {
        Database::pop_next_labeling_job(self).await
    }

    async fn get_question(&self, question_id: QuestionId) -> Result<Option<Question>> {
        Database::get_question(self, question_id).await
    }

    async fn get_item_text(&self, item_id: &str) -> Result<Option<ItemText>> {
        Database::get_item_text(self, item_id).await
    }

    async fn upsert_label(
        &self,
        item_id: &str,
        label_id: LabelId,
        confidence: Option<f64>,
    ) -> Result<()> {
        Database::upsert_label(self, item_id, label_id, confidence).await
    }
}
