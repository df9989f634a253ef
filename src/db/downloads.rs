//! Download queue operations.

use crate::error::DatabaseError;
use crate::types::DownloadStatus;
use crate::{Error, Result};

use super::{Database, DownloadJobRow};

impl Database {
    /// Add an item to the download queue as Pending
    ///
    /// Returns false when the item was already queued (in any status).
    pub async fn enqueue_download(&self, item_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO download_queue (item_id, status, created_at, updated_at)
            VALUES (?, 'PENDING', ?, ?)
            ON CONFLICT(item_id) DO NOTHING
            "#,
        )
        .bind(item_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to enqueue download: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Up to `limit` Pending items, oldest first
    ///
    /// Rows are not marked in-flight; overlapping batches against the same
    /// store may see the same items.
    pub async fn claim_pending_downloads(&self, limit: usize) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        sqlx::query_scalar(
            r#"
            SELECT item_id
            FROM download_queue
            WHERE status = 'PENDING'
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim pending downloads: {}",
                e
            )))
        })
    }

    /// Set the status of a queued item and touch its timestamp
    ///
    /// Setting the same status twice is a no-op apart from the timestamp.
    /// Unknown items are ignored.
    pub async fn set_download_status(&self, item_id: &str, status: DownloadStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE download_queue SET status = ?, updated_at = ? WHERE item_id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set download status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Get a download queue row
    pub async fn get_download_job(&self, item_id: &str) -> Result<Option<DownloadJobRow>> {
        sqlx::query_as::<_, DownloadJobRow>(
            "SELECT item_id, status, created_at, updated_at FROM download_queue WHERE item_id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download job: {}",
                e
            )))
        })
    }

    /// Put Failed items back to Pending so the next run retries them
    pub async fn requeue_failed_downloads(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE download_queue SET status = 'PENDING', updated_at = ? WHERE status = 'FAILED'",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to requeue failed downloads: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
