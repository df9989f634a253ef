//! Row counts and queue statistics.

use crate::error::DatabaseError;
use crate::types::QueueStats;
use crate::{Error, Result};

use super::{Database, TableCounts};

impl Database {
    /// Number of rows in every table
    pub async fn table_counts(&self) -> Result<TableCounts> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM metadata),
                (SELECT COUNT(*) FROM labels),
                (SELECT COUNT(*) FROM questions),
                (SELECT COUNT(*) FROM metadata_labels),
                (SELECT COUNT(*) FROM labeling_queue),
                (SELECT COUNT(*) FROM download_queue)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count rows: {}",
                e
            )))
        })?;

        Ok(TableCounts {
            metadata: row.0,
            labels: row.1,
            questions: row.2,
            metadata_labels: row.3,
            labeling_queue: row.4,
            download_queue: row.5,
        })
    }

    /// Download queue totals per status plus labeling queue depth
    pub async fn download_queue_stats(&self) -> Result<QueueStats> {
        let (pending, completed, failed): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(status = 'PENDING'), 0),
                COALESCE(SUM(status = 'COMPLETED'), 0),
                COALESCE(SUM(status = 'FAILED'), 0)
            FROM download_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download queue stats: {}",
                e
            )))
        })?;

        Ok(QueueStats {
            downloads_pending: pending,
            downloads_completed: completed,
            downloads_failed: failed,
            labeling_queued: self.labeling_queue_len().await?,
        })
    }
}
