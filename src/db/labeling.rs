//! Labeling queue and atomic job claiming.

use crate::error::DatabaseError;
use crate::types::{LabelingJob, QuestionId};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Queue an (item, question) pair; returns false when it was already queued
    pub async fn enqueue_labeling_job(&self, item_id: &str, question_id: QuestionId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO labeling_queue (item_id, question_id)
            VALUES (?, ?)
            ON CONFLICT(item_id, question_id) DO NOTHING
            "#,
        )
        .bind(item_id)
        .bind(question_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Error::Database(DatabaseError::NotFound(format!(
                    "item {} or question {}",
                    item_id, question_id
                )))
            }
            e => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to enqueue labeling job: {}",
                e
            ))),
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove and return the next queued job, or `None` when the queue is empty
    ///
    /// Selection and deletion happen in one statement, so concurrent callers
    /// never receive the same pair.
    pub async fn pop_next_labeling_job(&self) -> Result<Option<LabelingJob>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"
            DELETE FROM labeling_queue
            WHERE rowid = (
                SELECT rowid FROM labeling_queue
                ORDER BY item_id, question_id
                LIMIT 1
            )
            RETURNING item_id, question_id
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to pop labeling job: {}",
                e
            )))
        })?;

        Ok(row.map(|(item_id, question_id)| LabelingJob {
            item_id,
            question_id: QuestionId(question_id),
        }))
    }

    /// Number of jobs waiting in the labeling queue
    pub async fn labeling_queue_len(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM labeling_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count labeling queue: {}",
                    e
                )))
            })
    }
}
