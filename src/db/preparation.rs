//! Filling the work queues from the catalog.

use std::collections::BTreeSet;

use crate::error::DatabaseError;
use crate::types::{LabelId, QuestionId};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Queue a labeling job for every catalog item matching the filters
    ///
    /// `date_after` (`YYYY-MM-DD`, exclusive) limits items by update date.
    /// `categories` keeps items carrying at least one of the given category
    /// codes; an empty slice disables the filter. Pairs that are already
    /// queued are left alone.
    ///
    /// Returns the number of matching items.
    pub async fn prepare_labeling(
        &self,
        question_id: QuestionId,
        date_after: Option<&str>,
        categories: &[String],
    ) -> Result<usize> {
        if self.get_question(question_id).await?.is_none() {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "question {}",
                question_id
            ))));
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, categories
            FROM metadata
            WHERE (?1 IS NULL OR update_date > ?1)
            ORDER BY id
            "#,
        )
        .bind(date_after)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to select metadata for labeling: {}",
                e
            )))
        })?;

        let item_ids: Vec<String> = rows
            .into_iter()
            .filter(|(_, item_categories)| has_any_category(item_categories, categories))
            .map(|(id, _)| id)
            .collect();

        if item_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for item_id in &item_ids {
            sqlx::query(
                r#"
                INSERT INTO labeling_queue (item_id, question_id)
                VALUES (?, ?)
                ON CONFLICT(item_id, question_id) DO NOTHING
                "#,
            )
            .bind(item_id)
            .bind(question_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to enqueue labeling job: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit labeling preparation: {}",
                e
            )))
        })?;

        tracing::info!(
            question_id = question_id.0,
            items = item_ids.len(),
            "labeling queue prepared"
        );
        Ok(item_ids.len())
    }

    /// Queue the latest version of every item carrying `label_id` for download
    ///
    /// The latest version comes from the item's versions JSON, defaulting to 1.
    /// Already queued ids are left alone. Returns the number of unique ids.
    pub async fn prepare_downloads(&self, label_id: LabelId) -> Result<usize> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT ml.item_id, m.versions
            FROM metadata_labels ml
            JOIN metadata m ON m.id = ml.item_id
            WHERE ml.label_id = ?
            "#,
        )
        .bind(label_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to select labeled items: {}",
                e
            )))
        })?;

        let item_ids: BTreeSet<String> = rows
            .iter()
            .map(|(id, versions)| format!("{}v{}", id, latest_version(versions)))
            .collect();

        if item_ids.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for item_id in &item_ids {
            sqlx::query(
                r#"
                INSERT INTO download_queue (item_id, status, created_at, updated_at)
                VALUES (?, 'PENDING', ?, ?)
                ON CONFLICT(item_id) DO NOTHING
                "#,
            )
            .bind(item_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to enqueue download: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit download preparation: {}",
                e
            )))
        })?;

        tracing::info!(
            label_id = label_id.0,
            items = item_ids.len(),
            "download queue prepared"
        );
        Ok(item_ids.len())
    }
}

fn has_any_category(item_categories: &str, wanted: &[String]) -> bool {
    wanted.is_empty()
        || item_categories
            .split_whitespace()
            .any(|c| wanted.iter().any(|w| w == c))
}

/// Highest version number in a versions JSON array, 1 when absent or unreadable
pub(crate) fn latest_version(versions_json: &str) -> u32 {
    let Ok(serde_json::Value::Array(entries)) = serde_json::from_str(versions_json) else {
        return 1;
    };

    entries
        .iter()
        .filter_map(|entry| match entry.get("version")? {
            serde_json::Value::String(s) => {
                let digits = s.trim().trim_start_matches(['v', 'V']);
                digits.parse::<u32>().ok()
            }
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            _ => None,
        })
        .fold(1, u32::max)
}
