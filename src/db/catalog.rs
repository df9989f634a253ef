//! Item metadata, labels, questions and label associations.

use crate::error::DatabaseError;
use crate::types::{ItemText, LabelId, Question, QuestionId};
use crate::{Error, Result};

use super::{Database, LabelAssociation, LabelRow, MetadataRow, NewMetadata, QuestionRow};

impl Database {
    /// Insert item metadata, replacing the text fields of an existing row
    pub async fn upsert_metadata(&self, metadata: &NewMetadata) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO metadata (
                id, title, abstract, authors, categories, versions,
                update_date, doi, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                abstract = excluded.abstract,
                authors = excluded.authors,
                categories = excluded.categories,
                versions = excluded.versions,
                update_date = excluded.update_date,
                doi = excluded.doi,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&metadata.id)
        .bind(&metadata.title)
        .bind(&metadata.abstract_text)
        .bind(&metadata.authors)
        .bind(&metadata.categories)
        .bind(&metadata.versions)
        .bind(&metadata.update_date)
        .bind(&metadata.doi)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert metadata: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a full metadata row
    pub async fn get_metadata(&self, item_id: &str) -> Result<Option<MetadataRow>> {
        sqlx::query_as::<_, MetadataRow>(
            r#"
            SELECT id, title, abstract, authors, categories, versions,
                   update_date, doi, created_at, updated_at
            FROM metadata
            WHERE id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get metadata: {}",
                e
            )))
        })
    }

    /// Title and abstract of an item, if it exists
    pub async fn get_item_text(&self, item_id: &str) -> Result<Option<ItemText>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT title, abstract FROM metadata WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get item text: {}",
                        e
                    )))
                })?;

        Ok(row.map(|(title, abstract_text)| ItemText {
            title,
            abstract_text,
        }))
    }

    /// Look up a label by name, creating it when absent
    pub async fn get_or_create_label(&self, name: &str) -> Result<LabelId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Database(DatabaseError::ConstraintViolation(
                "label name must not be empty".to_string(),
            )));
        }

        sqlx::query("INSERT INTO labels (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert label: {}",
                    e
                )))
            })?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM labels WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get label id: {}",
                    e
                )))
            })?;

        Ok(LabelId(id))
    }

    /// List all labels ordered by id
    pub async fn list_labels(&self) -> Result<Vec<LabelRow>> {
        sqlx::query_as::<_, LabelRow>("SELECT id, name FROM labels ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list labels: {}",
                    e
                )))
            })
    }

    /// Add a question for a label; an identical (prompt, label) pair returns the existing id
    pub async fn insert_question(&self, prompt: &str, label_id: LabelId) -> Result<QuestionId> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO questions (prompt, label_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(prompt, label_id) DO NOTHING
            "#,
        )
        .bind(prompt)
        .bind(label_id.0)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Error::Database(DatabaseError::NotFound(format!("label {}", label_id)))
            }
            e => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert question: {}",
                e
            ))),
        })?;

        let id: i64 =
            sqlx::query_scalar("SELECT id FROM questions WHERE prompt = ? AND label_id = ?")
                .bind(prompt)
                .bind(label_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get question id: {}",
                        e
                    )))
                })?;

        Ok(QuestionId(id))
    }

    /// Resolve a question by id
    pub async fn get_question(&self, question_id: QuestionId) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, prompt, label_id, created_at FROM questions WHERE id = ?",
        )
        .bind(question_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get question: {}",
                e
            )))
        })?;

        Ok(row.map(Question::from))
    }

    /// List all questions ordered by id
    pub async fn list_questions(&self) -> Result<Vec<QuestionRow>> {
        sqlx::query_as::<_, QuestionRow>(
            "SELECT id, prompt, label_id, created_at FROM questions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list questions: {}",
                e
            )))
        })
    }

    /// Associate a label with an item, overwriting the confidence of an existing pair
    pub async fn upsert_label(
        &self,
        item_id: &str,
        label_id: LabelId,
        confidence: Option<f64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO metadata_labels (item_id, label_id, confidence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(item_id, label_id) DO UPDATE SET
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item_id)
        .bind(label_id.0)
        .bind(confidence)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert label association: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the association between an item and a label, if any
    pub async fn get_label_association(
        &self,
        item_id: &str,
        label_id: LabelId,
    ) -> Result<Option<LabelAssociation>> {
        sqlx::query_as::<_, LabelAssociation>(
            r#"
            SELECT item_id, label_id, confidence, created_at, updated_at
            FROM metadata_labels
            WHERE item_id = ? AND label_id = ?
            "#,
        )
        .bind(item_id)
        .bind(label_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get label association: {}",
                e
            )))
        })
    }
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: QuestionId(row.id),
            prompt: row.prompt,
            label_id: LabelId(row.label_id),
        }
    }
}
