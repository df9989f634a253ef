//! Database layer for metastudy
//!
//! Handles SQLite persistence for the item catalog, labels, questions and the
//! two work queues.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`catalog`] - Item metadata, labels, questions and label associations
//! - [`downloads`] - Download queue
//! - [`labeling`] - Labeling queue and atomic job claiming
//! - [`preparation`] - Filling the queues from the catalog
//! - [`reporting`] - Row counts and queue statistics
//!
//! The [`QueueStore`] trait is the narrow seam the download orchestrator and
//! labeling pipeline depend on; [`Database`] implements it.

use sqlx::{FromRow, sqlite::SqlitePool};

mod catalog;
mod downloads;
mod labeling;
mod migrations;
mod preparation;
mod reporting;
mod store;

pub use store::QueueStore;

/// Item metadata to insert or update in the catalog
#[derive(Debug, Clone, Default)]
pub struct NewMetadata {
    /// Unversioned item identifier (e.g. "2401.01234")
    pub id: String,
    /// Title used as classification input
    pub title: String,
    /// Abstract used as classification input
    pub abstract_text: String,
    /// Author list as published
    pub authors: String,
    /// Space-separated category codes (e.g. "cs.AI cs.SE")
    pub categories: String,
    /// JSON array of `{"version": "v1", ...}` objects
    pub versions: String,
    /// Last update date, `YYYY-MM-DD`
    pub update_date: String,
    /// DOI, when known
    pub doi: Option<String>,
}

/// Item metadata record from database
#[derive(Debug, Clone, FromRow)]
pub struct MetadataRow {
    /// Unversioned item identifier
    pub id: String,
    /// Title
    pub title: String,
    /// Abstract
    #[sqlx(rename = "abstract")]
    pub abstract_text: String,
    /// Author list
    pub authors: String,
    /// Space-separated category codes
    pub categories: String,
    /// JSON array of version objects
    pub versions: String,
    /// Last update date, `YYYY-MM-DD`
    pub update_date: String,
    /// DOI
    pub doi: Option<String>,
    /// Unix timestamp when the row was inserted
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Label record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LabelRow {
    /// Unique database ID
    pub id: i64,
    /// Unique label name
    pub name: String,
}

/// Question record from database
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    /// Unique database ID
    pub id: i64,
    /// Natural-language prompt
    pub prompt: String,
    /// Label applied on an affirmative answer
    pub label_id: i64,
    /// Unix timestamp when the question was created
    pub created_at: i64,
}

/// Persisted association between an item and a label
#[derive(Debug, Clone, FromRow)]
pub struct LabelAssociation {
    /// Unversioned item identifier
    pub item_id: String,
    /// Label id
    pub label_id: i64,
    /// Confidence reported by the classifier, if any
    pub confidence: Option<f64>,
    /// Unix timestamp of the first association
    pub created_at: i64,
    /// Unix timestamp of the last upsert
    pub updated_at: i64,
}

/// Download queue record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadJobRow {
    /// Versioned item identifier
    pub item_id: String,
    /// Status text (PENDING, COMPLETED or FAILED)
    pub status: String,
    /// Unix timestamp when the item was enqueued
    pub created_at: i64,
    /// Unix timestamp of the last status change
    pub updated_at: i64,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TableCounts {
    /// Rows in `metadata`
    pub metadata: i64,
    /// Rows in `labels`
    pub labels: i64,
    /// Rows in `questions`
    pub questions: i64,
    /// Rows in `metadata_labels`
    pub metadata_labels: i64,
    /// Rows in `labeling_queue`
    pub labeling_queue: i64,
    /// Rows in `download_queue`
    pub download_queue: i64,
}

/// Database handle for metastudy
pub struct Database {
    pool: SqlitePool,
}

#[cfg(test)]
mod tests;
