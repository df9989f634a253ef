//! Error types for metastudy
//!
//! This module provides the error hierarchy for the library:
//! - A top-level [`Error`] used by every public operation
//! - Domain-specific errors for persistence, fetching, archive extraction
//!   and classification backends
//! - Context information (item id, archive path, offending entry, etc.)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for metastudy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for metastudy
///
/// Each variant carries enough context to tell which item, archive or
/// backend was involved.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "labeling.concurrency")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Remote artifact fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Archive extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Classification backend failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Item identifier could not be parsed
    #[error("invalid item id '{0}': expected <base>v<version>")]
    InvalidItemId(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true when this error must abort the surrounding batch instead of
    /// being recorded against a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Extraction(ExtractionError::UnsafeEntry { .. })
                | Error::Backend(BackendError::Construction { .. })
        )
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors raised while fetching remote artifacts
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Server answered with an unexpected content type
    #[error("{url} returned content type '{content_type}', expected {expected}")]
    ContentType {
        /// Requested URL
        url: String,
        /// Content type reported by the server
        content_type: String,
        /// Expected content type fragment
        expected: &'static str,
    },

    /// Downloaded body is too small to be a valid artifact
    #[error("{url} returned {size} bytes, below minimum of {min}")]
    TooSmall {
        /// Requested URL
        url: String,
        /// Number of bytes received
        size: u64,
        /// Minimum accepted size
        min: u64,
    },
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// An archive entry would be written outside the scratch directory
    #[error("archive {archive} contains unsafe entry '{entry}'")]
    UnsafeEntry {
        /// The archive being extracted
        archive: PathBuf,
        /// The raw entry name as stored in the archive
        entry: String,
    },

    /// Archive format could not be recognised
    #[error("unrecognised archive format: {archive}")]
    UnknownFormat {
        /// The archive file
        archive: PathBuf,
    },

    /// Archive could not be read
    #[error("extraction failed for {archive}: {reason}")]
    Failed {
        /// The archive file
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}

/// Classification backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be constructed (fatal for the whole run)
    #[error("failed to construct {provider} backend: {reason}")]
    Construction {
        /// Provider name (e.g., "ollama")
        provider: String,
        /// Why construction failed
        reason: String,
    },

    /// Request to the backend could not be completed
    #[error("{provider} request failed: {reason}")]
    Transport {
        /// Provider name
        provider: String,
        /// Why the request failed
        reason: String,
    },

    /// Backend answered with a non-success status
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Backend response envelope did not have the expected shape
    #[error("{provider} returned an unexpected response: {reason}")]
    MalformedResponse {
        /// Provider name
        provider: String,
        /// What was wrong with the response
        reason: String,
    },
}
