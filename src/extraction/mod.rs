//! Source archive extraction
//!
//! Fetched source bundles come as gzipped tarballs, plain tarballs, ZIP files
//! or a single gzipped document. [`ArchiveExtractor`] unpacks one into a
//! per-item scratch directory, picks the primary document and copies it to a
//! canonical location named after the item.
//!
//! Every entry name is checked before anything is written; an entry that
//! would land outside the scratch directory aborts the extraction with
//! [`ExtractionError::UnsafeEntry`](crate::error::ExtractionError::UnsafeEntry).

mod shared;
mod tarball;
mod zip;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use shared::{ArchiveFormat, detect_archive_format, resolve_entry_path};

use crate::config::StorageConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::artifact_stem;
use shared::{ScratchDir, extraction_failed, find_largest_with_extension};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

/// Unpacks source archives and locates their primary document
#[derive(Clone, Debug)]
pub struct ArchiveExtractor {
    scratch_root: PathBuf,
    output_dir: PathBuf,
    primary_extension: String,
}

impl ArchiveExtractor {
    /// Create an extractor
    ///
    /// `primary_extension` is given without a leading dot (e.g. `"tex"`).
    pub fn new(
        scratch_root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        primary_extension: impl Into<String>,
    ) -> Self {
        let primary_extension: String = primary_extension.into();
        Self {
            scratch_root: scratch_root.into(),
            output_dir: output_dir.into(),
            primary_extension: primary_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Create an extractor from the storage settings
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(
            &storage.scratch_dir,
            &storage.document_dir,
            &storage.primary_extension,
        )
    }

    /// Canonical location of the primary document for `item_id`
    pub fn canonical_path(&self, item_id: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            artifact_stem(item_id),
            self.primary_extension
        ))
    }

    /// Unpack `archive_path` and copy its primary document to the canonical path
    ///
    /// Returns `Ok(None)` when the archive holds no file of the primary type.
    /// The scratch directory is removed whatever the outcome; the archive
    /// itself is left in place.
    pub async fn extract_primary_document(
        &self,
        archive_path: &Path,
        item_id: &str,
    ) -> Result<Option<PathBuf>> {
        let extractor = self.clone();
        let archive = archive_path.to_path_buf();
        let item = item_id.to_string();

        spawn_blocking(move || extractor.extract_blocking(&archive, &item))
            .await
            .map_err(|e| {
                Error::Extraction(ExtractionError::Failed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("extraction task panicked: {}", e),
                })
            })?
    }

    fn extract_blocking(&self, archive_path: &Path, item_id: &str) -> Result<Option<PathBuf>> {
        let stem = artifact_stem(item_id);
        let format = detect_archive_format(archive_path)?.ok_or_else(|| {
            Error::Extraction(ExtractionError::UnknownFormat {
                archive: archive_path.to_path_buf(),
            })
        })?;

        let scratch = ScratchDir::create(self.scratch_root.join(&stem))
            .map_err(|e| extraction_failed(archive_path, "create scratch directory", e))?;

        let files = match format {
            ArchiveFormat::TarGz => tarball::extract_tar(archive_path, scratch.path(), true)?,
            ArchiveFormat::Tar => tarball::extract_tar(archive_path, scratch.path(), false)?,
            ArchiveFormat::Zip => zip::extract_zip(archive_path, scratch.path())?,
            ArchiveFormat::Gzip => tarball::extract_gzip(
                archive_path,
                scratch.path(),
                &format!("{}.{}", stem, self.primary_extension),
            )?,
        };

        let Some(primary) = find_largest_with_extension(scratch.path(), &self.primary_extension)
        else {
            warn!(
                item_id,
                ?archive_path,
                ?format,
                extracted = files.len(),
                extension = %self.primary_extension,
                "no primary document in archive"
            );
            return Ok(None);
        };

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| extraction_failed(archive_path, "create output directory", e))?;
        let dest = self.canonical_path(item_id);
        std::fs::copy(&primary, &dest)
            .map_err(|e| extraction_failed(archive_path, "copy primary document", e))?;

        info!(
            item_id,
            ?archive_path,
            ?format,
            extracted = files.len(),
            primary = ?primary.strip_prefix(scratch.path()).unwrap_or(&primary),
            dest = ?dest,
            "primary document extracted"
        );
        Ok(Some(dest))
    }
}
