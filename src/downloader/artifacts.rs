use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::StorageConfig;
use crate::types::ItemId;

/// Paths that count as an acquired artifact of exactly `item`
///
/// The canonical document, the rendered PDF and the retained source archive.
/// A retained archive always passed the entry checks; rejected ones are
/// deleted.
pub fn candidate_paths(storage: &StorageConfig, item: &ItemId) -> Vec<PathBuf> {
    vec![
        storage.document_path(item.as_str()),
        storage.rendered_path(item.as_str()),
        storage.source_archive_path(item.as_str()),
    ]
}

/// First existing artifact for `item`, if any
///
/// Artifacts of the previous version only count when an earlier fallback
/// for `item` recorded that version in its marker.
pub async fn existing_artifact(storage: &StorageConfig, item: &ItemId) -> Option<PathBuf> {
    if let Some(path) = first_existing(candidate_paths(storage, item)).await {
        return Some(path);
    }
    let fallback = recorded_fallback(storage, item).await?;
    first_existing(candidate_paths(storage, &fallback)).await
}

/// Remember that `item` was acquired through `fallback`
pub async fn record_fallback(storage: &StorageConfig, item: &ItemId, fallback: &ItemId) {
    let marker = storage.fallback_marker_path(item.as_str());
    if let Err(e) = write_marker(&marker, fallback).await {
        warn!(item_id = %item, marker = ?marker, error = %e, "failed to record fallback");
    }
}

async fn write_marker(marker: &Path, fallback: &ItemId) -> std::io::Result<()> {
    if let Some(parent) = marker.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(marker, fallback.as_str()).await
}

async fn recorded_fallback(storage: &StorageConfig, item: &ItemId) -> Option<ItemId> {
    let marker = storage.fallback_marker_path(item.as_str());
    let recorded = tokio::fs::read_to_string(&marker).await.ok()?;
    match ItemId::parse(recorded.trim()) {
        Ok(fallback) if Some(&fallback) == item.previous().as_ref() => Some(fallback),
        _ => {
            warn!(item_id = %item, marker = ?marker, "ignoring unexpected fallback marker");
            None
        }
    }
}

async fn first_existing(paths: Vec<PathBuf>) -> Option<PathBuf> {
    for path in paths {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some(path);
        }
    }
    None
}
