use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::{check_entries, extraction_failed, resolve_entry_path, write_entry};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Unpack a ZIP archive into `dest`
///
/// Raw entry names are validated before any entry is written. Symlink
/// entries (by unix mode) are skipped.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| extraction_failed(archive_path, "open", e))?;
    let mut archive = ::zip::ZipArchive::new(file)
        .map_err(|e| extraction_failed(archive_path, "read ZIP archive", e))?;

    let names: Vec<PathBuf> = archive.file_names().map(PathBuf::from).collect();
    check_entries(archive_path, names.iter().map(PathBuf::as_path))?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| extraction_failed(archive_path, "read ZIP entry", e))?;

        let name = PathBuf::from(entry.name());
        let Some(relative) = resolve_entry_path(&name) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        if entry
            .unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
        {
            debug!(?archive_path, entry = %name.display(), "skipping symlink entry");
            continue;
        }

        if entry.is_dir() {
            std::fs::create_dir_all(dest.join(&relative))
                .map_err(|e| extraction_failed(archive_path, "create directory", e))?;
        } else {
            written.push(write_entry(archive_path, dest, &relative, &mut entry)?);
        }
    }

    debug!(?archive_path, files = written.len(), "ZIP archive unpacked");
    Ok(written)
}
