use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::shared::{
    check_entries, extraction_failed, resolve_entry_path, unsafe_entry, write_entry,
};

fn open_stream(archive_path: &Path, gzipped: bool) -> Result<Box<dyn Read>> {
    let file = File::open(archive_path).map_err(|e| extraction_failed(archive_path, "open", e))?;
    Ok(if gzipped {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

/// Unpack a (optionally gzipped) tarball into `dest`
///
/// Entry names are validated in a first pass over the whole archive; nothing
/// is written unless every name stays inside `dest`. Symlinks and hard links
/// are skipped.
pub fn extract_tar(archive_path: &Path, dest: &Path, gzipped: bool) -> Result<Vec<PathBuf>> {
    let names: Vec<PathBuf> = {
        let mut archive = tar::Archive::new(open_stream(archive_path, gzipped)?);
        let entries = archive
            .entries()
            .map_err(|e| extraction_failed(archive_path, "read entries", e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| extraction_failed(archive_path, "read entry", e))?;
            let name = entry
                .path()
                .map_err(|e| extraction_failed(archive_path, "read entry name", e))?;
            names.push(name.into_owned());
        }
        names
    };
    check_entries(archive_path, names.iter().map(PathBuf::as_path))?;

    let mut archive = tar::Archive::new(open_stream(archive_path, gzipped)?);
    let entries = archive
        .entries()
        .map_err(|e| extraction_failed(archive_path, "read entries", e))?;

    let mut written = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction_failed(archive_path, "read entry", e))?;
        let name = entry
            .path()
            .map_err(|e| extraction_failed(archive_path, "read entry name", e))?
            .into_owned();
        let Some(relative) = resolve_entry_path(&name) else {
            return Err(unsafe_entry(archive_path, &name));
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(dest.join(&relative))
                .map_err(|e| extraction_failed(archive_path, "create directory", e))?;
        } else if entry_type.is_file() {
            written.push(write_entry(archive_path, dest, &relative, &mut entry)?);
        } else {
            debug!(?archive_path, entry = %name.display(), ?entry_type, "skipping non-regular entry");
        }
    }

    debug!(?archive_path, files = written.len(), "tarball unpacked");
    Ok(written)
}

/// Decompress a single gzipped file to `dest/<file_name>`
pub fn extract_gzip(archive_path: &Path, dest: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    let mut stream = open_stream(archive_path, true)?;
    let path = write_entry(archive_path, dest, Path::new(file_name), &mut stream)?;
    Ok(vec![path])
}
