use crate::error::{Error, ExtractionError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Container format of a fetched source artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip-compressed tarball
    TarGz,
    /// Uncompressed tarball
    Tar,
    /// ZIP archive
    Zip,
    /// A single gzip-compressed file (no tar inside)
    Gzip,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: [u8; 4] = *b"PK\x05\x06";
const USTAR_OFFSET: usize = 257;

fn has_ustar_marker(block: &[u8]) -> bool {
    block.len() >= USTAR_OFFSET + 5 && &block[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar"
}

/// Read up to one tar header block from `reader`
fn read_header_block(reader: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let mut block = Vec::with_capacity(512);
    reader.take(512).read_to_end(&mut block)?;
    Ok(block)
}

/// Detect the container format from magic bytes
///
/// Returns `None` for anything that is not a tarball, zip or gzip stream
/// (e.g. a PDF served in place of a source bundle).
pub fn detect_archive_format(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut file = File::open(path).map_err(|e| extraction_failed(path, "open", e))?;
    let block = read_header_block(&mut file).map_err(|e| extraction_failed(path, "read", e))?;

    if block.starts_with(&GZIP_MAGIC) {
        let file = File::open(path).map_err(|e| extraction_failed(path, "open", e))?;
        let mut decoder = flate2::read::GzDecoder::new(file);
        // A corrupt stream is reported when it is actually unpacked
        let inner = read_header_block(&mut decoder).unwrap_or_default();
        return Ok(Some(if has_ustar_marker(&inner) {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Gzip
        }));
    }
    if block.starts_with(&ZIP_MAGIC) || block.starts_with(&ZIP_EMPTY_MAGIC) {
        return Ok(Some(ArchiveFormat::Zip));
    }
    if has_ustar_marker(&block) {
        return Ok(Some(ArchiveFormat::Tar));
    }
    Ok(None)
}

/// Resolve an archive entry name to a path relative to the scratch root
///
/// The check is purely lexical: absolute paths and drive prefixes are
/// rejected, `.` is dropped, and `..` may only climb back out of directories
/// the entry itself descended into. Returns `None` when the entry would land
/// outside the scratch root.
pub fn resolve_entry_path(entry: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in entry.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Validate every entry name before anything is written
pub fn check_entries<'a>(
    archive_path: &Path,
    names: impl IntoIterator<Item = &'a Path>,
) -> Result<()> {
    for name in names {
        if resolve_entry_path(name).is_none() {
            return Err(unsafe_entry(archive_path, name));
        }
    }
    Ok(())
}

/// Largest file under `root` whose extension matches `extension` (case-insensitive)
///
/// Ties keep the first file in name order.
pub fn find_largest_with_extension(root: &Path, extension: &str) -> Option<PathBuf> {
    let mut best: Option<(u64, PathBuf)> = None;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        debug!(path = ?entry.path(), size, "primary document candidate");
        if best.as_ref().is_none_or(|(best_size, _)| size > *best_size) {
            best = Some((size, entry.into_path()));
        }
    }

    best.map(|(_, path)| path)
}

/// Scratch directory removed on drop
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh, empty directory at `path`
    pub fn create(path: PathBuf) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = ?self.path, error = %e, "failed to remove scratch directory");
        }
    }
}

pub(crate) fn unsafe_entry(archive: &Path, entry: &Path) -> Error {
    warn!(?archive, entry = %entry.display(), "archive entry escapes extraction root");
    Error::Extraction(ExtractionError::UnsafeEntry {
        archive: archive.to_path_buf(),
        entry: entry.display().to_string(),
    })
}

pub(crate) fn extraction_failed(archive: &Path, action: &str, e: impl std::fmt::Display) -> Error {
    Error::Extraction(ExtractionError::Failed {
        archive: archive.to_path_buf(),
        reason: format!("{action}: {e}"),
    })
}

/// Write one regular file entry below `root`, creating parent directories
pub(crate) fn write_entry(
    archive: &Path,
    root: &Path,
    relative: &Path,
    contents: &mut impl Read,
) -> Result<PathBuf> {
    let dest = root.join(relative);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| extraction_failed(archive, "create directory", e))?;
    }
    let mut out = File::create(&dest).map_err(|e| extraction_failed(archive, "create file", e))?;
    std::io::copy(contents, &mut out).map_err(|e| extraction_failed(archive, "write file", e))?;
    Ok(dest)
}
