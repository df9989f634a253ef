use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    extractor: ArchiveExtractor,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let extractor = ArchiveExtractor::new(root.join("tmp"), root.join("tex"), "tex");
        Self {
            _dir: dir,
            root,
            extractor,
        }
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn scratch_root(&self) -> PathBuf {
        self.root.join("tmp")
    }
}

/// Append a regular file using a raw header name, bypassing the builder's path checks
fn append_raw<W: Write>(builder: &mut tar::Builder<W>, name: &str, content: &[u8]) {
    let mut header = tar::Header::new_gnu();
    let bytes = name.as_bytes();
    header.as_gnu_mut().unwrap().name[..bytes.len()].copy_from_slice(bytes);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, content).unwrap();
}

fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        append_raw(&mut builder, name, content);
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn write_targz(path: &Path, files: &[(&str, &[u8])]) {
    std::fs::write(path, gzip(&tar_bytes(files))).unwrap();
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

fn is_unsafe_entry(result: &crate::Result<Option<PathBuf>>) -> bool {
    matches!(
        result,
        Err(Error::Extraction(ExtractionError::UnsafeEntry { .. }))
    )
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

#[test]
fn resolve_keeps_plain_relative_paths() {
    assert_eq!(
        resolve_entry_path(Path::new("paper/sections/intro.tex")),
        Some(PathBuf::from("paper/sections/intro.tex"))
    );
    assert_eq!(
        resolve_entry_path(Path::new("./a/./b.tex")),
        Some(PathBuf::from("a/b.tex"))
    );
}

#[test]
fn resolve_allows_parent_dirs_that_stay_inside() {
    assert_eq!(
        resolve_entry_path(Path::new("a/b/../c.tex")),
        Some(PathBuf::from("a/c.tex"))
    );
}

#[test]
fn resolve_rejects_escapes_at_any_depth() {
    for depth in 1..8 {
        let escape = "../".repeat(depth) + "etc/passwd";
        assert_eq!(resolve_entry_path(Path::new(&escape)), None, "{escape}");

        // Descend first, then climb one level too far
        let nested = "d/".repeat(depth) + &"../".repeat(depth + 1) + "x.tex";
        assert_eq!(resolve_entry_path(Path::new(&nested)), None, "{nested}");
    }
}

#[test]
fn resolve_rejects_absolute_paths() {
    assert_eq!(resolve_entry_path(Path::new("/etc/passwd")), None);
}

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

#[test]
fn detects_formats_from_magic_bytes() {
    let f = Fixture::new();

    let targz = f.archive_path("a.bin");
    write_targz(&targz, &[("main.tex", b"x")]);
    assert_eq!(
        detect_archive_format(&targz).unwrap(),
        Some(ArchiveFormat::TarGz)
    );

    let tar = f.archive_path("b.bin");
    std::fs::write(&tar, tar_bytes(&[("main.tex", b"x")])).unwrap();
    assert_eq!(detect_archive_format(&tar).unwrap(), Some(ArchiveFormat::Tar));

    let zip = f.archive_path("c.bin");
    write_zip(&zip, &[("main.tex", b"x")]);
    assert_eq!(detect_archive_format(&zip).unwrap(), Some(ArchiveFormat::Zip));

    let gz = f.archive_path("d.bin");
    std::fs::write(&gz, gzip(b"\\documentclass{article}")).unwrap();
    assert_eq!(detect_archive_format(&gz).unwrap(), Some(ArchiveFormat::Gzip));

    let pdf = f.archive_path("e.bin");
    std::fs::write(&pdf, b"%PDF-1.5 not an archive").unwrap();
    assert_eq!(detect_archive_format(&pdf).unwrap(), None);
}

// ---------------------------------------------------------------------------
// Primary document extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn largest_primary_document_is_selected() {
    let f = Fixture::new();
    let archive = f.archive_path("P-v1.tar.gz");
    let main = vec![b'm'; 5000];
    let appendix = vec![b'a'; 500];
    write_targz(
        &archive,
        &[
            ("appendix.tex", &appendix),
            ("main.tex", &main),
            ("figure.png", &[0u8; 9000]),
        ],
    );

    let dest = f
        .extractor
        .extract_primary_document(&archive, "P-v1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(dest, f.root.join("tex").join("P-v1.tex"));
    assert_eq!(std::fs::read(&dest).unwrap(), main);
    assert!(archive.exists(), "archive must be retained");
    assert!(
        !f.scratch_root().join("P-v1").exists(),
        "scratch directory must be removed"
    );
}

#[tokio::test]
async fn nested_directories_are_searched() {
    let f = Fixture::new();
    let archive = f.archive_path("n.zip");
    let body = vec![b'x'; 300];
    write_zip(
        &archive,
        &[("src/", b""), ("src/paper.TEX", &body), ("README", b"read me")],
    );

    let dest = f
        .extractor
        .extract_primary_document(&archive, "N-v2")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(std::fs::read(dest).unwrap(), body);
}

#[tokio::test]
async fn single_gzipped_file_becomes_primary_document() {
    let f = Fixture::new();
    let archive = f.archive_path("g");
    std::fs::write(&archive, gzip(b"\\documentclass{article}\\begin{document}")).unwrap();

    let dest = f
        .extractor
        .extract_primary_document(&archive, "hep-th/9901001v2")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(dest, f.root.join("tex").join("hep-th_9901001v2.tex"));
    assert!(
        std::fs::read_to_string(dest)
            .unwrap()
            .starts_with("\\documentclass")
    );
}

#[tokio::test]
async fn archive_without_primary_type_returns_none() {
    let f = Fixture::new();
    let archive = f.archive_path("x.tar.gz");
    write_targz(&archive, &[("paper.pdf", b"%PDF"), ("data.csv", b"1,2")]);

    let result = f
        .extractor
        .extract_primary_document(&archive, "X-v1")
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(!f.root.join("tex").join("X-v1.tex").exists());
    assert!(!f.scratch_root().join("X-v1").exists());
}

#[tokio::test]
async fn unknown_format_is_reported() {
    let f = Fixture::new();
    let archive = f.archive_path("fake");
    std::fs::write(&archive, b"%PDF-1.4 this is a rendered document").unwrap();

    let result = f.extractor.extract_primary_document(&archive, "U-v1").await;
    assert!(matches!(
        result,
        Err(Error::Extraction(ExtractionError::UnknownFormat { .. }))
    ));
}

#[tokio::test]
async fn truncated_tarball_fails_and_cleans_up() {
    let f = Fixture::new();
    let archive = f.archive_path("t.tar.gz");
    let full = gzip(&tar_bytes(&[("main.tex", &[b'x'; 4096])]));
    std::fs::write(&archive, &full[..full.len() / 2]).unwrap();

    let result = f.extractor.extract_primary_document(&archive, "T-v1").await;
    assert!(matches!(
        result,
        Err(Error::Extraction(ExtractionError::Failed { .. }))
    ));
    assert!(!f.scratch_root().join("T-v1").exists());
}

// ---------------------------------------------------------------------------
// Unsafe entries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn traversal_entry_aborts_before_anything_is_written() {
    let f = Fixture::new();
    let archive = f.archive_path("evil.tar.gz");
    // The safe entry comes first; it must not be written either
    write_targz(
        &archive,
        &[
            ("main.tex", b"\\documentclass{article}"),
            ("../../escaped.tex", b"pwned"),
        ],
    );

    let result = f.extractor.extract_primary_document(&archive, "E-v1").await;

    assert!(is_unsafe_entry(&result), "got {result:?}");
    assert!(!f.root.join("escaped.tex").exists());
    assert!(!f.scratch_root().join("escaped.tex").exists());
    assert!(!f.root.join("tex").join("E-v1.tex").exists());
    assert!(!f.scratch_root().join("E-v1").join("main.tex").exists());
}

#[tokio::test]
async fn deeply_nested_traversal_is_rejected() {
    let f = Fixture::new();
    let archive = f.archive_path("deep.tar");
    let name = "a/b/c/".to_string() + &"../".repeat(6) + "etc/passwd";
    std::fs::write(&archive, tar_bytes(&[(&name, b"root:x:0:0")])).unwrap();

    let result = f.extractor.extract_primary_document(&archive, "D-v1").await;
    assert!(is_unsafe_entry(&result), "got {result:?}");
}

#[tokio::test]
async fn absolute_entry_is_rejected() {
    let f = Fixture::new();
    let archive = f.archive_path("abs.tar.gz");
    write_targz(&archive, &[("/tmp/absolute.tex", b"x")]);

    let result = f.extractor.extract_primary_document(&archive, "A-v1").await;
    assert!(is_unsafe_entry(&result), "got {result:?}");
}

#[tokio::test]
async fn zip_traversal_entry_is_rejected() {
    let f = Fixture::new();
    let archive = f.archive_path("evil.zip");
    write_zip(
        &archive,
        &[("main.tex", b"ok"), ("../../zip-escaped.tex", b"pwned")],
    );

    let result = f.extractor.extract_primary_document(&archive, "Z-v1").await;
    assert!(is_unsafe_entry(&result), "got {result:?}");
    assert!(!f.root.join("zip-escaped.tex").exists());
    assert!(!f.scratch_root().join("Z-v1").exists());
}

#[tokio::test]
async fn symlink_entries_are_skipped() {
    let f = Fixture::new();
    let archive = f.archive_path("link.tar");

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_path("link.tex").unwrap();
    header.set_link_name("/etc/passwd").unwrap();
    header.set_cksum();
    builder.append(&header, std::io::empty()).unwrap();
    append_raw(&mut builder, "real.tex", b"real document");
    std::fs::write(&archive, builder.into_inner().unwrap()).unwrap();

    let dest = f
        .extractor
        .extract_primary_document(&archive, "L-v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), b"real document");
}

// ---------------------------------------------------------------------------
// Known limitation: size heuristic
// ---------------------------------------------------------------------------

/// The primary document is chosen by size alone. A bundle holding a short
/// root document and a long standalone supplement yields the supplement.
#[tokio::test]
async fn size_heuristic_prefers_larger_supplement_over_root_document() {
    let f = Fixture::new();
    let archive = f.archive_path("multi.tar.gz");
    let root = b"\\documentclass{article}\\input{body}".to_vec();
    let supplement = vec![b's'; 8000];
    write_targz(
        &archive,
        &[("paper.tex", &root), ("supplementary.tex", &supplement)],
    );

    let dest = f
        .extractor
        .extract_primary_document(&archive, "M-v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), supplement);
}
