use super::*;
use crate::error::{Error, ExtractionError, FetchError};
use crate::types::{ItemText, LabelId, LabelingJob, Question, QuestionId};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// In-memory download queue
#[derive(Default)]
struct MemoryStore {
    pending: Vec<String>,
    statuses: Mutex<HashMap<String, DownloadStatus>>,
    refuse_status: bool,
}

impl MemoryStore {
    fn with_pending(items: &[&str]) -> Self {
        Self {
            pending: items.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn status(&self, item_id: &str) -> Option<DownloadStatus> {
        self.statuses.lock().unwrap().get(item_id).copied()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn claim_pending_downloads(&self, n: usize) -> Result<Vec<String>> {
        Ok(self.pending.iter().take(n).cloned().collect())
    }

    async fn set_download_status(&self, item_id: &str, status: DownloadStatus) -> Result<()> {
        if self.refuse_status {
            return Err(Error::Other("disk I/O error".to_string()));
        }
        self.statuses
            .lock()
            .unwrap()
            .insert(item_id.to_string(), status);
        Ok(())
    }

    async fn pop_next_labeling_job(&self) -> Result<Option<LabelingJob>> {
        Ok(None)
    }

    async fn get_question(&self, _question_id: QuestionId) -> Result<Option<Question>> {
        Ok(None)
    }

    async fn get_item_text(&self, _item_id: &str) -> Result<Option<ItemText>> {
        Ok(None)
    }

    async fn upsert_label(
        &self,
        _item_id: &str,
        _label_id: LabelId,
        _confidence: Option<f64>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Fetcher that records every call and serves canned artifacts
struct RecordingFetcher {
    storage: StorageConfig,
    sources: HashMap<String, Vec<u8>>,
    rendered: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    fn new(storage: &StorageConfig) -> Self {
        Self {
            storage: storage.clone(),
            sources: HashMap::new(),
            rendered: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_source(mut self, item_id: &str, bytes: Vec<u8>) -> Self {
        self.sources.insert(item_id.to_string(), bytes);
        self
    }

    fn with_rendered(mut self, item_id: &str) -> Self {
        self.rendered
            .insert(item_id.to_string(), b"%PDF-1.5 rendered".to_vec());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn serve(
        &self,
        label: &str,
        item: &ItemId,
        canned: &HashMap<String, Vec<u8>>,
        dest: PathBuf,
    ) -> Result<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{label}:{}", item.as_str()));
        let Some(bytes) = canned.get(item.as_str()) else {
            return Err(Error::Fetch(FetchError::Status {
                url: format!("fake://{label}/{item}"),
                status: 404,
            }));
        };
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, bytes).unwrap();
        Ok(dest)
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch_source(&self, item: &ItemId) -> Result<PathBuf> {
        let dest = self.storage.source_archive_path(item.as_str());
        self.serve("source", item, &self.sources, dest)
    }

    async fn fetch_rendered(&self, item: &ItemId) -> Result<PathBuf> {
        let dest = self.storage.rendered_path(item.as_str());
        self.serve("rendered", item, &self.rendered, dest)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage_in(dir: &Path) -> StorageConfig {
    StorageConfig {
        source_dir: dir.join("tarball"),
        document_dir: dir.join("tex"),
        rendered_dir: dir.join("pdf"),
        scratch_dir: dir.join("tmp"),
        primary_extension: "tex".to_string(),
    }
}

fn targz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        let bytes = name.as_bytes();
        header.as_gnu_mut().unwrap().name[..bytes.len()].copy_from_slice(bytes);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    let tar = builder.into_inner().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

struct Harness {
    _dir: TempDir,
    storage: StorageConfig,
    store: Arc<MemoryStore>,
    fetcher: Arc<RecordingFetcher>,
    orchestrator: DownloadOrchestrator,
}

fn harness(
    pending: &[&str],
    configure: impl FnOnce(RecordingFetcher) -> RecordingFetcher,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    harness_in(dir, pending, configure)
}

fn harness_in(
    dir: TempDir,
    pending: &[&str],
    configure: impl FnOnce(RecordingFetcher) -> RecordingFetcher,
) -> Harness {
    let storage = storage_in(dir.path());
    let store = Arc::new(MemoryStore::with_pending(pending));
    let fetcher = Arc::new(configure(RecordingFetcher::new(&storage)));
    let orchestrator = DownloadOrchestrator::new(
        store.clone(),
        fetcher.clone(),
        ArchiveExtractor::from_config(&storage),
        storage.clone(),
    );
    Harness {
        _dir: dir,
        storage,
        store,
        fetcher,
        orchestrator,
    }
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_archive_primary_document_is_copied() {
    let main = vec![b'm'; 5000];
    let appendix = vec![b'a'; 500];
    let archive = targz(&[("main.tex", &main), ("appendix.tex", &appendix)]);
    let h = harness(&["P-v1"], |f| f.with_source("P-v1", archive));

    let stats = h.orchestrator.run(10).await.unwrap();

    assert_eq!(
        stats,
        DownloadStats {
            requested: 10,
            attempted: 1,
            completed: 1,
            failed: 0,
            unrecorded: 0,
        }
    );
    assert_eq!(h.fetcher.calls(), vec!["source:P-v1"]);
    assert_eq!(h.store.status("P-v1"), Some(DownloadStatus::Completed));
    let document = h.storage.document_path("P-v1");
    assert_eq!(std::fs::read(document).unwrap(), main);
    assert!(!h.storage.scratch_dir.join("P-v1").exists());
}

#[tokio::test]
async fn previous_version_source_is_used_after_exact_version_fails() {
    let archive = targz(&[("paper.tex", b"\\documentclass{article}")]);
    let h = harness(&["Q-v3"], |f| f.with_source("Q-v2", archive));

    let stats = h.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(
        h.fetcher.calls(),
        vec!["source:Q-v3", "rendered:Q-v3", "source:Q-v2"]
    );
    assert_eq!(h.store.status("Q-v3"), Some(DownloadStatus::Completed));
    assert!(h.storage.document_path("Q-v2").exists());
}

#[tokio::test]
async fn rendered_document_is_second_choice() {
    let h = harness(&["D-v2"], |f| f.with_rendered("D-v2"));

    h.orchestrator.run(1).await.unwrap();

    assert_eq!(h.fetcher.calls(), vec!["source:D-v2", "rendered:D-v2"]);
    assert_eq!(h.store.status("D-v2"), Some(DownloadStatus::Completed));
}

#[tokio::test]
async fn all_strategies_attempted_in_order_before_failing() {
    let h = harness(&["F-v4"], |f| f);

    let stats = h.orchestrator.run(5).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(
        h.fetcher.calls(),
        vec![
            "source:F-v4",
            "rendered:F-v4",
            "source:F-v3",
            "rendered:F-v3"
        ]
    );
    assert_eq!(h.store.status("F-v4"), Some(DownloadStatus::Failed));
}

#[tokio::test]
async fn first_version_never_tries_previous_strategies() {
    let h = harness(&["N-v1"], |f| f);

    let stats = h.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(h.fetcher.calls(), vec!["source:N-v1", "rendered:N-v1"]);
}

#[tokio::test]
async fn archive_without_primary_document_still_completes() {
    let archive = targz(&[("figure.png", b"png bytes")]);
    let h = harness(&["E-v1"], |f| f.with_source("E-v1", archive));

    let stats = h.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(h.fetcher.calls(), vec!["source:E-v1"]);
    assert!(!h.storage.document_path("E-v1").exists());
    assert!(h.storage.source_archive_path("E-v1").exists());
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_batch() {
    let archive = targz(&[("a.tex", b"content")]);
    let h = harness(&["bad-id", "G-v1", "H-v1"], |f| {
        f.with_source("H-v1", archive)
    });

    let stats = h.orchestrator.run(10).await.unwrap();

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(h.store.status("bad-id"), Some(DownloadStatus::Failed));
    assert_eq!(h.store.status("G-v1"), Some(DownloadStatus::Failed));
    assert_eq!(h.store.status("H-v1"), Some(DownloadStatus::Completed));
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_artifact_skips_all_fetches() {
    let archive = targz(&[("main.tex", b"content")]);
    let first = harness(&["I-v2"], |f| f.with_source("I-v2", archive));
    first.orchestrator.run(1).await.unwrap();
    assert_eq!(first.fetcher.calls().len(), 1);

    // Second run over the same directories with a fetcher that would fail
    let Harness { _dir: dir, .. } = first;
    let second = harness_in(dir, &["I-v2"], |f| f);
    let stats = second.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert!(second.fetcher.calls().is_empty());
    assert_eq!(second.store.status("I-v2"), Some(DownloadStatus::Completed));
}

#[tokio::test]
async fn previous_version_fallback_is_remembered() {
    let archive = targz(&[("paper.tex", b"\\documentclass{article}")]);
    let first = harness(&["W-v3"], |f| f.with_source("W-v2", archive));
    first.orchestrator.run(1).await.unwrap();
    assert_eq!(first.fetcher.calls().len(), 3);
    assert!(first.storage.fallback_marker_path("W-v3").exists());

    let Harness { _dir: dir, .. } = first;
    let second = harness_in(dir, &["W-v3"], |f| f);
    let stats = second.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert!(second.fetcher.calls().is_empty());
}

#[tokio::test]
async fn newer_version_is_fetched_despite_previous_artifact() {
    let h = harness(&["J-v3"], |f| f.with_rendered("J-v3"));
    let prev_pdf = h.storage.rendered_path("J-v2");
    std::fs::create_dir_all(prev_pdf.parent().unwrap()).unwrap();
    std::fs::write(&prev_pdf, b"%PDF").unwrap();

    let stats = h.orchestrator.run(1).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(h.fetcher.calls(), vec!["source:J-v3", "rendered:J-v3"]);
    assert!(h.storage.rendered_path("J-v3").exists());
}

#[tokio::test]
async fn marker_for_another_version_is_ignored() {
    let h = harness(&["M-v3"], |f| f.with_rendered("M-v3"));
    let stray = h.storage.rendered_path("M-v1");
    std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
    std::fs::write(&stray, b"%PDF").unwrap();
    std::fs::create_dir_all(&h.storage.source_dir).unwrap();
    std::fs::write(h.storage.fallback_marker_path("M-v3"), "M-v1").unwrap();

    h.orchestrator.run(1).await.unwrap();

    assert_eq!(h.fetcher.calls(), vec!["source:M-v3", "rendered:M-v3"]);
}

#[tokio::test]
async fn explicit_item_list_is_processed() {
    let h = harness(&[], |f| f.with_rendered("K-v1"));

    let stats = h
        .orchestrator
        .run_items(&["K-v1".to_string()])
        .await
        .unwrap();

    assert_eq!(stats.requested, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(h.store.status("K-v1"), Some(DownloadStatus::Completed));
}

// ---------------------------------------------------------------------------
// Archive integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsafe_archive_marks_item_failed_and_aborts_batch() {
    let evil = targz(&[("../../escape.tex", b"owned")]);
    let h = harness(&["U-v1", "V-v1"], |f| {
        f.with_source("U-v1", evil).with_rendered("V-v1")
    });

    let err = h.orchestrator.run(10).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::UnsafeEntry { .. })
    ));
    assert_eq!(h.store.status("U-v1"), Some(DownloadStatus::Failed));
    assert_eq!(h.store.status("V-v1"), None);
    // The rendered fallback is not attempted once the archive is found unsafe
    assert_eq!(h.fetcher.calls(), vec!["source:U-v1"]);
    assert!(!h.storage.scratch_dir.join("escape.tex").exists());
}

#[tokio::test]
async fn rejected_archive_is_not_reused_after_requeue() {
    let evil = targz(&[("../../escape.tex", b"owned")]);
    let first = harness(&["X-v1"], |f| f.with_source("X-v1", evil.clone()));

    assert!(first.orchestrator.run(1).await.is_err());
    assert_eq!(first.store.status("X-v1"), Some(DownloadStatus::Failed));
    assert!(!first.storage.source_archive_path("X-v1").exists());

    // Requeued: the item is pending again over the same directories
    let Harness { _dir: dir, .. } = first;
    let second = harness_in(dir, &["X-v1"], |f| f.with_source("X-v1", evil));
    let err = second.orchestrator.run(1).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Extraction(ExtractionError::UnsafeEntry { .. })
    ));
    assert_eq!(second.fetcher.calls(), vec!["source:X-v1"]);
    assert_eq!(second.store.status("X-v1"), Some(DownloadStatus::Failed));
}

// ---------------------------------------------------------------------------
// Status bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refused_status_updates_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage_in(dir.path());
    let store = Arc::new(MemoryStore {
        refuse_status: true,
        ..MemoryStore::with_pending(&["Y-v1", "Z-v1"])
    });
    let fetcher = Arc::new(RecordingFetcher::new(&storage).with_rendered("Y-v1"));
    let orchestrator = DownloadOrchestrator::new(
        store.clone(),
        fetcher,
        ArchiveExtractor::from_config(&storage),
        storage,
    );

    let stats = orchestrator.run(2).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.unrecorded, 2);
    assert_eq!(store.status("Y-v1"), None);
}
