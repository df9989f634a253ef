//! Labeling pipeline
//!
//! Jobs flow through four overlapping stages:
//! 1. A producer task pops jobs from the queue, one at a time
//! 2. Each popped job is enriched with its question and item text
//! 3. Enriched jobs are classified, at most `concurrency` at once
//! 4. Results are consumed in completion order; affirmative verdicts are
//!    committed immediately
//!
//! A job popped but not committed when the run is cancelled is lost and has
//! to be re-enqueued by the caller. When popping fails, jobs popped before
//! the failure are still classified and committed, then the error is
//! returned.


use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::QueueStore;
use crate::error::{Error, Result};
use crate::llm::Classifier;
use crate::types::{LabelingJob, LabelingStats, Question, Verdict};

/// Outcome of stages 2 and 3 for one job
enum JobOutcome {
    /// Question or item text no longer exists
    Missing(LabelingJob),
    /// Enrichment failed in the store
    Failed(LabelingJob, Error),
    /// A verdict was produced
    Classified {
        job: LabelingJob,
        question: Question,
        title: String,
        verdict: Verdict,
    },
}

/// Drives the classifier over queued labeling jobs
pub struct LabelingPipeline {
    store: Arc<dyn QueueStore>,
    classifier: Classifier,
    limiter: Arc<Semaphore>,
    concurrency: usize,
}

impl LabelingPipeline {
    /// Create a pipeline allowing `concurrency` classifications in flight
    ///
    /// A `concurrency` of zero is treated as one.
    pub fn new(store: Arc<dyn QueueStore>, classifier: Classifier, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            store,
            classifier,
            limiter: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Classification ceiling of this pipeline
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process up to `max_jobs` jobs
    pub async fn run(&self, max_jobs: usize) -> Result<LabelingStats> {
        self.run_until(max_jobs, CancellationToken::new()).await
    }

    /// Process up to `max_jobs` jobs, stopping early when `cancel` fires
    ///
    /// On cancellation, in-flight classifications are aborted and the
    /// counters gathered so far are returned.
    pub async fn run_until(
        &self,
        max_jobs: usize,
        cancel: CancellationToken,
    ) -> Result<LabelingStats> {
        let started = Instant::now();
        let mut stats = LabelingStats::default();
        let mut consumed = 0usize;

        info!(
            max_jobs,
            concurrency = self.concurrency,
            provider = self.classifier.provider(),
            "labeling run started"
        );

        let (job_tx, mut job_rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(produce(
            self.store.clone(),
            max_jobs,
            cancel.clone(),
            job_tx,
        ));

        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();
        let mut producing = true;
        let mut pop_error = None;

        while producing || !tasks.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let abandoned = tasks.len();
                    tasks.abort_all();
                    producer.abort();
                    warn!(abandoned, "labeling run cancelled; popped jobs in flight are lost");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.consume(joined, &mut stats, &mut consumed).await;
                }

                received = job_rx.recv(), if producing => match received {
                    Some(Ok(job)) => {
                        tasks.spawn(process_job(
                            self.store.clone(),
                            self.classifier.clone(),
                            self.limiter.clone(),
                            job,
                        ));
                    }
                    Some(Err(e)) => {
                        error!(
                            error = %e,
                            in_flight = tasks.len(),
                            "failed to pop labeling job; finishing popped jobs before aborting"
                        );
                        pop_error = Some(e);
                        producing = false;
                    }
                    None => producing = false,
                },
            }
        }

        stats.elapsed = started.elapsed();
        if let Some(e) = pop_error {
            error!(
                processed = stats.processed,
                labeled = stats.labeled,
                errors = stats.errors,
                "labeling run aborted by store failure"
            );
            return Err(e);
        }
        info!(
            processed = stats.processed,
            labeled = stats.labeled,
            skipped_missing = stats.skipped_missing,
            errors = stats.errors,
            elapsed_ms = stats.elapsed.as_millis(),
            "labeling run finished"
        );
        Ok(stats)
    }

    /// Stage 4: record one finished job
    async fn consume(
        &self,
        joined: std::result::Result<JobOutcome, JoinError>,
        stats: &mut LabelingStats,
        consumed: &mut usize,
    ) {
        *consumed += 1;
        let n = *consumed;

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                stats.errors += 1;
                error!(error = %e, "labeling task did not complete");
                return;
            }
        };

        match outcome {
            JobOutcome::Missing(job) => {
                stats.skipped_missing += 1;
                info!(
                    item_id = %job.item_id,
                    question_id = %job.question_id,
                    "{n:03} skipped: question or item text missing"
                );
            }
            JobOutcome::Failed(job, e) => {
                stats.errors += 1;
                error!(
                    item_id = %job.item_id,
                    question_id = %job.question_id,
                    error = %e,
                    "{n:03} failed to load job"
                );
            }
            JobOutcome::Classified {
                job,
                question,
                title,
                verdict,
            } => {
                stats.processed += 1;
                if !verdict.answer {
                    info!(
                        item_id = %job.item_id,
                        question_id = %job.question_id,
                        confidence = ?verdict.confidence,
                        "{n:03} [ ] {title}"
                    );
                    return;
                }

                match self
                    .store
                    .upsert_label(&job.item_id, question.label_id, verdict.confidence)
                    .await
                {
                    Ok(()) => {
                        stats.labeled += 1;
                        info!(
                            item_id = %job.item_id,
                            question_id = %job.question_id,
                            label_id = %question.label_id,
                            confidence = ?verdict.confidence,
                            "{n:03} [x] {title}"
                        );
                    }
                    Err(e) => {
                        stats.errors += 1;
                        error!(
                            item_id = %job.item_id,
                            label_id = %question.label_id,
                            error = %e,
                            "{n:03} failed to store label"
                        );
                    }
                }
            }
        }
    }
}

/// Stage 1: pop up to `max_jobs` jobs and hand them over
///
/// Stops at an empty queue, on cancellation or when the receiver is gone. A
/// pop in progress is never interrupted.
async fn produce(
    store: Arc<dyn QueueStore>,
    max_jobs: usize,
    cancel: CancellationToken,
    jobs: mpsc::UnboundedSender<Result<LabelingJob>>,
) {
    for _ in 0..max_jobs {
        if cancel.is_cancelled() {
            break;
        }
        match store.pop_next_labeling_job().await {
            Ok(Some(job)) => {
                debug!(item_id = %job.item_id, question_id = %job.question_id, "job popped");
                if jobs.send(Ok(job)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("labeling queue empty");
                break;
            }
            Err(e) => {
                let _ = jobs.send(Err(e));
                break;
            }
        }
    }
}

/// Stages 2 and 3 for one job
async fn process_job(
    store: Arc<dyn QueueStore>,
    classifier: Classifier,
    limiter: Arc<Semaphore>,
    job: LabelingJob,
) -> JobOutcome {
    let (question, text) = tokio::join!(
        store.get_question(job.question_id),
        store.get_item_text(&job.item_id)
    );
    let (question, text) = match (question, text) {
        (Ok(Some(question)), Ok(Some(text))) => (question, text),
        (Err(e), _) | (_, Err(e)) => return JobOutcome::Failed(job, e),
        _ => return JobOutcome::Missing(job),
    };

    let verdict = {
        let _permit = match limiter.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return JobOutcome::Failed(
                    job,
                    Error::Other("classification limiter closed".to_string()),
                );
            }
        };
        classifier
            .classify(&question.prompt, &text.title, &text.abstract_text)
            .await
    };

    JobOutcome::Classified {
        job,
        question,
        title: text.title,
        verdict,
    }
}
