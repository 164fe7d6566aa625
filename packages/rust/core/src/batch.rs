//! Bounded-concurrency batch processor for pipeline jobs.
//!
//! Drives an arbitrary list of job ids through fetch → parse → extract →
//! validate under a semaphore-gated worker pool. Per-item failures are
//! retried with a linearly increasing delay; a retried item re-enters the
//! back of the queue so healthy items are never starved. The final report
//! classifies every recorded error message for operational triage.

use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use lexpipe_extract::{CompletionClient, ExtractOptions};
use lexpipe_shared::{JobId, JobStatus, LexpipeError, PipelineJob, Result};
use lexpipe_storage::Storage;

/// Default worker pool width. Bounded to respect the completion service's
/// rate limits.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default total attempts per item.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry delay grows linearly: `attempt * RETRY_DELAY_MS`.
const RETRY_DELAY_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// Batch execution options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum items in flight at once.
    pub concurrency_limit: usize,
    /// Total attempts per item before it is recorded as failed.
    pub max_retries: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Per-item success payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemResult {
    /// Articles segmented from the document.
    pub articles: usize,
    /// Obligations surviving validation.
    pub obligations: usize,
}

/// Terminal resolution of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Processed and yielded at least one obligation.
    Success,
    /// Processed but yielded zero obligations.
    Partial,
    /// Exhausted all attempts.
    Failed,
}

/// One terminally resolved item.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    pub attempts: u32,
    pub outcome: ItemOutcome,
    pub articles: usize,
    pub obligations: usize,
    pub error: Option<String>,
}

/// Coarse error classification, by substring match over the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    NotFound,
    ApiError,
    ParseError,
    Timeout,
    RateLimit,
    Unknown,
}

impl ErrorKind {
    /// Classify an error message. Rate limits are checked before the generic
    /// API bucket since "429" messages usually mention both.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not found") || lower.contains("404") {
            Self::NotFound
        } else if lower.contains("rate limit") || lower.contains("429") {
            Self::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("parse") || lower.contains("json") {
            Self::ParseError
        } else if lower.contains("http") || lower.contains("api") || lower.contains("status") {
            Self::ApiError
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::ApiError => "API_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Aggregate counts computed once at the end of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    pub total: usize,
    pub success_count: usize,
    pub partial_count: usize,
    pub failed_count: usize,
    pub articles_total: usize,
    pub obligations_total: usize,
    pub duration: Duration,
    /// Every recorded error message (including retried attempts), classified.
    pub error_kinds: BTreeMap<ErrorKind, usize>,
    /// Terminally resolved items, in resolution order.
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    /// Look up a resolved item by id.
    pub fn item(&self, id: &str) -> Option<&BatchItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

struct WorkItem {
    id: String,
    attempt: u32,
    delay: Duration,
}

/// Run `process` over every id under a bounded worker pool.
///
/// `on_progress` fires once per terminally resolved item with
/// `(percent, completed, total)`. Retries sleep their backoff before
/// requesting a permit, so they queue behind items already waiting.
#[instrument(skip_all, fields(total = ids.len(), concurrency = options.concurrency_limit))]
pub async fn process_batch<F, Fut, P>(
    ids: &[String],
    options: &BatchOptions,
    process: F,
    mut on_progress: P,
) -> BatchReport
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ItemResult>> + Send + 'static,
    P: FnMut(u8, usize, usize),
{
    let started = std::time::Instant::now();
    let total = ids.len();
    let max_attempts = options.max_retries.max(1);

    let process = Arc::new(process);
    let semaphore = Arc::new(Semaphore::new(options.concurrency_limit.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, u32, Result<ItemResult>)>();

    let spawn_item = |item: WorkItem| {
        let process = Arc::clone(&process);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            if !item.delay.is_zero() {
                tokio::time::sleep(item.delay).await;
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return; // pool shut down
            };
            let result = process(item.id.clone()).await;
            let _ = tx.send((item.id, item.attempt, result));
        });
    };

    for id in ids {
        spawn_item(WorkItem {
            id: id.clone(),
            attempt: 1,
            delay: Duration::ZERO,
        });
    }

    let mut report = BatchReport {
        total,
        success_count: 0,
        partial_count: 0,
        failed_count: 0,
        articles_total: 0,
        obligations_total: 0,
        duration: Duration::ZERO,
        error_kinds: BTreeMap::new(),
        items: Vec::with_capacity(total),
    };
    let mut completed = 0usize;

    while completed < total {
        let Some((id, attempt, result)) = rx.recv().await else {
            break;
        };

        match result {
            Ok(item_result) => {
                let outcome = if item_result.obligations > 0 {
                    report.success_count += 1;
                    ItemOutcome::Success
                } else {
                    report.partial_count += 1;
                    ItemOutcome::Partial
                };
                report.articles_total += item_result.articles;
                report.obligations_total += item_result.obligations;
                report.items.push(BatchItem {
                    id,
                    attempts: attempt,
                    outcome,
                    articles: item_result.articles,
                    obligations: item_result.obligations,
                    error: None,
                });
            }
            Err(e) => {
                let message = e.to_string();
                *report.error_kinds.entry(ErrorKind::classify(&message)).or_insert(0) += 1;

                if attempt < max_attempts {
                    debug!(%id, attempt, error = %message, "re-enqueueing item");
                    spawn_item(WorkItem {
                        id,
                        attempt: attempt + 1,
                        delay: Duration::from_millis(u64::from(attempt) * RETRY_DELAY_MS),
                    });
                    continue; // not terminal, no progress event
                }

                warn!(%id, attempts = attempt, error = %message, "item failed terminally");
                report.failed_count += 1;
                report.items.push(BatchItem {
                    id,
                    attempts: attempt,
                    outcome: ItemOutcome::Failed,
                    articles: 0,
                    obligations: 0,
                    error: Some(message),
                });
            }
        }

        completed += 1;
        let percent = ((completed * 100) / total.max(1)) as u8;
        on_progress(percent, completed, total);
    }

    report.duration = started.elapsed();
    info!(
        success = report.success_count,
        partial = report.partial_count,
        failed = report.failed_count,
        obligations = report.obligations_total,
        duration_ms = report.duration.as_millis(),
        "batch complete"
    );
    report
}

// ---------------------------------------------------------------------------
// Job worker
// ---------------------------------------------------------------------------

/// Drives one persisted [`PipelineJob`] through the document stages,
/// recording status and progress transitions as it goes.
#[derive(Clone)]
pub struct JobWorker {
    storage: Arc<Storage>,
    completion: Arc<CompletionClient>,
    http: reqwest::Client,
    jurisdiction: String,
    batch_size: usize,
}

impl JobWorker {
    pub fn new(
        storage: Arc<Storage>,
        completion: Arc<CompletionClient>,
        jurisdiction: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self> {
        let http = crate::fetch::build_client()?;
        Ok(Self {
            storage,
            completion,
            http,
            jurisdiction: jurisdiction.into(),
            batch_size,
        })
    }

    /// Process one job end to end. On failure the job row is marked `error`
    /// with the message and the error is returned for retry accounting.
    pub async fn process(&self, id: &str) -> Result<ItemResult> {
        let job_id = JobId::from_str(id)
            .map_err(|e| LexpipeError::Storage(format!("invalid job id {id}: {e}")))?;
        let Some(mut job) = self.storage.get_job(&job_id).await? else {
            return Err(LexpipeError::Storage(format!("job {id} not found")));
        };

        // A previously errored job must pass back through the retry edge.
        if job.status == JobStatus::Error {
            job = self.storage.retry_job(&job_id).await?;
        }

        match self.run_stages(&mut job).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.mark_error(&mut job, &e).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, job: &mut PipelineJob) -> Result<ItemResult> {
        self.advance(job, JobStatus::Scraping, "fetching document", 10)
            .await?;
        let body = crate::fetch::fetch_document(&self.http, &job.source_url).await?;

        self.advance(job, JobStatus::Parsing, "segmenting articles", 35)
            .await?;
        let document = lexpipe_segment::segment(&body, &self.jurisdiction)?;

        self.advance(job, JobStatus::Extracting, "extracting obligations", 60)
            .await?;
        let opts = ExtractOptions {
            batch_size: self.batch_size,
        };
        let raw = lexpipe_extract::extract(&document, &job.title, &self.completion, &opts).await?;

        self.advance(job, JobStatus::Validating, "validating obligations", 85)
            .await?;
        let validated = lexpipe_validate::validate(&raw, &self.jurisdiction);
        for obligation in &validated {
            self.storage.upsert_obligation(obligation).await?;
        }

        job.status = JobStatus::Completed;
        job.current_step = "completed".into();
        job.progress_percent = 100;
        job.completed_at = Some(Utc::now());
        job.result = Some(serde_json::json!({
            "articles": document.total_articles,
            "obligations_extracted": raw.len(),
            "obligations_validated": validated.len(),
        }));
        self.storage.update_job(job).await?;

        Ok(ItemResult {
            articles: document.total_articles,
            obligations: validated.len(),
        })
    }

    async fn advance(
        &self,
        job: &mut PipelineJob,
        status: JobStatus,
        step: &str,
        percent: u8,
    ) -> Result<()> {
        job.status = status;
        job.current_step = step.into();
        job.progress_percent = percent;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        self.storage.update_job(job).await
    }

    async fn mark_error(&self, job: &mut PipelineJob, error: &LexpipeError) {
        job.status = JobStatus::Error;
        job.error_message = Some(error.to_string());
        job.completed_at = Some(Utc::now());
        if let Err(e) = self.storage.update_job(job).await {
            warn!(id = %job.id, error = %e, "failed to persist job error state");
        }
    }
}

/// Enqueue jobs for a list of source URLs and run them through the pool.
#[instrument(skip_all, fields(count = sources.len()))]
pub async fn enqueue_and_process<P>(
    worker: JobWorker,
    sources: &[(String, String)],
    options: &BatchOptions,
    on_progress: P,
) -> Result<BatchReport>
where
    P: FnMut(u8, usize, usize),
{
    let mut ids = Vec::with_capacity(sources.len());
    for (url, title) in sources {
        let job = PipelineJob::queued(url.clone(), title.clone());
        worker.storage.insert_job(&job).await?;
        ids.push(job.id.to_string());
    }

    let report = process_batch(
        &ids,
        options,
        move |id| {
            let worker = worker.clone();
            async move { worker.process(&id).await }
        },
        on_progress,
    )
    .await;

    Ok(report)
}
