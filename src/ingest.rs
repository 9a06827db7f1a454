//! Ingestion gateway: validate submissions, create jobs, hand off work.
//!
//! ## Why a queue instead of `tokio::spawn` per request?
//!
//! Each submission costs one multi-second VLM call. Spawning one task per
//! request would let a burst of uploads open an unbounded number of
//! concurrent provider calls (and burn through the provider's rate limit).
//! Instead, submissions go through a bounded `mpsc` channel that a single
//! dispatcher drains with `for_each_concurrent(workers)`:
//!
//! ```text
//! submit_* ──▶ [queue: queue_capacity] ──▶ dispatcher ──▶ ≤ workers extractions
//!   (202)            (503 when full)                        │
//!                                                           ▼
//!                                              registry.complete / registry.fail
//! ```
//!
//! A queue slot is reserved *before* the job is created, so a full queue
//! rejects the submission without leaving an orphaned `processing` job.
//!
//! Every extraction runs in its own spawned task; even a panic inside the
//! extractor ends with the job in `error`, never stuck in `processing`.

use crate::config::ServiceConfig;
use crate::error::{JobFailure, SubmissionError};
use crate::job::{JobId, JobKind};
use crate::pipeline::extractor::{DocumentExtractor, ExtractionPayload};
use crate::pipeline::{media, normalize};
use crate::receipt::Receipt;
use crate::registry::JobRegistry;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, info_span, warn, Instrument};

/// One unit of queued extraction work.
#[derive(Debug)]
pub struct ExtractionTask {
    pub job_id: JobId,
    pub payload: ExtractionPayload,
}

/// Everything a worker needs, shared by all workers.
struct WorkerContext {
    registry: JobRegistry,
    extractor: Arc<dyn DocumentExtractor>,
    image_prompt: String,
    text_prompt: String,
    timeout: Option<Duration>,
}

impl WorkerContext {
    fn prompt_for(&self, payload: &ExtractionPayload) -> &str {
        match payload {
            ExtractionPayload::Image(_) => &self.image_prompt,
            ExtractionPayload::Text(_) => &self.text_prompt,
        }
    }
}

/// Entry point for receipt submissions.
///
/// Cheap to clone; all clones feed the same queue and registry.
#[derive(Clone)]
pub struct IngestionGateway {
    registry: JobRegistry,
    sender: mpsc::Sender<ExtractionTask>,
}

impl IngestionGateway {
    /// Create the gateway and spawn its dispatcher on the current runtime.
    ///
    /// The dispatcher runs until every clone of the gateway is dropped and
    /// the queue has drained; the returned handle resolves at that point.
    pub fn start(
        registry: JobRegistry,
        extractor: Arc<dyn DocumentExtractor>,
        config: &ServiceConfig,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let ctx = Arc::new(WorkerContext {
            registry: registry.clone(),
            extractor,
            image_prompt: config.resolved_image_prompt(),
            text_prompt: config.resolved_text_prompt(),
            timeout: config.extraction_timeout(),
        });
        let dispatcher = tokio::spawn(run_dispatcher(receiver, ctx, config.workers));
        (Self { registry, sender }, dispatcher)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Accept a receipt image.
    ///
    /// `filename` decides the media type; `declared` (the part's content
    /// type) is the fallback. Returns as soon as the job is queued.
    pub fn submit_image(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
        declared: Option<&str>,
    ) -> Result<JobId, SubmissionError> {
        let image = media::prepare_image(bytes, filename, declared)?;
        self.enqueue(JobKind::Image, ExtractionPayload::Image(image))
    }

    /// Accept receipt text. Absent or blank text is rejected.
    pub fn submit_text(&self, text: Option<&str>) -> Result<JobId, SubmissionError> {
        let text = text
            .filter(|t| !t.trim().is_empty())
            .ok_or(SubmissionError::MissingField("text"))?;
        self.enqueue(JobKind::Text, ExtractionPayload::Text(text.to_string()))
    }

    fn enqueue(
        &self,
        kind: JobKind,
        payload: ExtractionPayload,
    ) -> Result<JobId, SubmissionError> {
        let permit = self.sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => SubmissionError::QueueFull,
            TrySendError::Closed(()) => SubmissionError::WorkersUnavailable,
        })?;

        let job_id = self.registry.create(kind);
        info!(job_id = %job_id, payload = %payload.describe(), "Extraction job queued");
        permit.send(ExtractionTask { job_id, payload });
        Ok(job_id)
    }
}

async fn run_dispatcher(
    receiver: mpsc::Receiver<ExtractionTask>,
    ctx: Arc<WorkerContext>,
    workers: usize,
) {
    info!(workers, "Extraction dispatcher started");
    ReceiverStream::new(receiver)
        .for_each_concurrent(workers, |task| {
            let ctx = Arc::clone(&ctx);
            async move {
                let job_id = task.job_id;
                let worker = tokio::spawn(process_task(Arc::clone(&ctx), task));
                if let Err(e) = worker.await {
                    error!(job_id = %job_id, error = %e, "Extraction worker aborted");
                    let failure = JobFailure::Aborted {
                        detail: e.to_string(),
                    };
                    ctx.registry.fail(job_id, failure.to_string());
                }
            }
        })
        .await;
    info!("Extraction dispatcher stopped: queue closed");
}

async fn process_task(ctx: Arc<WorkerContext>, task: ExtractionTask) {
    let span = info_span!("extraction_job", job_id = %task.job_id);
    async move {
        let start = Instant::now();
        let prompt = ctx.prompt_for(&task.payload);
        match run_extraction(ctx.extractor.as_ref(), prompt, &task.payload, ctx.timeout).await {
            Ok(receipt) => {
                info!(
                    items = receipt.produtos().len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Extraction job done"
                );
                ctx.registry.complete(task.job_id, receipt);
            }
            Err(failure) => {
                warn!(
                    error = %failure,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Extraction job failed"
                );
                ctx.registry.fail(task.job_id, failure.to_string());
            }
        }
    }
    .instrument(span)
    .await
}

/// Call the extractor (bounded by `timeout` when set) and normalise its answer.
pub async fn run_extraction(
    extractor: &dyn DocumentExtractor,
    prompt: &str,
    payload: &ExtractionPayload,
    timeout: Option<Duration>,
) -> Result<Receipt, JobFailure> {
    let call = extractor.extract(prompt, payload);
    let raw = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| JobFailure::Timeout {
                secs: limit.as_secs(),
            })??,
        None => call.await?,
    };
    Ok(normalize::normalize_receipt(&raw)?)
}
