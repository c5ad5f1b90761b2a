//! Orchestrator and worker pool.
//!
//! Submissions are validated, recorded as queued jobs, and pushed onto a
//! bounded channel. A fixed pool of workers pulls them off, runs the
//! pipeline under the per-job time limit with a bounded retry budget for
//! transient failures, and always removes the job's working directory
//! before recording the terminal state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use super::store::JobStore;
use super::{Job, JobId};
use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineRun, ProgressSink};
use crate::{PipelineError, PipelineResult};

const QUEUE_CAPACITY: usize = 128;
const PURGE_INTERVAL: Duration = Duration::from_secs(60);
const RETRY_BASE_DELAY_MS: u64 = 500;

struct JobRequest {
    id: JobId,
    source: String,
    cancel: Arc<AtomicBool>,
}

type CancelMap = Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>;

struct WorkerContext {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn JobStore>,
    cancellations: CancelMap,
    time_limit: Duration,
    retry_count: u32,
}

/// Front door for job submission, status, and cancellation
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    sender: mpsc::Sender<JobRequest>,
    cancellations: CancelMap,
}

impl Orchestrator {
    /// Spawn the worker pool plus the purge and sweep maintenance loops
    pub fn start(pipeline: Arc<Pipeline>, store: Arc<dyn JobStore>, config: &Config) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancellations: CancelMap = Arc::new(Mutex::new(HashMap::new()));

        let context = Arc::new(WorkerContext {
            pipeline: pipeline.clone(),
            store: store.clone(),
            cancellations: cancellations.clone(),
            time_limit: Duration::from_secs(config.job_time_limit_seconds),
            retry_count: config.retry_count,
        });

        for index in 0..config.worker_concurrency {
            tokio::spawn(run_worker(index, receiver.clone(), context.clone()));
        }

        spawn_purge_loop(store.clone(), Duration::from_secs(config.job_retention_seconds));
        spawn_sweep_loop(pipeline, config);

        Arc::new(Self {
            store,
            sender,
            cancellations,
        })
    }

    /// Validate and enqueue a source reference, returning the job id
    pub async fn submit(&self, source: &str) -> PipelineResult<JobId> {
        let source = source.trim();
        if source.is_empty() {
            return Err(PipelineError::Validation(
                "source must not be empty".to_string(),
            ));
        }

        let job = Job::new(source);
        let id = job.id;
        self.store
            .insert(job)
            .await
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancellations.lock().await.insert(id, cancel.clone());

        self.sender
            .send(JobRequest {
                id,
                source: source.to_string(),
                cancel,
            })
            .await
            .map_err(|_| PipelineError::Validation("job queue is shut down".to_string()))?;

        tracing::info!(job_id = %id, %source, "Job queued");
        Ok(id)
    }

    pub async fn status(&self, id: JobId) -> Option<Job> {
        self.store.get(id).await.ok()
    }

    /// Request cooperative cancellation.
    ///
    /// Returns false for unknown or already-finished jobs. The pipeline
    /// observes the flag at its next stage boundary.
    pub async fn cancel(&self, id: JobId) -> bool {
        match self.cancellations.lock().await.get(&id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

async fn run_worker(
    index: usize,
    receiver: Arc<Mutex<mpsc::Receiver<JobRequest>>>,
    context: Arc<WorkerContext>,
) {
    tracing::debug!(worker = index, "Worker started");

    loop {
        // Hold the lock only while waiting for the next request
        let request = { receiver.lock().await.recv().await };
        let Some(request) = request else {
            break;
        };

        let span = tracing::info_span!("job", worker = index, job_id = %request.id);
        process_job(&context, request).instrument(span).await;
    }

    tracing::debug!(worker = index, "Worker stopped");
}

async fn process_job(context: &WorkerContext, request: JobRequest) {
    let JobRequest { id, source, cancel } = request;

    if let Err(e) = context.store.set_running(id).await {
        tracing::warn!(error = %e, "Dropping job with no record");
        context.cancellations.lock().await.remove(&id);
        return;
    }
    tracing::info!(%source, "Job started");

    let progress = StoreProgress {
        store: context.store.clone(),
        id,
    };

    let outcome = match tokio::time::timeout(
        context.time_limit,
        run_attempts(context, id, &source, &progress, &cancel),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout(format!(
            "exceeded the {}s job time limit",
            context.time_limit.as_secs()
        ))),
    };

    // Transient media lives only for the duration of the run. Reclaim logs
    // its own failures and never blocks the terminal transition below.
    context.pipeline.guard().reclaim(&context.pipeline.job_dir(id));

    let recorded = match outcome {
        Ok(run) => {
            tracing::info!(
                path = %run.document_path.display(),
                passages = run.passage_count,
                frames = run.frame_count,
                "Job succeeded"
            );
            context.store.complete(id, run.document_path).await
        }
        Err(e) => {
            tracing::warn!(error = %e, kind = %e.kind(), "Job failed");
            context.store.fail(id, e.kind(), e.to_string()).await
        }
    };

    if let Err(e) = recorded {
        tracing::error!(error = %e, "Failed to record terminal job state");
    }

    context.cancellations.lock().await.remove(&id);
}

/// Run the pipeline with a bounded retry budget for transient failures
async fn run_attempts(
    context: &WorkerContext,
    id: JobId,
    source: &str,
    progress: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> PipelineResult<PipelineRun> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match context.pipeline.run(id, source, progress, cancel).await {
            Ok(run) => return Ok(run),
            Err(e) if e.is_retryable() && attempt <= context.retry_count => {
                let delay =
                    Duration::from_millis(RETRY_BASE_DELAY_MS << (attempt - 1).min(6));
                tracing::warn!(attempt, error = %e, "Transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

struct StoreProgress {
    store: Arc<dyn JobStore>,
    id: JobId,
}

#[async_trait]
impl ProgressSink for StoreProgress {
    async fn report(&self, percent: u8) {
        if let Err(e) = self.store.set_progress(self.id, percent).await {
            tracing::warn!(error = %e, "Progress update lost");
        }
    }
}

fn spawn_purge_loop(store: Arc<dyn JobStore>, retention: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired(retention).await;
            if purged > 0 {
                tracing::info!(purged, "Purged expired jobs");
            }
        }
    });
}

fn spawn_sweep_loop(pipeline: Arc<Pipeline>, config: &Config) {
    let guard = pipeline.guard();
    let dirs = [config.working_dir.clone(), config.output_dir.clone()];
    let max_age = Duration::from_secs(config.sweep_max_age_seconds);
    let interval = Duration::from_secs(config.sweep_interval_seconds);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for dir in &dirs {
                match guard.sweep(dir, max_age) {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(dir = %dir.display(), removed, "Swept stale files");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "Sweep failed");
                    }
                }
            }
        }
    });
}
