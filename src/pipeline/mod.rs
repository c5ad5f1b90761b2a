//! End-to-end processing pipeline: acquire, extract audio and frames in
//! parallel, transcribe, segment, align, and render the document.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::acquire::AcquisitionChain;
use crate::align::Aligner;
use crate::config::Config;
use crate::engines::{
    retry::with_retry_or, Captioner, Embedder, InferenceClient, NullVision, RawSegment,
    RetryPolicy, SpeechToText, WhisperTranscriber,
};
use crate::extract::ExtractionChain;
use crate::frames::{FfmpegFrameDecoder, FrameSampler};
use crate::guard::{Admission, ResourceGuard};
use crate::jobs::JobId;
use crate::output::{self, Document};
use crate::segment::Segmenter;
use crate::utils::sanitize_filename;
use crate::{PipelineError, PipelineResult};

/// Receiver for coarse progress checkpoints
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// Sink for callers that do not track progress
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _percent: u8) {}
}

/// Outcome of one successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub document_path: PathBuf,
    pub title: String,
    pub passage_count: usize,
    pub frame_count: usize,
}

/// The assembled stage chain for one deployment.
///
/// Stages are injected so tests can run the full flow without external
/// binaries or an inference sidecar.
pub struct Pipeline {
    config: Config,
    guard: Arc<ResourceGuard>,
    acquisition: AcquisitionChain,
    extraction: ExtractionChain,
    sampler: FrameSampler,
    segmenter: Segmenter,
    aligner: Aligner,
    transcriber: Arc<dyn SpeechToText>,
    retry: RetryPolicy,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        guard: Arc<ResourceGuard>,
        acquisition: AcquisitionChain,
        extraction: ExtractionChain,
        sampler: FrameSampler,
        segmenter: Segmenter,
        aligner: Aligner,
        transcriber: Arc<dyn SpeechToText>,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry_count);
        Self {
            config,
            guard,
            acquisition,
            extraction,
            sampler,
            segmenter,
            aligner,
            transcriber,
            retry,
        }
    }

    /// Assemble the production stage chain from configuration
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let guard = Arc::new(ResourceGuard::new(config.min_free_space_mb));
        let retry = RetryPolicy::new(config.retry_count);

        let (captioner, embedder): (Arc<dyn Captioner>, Arc<dyn Embedder>) =
            match &config.inference_endpoint {
                Some(url) => {
                    let client = Arc::new(InferenceClient::new(url)?);
                    (client.clone(), client)
                }
                None => {
                    tracing::warn!(
                        "No inference endpoint configured, captions and embeddings run degraded"
                    );
                    let null = Arc::new(NullVision);
                    (null.clone(), null)
                }
            };

        let transcriber: Arc<dyn SpeechToText> = Arc::new(WhisperTranscriber::new(
            &config.transcription_model_size,
            config.use_gpu,
        ));

        let sampler = FrameSampler::new(
            Arc::new(FfmpegFrameDecoder),
            captioner,
            embedder.clone(),
            retry,
            config.frame_mode,
            config.min_frame_interval_seconds,
        );

        let segmenter = Segmenter::new(
            embedder.clone(),
            retry,
            config.merge_gap_seconds,
            config.semantic_merge_threshold,
        );

        Ok(Self::new(
            config.clone(),
            guard.clone(),
            AcquisitionChain::from_config(config),
            ExtractionChain::new(guard),
            sampler,
            segmenter,
            Aligner::new(embedder, retry),
            transcriber,
        ))
    }

    pub fn guard(&self) -> Arc<ResourceGuard> {
        self.guard.clone()
    }

    pub fn acquisition(&self) -> &AcquisitionChain {
        &self.acquisition
    }

    pub fn extraction(&self) -> &ExtractionChain {
        &self.extraction
    }

    /// Per-job transient directory, removed unconditionally after the run
    pub fn job_dir(&self, id: JobId) -> PathBuf {
        self.config.working_dir.join(id.to_string())
    }

    /// Run the full pipeline for one job.
    ///
    /// The cancellation flag is checked between stages; a set flag surfaces
    /// as [`PipelineError::Cancelled`] at the next checkpoint.
    pub async fn run(
        &self,
        id: JobId,
        source: &str,
        progress: &dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> PipelineResult<PipelineRun> {
        let job_dir = self.job_dir(id);
        fs_err::create_dir_all(&job_dir).map_err(|e| {
            PipelineError::ResourceExhausted(format!("cannot create working directory: {}", e))
        })?;

        progress.report(0).await;

        let estimate = self.config.acquisition_estimate_mb * 1024 * 1024;
        if let Admission::Deny(reason) = self.guard.admit(&job_dir, estimate) {
            return Err(PipelineError::ResourceExhausted(reason));
        }

        let (video, acquired_title) = self.acquisition.acquire(source, &job_dir).await?;
        check_cancelled(cancel)?;

        // Frame images land under the output tree: the document references
        // them, so they must outlive the per-job working directory
        let images_dir = self
            .config
            .output_dir
            .join("screenshots")
            .join(id.to_string());

        let (audio, frames) = tokio::join!(
            self.extraction.extract(&video, &job_dir),
            self.sampler
                .sample(&video, &images_dir, self.config.max_frames),
        );
        let audio = audio?;
        let frames = frames?;

        progress.report(50).await;
        check_cancelled(cancel)?;

        let raw_segments = with_retry_or(self.retry, "transcribe", Vec::new(), || {
            self.transcriber.transcribe(&audio.path)
        })
        .await;

        let raw_segments = if raw_segments.is_empty() {
            tracing::warn!("Transcription produced nothing, emitting placeholder passage");
            vec![RawSegment {
                start: 0.0,
                end: 0.0,
                text: "[transcription unavailable]".to_string(),
            }]
        } else {
            raw_segments
        };

        let passages = self.segmenter.merge(&raw_segments).await?;
        let frame_count = frames.len();
        let aligned = self.aligner.align(passages, &frames).await?;
        check_cancelled(cancel)?;

        let title = acquired_title
            .or_else(|| derive_title(source))
            .unwrap_or_else(|| "Untitled video".to_string());

        let document = Document::new(title.clone(), aligned);
        let document_path = output::write_markdown(&document, &self.config.output_dir)
            .map_err(|e| PipelineError::ResourceExhausted(format!("cannot write document: {}", e)))?;

        progress.report(100).await;

        Ok(PipelineRun {
            document_path,
            title,
            passage_count: document.passages.len(),
            frame_count,
        })
    }
}

fn check_cancelled(cancel: &AtomicBool) -> PipelineResult<()> {
    if cancel.load(Ordering::Relaxed) {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Fallback title from the source reference's final path component
fn derive_title(source: &str) -> Option<String> {
    let stem = Path::new(source).file_stem()?.to_string_lossy().to_string();
    let cleaned = sanitize_filename(&stem.replace(['_', '-'], " "));
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
