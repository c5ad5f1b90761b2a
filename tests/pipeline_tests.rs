//! End-to-end pipeline and orchestrator tests with injected stages, so no
//! external binaries or inference sidecar are needed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use videodoc::acquire::{Acquired, AcquireStrategy, AcquisitionChain, MIN_CANDIDATE_BYTES};
use videodoc::align::Aligner;
use videodoc::config::FrameMode;
use videodoc::engines::{Captioner, Embedder, RawSegment, RetryPolicy, SpeechToText};
use videodoc::extract::{ExtractTier, ExtractionChain};
use videodoc::frames::{FrameDecoder, FrameSampler};
use videodoc::guard::ResourceGuard;
use videodoc::jobs::{InMemoryJobStore, JobId, Orchestrator};
use videodoc::media::MediaAsset;
use videodoc::pipeline::NoopProgress;
use videodoc::segment::Segmenter;
use videodoc::{Config, ErrorKind, JobStatus, Pipeline, PipelineResult};

struct FileStrategy;

#[async_trait]
impl AcquireStrategy for FileStrategy {
    fn name(&self) -> &'static str {
        "test-file"
    }

    fn supports(&self, _source: &str) -> bool {
        true
    }

    async fn fetch(&self, _source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        let path = dest_dir.join("source.mp4");
        fs_err::write(&path, vec![0u8; 4096])?;
        Ok(Acquired { path, title: None })
    }

    // Size-only validation, no ffprobe in tests
    async fn validate(&self, candidate: &Path) -> anyhow::Result<()> {
        if fs_err::metadata(candidate)?.len() < MIN_CANDIDATE_BYTES {
            anyhow::bail!("too small");
        }
        Ok(())
    }
}

struct FailingStrategy;

#[async_trait]
impl AcquireStrategy for FailingStrategy {
    fn name(&self) -> &'static str {
        "test-failing"
    }

    fn supports(&self, _source: &str) -> bool {
        true
    }

    async fn fetch(&self, _source: &str, _dest_dir: &Path) -> anyhow::Result<Acquired> {
        anyhow::bail!("network unreachable")
    }
}

struct SlowStrategy {
    delay: Duration,
}

#[async_trait]
impl AcquireStrategy for SlowStrategy {
    fn name(&self) -> &'static str {
        "test-slow"
    }

    fn supports(&self, _source: &str) -> bool {
        true
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        tokio::time::sleep(self.delay).await;
        FileStrategy.fetch(source, dest_dir).await
    }

    async fn validate(&self, candidate: &Path) -> anyhow::Result<()> {
        FileStrategy.validate(candidate).await
    }
}

struct WritingTier;

#[async_trait]
impl ExtractTier for WritingTier {
    fn name(&self) -> &'static str {
        "test-writing"
    }

    fn estimated_bytes(&self, _video: &MediaAsset) -> u64 {
        0
    }

    async fn run(&self, _video: &MediaAsset, dest: &Path) -> anyhow::Result<()> {
        fs_err::write(dest, vec![0u8; 4096])?;
        Ok(())
    }
}

struct FakeDecoder {
    duration: f64,
}

#[async_trait]
impl FrameDecoder for FakeDecoder {
    async fn duration(&self, _video: &Path) -> Option<f64> {
        Some(self.duration)
    }

    async fn decode_frame(&self, _video: &Path, _timestamp: f64, dest: &Path) -> anyhow::Result<()> {
        fs_err::write(dest, b"jpeg")?;
        Ok(())
    }
}

struct FakeVision;

#[async_trait]
impl Captioner for FakeVision {
    async fn caption(&self, _image: &Path) -> PipelineResult<String> {
        Ok("a slide".to_string())
    }
}

#[async_trait]
impl Embedder for FakeVision {
    async fn embed_text(&self, _text: &str) -> PipelineResult<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_image(&self, _image: &Path) -> PipelineResult<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

struct FakeStt {
    segments: Vec<RawSegment>,
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, _audio: &Path) -> PipelineResult<Vec<RawSegment>> {
        Ok(self.segments.clone())
    }
}

fn test_config(working: &Path, output: &Path) -> Config {
    let mut config = Config::default();
    config.working_dir = working.to_path_buf();
    config.output_dir = output.to_path_buf();
    config.max_frames = 3;
    config.min_frame_interval_seconds = 1.0;
    config.retry_count = 1;
    config
}

fn build_pipeline(
    config: &Config,
    strategies: Vec<Box<dyn AcquireStrategy>>,
    stt: Arc<dyn SpeechToText>,
) -> Pipeline {
    let guard = Arc::new(ResourceGuard::new(0));
    let retry = RetryPolicy::once();
    let vision = Arc::new(FakeVision);
    let captioner: Arc<dyn Captioner> = vision.clone();
    let embedder: Arc<dyn Embedder> = vision;

    Pipeline::new(
        config.clone(),
        guard.clone(),
        AcquisitionChain::with_strategies(strategies),
        ExtractionChain::with_tiers(guard, vec![Box::new(WritingTier)]),
        FrameSampler::new(
            Arc::new(FakeDecoder { duration: 20.0 }),
            captioner,
            embedder.clone(),
            retry,
            FrameMode::Interval,
            config.min_frame_interval_seconds,
        ),
        Segmenter::new(
            embedder.clone(),
            retry,
            config.merge_gap_seconds,
            config.semantic_merge_threshold,
        ),
        Aligner::new(embedder, retry),
        stt,
    )
}

fn spoken(segments: &[(f64, f64, &str)]) -> Arc<FakeStt> {
    Arc::new(FakeStt {
        segments: segments
            .iter()
            .map(|&(start, end, text)| RawSegment {
                start,
                end,
                text: text.to_string(),
            })
            .collect(),
    })
}

async fn wait_terminal(orchestrator: &Orchestrator, id: JobId) -> videodoc::Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = orchestrator.status(id).await {
            if job.status.is_terminal() {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never reached a terminal state"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_single_video_yields_illustrated_document() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = build_pipeline(
        &config,
        vec![Box::new(FileStrategy)],
        spoken(&[(0.0, 2.0, "Welcome to the talk.")]),
    );

    let run = pipeline
        .run(
            JobId::new(),
            "talk.mp4",
            &NoopProgress,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

    assert_eq!(run.passage_count, 1);
    assert!(run.frame_count >= 1);
    assert!(run.document_path.exists());

    let markdown = fs_err::read_to_string(&run.document_path).unwrap();
    assert!(markdown.contains("Welcome to the talk."));
    // Every passage is illustrated when frames exist
    assert!(markdown.contains("!["));
}

#[tokio::test]
async fn test_unreachable_source_still_succeeds_via_fallback() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    // Both real strategies fail; the terminal fallback produces the video
    let pipeline = Arc::new(build_pipeline(
        &config,
        vec![
            Box::new(FailingStrategy),
            Box::new(FailingStrategy),
            Box::new(FileStrategy),
        ],
        spoken(&[(0.0, 1.0, "Placeholder narration.")]),
    ));

    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(pipeline, store, &config);

    let id = orchestrator.submit("https://unreachable.example/v").await.unwrap();
    let job = wait_terminal(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100);
    assert!(job.result.unwrap().exists());
}

#[tokio::test]
async fn test_working_directory_removed_after_success_and_failure() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = Arc::new(build_pipeline(
        &config,
        vec![Box::new(FileStrategy)],
        spoken(&[(0.0, 1.0, "Hello.")]),
    ));
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(pipeline, store, &config);

    let id = orchestrator.submit("talk.mp4").await.unwrap();
    let job = wait_terminal(&orchestrator, id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(!working.path().join(id.to_string()).exists());

    // Failure path: every strategy fails, no fallback
    let failing = Arc::new(build_pipeline(
        &config,
        vec![Box::new(FailingStrategy)],
        spoken(&[]),
    ));
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(failing, store, &config);

    let id = orchestrator.submit("talk.mp4").await.unwrap();
    let job = wait_terminal(&orchestrator, id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::AcquisitionFailed));
    assert!(!working.path().join(id.to_string()).exists());
}

#[tokio::test]
async fn test_time_limit_fails_job_with_timeout_kind() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut config = test_config(working.path(), output.path());
    config.job_time_limit_seconds = 1;

    let pipeline = Arc::new(build_pipeline(
        &config,
        vec![Box::new(SlowStrategy {
            delay: Duration::from_secs(5),
        })],
        spoken(&[(0.0, 1.0, "Never reached.")]),
    ));
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(pipeline, store, &config);

    let id = orchestrator.submit("talk.mp4").await.unwrap();
    let job = wait_terminal(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Timeout));
    assert!(!working.path().join(id.to_string()).exists());
}

#[tokio::test]
async fn test_cancellation_surfaces_as_cancelled() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = Arc::new(build_pipeline(
        &config,
        vec![Box::new(SlowStrategy {
            delay: Duration::from_millis(500),
        })],
        spoken(&[(0.0, 1.0, "Never reached.")]),
    ));
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(pipeline, store, &config);

    let id = orchestrator.submit("talk.mp4").await.unwrap();
    assert!(orchestrator.cancel(id).await);

    let job = wait_terminal(&orchestrator, id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(ErrorKind::Cancelled));
}

#[tokio::test]
async fn test_empty_source_rejected_at_submission() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = Arc::new(build_pipeline(
        &config,
        vec![Box::new(FileStrategy)],
        spoken(&[]),
    ));
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = Orchestrator::start(pipeline, store, &config);

    let result = orchestrator.submit("   ").await;
    match result {
        Err(e) => assert_eq!(e.kind(), ErrorKind::Validation),
        Ok(_) => panic!("empty source must be rejected"),
    }
}

#[tokio::test]
async fn test_silent_transcription_degrades_to_placeholder_passage() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = build_pipeline(&config, vec![Box::new(FileStrategy)], spoken(&[]));

    let run = pipeline
        .run(
            JobId::new(),
            "silent.mp4",
            &NoopProgress,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

    assert_eq!(run.passage_count, 1);
    let markdown = fs_err::read_to_string(&run.document_path).unwrap();
    assert!(markdown.contains("[transcription unavailable]"));
}

#[tokio::test]
async fn test_frame_count_never_exceeds_target() {
    let working = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let config = test_config(working.path(), output.path());

    let pipeline = build_pipeline(
        &config,
        vec![Box::new(FileStrategy)],
        spoken(&[(0.0, 2.0, "Hello.")]),
    );

    let run = pipeline
        .run(
            JobId::new(),
            "talk.mp4",
            &NoopProgress,
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

    assert!(run.frame_count <= config.max_frames);
}
