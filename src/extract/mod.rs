//! Audio extraction chain: produce a playable mono PCM WAV from a video.
//!
//! Four tiers run in order, each validated before acceptance: strict
//! transcode, lenient transcode tolerating corrupt input, stream-copy then
//! re-encode for containers whose audio codec cannot be read directly, and
//! synthetic silence as the terminal fallback so transcription always has
//! some input. Disk space is checked by the resource guard before each tier.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::guard::{Admission, ResourceGuard};
use crate::media::{AssetKind, MediaAsset};
use crate::{PipelineError, PipelineResult};

/// Accepted audio must exceed the WAV header plus some payload
pub const MIN_AUDIO_BYTES: u64 = 1024;

/// Transcoded output is conservatively estimated at this multiple of the
/// source size
const EXTRACTION_SIZE_FACTOR: u64 = 3;

/// Duration of the synthetic silence fallback
const SILENCE_SECONDS: u32 = 10;

const SAMPLE_RATE: &str = "16000";

/// One tier in the extraction cascade
#[async_trait]
pub trait ExtractTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rough output size used for the guard's admission check
    fn estimated_bytes(&self, video: &MediaAsset) -> u64 {
        video.size_bytes.saturating_mul(EXTRACTION_SIZE_FACTOR)
    }

    /// Produce the audio file at `dest`
    async fn run(&self, video: &MediaAsset, dest: &Path) -> anyhow::Result<()>;
}

/// Tier 1: strict transcode, hard failure on any decode error
pub struct StrictTranscodeTier;

#[async_trait]
impl ExtractTier for StrictTranscodeTier {
    fn name(&self) -> &'static str {
        "strict-transcode"
    }

    async fn run(&self, video: &MediaAsset, dest: &Path) -> anyhow::Result<()> {
        run_ffmpeg(&[
            "-y",
            "-i",
            &video.path.to_string_lossy(),
            "-vn",
            "-acodec",
            "pcm_s16le",
            "-ar",
            SAMPLE_RATE,
            "-ac",
            "1",
            &dest.to_string_lossy(),
        ])
        .await
    }
}

/// Tier 2: lenient transcode that tolerates corrupt input
pub struct LenientTranscodeTier;

#[async_trait]
impl ExtractTier for LenientTranscodeTier {
    fn name(&self) -> &'static str {
        "lenient-transcode"
    }

    async fn run(&self, video: &MediaAsset, dest: &Path) -> anyhow::Result<()> {
        run_ffmpeg(&[
            "-y",
            "-err_detect",
            "ignore_err",
            "-fflags",
            "+discardcorrupt",
            "-i",
            &video.path.to_string_lossy(),
            "-vn",
            "-acodec",
            "pcm_s16le",
            "-ar",
            SAMPLE_RATE,
            "-ac",
            "1",
            &dest.to_string_lossy(),
        ])
        .await
    }
}

/// Tier 3: stream-copy the audio track into an intermediate container, then
/// re-encode the intermediate
pub struct CopyThenReencodeTier;

#[async_trait]
impl ExtractTier for CopyThenReencodeTier {
    fn name(&self) -> &'static str {
        "copy-then-reencode"
    }

    async fn run(&self, video: &MediaAsset, dest: &Path) -> anyhow::Result<()> {
        let intermediate = dest.with_extension("mkv");

        let copy_result = run_ffmpeg(&[
            "-y",
            "-i",
            &video.path.to_string_lossy(),
            "-vn",
            "-acodec",
            "copy",
            &intermediate.to_string_lossy(),
        ])
        .await;

        if let Err(e) = copy_result {
            let _ = fs_err::remove_file(&intermediate);
            return Err(e);
        }

        let reencode_result = run_ffmpeg(&[
            "-y",
            "-i",
            &intermediate.to_string_lossy(),
            "-acodec",
            "pcm_s16le",
            "-ar",
            SAMPLE_RATE,
            "-ac",
            "1",
            &dest.to_string_lossy(),
        ])
        .await;

        let _ = fs_err::remove_file(&intermediate);
        reencode_result
    }
}

/// Tier 4, terminal fallback: synthetic silence of fixed short duration
pub struct SilenceTier;

#[async_trait]
impl ExtractTier for SilenceTier {
    fn name(&self) -> &'static str {
        "synthetic-silence"
    }

    fn estimated_bytes(&self, _video: &MediaAsset) -> u64 {
        // 16-bit mono PCM for a few seconds
        (SILENCE_SECONDS as u64) * 16_000 * 2
    }

    async fn run(&self, _video: &MediaAsset, dest: &Path) -> anyhow::Result<()> {
        run_ffmpeg(&[
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("anullsrc=r={}:cl=mono", SAMPLE_RATE),
            "-t",
            &SILENCE_SECONDS.to_string(),
            "-acodec",
            "pcm_s16le",
            &dest.to_string_lossy(),
        ])
        .await
    }
}

async fn run_ffmpeg(args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg failed: {}", error);
    }

    Ok(())
}

/// Ordered extraction cascade with per-tier admission checks
pub struct ExtractionChain {
    tiers: Vec<Box<dyn ExtractTier>>,
    guard: Arc<ResourceGuard>,
}

impl ExtractionChain {
    pub fn new(guard: Arc<ResourceGuard>) -> Self {
        Self {
            tiers: vec![
                Box::new(StrictTranscodeTier),
                Box::new(LenientTranscodeTier),
                Box::new(CopyThenReencodeTier),
                Box::new(SilenceTier),
            ],
            guard,
        }
    }

    pub fn with_tiers(guard: Arc<ResourceGuard>, tiers: Vec<Box<dyn ExtractTier>>) -> Self {
        Self { tiers, guard }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Run the cascade, returning the first tier's output that validates
    pub async fn extract(
        &self,
        video: &MediaAsset,
        dest_dir: &Path,
    ) -> PipelineResult<MediaAsset> {
        let dest = dest_dir.join("audio.wav");
        let mut last_error = String::from("no extraction tier configured");

        for tier in &self.tiers {
            let estimate = tier.estimated_bytes(video);
            if let Admission::Deny(reason) = self.guard.admit(dest_dir, estimate) {
                return Err(PipelineError::ResourceExhausted(reason));
            }

            tracing::info!(tier = tier.name(), "Attempting audio extraction");

            if let Err(e) = tier.run(video, &dest).await {
                tracing::warn!(tier = tier.name(), error = %e, "Extraction tier failed");
                let _ = fs_err::remove_file(&dest);
                last_error = format!("{}: {}", tier.name(), e);
                continue;
            }

            match validate_audio(&dest) {
                Ok(()) => {
                    let asset = MediaAsset::from_path(dest, AssetKind::Audio)
                        .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
                    tracing::info!(
                        tier = tier.name(),
                        size = asset.size_bytes,
                        "Audio extraction succeeded"
                    );
                    return Ok(asset);
                }
                Err(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "Output failed validation");
                    let _ = fs_err::remove_file(&dest);
                    last_error = format!("{}: {}", tier.name(), e);
                }
            }
        }

        Err(PipelineError::ExtractionFailed(last_error))
    }
}

fn validate_audio(path: &Path) -> anyhow::Result<()> {
    let metadata = fs_err::metadata(path)?;
    if metadata.len() < MIN_AUDIO_BYTES {
        anyhow::bail!(
            "audio output {} too small: {} bytes",
            path.display(),
            metadata.len()
        );
    }
    Ok(())
}
