//! Frame sampler: extract candidate frames at a computed cadence, caption
//! and embed each, then reduce to a diverse representative subset via
//! farthest-point selection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::config::FrameMode;
use crate::engines::{cosine_similarity, retry::with_retry_or, Captioner, Embedder, RetryPolicy};
use crate::media::{self, MediaAsset};
use crate::PipelineResult;

/// Fallback duration when the container reports none
const DEFAULT_DURATION_SECONDS: f64 = 10.0;

/// A sampled video still with caption, timestamp, and embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Position in the video, seconds
    pub timestamp: f64,

    /// Saved still image
    pub image_path: PathBuf,

    /// Caption from the captioning engine, absent in degraded mode
    pub caption: Option<String>,

    /// Fixed-dimension embedding; empty in degraded mode
    pub embedding: Vec<f32>,
}

/// Seam for decoding stills out of a video file
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    /// Container duration in seconds, if known
    async fn duration(&self, video: &Path) -> Option<f64>;

    /// Decode the frame nearest `timestamp` into `dest`
    async fn decode_frame(&self, video: &Path, timestamp: f64, dest: &Path) -> anyhow::Result<()>;
}

/// Default decoder shelling out to ffmpeg
pub struct FfmpegFrameDecoder;

#[async_trait]
impl FrameDecoder for FfmpegFrameDecoder {
    async fn duration(&self, video: &Path) -> Option<f64> {
        media::probe(video).await.ok().and_then(|info| info.duration)
    }

    async fn decode_frame(&self, video: &Path, timestamp: f64, dest: &Path) -> anyhow::Result<()> {
        let output = Command::new("ffmpeg")
            .args([
                "-y",
                "-ss",
                &format!("{:.3}", timestamp),
                "-i",
                &video.to_string_lossy(),
                "-frames:v",
                "1",
                "-q:v",
                "2",
                &dest.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("frame decode at {:.3}s failed: {}", timestamp, error);
        }

        if !dest.exists() {
            anyhow::bail!("frame decode at {:.3}s produced no image", timestamp);
        }

        Ok(())
    }
}

/// Two-phase sampler: candidate generation then diversity reduction
pub struct FrameSampler {
    decoder: Arc<dyn FrameDecoder>,
    captioner: Arc<dyn Captioner>,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    mode: FrameMode,
    min_interval: f64,
}

impl FrameSampler {
    pub fn new(
        decoder: Arc<dyn FrameDecoder>,
        captioner: Arc<dyn Captioner>,
        embedder: Arc<dyn Embedder>,
        retry: RetryPolicy,
        mode: FrameMode,
        min_interval: f64,
    ) -> Self {
        Self {
            decoder,
            captioner,
            embedder,
            retry,
            mode,
            min_interval,
        }
    }

    /// Sample at most `target_count` representative frames, time-ordered
    pub async fn sample(
        &self,
        video: &MediaAsset,
        images_dir: &Path,
        target_count: usize,
    ) -> PipelineResult<Vec<Frame>> {
        if target_count == 0 {
            return Ok(Vec::new());
        }

        fs_err::create_dir_all(images_dir)
            .map_err(|e| crate::PipelineError::ModelInference(e.to_string()))?;

        let duration = self
            .decoder
            .duration(&video.path)
            .await
            .unwrap_or(DEFAULT_DURATION_SECONDS);

        let timestamps =
            candidate_timestamps(duration, target_count, self.min_interval, self.mode);
        tracing::debug!(
            duration,
            candidates = timestamps.len(),
            target = target_count,
            "Generating candidate frames"
        );

        let mut frames = Vec::new();
        for (index, &timestamp) in timestamps.iter().enumerate() {
            let dest = images_dir.join(format!("frame_{:04}.jpg", index));

            if let Err(e) = self.decoder.decode_frame(&video.path, timestamp, &dest).await {
                tracing::warn!(timestamp, error = %e, "Skipping undecodable candidate");
                continue;
            }

            let caption = with_retry_or(self.retry, "caption", String::new(), || {
                self.captioner.caption(&dest)
            })
            .await;

            let embedding = with_retry_or(self.retry, "embed_image", Vec::new(), || {
                self.embedder.embed_image(&dest)
            })
            .await;

            frames.push(Frame {
                timestamp,
                image_path: dest,
                caption: if caption.is_empty() {
                    None
                } else {
                    Some(caption)
                },
                embedding,
            });
        }

        if frames.len() > target_count {
            let selected = farthest_point_indices(&frames, target_count);

            // Discard images of unselected candidates
            for (index, frame) in frames.iter().enumerate() {
                if !selected.contains(&index) {
                    let _ = fs_err::remove_file(&frame.image_path);
                }
            }

            let mut reduced: Vec<Frame> = selected.into_iter().map(|i| frames[i].clone()).collect();
            // Output order reflects video chronology, not selection order
            reduced.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            frames = reduced;
        }

        tracing::info!(selected = frames.len(), "Frame sampling complete");
        Ok(frames)
    }
}

/// Candidate timestamps at a cadence computed from duration and target.
///
/// Shorter videos get denser cadence, down to `min_interval`; scenes mode
/// oversamples further and relies on diversity reduction to prune.
pub fn candidate_timestamps(
    duration: f64,
    target_count: usize,
    min_interval: f64,
    mode: FrameMode,
) -> Vec<f64> {
    let duration = duration.max(0.1);
    let oversample = match mode {
        FrameMode::Interval => 2.0,
        FrameMode::Scenes => 4.0,
    };

    let interval = (duration / (target_count as f64 * oversample)).max(min_interval);

    let mut timestamps = Vec::new();
    let mut t = interval / 2.0;
    while t < duration {
        timestamps.push(t);
        t += interval;
    }

    if timestamps.is_empty() {
        timestamps.push(duration / 2.0);
    }

    timestamps
}

/// Greedy farthest-point selection over frame embeddings.
///
/// Seeds with the first candidate, then repeatedly adds the candidate whose
/// maximum cosine similarity to the selected set is smallest. Ties prefer
/// the earlier timestamp, so repeated runs over the same input produce the
/// identical index set. Returned indices are in selection order.
pub fn farthest_point_indices(frames: &[Frame], target_count: usize) -> Vec<usize> {
    if frames.is_empty() || target_count == 0 {
        return Vec::new();
    }

    let mut selected = vec![0usize];

    while selected.len() < target_count.min(frames.len()) {
        let mut best_index = None;
        let mut best_score = f32::INFINITY;

        // Candidates are walked in timestamp order, so strict comparison
        // resolves ties toward the earlier frame
        for index in 0..frames.len() {
            if selected.contains(&index) {
                continue;
            }

            let max_similarity = selected
                .iter()
                .map(|&s| cosine_similarity(&frames[index].embedding, &frames[s].embedding))
                .fold(f32::NEG_INFINITY, f32::max);

            if max_similarity < best_score {
                best_score = max_similarity;
                best_index = Some(index);
            }
        }

        match best_index {
            Some(index) => selected.push(index),
            None => break,
        }
    }

    selected
}
