//! Model engine interfaces.
//!
//! Speech-to-text, captioning, and embedding are consumed as black boxes
//! behind these traits and injected into the pipeline, so tests can
//! substitute fakes and deployments can swap backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::PipelineResult;

pub mod inference;
pub mod retry;
pub mod whisper;

pub use inference::InferenceClient;
pub use retry::{with_retry, RetryPolicy};
pub use whisper::WhisperTranscriber;

/// Raw timestamped speech segment from the speech-to-text engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Segment text
    pub text: String,
}

/// Speech-to-text engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<RawSegment>>;
}

/// Image captioning engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image: &Path) -> PipelineResult<String>;
}

/// Text and image embedding engine producing fixed-dimension vectors
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> PipelineResult<Vec<f32>>;

    async fn embed_image(&self, image: &Path) -> PipelineResult<Vec<f32>>;
}

/// Degraded captioner/embedder used when no inference endpoint is configured.
///
/// Produces empty captions and empty embeddings, which downstream stages
/// treat as zero similarity. Jobs still complete, with degraded content.
pub struct NullVision;

#[async_trait]
impl Captioner for NullVision {
    async fn caption(&self, _image: &Path) -> PipelineResult<String> {
        Ok(String::new())
    }
}

#[async_trait]
impl Embedder for NullVision {
    async fn embed_text(&self, _text: &str) -> PipelineResult<Vec<f32>> {
        Ok(Vec::new())
    }

    async fn embed_image(&self, _image: &Path) -> PipelineResult<Vec<f32>> {
        Ok(Vec::new())
    }
}

/// Cosine similarity between two embedding vectors.
///
/// Empty or mismatched vectors (the degraded-engine case) compare as 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degraded_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_null_vision_degrades_silently() {
        let vision = NullVision;
        assert_eq!(vision.caption(Path::new("x.jpg")).await.unwrap(), "");
        assert!(vision.embed_text("hello").await.unwrap().is_empty());
        assert!(vision.embed_image(Path::new("x.jpg")).await.unwrap().is_empty());
    }
}
