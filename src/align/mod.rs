//! Alignment engine: map each transcript passage to its best-matching frame
//! via embedding similarity.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engines::{cosine_similarity, retry::with_retry_or, Embedder, RetryPolicy};
use crate::frames::Frame;
use crate::segment::Passage;
use crate::PipelineResult;

/// A passage paired with its best-matching frame.
///
/// The frame is absent only when no frames exist at all; one frame may be
/// reused across multiple passages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedPassage {
    pub passage: Passage,
    pub frame: Option<Frame>,
}

pub struct Aligner {
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
}

impl Aligner {
    pub fn new(embedder: Arc<dyn Embedder>, retry: RetryPolicy) -> Self {
        Self { embedder, retry }
    }

    /// Pair every passage with its most similar frame.
    ///
    /// An empty frame list is a degraded-content condition, not an error:
    /// every alignment then carries no frame.
    pub async fn align(
        &self,
        passages: Vec<Passage>,
        frames: &[Frame],
    ) -> PipelineResult<Vec<AlignedPassage>> {
        if frames.is_empty() {
            tracing::warn!("No frames available, producing unillustrated passages");
            return Ok(passages
                .into_iter()
                .map(|passage| AlignedPassage {
                    passage,
                    frame: None,
                })
                .collect());
        }

        let mut aligned = Vec::with_capacity(passages.len());

        for passage in passages {
            let text_embedding = with_retry_or(self.retry, "embed_text", Vec::new(), || {
                self.embedder.embed_text(&passage.text)
            })
            .await;

            let best = best_frame(&text_embedding, frames);

            aligned.push(AlignedPassage {
                passage,
                frame: Some(best.clone()),
            });
        }

        Ok(aligned)
    }
}

/// Argmax over cosine similarity; frames are walked in timestamp order, so
/// strict comparison resolves ties toward the earliest frame
fn best_frame<'a>(text_embedding: &[f32], frames: &'a [Frame]) -> &'a Frame {
    let mut best = &frames[0];
    let mut best_score = f32::NEG_INFINITY;

    for frame in frames {
        let score = cosine_similarity(text_embedding, &frame.embedding);
        if score > best_score {
            best_score = score;
            best = frame;
        }
    }

    best
}
