//! Transcript segmenter: merge raw timestamped speech segments into
//! coherent passages using a timing plus semantic-similarity rule.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engines::{cosine_similarity, retry::with_retry_or, Embedder, RawSegment, RetryPolicy};
use crate::PipelineResult;

/// A merged, semantically coherent span of transcript text.
///
/// Passages are time-ordered and non-overlapping; `end >= start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Accumulator-walk segmenter.
///
/// Adjacent segments merge when the silence gap between them is below the
/// configured threshold AND their sentence embeddings are semantically
/// similar. Requiring both conditions prevents over-fragmentation without
/// falsely merging unrelated adjacent speech.
pub struct Segmenter {
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    merge_gap_seconds: f64,
    semantic_threshold: f32,
}

impl Segmenter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retry: RetryPolicy,
        merge_gap_seconds: f64,
        semantic_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            retry,
            merge_gap_seconds,
            semantic_threshold,
        }
    }

    /// Merge time-ordered raw segments into passages
    pub async fn merge(&self, raw_segments: &[RawSegment]) -> PipelineResult<Vec<Passage>> {
        let mut passages = Vec::new();
        let mut current: Option<Passage> = None;

        for segment in raw_segments {
            let mut next = Passage {
                start: segment.start,
                end: segment.end.max(segment.start),
                text: segment.text.trim().to_string(),
            };

            if next.text.is_empty() {
                continue;
            }

            let Some(mut accumulator) = current.take() else {
                current = Some(next);
                continue;
            };

            let gap = next.start - accumulator.end;

            if gap < self.merge_gap_seconds && self.semantically_close(&accumulator.text, &next.text).await
            {
                accumulator.text.push(' ');
                accumulator.text.push_str(&next.text);
                accumulator.end = accumulator.end.max(next.end);
                current = Some(accumulator);
            } else {
                // Overlapping input split on the semantic condition must
                // not produce overlapping passages
                if next.start < accumulator.end {
                    next.start = accumulator.end;
                    next.end = next.end.max(next.start);
                }
                passages.push(accumulator);
                current = Some(next);
            }
        }

        // Flush the open accumulator
        if let Some(accumulator) = current {
            passages.push(accumulator);
        }

        tracing::debug!(
            raw = raw_segments.len(),
            merged = passages.len(),
            "Transcript segmentation complete"
        );

        Ok(passages)
    }

    async fn semantically_close(&self, current: &str, next: &str) -> bool {
        let a = with_retry_or(self.retry, "embed_text", Vec::new(), || {
            self.embedder.embed_text(current)
        })
        .await;
        let b = with_retry_or(self.retry, "embed_text", Vec::new(), || {
            self.embedder.embed_text(next)
        })
        .await;

        // Degraded embeddings compare as 0.0 and never merge, which keeps
        // passage boundaries conservative
        cosine_similarity(&a, &b) > self.semantic_threshold
    }
}
