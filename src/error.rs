use serde::{Deserialize, Serialize};

/// Error taxonomy for the processing pipeline.
///
/// Every stage reports failure through one of these kinds rather than a
/// stage-specific error type. Cascading fallback chains absorb as many
/// failures as they can; only the final kind plus a human-readable cause
/// reaches the job's error field.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Every acquisition strategy, including the placeholder generator, failed
    #[error("acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// Every audio extraction tier, including the silence generator, failed
    #[error("audio extraction failed: {0}")]
    ExtractionFailed(String),

    /// The resource guard denied admission for a disk/memory-consuming step
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A speech-to-text, captioning, or embedding call failed
    #[error("model inference failed: {0}")]
    ModelInference(String),

    /// Wall-clock or per-call time limit exceeded
    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed submission, e.g. an empty source reference
    #[error("invalid submission: {0}")]
    Validation(String),

    /// The job's cancellation flag was set between stages
    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::AcquisitionFailed(_) => ErrorKind::AcquisitionFailed,
            PipelineError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            PipelineError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            PipelineError::ModelInference(_) => ErrorKind::ModelInference,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transient failures (model inference, timeouts) are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelInference(_) | PipelineError::Timeout(_)
        )
    }
}

/// Discriminant of [`PipelineError`], stored on failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AcquisitionFailed,
    ExtractionFailed,
    ResourceExhausted,
    ModelInference,
    Timeout,
    Validation,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::AcquisitionFailed => "acquisition_failed",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::ModelInference => "model_inference",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(PipelineError::ModelInference("caption call failed".into()).is_retryable());
        assert!(PipelineError::Timeout("read timed out".into()).is_retryable());
        assert!(!PipelineError::Validation("no source".into()).is_retryable());
        assert!(!PipelineError::ResourceExhausted("disk full".into()).is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::AcquisitionFailed("x".into()).kind(),
            ErrorKind::AcquisitionFailed
        );
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
