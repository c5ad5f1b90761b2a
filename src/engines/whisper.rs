use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{RawSegment, SpeechToText};
use crate::{PipelineError, PipelineResult};

/// Speech-to-text engine backed by the `whisper` command-line tool.
///
/// The model is loaded by the external process on each call; the binary keeps
/// its own model cache, so repeated jobs do not re-download weights.
pub struct WhisperTranscriber {
    binary: String,
    model_size: String,
    use_gpu: bool,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperTranscriber {
    pub fn new(model_size: &str, use_gpu: bool) -> Self {
        Self {
            binary: "whisper".to_string(),
            model_size: model_size.to_string(),
            use_gpu,
        }
    }

    /// Check if the whisper binary is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<RawSegment>> {
        let output_dir = tempfile::tempdir()
            .map_err(|e| PipelineError::ModelInference(format!("temp dir: {}", e)))?;

        let device = if self.use_gpu { "cuda" } else { "cpu" };
        tracing::debug!(
            audio = %audio.display(),
            model = %self.model_size,
            device,
            "Running whisper transcription"
        );

        let output = Command::new(&self.binary)
            .args([
                &audio.to_string_lossy() as &str,
                "--model",
                &self.model_size,
                "--device",
                device,
                "--output_format",
                "json",
                "--output_dir",
                &output_dir.path().to_string_lossy(),
                "--verbose",
                "False",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::ModelInference(format!("whisper spawn: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ModelInference(format!(
                "whisper exited with {}: {}",
                output.status, error
            )));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let json_path = output_dir.path().join(format!("{}.json", stem));

        let content = fs_err::read_to_string(&json_path)
            .map_err(|e| PipelineError::ModelInference(format!("whisper output: {}", e)))?;

        let parsed: WhisperOutput = serde_json::from_str(&content)
            .map_err(|e| PipelineError::ModelInference(format!("whisper json: {}", e)))?;

        let segments = parsed
            .segments
            .into_iter()
            .map(|s| RawSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .filter(|s| !s.text.is_empty())
            .collect();

        Ok(segments)
    }
}
