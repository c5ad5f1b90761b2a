use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{Captioner, Embedder};
use crate::{PipelineError, PipelineResult};

/// Client for the captioning/embedding inference sidecar.
///
/// The sidecar exposes three endpoints: `POST /caption` and
/// `POST /embed_image` taking raw image bytes, and `POST /embed_text` taking
/// a JSON body. Connect and read timeouts are enforced per call.
pub struct InferenceClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl InferenceClient {
    pub fn new(base_url: &str) -> crate::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_image(&self, path: &str, image: &Path) -> PipelineResult<reqwest::Response> {
        let bytes = fs_err::read(image)
            .map_err(|e| PipelineError::ModelInference(format!("read {}: {}", image.display(), e)))?;

        let response = self
            .client
            .post(self.endpoint(path))
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response)
    }
}

fn map_request_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout(format!("inference call: {}", e))
    } else {
        PipelineError::ModelInference(format!("inference call: {}", e))
    }
}

fn check_status(response: reqwest::Response) -> PipelineResult<reqwest::Response> {
    if !response.status().is_success() {
        return Err(PipelineError::ModelInference(format!(
            "inference sidecar returned HTTP {}",
            response.status()
        )));
    }
    Ok(response)
}

#[async_trait]
impl Captioner for InferenceClient {
    async fn caption(&self, image: &Path) -> PipelineResult<String> {
        let response = self.post_image("caption", image).await?;

        let parsed: CaptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelInference(format!("caption response: {}", e)))?;

        Ok(parsed.caption)
    }
}

#[async_trait]
impl Embedder for InferenceClient {
    async fn embed_text(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let response = self
            .client
            .post(self.endpoint("embed_text"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(map_request_error)?;

        let response = check_status(response)?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelInference(format!("embed_text response: {}", e)))?;

        Ok(parsed.embedding)
    }

    async fn embed_image(&self, image: &Path) -> PipelineResult<Vec<f32>> {
        let response = self.post_image("embed_image", image).await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelInference(format!("embed_image response: {}", e)))?;

        Ok(parsed.embedding)
    }
}
