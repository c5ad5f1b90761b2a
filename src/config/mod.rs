use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Typed configuration enumerating exactly the recognized options.
///
/// Unknown keys are rejected at load time rather than at first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Directory holding per-job transient subdirectories
    pub working_dir: PathBuf,

    /// Directory receiving finished documents and their frame images
    pub output_dir: PathBuf,

    /// Target number of representative frames per document
    pub max_frames: usize,

    /// Cadence strategy for candidate frame generation
    pub frame_mode: FrameMode,

    /// Lower bound on the spacing between candidate frames, in seconds
    pub min_frame_interval_seconds: f64,

    /// Speech-to-text model size (tiny, base, small, medium, large)
    pub transcription_model_size: String,

    /// Run model inference on GPU when available
    pub use_gpu: bool,

    /// Free-space safety margin the resource guard enforces
    pub min_free_space_mb: u64,

    /// Conservative size estimate for acquisitions whose size is unknown
    pub acquisition_estimate_mb: u64,

    /// Hard wall-clock ceiling per job, in seconds
    pub job_time_limit_seconds: u64,

    /// Retry budget for transient failures
    pub retry_count: u32,

    /// Maximum silence gap across which adjacent transcript segments merge
    pub merge_gap_seconds: f64,

    /// Minimum semantic similarity for adjacent transcript segments to merge
    pub semantic_merge_threshold: f32,

    /// Number of concurrent pipeline workers
    pub worker_concurrency: usize,

    /// How long terminal jobs are retained before being purged
    pub job_retention_seconds: u64,

    /// Interval between background stale-file sweeps
    pub sweep_interval_seconds: u64,

    /// Files older than this are removed by the background sweep
    pub sweep_max_age_seconds: u64,

    /// Base URL of the caption/embedding inference sidecar; when absent the
    /// vision engines run in degraded mode
    pub inference_endpoint: Option<String>,

    /// Cookies file handed to yt-dlp for authenticated sources
    pub cookies_file: Option<PathBuf>,
}

/// Cadence strategy selector for the frame sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameMode {
    /// Evenly spaced candidates across the duration
    Interval,
    /// Denser candidate generation, relying on diversity selection to prune
    Scenes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("working"),
            output_dir: PathBuf::from("output"),
            max_frames: 10,
            frame_mode: FrameMode::Interval,
            min_frame_interval_seconds: 2.0,
            transcription_model_size: "base".to_string(),
            use_gpu: false,
            min_free_space_mb: 500,
            acquisition_estimate_mb: 512,
            job_time_limit_seconds: 1800,
            retry_count: 3,
            merge_gap_seconds: 2.0,
            semantic_merge_threshold: 0.7,
            worker_concurrency: 1,
            job_retention_seconds: 3600,
            sweep_interval_seconds: 3600,
            sweep_max_age_seconds: 3600,
            inference_endpoint: None,
            cookies_file: None,
        }
    }
}

impl Config {
    /// Load configuration from file or fall back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("videodoc").join("config.yaml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            anyhow::bail!("max_frames must be at least 1");
        }

        if self.worker_concurrency == 0 {
            anyhow::bail!("worker_concurrency must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.semantic_merge_threshold) {
            anyhow::bail!("semantic_merge_threshold must be between 0.0 and 1.0");
        }

        if self.merge_gap_seconds < 0.0 {
            anyhow::bail!("merge_gap_seconds must not be negative");
        }

        if self.min_frame_interval_seconds <= 0.0 {
            anyhow::bail!("min_frame_interval_seconds must be positive");
        }

        if self.job_time_limit_seconds == 0 {
            anyhow::bail!("job_time_limit_seconds must be positive");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Working Dir: {}", self.working_dir.display());
        println!("  Output Dir: {}", self.output_dir.display());
        println!("  Max Frames: {}", self.max_frames);
        println!("  Frame Mode: {:?}", self.frame_mode);
        println!("  Model Size: {}", self.transcription_model_size);
        println!("  Use GPU: {}", self.use_gpu);
        println!("  Min Free Space: {} MB", self.min_free_space_mb);
        println!("  Job Time Limit: {} s", self.job_time_limit_seconds);
        println!("  Retry Count: {}", self.retry_count);
        println!("  Merge Gap: {} s", self.merge_gap_seconds);
        println!("  Merge Threshold: {}", self.semantic_merge_threshold);
        println!("  Workers: {}", self.worker_concurrency);
        match &self.inference_endpoint {
            Some(url) => println!("  Inference Endpoint: {}", url),
            None => println!("  Inference Endpoint: (disabled, degraded captions/embeddings)"),
        }
    }
}
