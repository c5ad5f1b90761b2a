//! Acquisition chain: turn a source reference into a local video file.
//!
//! An ordered, deterministic list of strategies is tried in turn. Each
//! strategy produces a candidate file and validates it; invalid candidates
//! are discarded and the next strategy runs. The placeholder generator at
//! the end of the list always succeeds, so in practice the chain keeps the
//! job queue moving even when every real fetch fails.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::media::{self, AssetKind, MediaAsset};
use crate::{PipelineError, PipelineResult};

pub mod http;
pub mod local;
pub mod placeholder;
pub mod ytdlp;

/// Candidates smaller than this are rejected outright
pub const MIN_CANDIDATE_BYTES: u64 = 1024;

/// A fetched candidate video with optional source metadata
#[derive(Debug, Clone)]
pub struct Acquired {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// One strategy in the acquisition cascade
#[async_trait]
pub trait AcquireStrategy: Send + Sync {
    /// Name used in logs and the `strategies` CLI listing
    fn name(&self) -> &'static str;

    /// Whether this strategy applies to the given source reference
    fn supports(&self, source: &str) -> bool;

    /// Produce a candidate file under `dest_dir`
    async fn fetch(&self, source: &str, dest_dir: &Path) -> anyhow::Result<Acquired>;

    /// Validate a candidate: decodable video container, non-trivial size
    async fn validate(&self, candidate: &Path) -> anyhow::Result<()> {
        media::validate_video(candidate, MIN_CANDIDATE_BYTES).await
    }
}

/// Ordered acquisition cascade
pub struct AcquisitionChain {
    strategies: Vec<Box<dyn AcquireStrategy>>,
}

impl AcquisitionChain {
    /// Default strategy order: local copy, yt-dlp, generic HTTP fetch,
    /// synthetic placeholder
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategies: vec![
                Box::new(local::LocalFileStrategy::new()),
                Box::new(ytdlp::YtDlpStrategy::new(config.cookies_file.clone())),
                Box::new(http::HttpFetchStrategy::new()),
                Box::new(placeholder::PlaceholderStrategy::new()),
            ],
        }
    }

    /// Build a chain from explicit strategies, preserving order
    pub fn with_strategies(strategies: Vec<Box<dyn AcquireStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the cascade, returning the first validated candidate.
    ///
    /// Only returns an error when every strategy has failed, which the
    /// placeholder fallback makes practically unreachable.
    pub async fn acquire(
        &self,
        source: &str,
        dest_dir: &Path,
    ) -> PipelineResult<(MediaAsset, Option<String>)> {
        let mut last_error = String::from("no strategy supports this source");

        for strategy in &self.strategies {
            if !strategy.supports(source) {
                tracing::debug!(strategy = strategy.name(), "Strategy does not apply");
                continue;
            }

            tracing::info!(strategy = strategy.name(), source, "Attempting acquisition");

            let acquired = match strategy.fetch(source, dest_dir).await {
                Ok(acquired) => acquired,
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "Fetch failed");
                    last_error = format!("{}: {}", strategy.name(), e);
                    continue;
                }
            };

            if let Err(e) = strategy.validate(&acquired.path).await {
                tracing::warn!(
                    strategy = strategy.name(),
                    candidate = %acquired.path.display(),
                    error = %e,
                    "Candidate failed validation, discarding"
                );
                let _ = fs_err::remove_file(&acquired.path);
                last_error = format!("{}: {}", strategy.name(), e);
                continue;
            }

            let asset = MediaAsset::from_path(acquired.path, AssetKind::Video)
                .map_err(|e| PipelineError::AcquisitionFailed(e.to_string()))?;

            tracing::info!(
                strategy = strategy.name(),
                path = %asset.path.display(),
                size = asset.size_bytes,
                "Acquisition succeeded"
            );

            return Ok((asset, acquired.title));
        }

        Err(PipelineError::AcquisitionFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStrategy;

    #[async_trait]
    impl AcquireStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn supports(&self, _source: &str) -> bool {
            true
        }

        async fn fetch(&self, _source: &str, _dest_dir: &Path) -> anyhow::Result<Acquired> {
            anyhow::bail!("network unreachable")
        }
    }

    struct FileStrategy {
        title: Option<String>,
    }

    #[async_trait]
    impl AcquireStrategy for FileStrategy {
        fn name(&self) -> &'static str {
            "file"
        }

        fn supports(&self, _source: &str) -> bool {
            true
        }

        async fn fetch(&self, _source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
            let path = dest_dir.join("candidate.mp4");
            fs_err::write(&path, vec![0u8; 4096])?;
            Ok(Acquired {
                path,
                title: self.title.clone(),
            })
        }

        // Size-only validation so the test does not need ffprobe
        async fn validate(&self, candidate: &Path) -> anyhow::Result<()> {
            let metadata = fs_err::metadata(candidate)?;
            if metadata.len() < MIN_CANDIDATE_BYTES {
                anyhow::bail!("too small");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_terminal_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let chain = AcquisitionChain::with_strategies(vec![
            Box::new(FailingStrategy),
            Box::new(FailingStrategy),
            Box::new(FileStrategy {
                title: Some("fallback".into()),
            }),
        ]);

        let (asset, title) = chain
            .acquire("https://example.com/video", dir.path())
            .await
            .unwrap();

        assert_eq!(asset.kind, AssetKind::Video);
        assert_eq!(asset.size_bytes, 4096);
        assert_eq!(title.as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_chain_fails_only_when_all_strategies_fail() {
        let dir = tempfile::tempdir().unwrap();
        let chain = AcquisitionChain::with_strategies(vec![
            Box::new(FailingStrategy),
            Box::new(FailingStrategy),
        ]);

        let result = chain.acquire("https://example.com/video", dir.path()).await;

        match result {
            Err(PipelineError::AcquisitionFailed(msg)) => {
                assert!(msg.contains("network unreachable"));
            }
            other => panic!("expected AcquisitionFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_default_strategy_order_is_deterministic() {
        let chain = AcquisitionChain::from_config(&Config::default());
        assert_eq!(
            chain.strategy_names(),
            vec!["local-file", "yt-dlp", "http-fetch", "placeholder"]
        );
    }
}
