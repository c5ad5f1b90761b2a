use async_trait::async_trait;
use std::path::Path;

use super::{Acquired, AcquireStrategy};
use crate::utils;

/// Copies a local video file into the job's working directory.
///
/// The copy keeps the job-ownership invariant: the original file belongs to
/// the caller and must survive cleanup, so the job works on its own copy.
pub struct LocalFileStrategy;

impl LocalFileStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalFileStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquireStrategy for LocalFileStrategy {
    fn name(&self) -> &'static str {
        "local-file"
    }

    fn supports(&self, source: &str) -> bool {
        utils::is_local_reference(source) && Path::new(source).is_file()
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        let source_path = Path::new(source);

        let extension = source_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        let dest = dest_dir.join(format!("source.{}", extension));

        tokio::fs::copy(source_path, &dest).await?;

        let title = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());

        Ok(Acquired { path: dest, title })
    }
}
