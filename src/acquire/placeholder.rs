use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{Acquired, AcquireStrategy};

/// Terminal fallback: generate a short synthetic video with silent audio.
///
/// Guarantees the pipeline can continue in degraded mode instead of stalling
/// the job queue when every real fetch strategy has failed.
pub struct PlaceholderStrategy {
    duration_seconds: u32,
}

impl PlaceholderStrategy {
    pub fn new() -> Self {
        Self {
            duration_seconds: 10,
        }
    }
}

impl Default for PlaceholderStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquireStrategy for PlaceholderStrategy {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn supports(&self, _source: &str) -> bool {
        true
    }

    async fn fetch(&self, _source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        let dest = dest_dir.join("placeholder.mp4");
        let duration = self.duration_seconds.to_string();

        let output = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "lavfi",
                "-i",
                &format!("color=c=black:s=640x360:r=10:d={}", duration),
                "-f",
                "lavfi",
                "-i",
                "anullsrc=r=16000:cl=mono",
                "-t",
                &duration,
                "-pix_fmt",
                "yuv420p",
                &dest.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("placeholder generation failed: {}", error);
        }

        Ok(Acquired {
            path: dest,
            title: None,
        })
    }
}
