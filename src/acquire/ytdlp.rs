use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{Acquired, AcquireStrategy};
use crate::utils;

/// Primary remote fetch via yt-dlp
pub struct YtDlpStrategy {
    yt_dlp_path: String,
    cookies_file: Option<PathBuf>,
}

impl YtDlpStrategy {
    pub fn new(cookies_file: Option<PathBuf>) -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            cookies_file,
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl AcquireStrategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn supports(&self, source: &str) -> bool {
        utils::validate_and_normalize_url(source).is_ok()
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        if !self.check_availability().await {
            anyhow::bail!("yt-dlp is not available on PATH");
        }

        let output_template = dest_dir.join("source.%(ext)s");

        let mut command = Command::new(&self.yt_dlp_path);
        command.args([
            "--output",
            &output_template.to_string_lossy(),
            "--format",
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            "--no-playlist",
            "--print-json",
        ]);

        if let Some(cookies) = &self.cookies_file {
            command.args(["--cookies", &cookies.to_string_lossy()]);
        }

        command.arg(source);

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error);
        }

        let info: Value = serde_json::from_slice(&output.stdout)?;

        let title = info["title"].as_str().map(|s| s.to_string());
        let ext = info["ext"].as_str().unwrap_or("mp4");
        let path = dest_dir.join(format!("source.{}", ext));

        if !path.exists() {
            // Merged downloads may land under a different extension
            let fallback = find_downloaded_file(dest_dir)?;
            return Ok(Acquired {
                path: fallback,
                title,
            });
        }

        Ok(Acquired { path, title })
    }
}

fn find_downloaded_file(dest_dir: &Path) -> anyhow::Result<PathBuf> {
    for entry in fs_err::read_dir(dest_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file()
            && path
                .file_stem()
                .map(|s| s == "source")
                .unwrap_or(false)
        {
            return Ok(path);
        }
    }
    anyhow::bail!("yt-dlp reported success but no output file was found")
}
