use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Kind of a transient media file owned by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
}

/// A media file created by and owned by a single job.
///
/// Assets live under the job's private working subdirectory and are removed
/// unconditionally when the job reaches a terminal state.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub size_bytes: u64,
}

impl MediaAsset {
    /// Wrap an existing file as an asset, capturing its current byte size
    pub fn from_path(path: PathBuf, kind: AssetKind) -> Result<Self> {
        let metadata = fs_err::metadata(&path)?;
        Ok(Self {
            path,
            kind,
            size_bytes: metadata.len(),
        })
    }
}

/// Container-level information from ffprobe
#[derive(Debug, Clone, Default)]
pub struct ProbeInfo {
    pub duration: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Inspect a media file with ffprobe
pub async fn probe(path: &Path) -> Result<ProbeInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            &path.to_string_lossy(),
        ])
        .output()
        .await?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed for {}: {}", path.display(), error);
    }

    let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    let duration = info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok());

    let empty_vec = vec![];
    let streams = info["streams"].as_array().unwrap_or(&empty_vec);
    let has_video = streams
        .iter()
        .any(|stream| stream["codec_type"].as_str() == Some("video"));
    let has_audio = streams
        .iter()
        .any(|stream| stream["codec_type"].as_str() == Some("audio"));

    Ok(ProbeInfo {
        duration,
        has_video,
        has_audio,
    })
}

/// Validate that a candidate file is a decodable video container of
/// non-trivial size
pub async fn validate_video(path: &Path, min_bytes: u64) -> Result<()> {
    let metadata = fs_err::metadata(path)?;
    if metadata.len() < min_bytes {
        anyhow::bail!(
            "candidate {} is too small: {} bytes",
            path.display(),
            metadata.len()
        );
    }

    let info = probe(path).await?;
    if !info.has_video {
        anyhow::bail!("candidate {} has no video stream", path.display());
    }

    Ok(())
}
