use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{Acquired, AcquireStrategy};
use crate::utils;

/// Generic HTTP streaming fetch, used when yt-dlp cannot handle the source
pub struct HttpFetchStrategy {
    client: Client,
}

impl HttpFetchStrategy {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Derive a display title from the URL's final path segment
    fn title_from_url(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|filename| !filename.is_empty())
            .map(|filename| {
                let name = match filename.rfind('.') {
                    Some(dot_pos) => &filename[..dot_pos],
                    None => filename,
                };
                urlencoding::decode(name)
                    .unwrap_or_else(|_| name.into())
                    .replace(['_', '-'], " ")
            })
    }

    fn extension_from_url(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|segments| segments.last().map(|s| s.to_string()))
            })
            .and_then(|filename| {
                Path::new(&filename)
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "mp4".to_string())
    }
}

impl Default for HttpFetchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquireStrategy for HttpFetchStrategy {
    fn name(&self) -> &'static str {
        "http-fetch"
    }

    fn supports(&self, source: &str) -> bool {
        utils::validate_and_normalize_url(source).is_ok()
    }

    async fn fetch(&self, source: &str, dest_dir: &Path) -> anyhow::Result<Acquired> {
        let response = self.client.get(source).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {} fetching {}", response.status(), source);
        }

        let dest = dest_dir.join(format!("fetched.{}", Self::extension_from_url(source)));
        let mut file = fs_err::File::create(&dest)?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
        }

        Ok(Acquired {
            path: dest,
            title: Self::title_from_url(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            HttpFetchStrategy::title_from_url("https://cdn.example.com/my_great-talk.mp4"),
            Some("my great talk".to_string())
        );
        assert_eq!(HttpFetchStrategy::title_from_url("not a url"), None);
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            HttpFetchStrategy::extension_from_url("https://example.com/clip.webm"),
            "webm"
        );
        assert_eq!(
            HttpFetchStrategy::extension_from_url("https://example.com/clip"),
            "mp4"
        );
    }
}
