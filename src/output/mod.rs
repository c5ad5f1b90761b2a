//! Document assembly and markdown rendering.
//!
//! The markdown is structured for downstream paginated-document conversion:
//! a title heading, then one timestamped section per passage with its
//! illustrating frame (when one exists) referenced by a path relative to the
//! output directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::align::AlignedPassage;
use crate::utils::{format_duration, sanitize_filename};

/// Finished document: a title plus time-ordered, illustrated passages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub passages: Vec<AlignedPassage>,
}

impl Document {
    pub fn new(title: String, passages: Vec<AlignedPassage>) -> Self {
        Self { title, passages }
    }
}

/// Render the document and write it under `output_dir`.
///
/// The filename is derived from the sanitized title so documents from
/// different sources do not collide on a generic name.
pub fn write_markdown(document: &Document, output_dir: &Path) -> Result<PathBuf> {
    fs_err::create_dir_all(output_dir).context("Failed to create output directory")?;

    let mut stem = sanitize_filename(&document.title);
    if stem.is_empty() {
        stem = "document".to_string();
    }

    let path = output_dir.join(format!("{}.md", stem));
    let markdown = render_markdown(document, output_dir);

    fs_err::write(&path, markdown).context("Failed to write document")?;
    tracing::info!(path = %path.display(), "Document written");

    Ok(path)
}

/// Render markdown with image references relative to `output_dir`
pub fn render_markdown(document: &Document, output_dir: &Path) -> String {
    let mut out = format!("# {}\n\n", document.title);

    for aligned in &document.passages {
        out.push_str(&format!(
            "## {}\n\n",
            format_duration(aligned.passage.start)
        ));

        if let Some(frame) = &aligned.frame {
            let image = relative_to(&frame.image_path, output_dir);
            let alt = frame.caption.as_deref().unwrap_or("video frame");
            out.push_str(&format!("![{}]({})\n\n", alt, image.display()));

            if let Some(caption) = &frame.caption {
                out.push_str(&format!("*{}*\n\n", caption));
            }
        }

        out.push_str(&aligned.passage.text);
        out.push_str("\n\n");
    }

    out
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;
    use crate::segment::Passage;

    fn aligned(start: f64, text: &str, frame: Option<Frame>) -> AlignedPassage {
        AlignedPassage {
            passage: Passage {
                start,
                end: start + 5.0,
                text: text.to_string(),
            },
            frame,
        }
    }

    #[test]
    fn test_render_includes_title_and_sections() {
        let doc = Document::new(
            "Intro to Ownership".to_string(),
            vec![
                aligned(0.0, "Welcome to the talk.", None),
                aligned(65.0, "Ownership rules.", None),
            ],
        );

        let markdown = render_markdown(&doc, Path::new("output"));
        assert!(markdown.starts_with("# Intro to Ownership\n"));
        assert!(markdown.contains("## 0s"));
        assert!(markdown.contains("## 1m 5s"));
        assert!(markdown.contains("Ownership rules."));
    }

    #[test]
    fn test_render_image_paths_relative_to_output_dir() {
        let frame = Frame {
            timestamp: 3.0,
            image_path: PathBuf::from("output/screenshots/job/frame_0000.jpg"),
            caption: Some("a slide".to_string()),
            embedding: vec![],
        };
        let doc = Document::new("T".to_string(), vec![aligned(0.0, "Text.", Some(frame))]);

        let markdown = render_markdown(&doc, Path::new("output"));
        assert!(markdown.contains("![a slide](screenshots/job/frame_0000.jpg)"));
        assert!(markdown.contains("*a slide*"));
    }

    #[test]
    fn test_render_passage_without_frame_has_no_image() {
        let doc = Document::new("T".to_string(), vec![aligned(0.0, "Text.", None)]);
        assert!(!render_markdown(&doc, Path::new("output")).contains("!["));
    }

    #[test]
    fn test_write_uses_sanitized_title_filename() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Document::new("My Talk: Part 1/2".to_string(), vec![]);

        let path = write_markdown(&doc, dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".md"));
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }
}
