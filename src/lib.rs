//! videodoc - turns a source video into a structured, illustrated document
//!
//! This library acquires a video, extracts its audio and representative frames,
//! produces a time-aligned transcript, aligns transcript passages with frames,
//! and renders the result as a markdown document ready for an external
//! paginated-document renderer.

pub mod acquire;
pub mod align;
pub mod cli;
pub mod config;
pub mod engines;
pub mod error;
pub mod extract;
pub mod frames;
pub mod guard;
pub mod jobs;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod segment;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{ErrorKind, PipelineError};
pub use jobs::{Job, JobId, JobStatus};
pub use pipeline::Pipeline;

/// Result type used at application seams
pub type Result<T> = anyhow::Result<T>;

/// Result type used inside the pipeline, carrying the error taxonomy
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
