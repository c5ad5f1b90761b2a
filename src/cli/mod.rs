use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "videodoc",
    about = "Turn a source video into a structured, illustrated document",
    version,
    long_about = "Acquires a video from a URL or local path, extracts audio and representative \
frames, produces a time-aligned transcript, aligns transcript passages with frames, and renders \
a markdown document ready for paginated conversion."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a video into a document and wait for the result
    Process {
        /// URL or file path of the source video
        #[arg(value_name = "URL_OR_FILE")]
        source: String,

        /// Output directory (overrides the configured output_dir)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Target number of representative frames (overrides max_frames)
        #[arg(long, value_name = "COUNT")]
        max_frames: Option<usize>,

        /// Polling interval while waiting for the job, in milliseconds
        #[arg(long, default_value = "500")]
        poll_interval_ms: u64,
    },

    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Run one stale-file sweep over the working directory
    Sweep,

    /// List acquisition strategies in the order they are attempted
    Strategies,
}
