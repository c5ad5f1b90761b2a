use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use videodoc::acquire::AcquisitionChain;
use videodoc::extract::ExtractionChain;
use videodoc::guard::ResourceGuard;
use videodoc::jobs::{InMemoryJobStore, Orchestrator};
use videodoc::{utils, Cli, Commands, Config, JobStatus, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "videodoc=debug"
    } else {
        "videodoc=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Check for required external dependencies (non-fatal in Docker)
    let missing_deps = utils::check_dependencies().await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    let config = Config::load().await?;

    match cli.command {
        Commands::Process {
            source,
            output,
            max_frames,
            poll_interval_ms,
        } => {
            let mut config = config;
            if let Some(dir) = output {
                config.output_dir = dir;
            }
            if let Some(count) = max_frames {
                config.max_frames = count;
            }
            config.validate()?;

            let pipeline = Arc::new(Pipeline::from_config(&config)?);
            let store = Arc::new(InMemoryJobStore::new());
            let orchestrator = Orchestrator::start(pipeline, store, &config);

            let job_id = orchestrator.submit(&source).await?;
            tracing::info!(%job_id, "Submitted {}", source);

            let spinner = if cli.quiet {
                None
            } else {
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
                {
                    spinner.set_style(style);
                }
                spinner.enable_steady_tick(Duration::from_millis(120));
                spinner.set_message("queued (0%)");
                Some(spinner)
            };

            loop {
                tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;

                let Some(job) = orchestrator.status(job_id).await else {
                    anyhow::bail!("job {} disappeared from the store", job_id);
                };

                if let Some(spinner) = &spinner {
                    spinner.set_message(format!("{} ({}%)", job.status, job.progress));
                }

                if !job.status.is_terminal() {
                    continue;
                }

                if let Some(spinner) = &spinner {
                    spinner.finish_and_clear();
                }

                match job.status {
                    JobStatus::Succeeded => match job.result {
                        Some(path) => println!("Document written to: {}", path.display()),
                        None => println!("Job succeeded"),
                    },
                    JobStatus::Failed => {
                        let kind = job
                            .error_kind
                            .map(|k| k.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        let cause = job
                            .error
                            .unwrap_or_else(|| "no cause recorded".to_string());
                        anyhow::bail!("job failed ({}): {}", kind, cause);
                    }
                    _ => {}
                }
                break;
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Run `videodoc config --show` to print the effective configuration.");
                println!("Settings are read from ./config.yaml or the user config directory.");
            }
        }
        Commands::Sweep => {
            let guard = ResourceGuard::new(config.min_free_space_mb);
            let max_age = Duration::from_secs(config.sweep_max_age_seconds);

            let mut removed = 0;
            for dir in [&config.working_dir, &config.output_dir] {
                if dir.exists() {
                    removed += guard.sweep(dir, max_age)?;
                }
            }
            println!("Removed {} stale file(s)", removed);
        }
        Commands::Strategies => {
            let chain = AcquisitionChain::from_config(&config);
            println!("Acquisition strategies, in order:");
            for name in chain.strategy_names() {
                println!("  • {}", name);
            }

            let tiers =
                ExtractionChain::new(Arc::new(ResourceGuard::new(config.min_free_space_mb)));
            println!("Audio extraction tiers, in order:");
            for name in tiers.tier_names() {
                println!("  • {}", name);
            }
        }
    }

    Ok(())
}
