mod args;
mod compositor;
mod config;
mod error;
mod export;
mod pipeline;
mod reddit;
mod scheduler;
mod utils;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::compositor::{Compositor, FfmpegBackend};
use crate::config::{PipelineSettings, ScheduleSettings};
use crate::export::DirExporter;
use crate::pipeline::Orchestrator;
use crate::reddit::RedditClient;
use crate::scheduler::{ArmStatus, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting reddit shorts pipeline");

    let source = RedditClient::new(&args.feed_base, Duration::from_secs(args.http_timeout_secs))?;
    let compositor = Compositor::new(Arc::new(FfmpegBackend::new(&args.ffmpeg)));
    let exporter = DirExporter::new(&args.out);
    info!("Videos will be written to {}", exporter.dir().display());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(source),
        compositor,
        Arc::new(exporter),
        PipelineSettings::from(&args),
    ));
    let settings = ScheduleSettings::from(&args);

    if args.once {
        let Some(request) = settings.run_request() else {
            error!("--subreddit and --background are required");
            anyhow::bail!("--subreddit and --background are required");
        };
        let result = orchestrator.run(&request).await?;
        info!(
            "Run complete: {}/{} exported{}",
            result.succeeded,
            result.submitted,
            if result.cancelled { " (cancelled)" } else { "" }
        );
        for failure in &result.failures {
            warn!(
                "Failed: {} ({}) - {:?}",
                failure.post.title, failure.post.permalink, failure.kind
            );
        }
        return Ok(());
    }

    let mut scheduler = Scheduler::new(Arc::new(orchestrator.clone()));
    match scheduler.configure(settings) {
        ArmStatus::Armed([first, second]) => info!(
            "{} timers armed, next runs at {} and {}",
            scheduler.armed_timers(),
            first.format("%Y-%m-%d %H:%M"),
            second.format("%Y-%m-%d %H:%M")
        ),
        ArmStatus::Deferred => {
            warn!("Nothing scheduled: set --subreddit and --background to enable runs")
        }
        ArmStatus::Invalid(reason) => {
            error!("Nothing scheduled: {}", reason);
            anyhow::bail!("invalid configuration: {}", reason);
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    scheduler.shutdown();
    orchestrator.shutdown();
    if orchestrator.is_running() {
        info!("Waiting for the active job to finish");
        orchestrator.wait_idle().await;
    }

    Ok(())
}
