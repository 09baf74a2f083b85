mod app;
mod config;
mod dataset;
mod geom;
mod pipeline;
mod sampler;

use anyhow::Result;
use clap::Parser;

use app::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let start = std::time::Instant::now();
    let summary = app::run(&cli)?;

    tracing::info!(
        "Done! Wrote {} of {} features ({} sampled) in {:.2}s",
        summary.written_count,
        summary.feature_count,
        summary.sampled_count,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
