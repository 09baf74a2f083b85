use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    DEFAULT_DEM_DATASET, DEFAULT_FIELD, DEFAULT_SCALE_M, DEFAULT_SENTINEL, DEFAULT_TIMEOUT_SECS,
    RunOptions, SamplingConfig,
};
use crate::pipeline::{self, RunSummary};
use crate::sampler::RemoteSampler;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input vector dataset (GeoJSON FeatureCollection), mutated in place
    #[arg(short, long)]
    pub input: PathBuf,

    /// Sampling service endpoint URL
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Attribute field to populate (default: elevation)
    #[arg(long)]
    pub field: Option<String>,

    /// DEM dataset identifier (default: USGS/3DEP/10m)
    #[arg(long)]
    pub dem_dataset: Option<String>,

    /// Sampling resolution in meters (default: 10)
    #[arg(long)]
    pub scale: Option<f64>,

    /// Value written when the service has no elevation (default: -9999)
    #[arg(long)]
    pub sentinel: Option<f64>,

    /// Request timeout in seconds (default: 60)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Sampling configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Merges CLI flags over the config file over the built-in defaults. The
/// endpoint is the one setting with no default; it must come from one of
/// the two sources.
pub fn resolve_options(cli: &Cli, file: SamplingConfig) -> Result<RunOptions> {
    let endpoint = cli
        .endpoint
        .clone()
        .or(file.endpoint)
        .context("CLI: no sampling endpoint; pass --endpoint or set it in the config file")?;

    Ok(RunOptions {
        field: cli
            .field
            .clone()
            .or(file.field)
            .unwrap_or_else(|| DEFAULT_FIELD.to_string()),
        dem_dataset: cli
            .dem_dataset
            .clone()
            .or(file.dem_dataset)
            .unwrap_or_else(|| DEFAULT_DEM_DATASET.to_string()),
        scale_m: cli.scale.or(file.scale).unwrap_or(DEFAULT_SCALE_M),
        endpoint,
        sentinel: cli.sentinel.or(file.sentinel).unwrap_or(DEFAULT_SENTINEL),
        timeout_secs: cli
            .timeout
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    })
}

pub fn run(cli: &Cli) -> Result<RunSummary> {
    let file = match &cli.config {
        Some(path) => SamplingConfig::load(path)
            .with_context(|| format!("CLI: failed to load config {}", path.display()))?,
        None => SamplingConfig::default(),
    };
    let options = resolve_options(cli, file)?;

    tracing::info!(
        "Sampling {} at {} m against {}",
        options.dem_dataset,
        options.scale_m,
        options.endpoint
    );

    let sampler = RemoteSampler::new(
        options.endpoint.clone(),
        options.dem_dataset.clone(),
        options.scale_m,
        Duration::from_secs(options.timeout_secs),
    )?;

    pipeline::run(&cli.input, &options.field, options.sentinel, &sampler)
}
