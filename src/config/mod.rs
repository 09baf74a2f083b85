use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_FIELD: &str = "elevation";
pub const DEFAULT_DEM_DATASET: &str = "USGS/3DEP/10m";
pub const DEFAULT_SCALE_M: f64 = 10.0;
pub const DEFAULT_SENTINEL: f64 = -9999.0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Optional settings read from a YAML file. Anything left out falls back to
/// the CLI flag or the built-in default during resolution.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SamplingConfig {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub dem_dataset: Option<String>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub sentinel: Option<f64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SamplingConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Fully resolved options for one pipeline run. CLI flags take precedence
/// over the config file, which takes precedence over the defaults above.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub field: String,
    pub dem_dataset: String,
    pub scale_m: f64,
    pub endpoint: String,
    pub sentinel: f64,
    pub timeout_secs: u64,
}
