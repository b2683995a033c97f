use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Run-frequency below which a path is not persisted on first sighting.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,
    /// Hard recursion cap for the structural walker.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Number of leading array elements walked per array.
    #[serde(default = "default_array_sample")]
    pub array_sample: usize,
    /// Sample values collected per path within one run.
    #[serde(default = "default_run_sample_cap")]
    pub run_sample_cap: usize,
    /// Sample values retained per path in the persistent catalog.
    #[serde(default = "default_catalog_sample_cap")]
    pub catalog_sample_cap: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            noise_threshold: default_noise_threshold(),
            max_depth: default_max_depth(),
            array_sample: default_array_sample(),
            run_sample_cap: default_run_sample_cap(),
            catalog_sample_cap: default_catalog_sample_cap(),
        }
    }
}

fn default_noise_threshold() -> f64 {
    0.05
}
fn default_max_depth() -> usize {
    32
}
fn default_array_sample() -> usize {
    3
}
fn default_run_sample_cap() -> usize {
    5
}
fn default_catalog_sample_cap() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Minimum catalog frequency for a field to enter a scoring batch.
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f64,
    /// Maximum fields per scoring batch, frequency-descending.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
    /// Relevance scores below this are dropped even if the collaborator
    /// returns them.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            min_frequency: default_min_frequency(),
            batch_limit: default_batch_limit(),
            min_score: default_min_score(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ScoringConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_min_frequency() -> f64 {
    0.1
}
fn default_batch_limit() -> i64 {
    100
}
fn default_min_score() -> f64 {
    3.0
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate discovery
    if !(0.0..=1.0).contains(&config.discovery.noise_threshold) {
        anyhow::bail!("discovery.noise_threshold must be in [0.0, 1.0]");
    }
    if config.discovery.max_depth == 0 {
        anyhow::bail!("discovery.max_depth must be > 0");
    }
    if config.discovery.array_sample == 0 {
        anyhow::bail!("discovery.array_sample must be > 0");
    }
    if config.discovery.run_sample_cap == 0 || config.discovery.catalog_sample_cap == 0 {
        anyhow::bail!("discovery sample caps must be > 0");
    }

    // Validate scoring
    if !(0.0..=1.0).contains(&config.scoring.min_frequency) {
        anyhow::bail!("scoring.min_frequency must be in [0.0, 1.0]");
    }
    if !(0.0..=10.0).contains(&config.scoring.min_score) {
        anyhow::bail!("scoring.min_score must be in [0.0, 10.0]");
    }
    if config.scoring.batch_limit < 1 {
        anyhow::bail!("scoring.batch_limit must be >= 1");
    }
    if config.scoring.is_enabled() && config.scoring.model.is_none() {
        anyhow::bail!(
            "scoring.model must be specified when provider is '{}'",
            config.scoring.provider
        );
    }
    match config.scoring.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown scoring provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
