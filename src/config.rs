use crate::tuning::generator::GainPriors;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parameters of the live search, shared by every tuning group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Capacity of each group's population pool.
    pub max_population: usize,
    /// Generations (in pool-capacity units) before a full cold restart.
    pub max_generation: u32,
    /// Minimum movement time after an assignment before its window closes.
    pub settle_secs: f64,
    /// Base RNG seed; groups derive their own seeds from it.
    pub seed: Option<u64>,
    pub priors: GainPriors,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_population: 30,
            max_generation: 50,
            settle_secs: 5.0,
            seed: None,
            priors: GainPriors::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_dir: String,
    pub enable: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            enable: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Population log to replay; a CLI argument overrides this.
    pub input_file: Option<String>,
    pub output_dir: String,
    /// Remapped generations past this are dropped from the table.
    pub max_generation: i32,
    /// Gain sets per particle in the replayed log.
    pub members_per_particle: usize,
    /// How many of the best particles the JSON export carries.
    pub champion_count: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_file: None,
            output_dir: "logs".to_string(),
            max_generation: 100,
            members_per_particle: 2,
            champion_count: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub output: OutputConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_population == 0 {
            return Err(ConfigError::Invalid(
                "search.max_population must be at least 1".to_string(),
            ));
        }
        if self.search.max_generation == 0 {
            return Err(ConfigError::Invalid(
                "search.max_generation must be at least 1".to_string(),
            ));
        }
        if !(self.search.settle_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "search.settle_secs must be positive".to_string(),
            ));
        }
        if !(self.search.priors.gain_spread > 0.0) {
            return Err(ConfigError::Invalid(
                "search.priors.gain_spread must be positive".to_string(),
            ));
        }
        if !(self.search.priors.damping_min > 0.0
            && self.search.priors.damping_min < self.search.priors.damping_max)
        {
            return Err(ConfigError::Invalid(
                "search.priors damping interval must be positive and ordered".to_string(),
            ));
        }
        if self.analysis.members_per_particle == 0 {
            return Err(ConfigError::Invalid(
                "analysis.members_per_particle must be at least 1".to_string(),
            ));
        }
        if self.analysis.max_generation < 1 {
            return Err(ConfigError::Invalid(
                "analysis.max_generation must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
