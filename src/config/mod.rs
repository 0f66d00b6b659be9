//! Configuration loading and validation.
//!
//! Layers, later wins: built-in defaults, an optional TOML file, then
//! `LEAGUE_STATS__*` environment variables (`__` separates sections, e.g.
//! `LEAGUE_STATS__PIPELINE__WINDOW_SIZE=3`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::merge::MergePolicy;
use crate::pipeline::PipelineConfig;
use crate::ranking::RankingConfig;
use crate::storage::StorageConfig;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LEAGUE_STATS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Raw fact inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// JSONL file of per-round records
    #[serde(default = "default_rounds_path")]
    pub rounds_path: PathBuf,

    /// JSONL file of per-player match results. Optional on disk.
    #[serde(default = "default_outcomes_path")]
    pub outcomes_path: PathBuf,
}

fn default_rounds_path() -> PathBuf {
    PathBuf::from("./input/rounds.jsonl")
}

fn default_outcomes_path() -> PathBuf {
    PathBuf::from("./input/outcomes.jsonl")
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rounds_path: default_rounds_path(),
            outcomes_path: default_outcomes_path(),
        }
    }
}

/// Run tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Matches per recent-form window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default)]
    pub merge_policy: MergePolicy,
}

fn default_max_concurrent_queries() -> usize {
    8
}

fn default_window_size() -> usize {
    5
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            window_size: default_window_size(),
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub ranking: RankingConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            source: SourceConfig::default(),
            pipeline: PipelineSettings::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent_queries == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_queries must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "window_size must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("k_factor", self.ranking.k_factor),
            ("scale", self.ranking.scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "ranking {} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if !self.ranking.initial_rating.is_finite() {
            return Err(ConfigError::ValidationError(
                "ranking initial_rating must be finite".to_string(),
            ));
        }

        Ok(())
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::new(self.data_dir.clone())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            storage: self.storage_config(),
            max_concurrent_queries: self.pipeline.max_concurrent_queries,
            window_size: self.pipeline.window_size,
            merge_policy: self.pipeline.merge_policy,
        }
    }
}
