use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::concurrency_budget::split_budget;

/// Upper bound for the shared concurrency budget
const MAX_TOTAL_CONCURRENCY: usize = 1024;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid total_concurrency: {0}. Must be between 2 and {MAX_TOTAL_CONCURRENCY}")]
    InvalidTotalConcurrency(usize),

    #[error("Invalid ingest_ratio: {ratio}. With total {total} both pools need at least one permit")]
    InvalidIngestRatio { total: usize, ratio: f64 },

    #[error("Invalid max_concurrent_encodes: {0}. Must be at least 1")]
    InvalidEncoderConcurrency(usize),

    #[error("Invalid sampling: chunk_words ({0}) and sample_chunks ({1}) must be at least 1")]
    InvalidSampling(usize, usize),

    #[error("Invalid top_k: {0}. Must be at least 1")]
    InvalidTopK(usize),

    #[error("Invalid num_candidates: {num_candidates}. Must be at least top_k ({top_k})")]
    InvalidCandidatePool { num_candidates: usize, top_k: usize },

    #[error("Cache prefix cannot be empty")]
    EmptyCachePrefix,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .vaultsearch/config.yaml (project config)
    /// 3. .vaultsearch/local.yaml (local overrides, optional)
    /// 4. Environment variables (VAULTSEARCH_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".vaultsearch/config.yaml"))
            .merge(Yaml::file(".vaultsearch/local.yaml"))
            .merge(Env::prefixed("VAULTSEARCH_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("VAULTSEARCH_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let budget = &config.budget;
        if budget.total_concurrency < 2 || budget.total_concurrency > MAX_TOTAL_CONCURRENCY {
            return Err(ConfigError::InvalidTotalConcurrency(budget.total_concurrency));
        }
        if split_budget(budget.total_concurrency, budget.ingest_ratio).is_err() {
            return Err(ConfigError::InvalidIngestRatio {
                total: budget.total_concurrency,
                ratio: budget.ingest_ratio,
            });
        }

        if config.encoder.max_concurrent_encodes == 0 {
            return Err(ConfigError::InvalidEncoderConcurrency(
                config.encoder.max_concurrent_encodes,
            ));
        }

        let sampling = &config.sampling;
        if sampling.chunk_words == 0 || sampling.sample_chunks == 0 {
            return Err(ConfigError::InvalidSampling(
                sampling.chunk_words,
                sampling.sample_chunks,
            ));
        }

        if config.search.top_k == 0 {
            return Err(ConfigError::InvalidTopK(config.search.top_k));
        }
        if config.search.num_candidates < config.search.top_k {
            return Err(ConfigError::InvalidCandidatePool {
                num_candidates: config.search.num_candidates,
                top_k: config.search.top_k,
            });
        }

        if config.cache.prefix.is_empty() {
            return Err(ConfigError::EmptyCachePrefix);
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
