use serde::{Deserialize, Serialize};

use super::embedding::EmbeddingModelKind;

/// Main configuration structure for vaultsearch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Encoder resource manager settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Ingest/search concurrency split
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Chunking and sampling parameters
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Search tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// Primary vector cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Encoder resource manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EncoderConfig {
    /// Which model backend to load
    #[serde(default)]
    pub model: EmbeddingModelKind,

    /// Seconds with zero leases before the model is unloaded
    #[serde(default = "default_idle_unload_secs")]
    pub idle_unload_secs: u64,

    /// Encode calls allowed in flight at once
    #[serde(default = "default_max_concurrent_encodes")]
    pub max_concurrent_encodes: usize,

    /// Process RSS above which the model is reloaded before encoding.
    /// `None` disables the pressure check.
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: Option<u64>,

    /// L2-normalize query embeddings
    #[serde(default = "default_normalize_embeddings")]
    pub normalize_embeddings: bool,
}

const fn default_idle_unload_secs() -> u64 {
    30
}

const fn default_max_concurrent_encodes() -> usize {
    2
}

#[allow(clippy::unnecessary_wraps)]
const fn default_memory_threshold_mb() -> Option<u64> {
    Some(2048)
}

const fn default_normalize_embeddings() -> bool {
    true
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModelKind::default(),
            idle_unload_secs: default_idle_unload_secs(),
            max_concurrent_encodes: default_max_concurrent_encodes(),
            memory_threshold_mb: default_memory_threshold_mb(),
            normalize_embeddings: default_normalize_embeddings(),
        }
    }
}

/// Concurrency budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Total permits shared by ingestion and search
    #[serde(default = "default_total_concurrency")]
    pub total_concurrency: usize,

    /// Fraction of the total given to ingestion, rounded down
    #[serde(default = "default_ingest_ratio")]
    pub ingest_ratio: f64,
}

const fn default_total_concurrency() -> usize {
    8
}

const fn default_ingest_ratio() -> f64 {
    0.75
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_concurrency: default_total_concurrency(),
            ingest_ratio: default_ingest_ratio(),
        }
    }
}

/// Chunking and sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SamplingConfig {
    /// Words per chunk
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,

    /// Maximum chunks encoded per document
    #[serde(default = "default_sample_chunks")]
    pub sample_chunks: usize,

    /// Characters of leading text kept as the cache snippet
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

const fn default_chunk_words() -> usize {
    200
}

const fn default_sample_chunks() -> usize {
    5
}

const fn default_snippet_chars() -> usize {
    200
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            sample_chunks: default_sample_chunks(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// Unique documents returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidate pool considered by the secondary backend
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,

    /// Name of the primary vector index
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

const fn default_top_k() -> usize {
    5
}

const fn default_num_candidates() -> usize {
    100
}

fn default_index_name() -> String {
    "doc_index".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            num_candidates: default_num_candidates(),
            index_name: default_index_name(),
        }
    }
}

/// Primary vector cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Key prefix prepended to content hashes
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,

    /// Maximum number of resident entries
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,

    /// Seconds an untouched entry stays resident
    #[serde(default = "default_time_to_idle_secs")]
    pub time_to_idle_secs: u64,
}

fn default_cache_prefix() -> String {
    "doc:".to_string()
}

const fn default_cache_capacity() -> u64 {
    10_000
}

const fn default_time_to_idle_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_cache_prefix(),
            max_capacity: default_cache_capacity(),
            time_to_idle_secs: default_time_to_idle_secs(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".vaultsearch/vaultsearch.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.encoder.idle_unload_secs, 30);
        assert_eq!(config.encoder.max_concurrent_encodes, 2);
        assert_eq!(config.budget.total_concurrency, 8);
        assert!((config.budget.ingest_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.sampling.chunk_words, 200);
        assert_eq!(config.sampling.sample_chunks, 5);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.num_candidates, 100);
        assert_eq!(config.cache.prefix, "doc:");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "budget:\n  total_concurrency: 4\nsearch:\n  top_k: 3\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.budget.total_concurrency, 4);
        assert!((config.budget.ingest_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.index_name, "doc_index");
    }
}
