use crate::error::{AppError, Result};
use crate::naming::parse_potential_percent;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search backend connection
    pub backend: BackendConfig,

    /// Naming of indexes and aliases
    pub index: IndexConfig,

    /// Target configuration per logical index type
    pub index_types: BTreeMap<String, IndexTypeSpec>,

    /// Reindex and migration tuning
    #[serde(default)]
    pub reindex: ReindexConfig,

    /// Desired-state documents
    #[serde(default)]
    pub desired: DesiredConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and the environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(
                std::env::var("SIM_CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string()),
            ),
        };

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::from(config_path).required(false))
            // Override with environment variables (prefix: SIM_)
            .add_source(
                config::Environment::with_prefix("SIM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every index type specification
    pub fn validate(&self) -> Result<()> {
        if self.index.base_name.is_empty() {
            return Err(AppError::Configuration(
                "index.base_name must not be empty".to_string(),
            ));
        }
        if self.index_types.is_empty() {
            return Err(AppError::Configuration(
                "at least one index type must be configured".to_string(),
            ));
        }
        for spec in self.index_types.values() {
            spec.validate()?;
        }
        Ok(())
    }

    /// Look up the specification for an index type
    pub fn index_type(&self, name: &str) -> Result<&IndexTypeSpec> {
        self.index_types.get(name).ok_or_else(|| {
            AppError::Configuration(format!(
                "index type must be one of: {}",
                self.index_types.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Http,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend implementation
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the search cluster
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password (from env var)
    pub password_env: Option<String>,

    /// API key (from env var); takes precedence over basic auth
    pub api_key_env: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn password(&self) -> Option<String> {
        self.password_env.as_ref().and_then(|var| std::env::var(var).ok())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env.as_ref().and_then(|var| std::env::var(var).ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Prefix of every index and alias; also the name of the global alias
    pub base_name: String,
}

/// Immutable target configuration for one logical index type
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct IndexTypeSpec {
    /// Desired primary shard count
    #[validate(range(min = 1))]
    pub shards: u32,

    /// Desired replica count
    #[serde(default)]
    pub replicas: u32,

    /// Documents per bulk chunk during reindex
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Tolerated fractional difference between source and destination counts
    #[serde(
        default = "default_acceptable_count_deviation",
        deserialize_with = "deserialize_fraction"
    )]
    #[validate(range(min = 0.0, max = 1.0))]
    pub acceptable_count_deviation: f64,

    /// Parallel reindex workers
    #[serde(default = "default_reindex_workers")]
    #[validate(range(min = 1))]
    pub reindex_workers: u32,
}

impl IndexTypeSpec {
    pub fn new(shards: u32, replicas: u32) -> Self {
        Self {
            shards,
            replicas,
            chunk_size: default_chunk_size(),
            acceptable_count_deviation: default_acceptable_count_deviation(),
            reindex_workers: default_reindex_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexConfig {
    /// Scroll cursor keep-alive (seconds)
    #[serde(default = "default_scroll_window")]
    pub scroll_window_secs: u64,

    /// Delay between shard status polls (milliseconds)
    #[serde(default = "default_shard_poll_interval")]
    pub shard_poll_interval_ms: u64,

    /// Log the unstarted shard count every this many polls
    #[serde(default = "default_shard_poll_log_every")]
    pub shard_poll_log_every: u32,

    /// Segment target for post-migration optimization
    #[serde(default = "default_optimize_max_segments")]
    pub optimize_max_segments: u32,
}

impl ReindexConfig {
    pub fn scroll_window(&self) -> Duration {
        Duration::from_secs(self.scroll_window_secs)
    }

    pub fn shard_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shard_poll_interval_ms)
    }
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            scroll_window_secs: default_scroll_window(),
            shard_poll_interval_ms: default_shard_poll_interval(),
            shard_poll_log_every: default_shard_poll_log_every(),
            optimize_max_segments: default_optimize_max_segments(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DesiredConfig {
    /// JSON or YAML analysis document replacing the built-in one
    pub analysis_path: Option<PathBuf>,

    /// JSON or YAML mapping document replacing the built-in one
    pub mapping_path: Option<PathBuf>,

    /// Allow prefix searches to match on any word of a title
    #[serde(default)]
    pub prefix_search_starts_with_any_word: bool,

    /// Phrase searches run against the suggestion analyzer
    #[serde(default)]
    pub phrase_use_text: bool,

    /// Store offsets for the experimental highlighter instead of term vectors
    #[serde(default)]
    pub optimize_for_experimental_highlighter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Write Prometheus metrics to this file when the run ends
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_textfile: None,
        }
    }
}

/// Accept `0.05`, `"0.05"` or `"5%"`
fn deserialize_fraction<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fraction {
        Number(f64),
        Text(String),
    }

    match Fraction::deserialize(deserializer)? {
        Fraction::Number(n) => Ok(n),
        Fraction::Text(s) => parse_potential_percent(&s).map_err(serde::de::Error::custom),
    }
}

// Default value functions
fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    1000
}

fn default_acceptable_count_deviation() -> f64 {
    0.05
}

fn default_reindex_workers() -> u32 {
    10
}

fn default_scroll_window() -> u64 {
    3600 // 1 hour
}

fn default_shard_poll_interval() -> u64 {
    1000
}

fn default_shard_poll_log_every() -> u32 {
    20
}

fn default_optimize_max_segments() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
