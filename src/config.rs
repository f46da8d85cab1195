use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AntError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_max_dimensions")]
    pub max_dimensions: usize,
    #[serde(default = "default_max_request_body_mb")]
    pub max_request_body_mb: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; instances live under `<data_dir>/members/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_nlist")]
    pub default_nlist: usize,
    #[serde(default = "default_nprobe")]
    pub default_nprobe: usize,
    #[serde(default = "default_kmeans_max_iterations")]
    pub kmeans_max_iterations: usize,
    #[serde(default = "default_kmeans_convergence_epsilon")]
    pub kmeans_convergence_epsilon: f64,
    #[serde(default)]
    pub kmeans_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,
    #[serde(default = "default_backup_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_retention_interval")]
    pub retention_interval_secs: u64,
    #[serde(default = "default_max_keep_versions")]
    pub max_keep_versions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// Default value functions
fn default_host() -> String {
    std::env::var("ANT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}
fn default_port() -> u16 {
    env_parse("ANT_PORT").unwrap_or(8080)
}
fn default_request_timeout() -> u64 {
    env_parse("ANT_REQUEST_TIMEOUT_SECS").unwrap_or(30)
}
fn default_max_batch_size() -> usize {
    env_parse("ANT_MAX_BATCH_SIZE").unwrap_or(100_000)
}
fn default_max_top_k() -> usize {
    env_parse("ANT_MAX_TOP_K").unwrap_or(10_000)
}
fn default_max_dimensions() -> usize {
    env_parse("ANT_MAX_DIMENSIONS").unwrap_or(65_536)
}
fn default_max_request_body_mb() -> usize {
    env_parse("ANT_MAX_REQUEST_BODY_MB").unwrap_or(256)
}
fn default_shutdown_timeout_secs() -> u64 {
    env_parse("ANT_SHUTDOWN_TIMEOUT_SECS").unwrap_or(30)
}
fn default_data_dir() -> PathBuf {
    std::env::var("ANT_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./ant-data"))
}
fn default_nlist() -> usize {
    env_parse("ANT_DEFAULT_NLIST").unwrap_or(128)
}
fn default_nprobe() -> usize {
    env_parse("ANT_DEFAULT_NPROBE").unwrap_or(10)
}
fn default_kmeans_max_iterations() -> usize {
    25
}
fn default_kmeans_convergence_epsilon() -> f64 {
    1e-4
}
fn default_backup_enabled() -> bool {
    true
}
fn default_backup_interval() -> u64 {
    env_parse("ANT_BACKUP_INTERVAL_SECS").unwrap_or(3600)
}
fn default_retention_interval() -> u64 {
    env_parse("ANT_RETENTION_INTERVAL_SECS").unwrap_or(3600)
}
fn default_max_keep_versions() -> usize {
    env_parse("ANT_MAX_KEEP_VERSIONS").unwrap_or(3)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    std::env::var("ANT_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_batch_size: default_max_batch_size(),
            max_top_k: default_max_top_k(),
            max_dimensions: default_max_dimensions(),
            max_request_body_mb: default_max_request_body_mb(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            default_nlist: default_nlist(),
            default_nprobe: default_nprobe(),
            kmeans_max_iterations: default_kmeans_max_iterations(),
            kmeans_convergence_epsilon: default_kmeans_convergence_epsilon(),
            kmeans_seed: None,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_backup_enabled(),
            interval_secs: default_backup_interval(),
            retention_interval_secs: default_retention_interval(),
            max_keep_versions: default_max_keep_versions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    /// After loading, env var overrides are applied so that:
    /// env var > TOML file > defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    AntError::Config(format!("failed to read config file {p}: {e}"))
                })?;
                Self::from_toml(&content)?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AntError::Config(format!("failed to parse config: {e}")))
    }

    /// k-means settings for newly created instances.
    pub fn kmeans_params(&self) -> crate::types::KMeansParams {
        crate::types::KMeansParams {
            max_iterations: self.indexing.kmeans_max_iterations,
            epsilon: self.indexing.kmeans_convergence_epsilon,
            seed: self.indexing.kmeans_seed,
        }
    }

    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(v) = std::env::var("ANT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("ANT_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse("ANT_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("ANT_MAX_BATCH_SIZE") {
            self.server.max_batch_size = v;
        }
        if let Some(v) = env_parse("ANT_MAX_TOP_K") {
            self.server.max_top_k = v;
        }
        if let Some(v) = env_parse("ANT_MAX_DIMENSIONS") {
            self.server.max_dimensions = v;
        }
        if let Some(v) = env_parse("ANT_MAX_REQUEST_BODY_MB") {
            self.server.max_request_body_mb = v;
        }
        if let Some(v) = env_parse("ANT_SHUTDOWN_TIMEOUT_SECS") {
            self.server.shutdown_timeout_secs = v;
        }

        // Storage
        if let Ok(v) = std::env::var("ANT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }

        // Indexing
        if let Some(v) = env_parse("ANT_DEFAULT_NLIST") {
            self.indexing.default_nlist = v;
        }
        if let Some(v) = env_parse("ANT_DEFAULT_NPROBE") {
            self.indexing.default_nprobe = v;
        }
        if let Some(v) = env_parse("ANT_KMEANS_SEED") {
            self.indexing.kmeans_seed = Some(v);
        }

        // Backup
        if let Ok(v) = std::env::var("ANT_BACKUP_ENABLED") {
            self.backup.enabled = v == "true";
        }
        if let Some(v) = env_parse("ANT_BACKUP_INTERVAL_SECS") {
            self.backup.interval_secs = v;
        }
        if let Some(v) = env_parse("ANT_RETENTION_INTERVAL_SECS") {
            self.backup.retention_interval_secs = v;
        }
        if let Some(v) = env_parse("ANT_MAX_KEEP_VERSIONS") {
            self.backup.max_keep_versions = v;
        }

        // Logging
        if let Ok(v) = std::env::var("ANT_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
