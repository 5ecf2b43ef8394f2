//! Application configuration - connection defaults, process thresholds and
//! model hyperparameters as operator-tunable TOML values.
//!
//! Every section implements `Default` with the original constants, so a
//! missing or partial config file changes nothing. The loaded struct is
//! constructed once at startup and passed by reference to the store,
//! importer and forecaster; there is no global singleton.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Root configuration.
///
/// Load with [`AppConfig::load`], which searches:
/// 1. `$SULFEX_CONFIG` env var
/// 2. `./sulfex.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External production database connection defaults
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Process alarm thresholds
    #[serde(default)]
    pub process: ProcessConfig,

    /// Forecasting model hyperparameters
    #[serde(default)]
    pub model: ModelConfig,
}

/// External production database connection defaults plus the local store path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Remote SQL dialect: "postgres" or "mssql"
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Path of the local SQLite batch store
    #[serde(default = "default_local_db_path")]
    pub local_db_path: PathBuf,
}

fn default_dialect() -> String {
    "postgres".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "production_db".to_string()
}
fn default_username() -> String {
    "operator".to_string()
}
fn default_local_db_path() -> PathBuf {
    PathBuf::from("data/database.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
            username: default_username(),
            password: String::new(),
            local_db_path: default_local_db_path(),
        }
    }
}

/// Process alarm thresholds (consumed by the monitoring collaborators).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Hard upper limit on any reactor temperature (°C)
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold: f64,
    /// Minimum acceptable acid feed rate
    #[serde(default = "default_min_acid_flow")]
    pub min_acid_flow: f64,
    /// Maximum acceptable electrode current
    #[serde(default = "default_max_current")]
    pub max_current: f64,
    /// Telemetry sampling interval (seconds)
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: u64,
}

fn default_temperature_threshold() -> f64 {
    120.0
}
fn default_min_acid_flow() -> f64 {
    0.5
}
fn default_max_current() -> f64 {
    200.0
}
fn default_sampling_interval() -> u64 {
    60
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            temperature_threshold: default_temperature_threshold(),
            min_acid_flow: default_min_acid_flow(),
            max_current: default_max_current(),
            sampling_interval: default_sampling_interval(),
        }
    }
}

/// Forecasting model hyperparameters and artifact location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Similarity score floor for future neighbour-based matching
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Neighbour count for future neighbour-based matching
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    /// Seed for bootstrap resampling and the train/test shuffle
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Ensemble member count
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Regression tree depth limit
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Where the serialized model bundle lives
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

fn default_similarity_threshold() -> f64 {
    0.75
}
fn default_n_neighbors() -> usize {
    5
}
fn default_random_state() -> u64 {
    42
}
fn default_n_estimators() -> usize {
    100
}
fn default_max_depth() -> usize {
    10
}
fn default_model_path() -> PathBuf {
    PathBuf::from("data/models/temperature_model.json")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            n_neighbors: default_n_neighbors(),
            random_state: default_random_state(),
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            model_path: default_model_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SULFEX_CONFIG` environment variable
    /// 2. `./sulfex.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SULFEX_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from SULFEX_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SULFEX_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SULFEX_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("sulfex.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded config from working directory");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse ./sulfex.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Parse a specific TOML config file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

/// Config load/parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
