//! Configuration module for TrainRelay.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`trainrelay.toml`, or the path in `TRAINRELAY_CONFIG`), then environment
//! variables such as `TRAINRELAY__UPSTREAM__BASE_URL`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use trainrelay_training::ArtifactLayout;

use crate::error::{CoreError, Result};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "trainrelay.toml";

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "TRAINRELAY_CONFIG";

const ENV_PREFIX: &str = "TRAINRELAY";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

fn default_address() -> SocketAddr {
    // This is a compile-time constant, so unwrap is safe
    "127.0.0.1:8080".parse().expect("valid default address")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address() }
    }
}

/// Where the training job lives.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL of the job's control API (`/start`, `/stop`, `/status`, `/metrics`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// WebSocket URL of the job's event stream.
    #[serde(default = "default_events_url")]
    pub events_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/training".to_string()
}

fn default_events_url() -> String {
    "ws://localhost:8000/training/ws/training".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            events_url: default_events_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// SQLite file path; `:memory:` for a throwaway database.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "trainrelay.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

/// Where the job writes weights and result images.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_root")]
    pub root: PathBuf,
    /// Model file, relative to `root`.
    #[serde(default = "default_model_file")]
    pub model_file: PathBuf,
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_model_file() -> PathBuf {
    PathBuf::from("weights/best.pt")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { root: default_artifacts_root(), model_file: default_model_file() }
    }
}

/// Deployment-fixed paths. When set they replace whatever a start request carries.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub dataset_path: Option<String>,
    #[serde(default)]
    pub pretrained_weights: Option<String>,
}

/// Event relay settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RelayConfig {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub connect_on_startup: bool,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { channel_capacity: default_channel_capacity(), connect_on_startup: false }
    }
}

/// Root configuration for TrainRelay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the config file and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result fails validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load configuration layering `file` (if it exists) and the environment over the defaults.
    pub fn load_from(file: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(file).format(config::FileFormat::Toml).required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        let config: Self =
            settings.try_deserialize().map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_url(&self.upstream.base_url, &["http", "https"], "upstream.base_url")?;
        check_url(&self.upstream.events_url, &["ws", "wss"], "upstream.events_url")?;
        if self.upstream.request_timeout_secs == 0 {
            return Err(CoreError::Config("upstream.request_timeout_secs must be > 0".to_string()));
        }
        if self.upstream.connect_timeout_secs == 0 {
            return Err(CoreError::Config("upstream.connect_timeout_secs must be > 0".to_string()));
        }
        if self.relay.channel_capacity == 0 {
            return Err(CoreError::Config("relay.channel_capacity must be > 0".to_string()));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(CoreError::Config("storage.database_path must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn artifact_layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.artifacts.root, &self.artifacts.model_file)
    }
}

fn check_url(value: &str, schemes: &[&str], key: &str) -> Result<()> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| CoreError::Config(format!("{key}: invalid URL {value:?}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(CoreError::Config(format!(
            "{key}: scheme must be one of {}, got {}",
            schemes.join("/"),
            url.scheme()
        )));
    }
    Ok(())
}
