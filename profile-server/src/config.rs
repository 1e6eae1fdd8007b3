//! Configuration for the server

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    bus::DEFAULT_CAPACITY,
    http::HttpConfig,
    store::DEFAULT_OP_TIMEOUT,
};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PROFILE_SERVER_DATA_DIR";

/// Server configuration
///
/// The config is usually loaded from a file with [`Self::load`].
///
/// The struct also implements [`Default`] which creates a config suitable for local development
/// and testing.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config for the HTTP server
    #[serde(default)]
    pub http: HttpConfig,
    /// Config for the profile store.
    #[serde(default)]
    pub store: StoreConfig,
    /// Config for the notification bus.
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Config for the `/metrics` endpoint.
    ///
    /// Metrics are served by default. To disable them, set to
    /// `Some(MetricsConfig::disabled())`.
    pub metrics: Option<MetricsConfig>,
}

/// Config for the profile store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the database file. Defaults to a file in [`Config::data_dir`].
    pub path: Option<PathBuf>,
    /// Upper bound for a single store operation.
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Config for the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Number of events buffered per topic before slow subscribers skip events.
    pub capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// The config for the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Set to true to disable the metrics endpoint.
    pub disabled: bool,
}

impl MetricsConfig {
    /// Disable the metrics endpoint.
    pub fn disabled() -> Self {
        Self { disabled: true }
    }
}

/// Errors while loading the configuration.
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ConfigError {
    #[snafu(display("failed to read {}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse config"))]
    Parse { source: toml::de::Error },
    #[snafu(display("operating environment provides no directory for application data"))]
    NoDataDir,
}

impl Config {
    /// Load the config from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let s = tokio::fs::read_to_string(path)
            .await
            .context(ReadSnafu { path })?;
        let config: Config = toml::from_str(&s).context(ParseSnafu)?;
        Ok(config)
    }

    /// Get the data directory.
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let dir = if let Some(val) = env::var_os(DATA_DIR_ENV) {
            PathBuf::from(val)
        } else {
            let path = dirs_next::data_dir().context(NoDataDirSnafu)?;
            path.join("profile-server")
        };
        Ok(dir)
    }

    /// Get the path to the store database file.
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("profiles-1.db")),
        }
    }

    /// Whether the `/metrics` endpoint is served.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.as_ref().is_none_or(|conf| !conf.disabled)
    }
}
