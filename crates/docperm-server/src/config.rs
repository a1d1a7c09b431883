//! Server configuration.
//!
//! Sources are layered, later ones winning: built-in defaults, an optional
//! YAML file, then `DOCPERM_*` environment variables.
//!
//! ```ignore
//! use docperm_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("docperm.yaml")?;
//! let token_policy = config.broker.token_policy();
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use docperm_domain::policy::{DEFAULT_MAX_DURATION, DEFAULT_REFRESH_THRESHOLD};
use docperm_domain::{TokenPolicy, ANONYMOUS_USER_ID};
use serde::{Deserialize, Serialize};

/// Upper bound on `broker.max_duration_secs` (one day).
pub const MAX_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Prefix of environment variable overrides (`DOCPERM_SERVER__PORT`).
pub const ENV_PREFIX: &str = "DOCPERM";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Token issuance settings
    #[serde(default)]
    pub broker: BrokerSettings,

    /// Secret cache settings
    #[serde(default)]
    pub secrets: SecretSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Keep-warm heartbeat settings
    #[serde(default)]
    pub warm_timer: WarmTimerSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Token issuance settings.
///
/// ```yaml
/// broker:
///   refresh_threshold_secs: 600
///   max_duration_secs: 18000
///   anonymous_user_id: anonymous-user
///   collection_throughput: 1000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BrokerSettings {
    /// Cached tokens with less remaining lifetime than this are renewed.
    /// Environment variable: `DOCPERM_BROKER__REFRESH_THRESHOLD_SECS`
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,

    /// Longest lifetime a token is issued for.
    /// Environment variable: `DOCPERM_BROKER__MAX_DURATION_SECS`
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,

    /// User id shared by every caller without a resolvable identity.
    #[serde(default = "default_anonymous_user_id")]
    pub anonymous_user_id: String,

    /// Throughput hint for collections created on demand.
    #[serde(default = "default_collection_throughput")]
    pub collection_throughput: Option<u32>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            refresh_threshold_secs: default_refresh_threshold(),
            max_duration_secs: default_max_duration(),
            anonymous_user_id: default_anonymous_user_id(),
            collection_throughput: default_collection_throughput(),
        }
    }
}

impl BrokerSettings {
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy::new(
            Duration::from_secs(self.refresh_threshold_secs),
            Duration::from_secs(self.max_duration_secs),
        )
    }
}

fn default_refresh_threshold() -> u64 {
    DEFAULT_REFRESH_THRESHOLD.as_secs()
}

fn default_max_duration() -> u64 {
    DEFAULT_MAX_DURATION.as_secs()
}

fn default_anonymous_user_id() -> String {
    ANONYMOUS_USER_ID.to_string()
}

fn default_collection_throughput() -> Option<u32> {
    Some(1000)
}

/// Secret cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SecretSettings {
    /// Maximum number of cached secrets
    #[serde(default = "default_secret_capacity")]
    pub max_capacity: u64,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            max_capacity: default_secret_capacity(),
        }
    }
}

fn default_secret_capacity() -> u64 {
    100_000
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Periodic heartbeat that keeps a scale-to-zero host from idling out.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WarmTimerSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between heartbeats
    #[serde(default = "default_warm_interval")]
    pub interval_secs: u64,
}

impl Default for WarmTimerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_warm_interval(),
        }
    }
}

fn default_warm_interval() -> u64 {
    240
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `DOCPERM_` and use `__` as
    /// separator, e.g. `DOCPERM_BROKER__MAX_DURATION_SECS=3600` overrides
    /// `broker.max_duration_secs`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        Self::layered(Some(path))
    }

    /// Defaults overridden by `DOCPERM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::layered(None)
    }

    fn layered(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&ServerConfig::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let loaded: ServerConfig = builder
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.broker.refresh_threshold_secs == 0 {
            return Err(invalid(
                "broker.refresh_threshold_secs must be greater than 0",
            ));
        }

        let min_duration_secs = self.broker.refresh_threshold_secs.saturating_mul(2);
        if self.broker.max_duration_secs < min_duration_secs {
            return Err(invalid(format!(
                "broker.max_duration_secs must be at least twice broker.refresh_threshold_secs ({}), got: {}",
                min_duration_secs, self.broker.max_duration_secs
            )));
        }

        if self.broker.max_duration_secs > MAX_TOKEN_DURATION_SECS {
            return Err(invalid(format!(
                "broker.max_duration_secs must be at most {}, got: {}",
                MAX_TOKEN_DURATION_SECS, self.broker.max_duration_secs
            )));
        }

        if self.broker.anonymous_user_id.trim().is_empty() {
            return Err(invalid("broker.anonymous_user_id cannot be empty"));
        }

        if self.secrets.max_capacity == 0 {
            return Err(invalid("secrets.max_capacity must be greater than 0"));
        }

        if self.warm_timer.enabled && self.warm_timer.interval_secs == 0 {
            return Err(invalid("warm_timer.interval_secs must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

/// `DOCPERM_BROKER__MAX_DURATION_SECS` -> `broker.max_duration_secs`
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}
