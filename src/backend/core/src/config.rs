//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::telemetry::{LoggingConfig, MetricsConfig};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Policy store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Enforcer configuration
    #[serde(default)]
    pub enforcer: EnforcerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Which policy store implementation to use.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, lost on exit
    #[default]
    Memory,
    /// PostgreSQL via sqlx
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection URL, required for the postgres backend
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnforcerConfig {
    /// Upper bound on a single policy reload
    #[serde(default = "default_reload_timeout", with = "humantime_serde")]
    pub reload_timeout: Duration,

    /// Reload the enforcer after every successful administrative mutation
    #[serde(default = "default_true")]
    pub reload_on_write: bool,

    /// Seed file applied at startup
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Apply the built-in default policy at startup
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            reload_timeout: default_reload_timeout(),
            reload_on_write: true,
            seed_path: None,
            seed_defaults: true,
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_reload_timeout() -> Duration { Duration::from_secs(5) }
fn default_true() -> bool { true }

const ENV_PREFIX: &str = "GATEKEEPER";

impl Config {
    /// Load configuration from an optional file, overridden by
    /// `GATEKEEPER__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        use crate::error::AuthzError;

        if self.store.backend == StoreBackend::Postgres && self.store.url.is_none() {
            return Err(AuthzError::Configuration(
                "store.url is required when store.backend = postgres".into(),
            ));
        }
        if self.store.min_connections > self.store.max_connections {
            return Err(AuthzError::Configuration(
                "store.min_connections must not exceed store.max_connections".into(),
            ));
        }
        if self.enforcer.reload_timeout.is_zero() {
            return Err(AuthzError::Configuration(
                "enforcer.reload_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
