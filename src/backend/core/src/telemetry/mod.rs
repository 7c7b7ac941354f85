//! Telemetry: structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use gatekeeper_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let _handle = init_telemetry(&config).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, MetricsConfig, MetricsRegistry, PolicyMetrics};

/// Logging and metrics settings, usually taken from [`crate::config::Config`].
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl From<&crate::config::Config> for TelemetryConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            logging: config.logging.clone(),
            metrics: config.metrics.clone(),
        }
    }
}

/// Initialize metrics, then logging. Call once at startup.
///
/// # Errors
///
/// Returns an error if either component fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics)?;
    init_logging(&config.logging)?;

    Ok(TelemetryHandle { metrics })
}

/// Handle for the installed telemetry components.
#[derive(Debug)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}
