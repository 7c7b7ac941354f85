//! Prometheus metrics for authorization decisions and policy reloads.
//!
//! Metric names:
//!
//! - `gatekeeper_decisions_total{outcome}`: allow / deny counts
//! - `gatekeeper_reloads_total{result}`: success / failure counts
//! - `gatekeeper_reload_duration_seconds`: reload latency
//! - `gatekeeper_policy_rules`, `gatekeeper_inheritance_edges`,
//!   `gatekeeper_role_assignments`: size of the serving snapshot
//! - `gatekeeper_errors_total{code, category, severity}`: logged errors
//!
//! With no recorder installed every call is a no-op, so library users that
//! never call [`init_metrics`] pay nothing.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder
    #[serde(default)]
    pub enabled: bool,

    /// Histogram buckets for reload durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
}

/// Handle to the installed recorder.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder behind it.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder and describe the core metrics.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already set.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(
        buckets = config.duration_buckets.len(),
        "Metrics initialized"
    );

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!(
        "gatekeeper_decisions_total",
        "Authorization decisions by outcome"
    );
    describe_counter!("gatekeeper_reloads_total", "Policy reloads by result");
    describe_histogram!(
        "gatekeeper_reload_duration_seconds",
        "Time spent loading and indexing policy"
    );
    describe_gauge!(
        "gatekeeper_policy_rules",
        "Policy rules in the serving snapshot"
    );
    describe_gauge!(
        "gatekeeper_inheritance_edges",
        "Role inheritance edges in the serving snapshot"
    );
    describe_gauge!(
        "gatekeeper_role_assignments",
        "User role assignments in the serving snapshot"
    );
    describe_counter!(
        "gatekeeper_errors_total",
        "Errors by code, category and severity"
    );
}

/// Recording helpers used by the enforcer.
pub struct PolicyMetrics;

impl PolicyMetrics {
    /// Count one authorization decision.
    pub fn record_decision(allowed: bool) {
        let outcome = if allowed { "allow" } else { "deny" };
        counter!("gatekeeper_decisions_total", "outcome" => outcome).increment(1);
    }

    /// Count a successful reload and publish the new snapshot sizes.
    pub fn record_reload_success(
        duration: Duration,
        rules: usize,
        edges: usize,
        assignments: usize,
    ) {
        counter!("gatekeeper_reloads_total", "result" => "success").increment(1);
        histogram!("gatekeeper_reload_duration_seconds").record(duration.as_secs_f64());

        gauge!("gatekeeper_policy_rules").set(rules as f64);
        gauge!("gatekeeper_inheritance_edges").set(edges as f64);
        gauge!("gatekeeper_role_assignments").set(assignments as f64);
    }

    /// Count a failed reload. The previous snapshot keeps serving.
    pub fn record_reload_failure(duration: Duration, reason: &'static str) {
        counter!(
            "gatekeeper_reloads_total",
            "result" => "failure",
            "reason" => reason,
        )
        .increment(1);
        histogram!("gatekeeper_reload_duration_seconds").record(duration.as_secs_f64());
    }
}
