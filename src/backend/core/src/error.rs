//! Error handling for Gatekeeper.
//!
//! This module provides:
//! - The authorization error taxonomy (`AuthzError`)
//! - Stable machine-readable error codes with HTTP status mapping
//! - Severity-driven logging with tracing integration
//! - Error counters for observability
//!
//! None of these errors ever reach the enforcement path: `Enforcer::is_allowed`
//! only returns a boolean. They are returned to administrative callers and to
//! whoever triggers a reload.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

use crate::rbac::models::{PolicyRule, RoleInheritance};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Policy errors (1000-1099)
    DuplicateRule,
    DuplicateEdge,
    NotFound,
    CycleDetected,
    UnknownRole,
    UpdateInconsistent,

    // Store errors (2000-2099)
    StoreUnavailable,
    ReloadTimeout,

    // Authorization (4000-4099)
    Forbidden,

    // Validation (4100-4199)
    InvalidInput,

    // Configuration (5000-5099)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::DuplicateRule => 1000,
            Self::DuplicateEdge => 1001,
            Self::NotFound => 1002,
            Self::CycleDetected => 1003,
            Self::UnknownRole => 1004,
            Self::UpdateInconsistent => 1005,

            Self::StoreUnavailable => 2000,
            Self::ReloadTimeout => 2001,

            Self::Forbidden => 4001,

            Self::InvalidInput => 4100,

            Self::ConfigurationError => 5000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::DuplicateRule | Self::DuplicateEdge => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::CycleDetected | Self::UnknownRole | Self::InvalidInput => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StoreUnavailable | Self::ReloadTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpdateInconsistent | Self::ConfigurationError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::ReloadTimeout)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "policy",
            2000..=2099 => "store",
            4000..=4099 => "authorization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Rejected administrative requests
    Low,
    /// Operational issues
    Medium,
    /// Store failures
    High,
    /// A permission gap was left behind
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::DuplicateRule
            | ErrorCode::DuplicateEdge
            | ErrorCode::NotFound
            | ErrorCode::UnknownRole
            | ErrorCode::InvalidInput
            | ErrorCode::Forbidden => Self::Low,

            ErrorCode::CycleDetected | ErrorCode::ReloadTimeout => Self::Medium,

            ErrorCode::StoreUnavailable | ErrorCode::ConfigurationError => Self::High,

            ErrorCode::UpdateInconsistent => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised by the policy store, the role graph and the administrative
/// operations around the enforcer.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Policy rule already exists: {0}")]
    DuplicateRule(PolicyRule),

    #[error("Inheritance edge already exists: {0}")]
    DuplicateEdge(RoleInheritance),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Role inheritance cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Policy store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    #[error("Policy reload timed out after {0:?}")]
    ReloadTimeout(Duration),

    #[error("Update left policy inconsistent: {old} was deleted but {new} was not created")]
    UpdateInconsistent {
        old: PolicyRule,
        new: PolicyRule,
        #[source]
        source: Box<AuthzError>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthzError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn cycle_detected<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::CycleDetected {
            path: path.into_iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_unavailable_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StoreUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DuplicateRule(_) => ErrorCode::DuplicateRule,
            Self::DuplicateEdge(_) => ErrorCode::DuplicateEdge,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::UnknownRole(_) => ErrorCode::UnknownRole,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::ReloadTimeout(_) => ErrorCode::ReloadTimeout,
            Self::UpdateInconsistent { .. } => ErrorCode::UpdateInconsistent,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code().http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at its severity and count it.
    pub fn log(&self) {
        let code = self.code();
        let category = code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    error = %self,
                    source = ?std::error::Error::source(self).map(|s| s.to_string()),
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(error_code = %code, category = category, error = %self, "Store error");
            }
            ErrorSeverity::Medium => {
                warn!(error_code = %code, category = category, error = %self, "Operation rejected");
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    error = %self,
                    "Request rejected"
                );
            }
        }

        self.record_metrics();
    }

    fn record_metrics(&self) {
        let code = self.code();
        counter!(
            "gatekeeper_errors_total",
            "code" => code.to_string(),
            "category" => code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl From<&AuthzError> for ErrorResponse {
    fn from(error: &AuthzError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AuthzError {
    fn from(error: sqlx::Error) -> Self {
        let message = match &error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => "connection pool unavailable",
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => "connection to policy database failed",
            sqlx::Error::Database(_) => "policy database rejected the query",
            _ => "policy database error",
        };
        Self::store_unavailable_with(message, error)
    }
}

impl From<sqlx::migrate::MigrateError> for AuthzError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::store_unavailable_with("policy schema migration failed", error)
    }
}

impl From<config::ConfigError> for AuthzError {
    fn from(error: config::ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<std::io::Error> for AuthzError {
    fn from(error: std::io::Error) -> Self {
        Self::InvalidInput(format!("failed to read policy input: {}", error))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
