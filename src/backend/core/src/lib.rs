#![allow(clippy::result_large_err)]
//! # Gatekeeper Core
//!
//! Role-based authorization with inherited roles.
//!
//! ## Architecture
//!
//! - **Policy Store**: durable rules, user assignments and inheritance edges
//! - **Role Graph**: acyclic inheritance, resolved to effective role sets
//! - **Policy Index**: (role, resource) to granted actions
//! - **Enforcer**: the single decision point, reloaded by snapshot swap
//! - **Administration**: validated mutations with explicit reload stages
//! - **Middleware**: tower layer turning denials into 403 responses
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use bootstrap::Gatekeeper;
pub use error::{AuthzError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bootstrap::Gatekeeper;
    pub use crate::config::{Config, EnforcerConfig, StoreBackend, StoreConfig};
    pub use crate::error::{AuthzError, ErrorCode, ErrorSeverity, Result};
    pub use crate::rbac::{
        Action, AuthorizeLayer, AuthorizedRequest, Decision, DefaultRole, Enforcer,
        MemoryPolicyStore, MutationReceipt, MutationStage, PgPolicyStore, PolicyAdminService,
        PolicyGroup, PolicyRule, PolicyStore, Principal, RoleAssignment,
        RoleAssignmentManager, RoleInheritance, RoleName, SeedPolicy, SeedReport, UserId,
    };
}
