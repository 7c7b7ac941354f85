//! Role-based access control.
//!
//! This module provides:
//! - **Models**: users, roles, actions, policy rules, assignments and edges
//! - **PolicyStore**: durable tuple storage (in-memory or PostgreSQL)
//! - **RoleGraph / PolicyIndex**: the in-memory structures decisions run on
//! - **Enforcer**: the decision point, reloaded by swapping whole snapshots
//! - **RoleAssignmentManager / PolicyAdminService**: validated mutations
//! - **Seeding**: built-in defaults and casbin-style seed files
//! - **Authorization Middleware**: a tower layer for axum routers
//!
//! # Usage
//!
//! ```rust,ignore
//! use gatekeeper_core::rbac::{Action, Enforcer, MemoryPolicyStore, PolicyAdminService};
//!
//! let store: Arc<dyn PolicyStore> = Arc::new(MemoryPolicyStore::new());
//! let enforcer = Arc::new(Enforcer::build(store.clone(), Duration::from_secs(5)).await?);
//! let admin = PolicyAdminService::new(store, enforcer.clone());
//!
//! admin.create_policy(&PolicyRule::new("viewer", "/docs", Action::Read)).await?;
//! admin.create_inheritance(&RoleInheritance::new("editor", "viewer")).await?;
//! admin.assign_user_role(&"u1".into(), &"editor".into()).await?;
//!
//! assert!(enforcer.is_allowed("u1", "/docs", Action::Read));
//! ```

pub mod admin;
pub mod assignment;
pub mod defaults;
pub mod enforcer;
pub mod graph;
pub mod index;
pub mod middleware;
pub mod models;
pub mod seed;
pub mod store;

pub use admin::{MutationReceipt, MutationStage, PolicyAdminService};
pub use assignment::RoleAssignmentManager;
pub use defaults::DefaultRole;
pub use enforcer::{Decision, EffectivePermissions, Enforcer, PolicySnapshot, ReloadReport};
pub use graph::RoleGraph;
pub use index::PolicyIndex;
pub use middleware::{AuthorizeLayer, AuthorizeService, AuthorizedRequest, Principal};
pub use models::{
    normalize_resource_path, Action, ActionSet, PolicyGroup, PolicyRule, RoleAssignment,
    RoleInheritance, RoleName, UserId,
};
pub use seed::{SeedPolicy, SeedReport};
pub use store::{MemoryPolicyStore, PgPolicyStore, PolicyStore, PolicyTables};
