//! Durable storage of policy rules, role assignments and inheritance edges.
//!
//! A store is a thin persistence boundary: it enforces tuple uniqueness and
//! atomicity of each call, nothing else. Cycle checks, role validation and
//! index rebuilding live above it.

mod memory;
mod postgres;

pub use memory::MemoryPolicyStore;
pub use postgres::PgPolicyStore;

use async_trait::async_trait;
use std::sync::Arc;

use super::models::{PolicyRule, RoleAssignment, RoleInheritance, RoleName, UserId};
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

/// Every tuple in a store, read at a single point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTables {
    pub rules: Vec<PolicyRule>,
    pub assignments: Vec<RoleAssignment>,
    pub edges: Vec<RoleInheritance>,
}

/// Storage operations consumed by the enforcer and the administrative service.
///
/// Every mutation is atomic and serialized with respect to other mutations
/// on the same store.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list_policies(&self) -> Result<Vec<PolicyRule>>;

    async fn list_role_assignments(&self) -> Result<Vec<RoleAssignment>>;

    async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>>;

    /// All three tuple sets from one consistent view of the store.
    ///
    /// A mutation either lands in every set or in none of them.
    async fn load_all(&self) -> Result<PolicyTables>;

    /// Fails with `DuplicateRule` if the exact triple already exists.
    async fn create_policy(&self, rule: &PolicyRule) -> Result<()>;

    /// Fails with `NotFound` if no matching triple exists.
    async fn delete_policy(&self, rule: &PolicyRule) -> Result<()>;

    /// Fails with `DuplicateEdge` if the edge already exists.
    async fn create_inheritance(&self, edge: &RoleInheritance) -> Result<()>;

    /// Fails with `NotFound` if the edge does not exist.
    async fn delete_inheritance(&self, edge: &RoleInheritance) -> Result<()>;

    /// Replace every assignment of `user_id` with `role` in one atomic step.
    async fn set_user_role(&self, user_id: &UserId, role: &RoleName) -> Result<()>;

    /// Remove every assignment of `user_id`, returning how many were removed.
    async fn remove_user_roles(&self, user_id: &UserId) -> Result<usize>;

    async fn role_of(&self, user_id: &UserId) -> Result<Option<RoleName>>;
}

/// Open the store selected by configuration.
///
/// The Postgres backend runs its embedded migrations before returning.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn PolicyStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryPolicyStore::new())),
        StoreBackend::Postgres => {
            let store = PgPolicyStore::connect(config).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}
