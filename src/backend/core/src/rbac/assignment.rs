//! User role assignments and role inheritance edges.
//!
//! Every check here happens before the store is touched: an unknown role is
//! never assigned and a cycle-closing edge is never persisted.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::graph::RoleGraph;
use super::models::{RoleInheritance, RoleName, UserId};
use super::store::PolicyStore;
use crate::error::{AuthzError, Result};

/// Proof that the caller holds the administrative mutation lock.
pub(crate) struct MutationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Owns the mutation path for assignments and inheritance edges.
pub struct RoleAssignmentManager {
    store: Arc<dyn PolicyStore>,

    /// Held across every validate-then-persist sequence, including policy
    /// rule writes made by the admin service, so validation results stay
    /// true until the write lands.
    mutation_lock: Mutex<()>,
}

impl RoleAssignmentManager {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            mutation_lock: Mutex::new(()),
        }
    }

    /// Wait for exclusive access to administrative mutations.
    pub(crate) async fn lock(&self) -> MutationGuard<'_> {
        MutationGuard {
            _guard: self.mutation_lock.lock().await,
        }
    }

    /// Roles mentioned by any policy rule or inheritance edge.
    pub async fn known_roles(&self) -> Result<BTreeSet<RoleName>> {
        let tables = self.store.load_all().await?;

        let mut roles: BTreeSet<RoleName> = tables.rules.into_iter().map(|r| r.role).collect();
        for edge in tables.edges {
            roles.insert(edge.role);
            roles.insert(edge.inherits_from);
        }
        Ok(roles)
    }

    /// Make `role` the only role of `user_id`.
    ///
    /// Fails with `UnknownRole` when no rule or edge mentions `role`.
    pub async fn assign_role(&self, user_id: &UserId, role: &RoleName) -> Result<()> {
        let guard = self.lock().await;
        self.assign_role_locked(&guard, user_id, role).await
    }

    pub(crate) async fn assign_role_locked(
        &self,
        _guard: &MutationGuard<'_>,
        user_id: &UserId,
        role: &RoleName,
    ) -> Result<()> {
        if user_id.as_str().trim().is_empty() {
            return Err(AuthzError::InvalidInput("user id must not be empty".into()));
        }

        if !self.known_roles().await?.contains(role) {
            warn!(user_id = %user_id, role = %role, "Rejected assignment of unknown role");
            return Err(AuthzError::UnknownRole(role.to_string()));
        }

        self.store.set_user_role(user_id, role).await?;
        info!(user_id = %user_id, role = %role, "Assigned role");
        Ok(())
    }

    /// The single role assigned to `user_id`.
    pub async fn role_of(&self, user_id: &UserId) -> Result<RoleName> {
        self.store
            .role_of(user_id)
            .await?
            .ok_or_else(|| AuthzError::not_found("role assignment", user_id))
    }

    /// Drop every assignment of `user_id`. Returns how many were removed.
    pub async fn remove_all_roles(&self, user_id: &UserId) -> Result<usize> {
        let _guard = self.lock().await;
        let removed = self.store.remove_user_roles(user_id).await?;
        info!(user_id = %user_id, removed, "Removed role assignments");
        Ok(removed)
    }

    pub async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>> {
        self.store.list_inheritance().await
    }

    /// Persist `edge` unless it duplicates an existing edge or closes a cycle.
    pub async fn add_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        let guard = self.lock().await;
        self.add_inheritance_locked(&guard, edge).await
    }

    pub(crate) async fn add_inheritance_locked(
        &self,
        _guard: &MutationGuard<'_>,
        edge: &RoleInheritance,
    ) -> Result<()> {
        edge.validate()?;
        let edges = self.store.list_inheritance().await?;

        if edges.contains(edge) {
            return Err(AuthzError::DuplicateEdge(edge.clone()));
        }

        if let Err(error) = RoleGraph::build(&edges).and_then(|graph| graph.check_edge(edge)) {
            warn!(edge = %edge, error = %error, "Rejected inheritance edge");
            return Err(error);
        }

        self.store.create_inheritance(edge).await?;
        info!(edge = %edge, "Added inheritance edge");
        Ok(())
    }

    /// Fails with `NotFound` if the edge does not exist.
    pub async fn remove_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        let _guard = self.lock().await;
        self.store.delete_inheritance(edge).await?;
        info!(edge = %edge, "Removed inheritance edge");
        Ok(())
    }
}
