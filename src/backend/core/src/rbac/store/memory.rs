//! In-process policy store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{PolicyStore, PolicyTables};
use crate::error::{AuthzError, Result};
use crate::rbac::models::{PolicyRule, RoleAssignment, RoleInheritance, RoleName, UserId};

#[derive(Debug, Default)]
struct Tables {
    rules: BTreeSet<PolicyRule>,
    assignments: BTreeMap<UserId, RoleName>,
    edges: BTreeSet<RoleInheritance>,
}

/// Policy store kept in memory.
///
/// A single mutex guards all three tuple sets, so every call, including the
/// delete-then-insert of `set_user_role`, is atomic and serialized. Listings
/// come back sorted.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    tables: Mutex<Tables>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn list_policies(&self) -> Result<Vec<PolicyRule>> {
        Ok(self.tables.lock().rules.iter().cloned().collect())
    }

    async fn list_role_assignments(&self) -> Result<Vec<RoleAssignment>> {
        Ok(self
            .tables
            .lock()
            .assignments
            .iter()
            .map(|(user, role)| RoleAssignment::new(user.clone(), role.clone()))
            .collect())
    }

    async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>> {
        Ok(self.tables.lock().edges.iter().cloned().collect())
    }

    async fn load_all(&self) -> Result<PolicyTables> {
        let tables = self.tables.lock();
        Ok(PolicyTables {
            rules: tables.rules.iter().cloned().collect(),
            assignments: tables
                .assignments
                .iter()
                .map(|(user, role)| RoleAssignment::new(user.clone(), role.clone()))
                .collect(),
            edges: tables.edges.iter().cloned().collect(),
        })
    }

    async fn create_policy(&self, rule: &PolicyRule) -> Result<()> {
        if !self.tables.lock().rules.insert(rule.clone()) {
            return Err(AuthzError::DuplicateRule(rule.clone()));
        }
        debug!(rule = %rule, "Stored policy rule");
        Ok(())
    }

    async fn delete_policy(&self, rule: &PolicyRule) -> Result<()> {
        if !self.tables.lock().rules.remove(rule) {
            return Err(AuthzError::not_found("policy rule", rule));
        }
        Ok(())
    }

    async fn create_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        if !self.tables.lock().edges.insert(edge.clone()) {
            return Err(AuthzError::DuplicateEdge(edge.clone()));
        }
        debug!(edge = %edge, "Stored inheritance edge");
        Ok(())
    }

    async fn delete_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        if !self.tables.lock().edges.remove(edge) {
            return Err(AuthzError::not_found("inheritance edge", edge));
        }
        Ok(())
    }

    async fn set_user_role(&self, user_id: &UserId, role: &RoleName) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.assignments.remove(user_id);
        tables.assignments.insert(user_id.clone(), role.clone());
        Ok(())
    }

    async fn remove_user_roles(&self, user_id: &UserId) -> Result<usize> {
        Ok(usize::from(self.tables.lock().assignments.remove(user_id).is_some()))
    }

    async fn role_of(&self, user_id: &UserId) -> Result<Option<RoleName>> {
        Ok(self.tables.lock().assignments.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::Action;

    #[tokio::test]
    async fn test_duplicate_rule_rejected() {
        let store = MemoryPolicyStore::new();
        let rule = PolicyRule::new("admin", "/api/x", Action::Read);

        store.create_policy(&rule).await.unwrap();
        let err = store.create_policy(&rule).await.unwrap_err();

        assert!(matches!(err, AuthzError::DuplicateRule(r) if r == rule));
        assert_eq!(store.list_policies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_rule() {
        let store = MemoryPolicyStore::new();
        let err = store
            .delete_policy(&PolicyRule::new("admin", "/api/x", Action::Read))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_edge_contract() {
        let store = MemoryPolicyStore::new();
        let edge = RoleInheritance::new("editor", "viewer");

        store.create_inheritance(&edge).await.unwrap();
        assert!(matches!(
            store.create_inheritance(&edge).await,
            Err(AuthzError::DuplicateEdge(_))
        ));

        store.delete_inheritance(&edge).await.unwrap();
        assert!(matches!(
            store.delete_inheritance(&edge).await,
            Err(AuthzError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_user_role_replaces() {
        let store = MemoryPolicyStore::new();
        let user = UserId::new("u1");

        store.set_user_role(&user, &"admin".into()).await.unwrap();
        store.set_user_role(&user, &"user".into()).await.unwrap();

        let assignments = store.list_role_assignments().await.unwrap();
        assert_eq!(assignments, vec![RoleAssignment::new("u1", "user")]);
        assert_eq!(store.role_of(&user).await.unwrap(), Some(RoleName::from("user")));

        assert_eq!(store.remove_user_roles(&user).await.unwrap(), 1);
        assert_eq!(store.remove_user_roles(&user).await.unwrap(), 0);
        assert_eq!(store.role_of(&user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_all_matches_listings() {
        let store = MemoryPolicyStore::new();
        store
            .create_policy(&PolicyRule::new("viewer", "/docs", Action::Read))
            .await
            .unwrap();
        store
            .create_inheritance(&RoleInheritance::new("editor", "viewer"))
            .await
            .unwrap();
        store.set_user_role(&"u1".into(), &"editor".into()).await.unwrap();

        let tables = store.load_all().await.unwrap();
        assert_eq!(tables.rules, store.list_policies().await.unwrap());
        assert_eq!(tables.assignments, vec![RoleAssignment::new("u1", "editor")]);
        assert_eq!(tables.edges, vec![RoleInheritance::new("editor", "viewer")]);
    }
}
