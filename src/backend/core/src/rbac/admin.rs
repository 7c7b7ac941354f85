//! Administrative operations over the policy store.
//!
//! Every mutation moves through `Proposed → Validated → Persisted → Indexed`.
//! With `reload_on_write` enabled the service reloads the enforcer after each
//! successful write, and the returned [`MutationReceipt`] says whether the
//! change already serves decisions (`Indexed`) or only sits in the store
//! (`Persisted`).

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use super::assignment::RoleAssignmentManager;
use super::enforcer::Enforcer;
use super::models::{
    Action, PolicyGroup, PolicyRule, RoleAssignment, RoleInheritance, RoleName, UserId,
};
use super::seed::{SeedPolicy, SeedReport};
use super::store::PolicyStore;
use crate::error::{AuthzError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Mutation lifecycle
// ═══════════════════════════════════════════════════════════════════════════════

/// How far a mutation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStage {
    Proposed,
    /// No duplicate, no cycle, role known
    Validated,
    /// Written to the store; decisions do not reflect it yet
    Persisted,
    /// The enforcer serves a snapshot that includes it
    Indexed,
}

impl MutationStage {
    pub fn is_effective(&self) -> bool {
        matches!(self, Self::Indexed)
    }
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutationReceipt {
    pub stage: MutationStage,

    /// Generation of the snapshot serving decisions after the mutation.
    pub generation: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Administrative surface: policy rules, roles, assignments and edges.
pub struct PolicyAdminService {
    store: Arc<dyn PolicyStore>,
    manager: RoleAssignmentManager,
    enforcer: Arc<Enforcer>,
    reload_on_write: bool,
}

impl PolicyAdminService {
    pub fn new(store: Arc<dyn PolicyStore>, enforcer: Arc<Enforcer>) -> Self {
        Self {
            manager: RoleAssignmentManager::new(store.clone()),
            store,
            enforcer,
            reload_on_write: true,
        }
    }

    /// Whether to reload the enforcer after each successful mutation.
    pub fn with_reload_on_write(mut self, enabled: bool) -> Self {
        self.reload_on_write = enabled;
        self
    }

    pub fn enforcer(&self) -> &Arc<Enforcer> {
        &self.enforcer
    }

    pub fn manager(&self) -> &RoleAssignmentManager {
        &self.manager
    }

    /// Reload if configured and report the stage reached.
    ///
    /// A failed reload does not fail the mutation: the write is durable and
    /// the enforcer keeps serving its previous snapshot.
    async fn settle(&self) -> MutationReceipt {
        if self.reload_on_write {
            if let Ok(report) = self.enforcer.reload().await {
                return MutationReceipt {
                    stage: MutationStage::Indexed,
                    generation: report.generation,
                };
            }
        }

        MutationReceipt {
            stage: MutationStage::Persisted,
            generation: self.enforcer.generation(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Policy rules
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_policy(&self, rule: &PolicyRule) -> Result<MutationReceipt> {
        rule.validate()?;
        {
            let _guard = self.manager.lock().await;
            self.store.create_policy(rule).await?;
        }
        info!(rule = %rule, "Created policy rule");
        Ok(self.settle().await)
    }

    pub async fn delete_policy(&self, rule: &PolicyRule) -> Result<MutationReceipt> {
        {
            let _guard = self.manager.lock().await;
            self.store.delete_policy(rule).await?;
        }
        info!(rule = %rule, "Deleted policy rule");
        Ok(self.settle().await)
    }

    /// Replace `old` with `new` by delete-then-create.
    ///
    /// If the create fails after the delete succeeded, the old rule is gone
    /// and the error is `UpdateInconsistent` wrapping the create failure.
    pub async fn update_policy(
        &self,
        old: &PolicyRule,
        new: &PolicyRule,
    ) -> Result<MutationReceipt> {
        old.validate()?;
        new.validate()?;
        if old == new {
            return Err(AuthzError::InvalidInput(format!(
                "update of {} to an identical rule",
                old
            )));
        }

        let guard = self.manager.lock().await;

        let existing = self.store.list_policies().await?;
        if !existing.contains(old) {
            return Err(AuthzError::not_found("policy rule", old));
        }
        if existing.contains(new) {
            return Err(AuthzError::DuplicateRule(new.clone()));
        }

        self.store.delete_policy(old).await?;

        let created = self.store.create_policy(new).await;
        drop(guard);

        if let Err(source) = created {
            let inconsistent = AuthzError::UpdateInconsistent {
                old: old.clone(),
                new: new.clone(),
                source: Box::new(source),
            };
            error!(old = %old, new = %new, "Policy update left a permission gap");

            // The store no longer holds `old`; let decisions follow it.
            if self.reload_on_write {
                let _ = self.enforcer.reload().await;
            }
            return Err(inconsistent);
        }

        info!(old = %old, new = %new, "Updated policy rule");
        Ok(self.settle().await)
    }

    /// Rules grouped by (role, resource), sorted by resource then role.
    ///
    /// `search` keeps groups whose resource contains it, ignoring case.
    pub async fn list_policies(&self, search: Option<&str>) -> Result<Vec<PolicyGroup>> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let rules = self.store.list_policies().await?;
        Ok(group_rules(rules.into_iter().filter(|rule| {
            needle
                .as_deref()
                .map_or(true, |n| rule.resource.to_lowercase().contains(n))
        })))
    }

    /// Groups for exactly `resource`.
    pub async fn find_by_resource(&self, resource: &str) -> Result<Vec<PolicyGroup>> {
        let rules = self.store.list_policies().await?;
        Ok(group_rules(
            rules.into_iter().filter(|rule| rule.resource == resource),
        ))
    }

    /// Every role mentioned by a rule or an edge, sorted.
    pub async fn list_roles(&self) -> Result<Vec<RoleName>> {
        Ok(self.manager.known_roles().await?.into_iter().collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Assignments
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn assign_user_role(
        &self,
        user_id: &UserId,
        role: &RoleName,
    ) -> Result<MutationReceipt> {
        self.manager.assign_role(user_id, role).await?;
        Ok(self.settle().await)
    }

    pub async fn role_of_user(&self, user_id: &UserId) -> Result<RoleName> {
        self.manager.role_of(user_id).await
    }

    pub async fn list_assignments(&self) -> Result<Vec<RoleAssignment>> {
        self.store.list_role_assignments().await
    }

    /// Remove every role of `user_id`, returning how many were removed.
    pub async fn remove_user_roles(&self, user_id: &UserId) -> Result<(usize, MutationReceipt)> {
        let removed = self.manager.remove_all_roles(user_id).await?;
        Ok((removed, self.settle().await))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inheritance
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>> {
        self.manager.list_inheritance().await
    }

    pub async fn create_inheritance(&self, edge: &RoleInheritance) -> Result<MutationReceipt> {
        self.manager.add_inheritance(edge).await?;
        Ok(self.settle().await)
    }

    pub async fn delete_inheritance(&self, edge: &RoleInheritance) -> Result<MutationReceipt> {
        self.manager.remove_inheritance(edge).await?;
        Ok(self.settle().await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply `seed` and reload once at the end.
    ///
    /// The whole seed runs as one administrative mutation.
    pub async fn seed(&self, seed: &SeedPolicy) -> Result<(SeedReport, MutationReceipt)> {
        let report = seed.apply(self.store.as_ref(), &self.manager).await?;
        Ok((report, self.settle().await))
    }
}

fn group_rules(rules: impl Iterator<Item = PolicyRule>) -> Vec<PolicyGroup> {
    let mut groups: BTreeMap<(String, RoleName), Vec<Action>> = BTreeMap::new();
    for rule in rules {
        groups
            .entry((rule.resource, rule.role))
            .or_default()
            .push(rule.action);
    }

    groups
        .into_iter()
        .map(|((resource, role), mut actions)| {
            actions.sort();
            actions.dedup();
            PolicyGroup {
                role,
                resource,
                actions,
            }
        })
        .collect()
}
