//! The authorization decision point.
//!
//! The enforcer serves decisions from an immutable [`PolicySnapshot`]: the
//! role graph, the policy index and the user assignments as they were at the
//! last successful reload. A reload builds a complete new snapshot off to the
//! side and swaps one `Arc`, so a concurrent `is_allowed` sees either the old
//! snapshot or the new one, never a mix.
//!
//! Decisions reflect the last completed reload, not the latest store write.
//! Callers that need read-your-writes must await [`Enforcer::reload`] after
//! mutating the store.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::graph::RoleGraph;
use super::index::PolicyIndex;
use super::models::{
    Action, ActionSet, PolicyRule, RoleAssignment, RoleInheritance, RoleName, UserId,
};
use super::store::PolicyStore;
use crate::error::{AuthzError, Result};
use crate::telemetry::PolicyMetrics;

/// Default upper bound on a single reload.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Granted through this role of the user's effective set.
    Allow { via_role: RoleName },
    /// Denied, with a reason for diagnostics.
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

/// Everything a user can do, resolved against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub role: Option<RoleName>,
    pub effective_roles: Vec<RoleName>,
    pub resources: BTreeMap<String, Vec<Action>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable policy state served by the enforcer.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    graph: RoleGraph,
    index: PolicyIndex,
    assignments: HashMap<UserId, RoleName>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl PolicySnapshot {
    /// The state before the first reload: denies everything.
    pub fn empty() -> Self {
        Self {
            graph: RoleGraph::new(),
            index: PolicyIndex::default(),
            assignments: HashMap::new(),
            generation: 0,
            loaded_at: Utc::now(),
        }
    }

    /// Build a snapshot from store contents.
    ///
    /// Fails with `CycleDetected` if the stored edges are cyclic.
    pub fn build(
        rules: &[PolicyRule],
        assignments: &[RoleAssignment],
        edges: &[RoleInheritance],
        generation: u64,
    ) -> Result<Self> {
        let graph = RoleGraph::build(edges)?;
        let index = PolicyIndex::build(rules);
        let assignments = assignments
            .iter()
            .map(|a| (a.user_id.clone(), a.role.clone()))
            .collect();

        Ok(Self {
            graph,
            index,
            assignments,
            generation,
            loaded_at: Utc::now(),
        })
    }

    /// Evaluate a request.
    ///
    /// Allowed when any role in the effective set of the user's assigned
    /// role grants `action` on exactly `resource`. There is no explicit deny.
    pub fn decide(&self, user_id: &str, resource: &str, action: Action) -> Decision {
        let Some(role) = self.assignments.get(user_id) else {
            return Decision::Deny(format!("user '{}' has no role assignment", user_id));
        };

        let effective = self.graph.effective_roles(role);
        for candidate in &effective {
            if self.index.actions_for(candidate.as_str(), resource).contains(action) {
                return Decision::Allow {
                    via_role: candidate.clone(),
                };
            }
        }

        Decision::Deny(format!(
            "role '{}' does not grant {} on {}",
            role, action, resource
        ))
    }

    pub fn is_allowed(&self, user_id: &str, resource: &str, action: Action) -> bool {
        self.decide(user_id, resource, action).is_allowed()
    }

    /// Union of grants across the user's effective roles, by resource.
    pub fn effective_permissions(&self, user_id: &str) -> EffectivePermissions {
        let role = self.assignments.get(user_id).cloned();
        let effective: Vec<RoleName> = role
            .as_ref()
            .map(|r| self.graph.effective_roles(r).into_iter().collect())
            .unwrap_or_default();

        let mut resources: BTreeMap<String, ActionSet> = BTreeMap::new();
        for r in &effective {
            for (resource, actions) in self.index.resources_for(r.as_str()) {
                let entry = resources.entry(resource.to_string()).or_default();
                *entry = entry.union(actions);
            }
        }

        EffectivePermissions {
            user_id: UserId::new(user_id),
            role,
            effective_roles: effective,
            resources: resources
                .into_iter()
                .map(|(resource, actions)| (resource, actions.iter().collect()))
                .collect(),
        }
    }

    pub fn role_of(&self, user_id: &str) -> Option<&RoleName> {
        self.assignments.get(user_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn rule_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}

/// Summary of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    pub rules: usize,
    pub edges: usize,
    pub assignments: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcer
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-lived, shared authorization decision point.
///
/// Construct once at startup and hand an `Arc<Enforcer>` to the middleware
/// and the administrative service.
pub struct Enforcer {
    store: Arc<dyn PolicyStore>,

    /// Serving snapshot. The lock is only held long enough to clone the `Arc`.
    current: RwLock<Arc<PolicySnapshot>>,

    /// Serializes reloads.
    reload_lock: tokio::sync::Mutex<()>,

    reload_timeout: Duration,

    last_error: Mutex<Option<String>>,
}

impl Enforcer {
    /// Create an enforcer that denies everything until the first reload.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(PolicySnapshot::empty())),
            reload_lock: tokio::sync::Mutex::new(()),
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            last_error: Mutex::new(None),
        }
    }

    /// Bound each reload by `timeout`.
    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    /// Create an enforcer and perform the initial load.
    pub async fn build(store: Arc<dyn PolicyStore>, reload_timeout: Duration) -> Result<Self> {
        let enforcer = Self::new(store).with_reload_timeout(reload_timeout);
        enforcer.reload().await?;
        Ok(enforcer)
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// The snapshot currently serving decisions.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.read().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide whether `user_id` may perform `action` on `resource`.
    ///
    /// Never fails and never touches the store.
    pub fn is_allowed(&self, user_id: &str, resource: &str, action: Action) -> bool {
        self.decide(user_id, resource, action).is_allowed()
    }

    /// Like [`is_allowed`](Self::is_allowed), with the granting role or the
    /// denial reason.
    pub fn decide(&self, user_id: &str, resource: &str, action: Action) -> Decision {
        let decision = self.snapshot().decide(user_id, resource, action);
        PolicyMetrics::record_decision(decision.is_allowed());

        match &decision {
            Decision::Allow { via_role } => debug!(
                user_id = %user_id,
                resource = %resource,
                action = %action,
                via_role = %via_role,
                "Access allowed"
            ),
            Decision::Deny(reason) => debug!(
                user_id = %user_id,
                resource = %resource,
                action = %action,
                reason = %reason,
                "Access denied"
            ),
        }

        decision
    }

    pub fn effective_permissions(&self, user_id: &str) -> EffectivePermissions {
        self.snapshot().effective_permissions(user_id)
    }

    /// Number of successful reloads so far.
    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    /// Message of the most recent reload failure, cleared by the next success.
    pub fn last_reload_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reload
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild the snapshot from the store and swap it in.
    ///
    /// On any failure, including the timeout and a cyclic edge set, the
    /// previous snapshot keeps serving and the error is logged, counted and
    /// returned.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let _guard = self.reload_lock.lock().await;
        let started = Instant::now();
        let generation = self.snapshot().generation() + 1;

        let loaded = match tokio::time::timeout(self.reload_timeout, self.load(generation)).await {
            Ok(result) => result,
            Err(_) => Err(AuthzError::ReloadTimeout(self.reload_timeout)),
        };
        let elapsed = started.elapsed();

        match loaded {
            Ok(snapshot) => {
                let report = ReloadReport {
                    generation,
                    rules: snapshot.rule_count(),
                    edges: snapshot.edge_count(),
                    assignments: snapshot.assignment_count(),
                    duration: elapsed,
                };

                *self.current.write() = Arc::new(snapshot);
                *self.last_error.lock() = None;

                PolicyMetrics::record_reload_success(
                    elapsed,
                    report.rules,
                    report.edges,
                    report.assignments,
                );
                info!(
                    generation = report.generation,
                    rules = report.rules,
                    edges = report.edges,
                    assignments = report.assignments,
                    duration_ms = elapsed.as_millis() as u64,
                    "Policy reloaded"
                );

                Ok(report)
            }
            Err(error) => {
                let reason = match &error {
                    AuthzError::ReloadTimeout(_) => "timeout",
                    AuthzError::CycleDetected { .. } => "cycle",
                    _ => "store",
                };
                PolicyMetrics::record_reload_failure(elapsed, reason);
                error.log();
                warn!(
                    serving_generation = generation - 1,
                    error = %error,
                    "Policy reload failed, keeping last known good policy"
                );

                *self.last_error.lock() = Some(error.to_string());
                Err(error)
            }
        }
    }

    async fn load(&self, generation: u64) -> Result<PolicySnapshot> {
        let tables = self.store.load_all().await?;
        PolicySnapshot::build(&tables.rules, &tables.assignments, &tables.edges, generation)
    }
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("generation", &self.generation())
            .field("reload_timeout", &self.reload_timeout)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
