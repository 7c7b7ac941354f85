//! Seed policy files.
//!
//! A seed file holds one tuple per line:
//!
//! ```text
//! # role rules
//! p, admin, /api/users, delete
//! # user assignments
//! g, alice, admin
//! # inheritance edges
//! g2, admin, user
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Applying a seed is
//! idempotent: tuples that already exist are skipped, and a user that already
//! holds a role keeps it.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use super::assignment::RoleAssignmentManager;
use super::defaults::DefaultRole;
use super::models::{PolicyRule, RoleAssignment, RoleInheritance};
use super::store::PolicyStore;
use crate::error::{AuthzError, Result};

/// Tuples to load into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPolicy {
    pub rules: Vec<PolicyRule>,
    pub assignments: Vec<RoleAssignment>,
    pub edges: Vec<RoleInheritance>,
}

/// What applying a seed changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub rules_added: usize,
    pub rules_skipped: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
    pub assignments_added: usize,
    pub assignments_skipped: usize,

    /// Lines refused by validation, with the reason.
    pub rejected: Vec<String>,
}

impl SeedReport {
    pub fn changed(&self) -> bool {
        self.rules_added + self.edges_added + self.assignments_added > 0
    }
}

impl SeedPolicy {
    /// The built-in default rules.
    pub fn defaults() -> Self {
        Self {
            rules: DefaultRole::all_rules(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.assignments.is_empty() && self.edges.is_empty()
    }

    /// Append the tuples of `other`.
    pub fn extend(&mut self, other: SeedPolicy) {
        self.rules.extend(other.rules);
        self.assignments.extend(other.assignments);
        self.edges.extend(other.edges);
    }

    /// Parse seed text. Errors name the offending line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut seed = Self::default();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let bad_line = |reason: &str| {
                AuthzError::InvalidInput(format!(
                    "seed line {}: {}: '{}'",
                    number + 1,
                    reason,
                    line
                ))
            };

            match fields.as_slice() {
                ["p", role, resource, action] => {
                    let action = action
                        .parse()
                        .map_err(|_| bad_line("unknown action"))?;
                    let rule = PolicyRule::new(*role, *resource, action);
                    rule.validate().map_err(|e| bad_line(&e.to_string()))?;
                    seed.rules.push(rule);
                }
                ["g", user, role] => {
                    if user.is_empty() || role.is_empty() {
                        return Err(bad_line("empty field"));
                    }
                    seed.assignments.push(RoleAssignment::new(*user, *role));
                }
                ["g2", role, inherits_from] => {
                    let edge = RoleInheritance::new(*role, *inherits_from);
                    edge.validate().map_err(|e| bad_line(&e.to_string()))?;
                    seed.edges.push(edge);
                }
                ["p", ..] => return Err(bad_line("expected 'p, role, resource, action'")),
                ["g", ..] => return Err(bad_line("expected 'g, user, role'")),
                ["g2", ..] => return Err(bad_line("expected 'g2, role, inherits_from'")),
                _ => return Err(bad_line("unknown record type")),
            }
        }

        Ok(seed)
    }

    /// Read and parse a seed file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Load the seed into `store`: rules, then edges, then assignments.
    ///
    /// Duplicates are skipped. Cycle-closing edges and assignments of roles
    /// that are still unknown are rejected and listed in the report. Store
    /// failures abort the seed. Other administrative mutations wait until
    /// the seed is done.
    pub async fn apply(
        &self,
        store: &dyn PolicyStore,
        manager: &RoleAssignmentManager,
    ) -> Result<SeedReport> {
        let guard = manager.lock().await;
        let mut report = SeedReport::default();

        for rule in &self.rules {
            match store.create_policy(rule).await {
                Ok(()) => report.rules_added += 1,
                Err(AuthzError::DuplicateRule(_)) => report.rules_skipped += 1,
                Err(e) => return Err(e),
            }
        }

        for edge in &self.edges {
            match manager.add_inheritance_locked(&guard, edge).await {
                Ok(()) => report.edges_added += 1,
                Err(AuthzError::DuplicateEdge(_)) => report.edges_skipped += 1,
                Err(e @ AuthzError::CycleDetected { .. }) => {
                    warn!(edge = %edge, "Seed edge rejected");
                    report.rejected.push(format!("g2 {}: {}", edge, e));
                }
                Err(e) => return Err(e),
            }
        }

        for assignment in &self.assignments {
            if store.role_of(&assignment.user_id).await?.is_some() {
                report.assignments_skipped += 1;
                continue;
            }
            match manager
                .assign_role_locked(&guard, &assignment.user_id, &assignment.role)
                .await
            {
                Ok(()) => report.assignments_added += 1,
                Err(e @ AuthzError::UnknownRole(_)) => {
                    warn!(assignment = %assignment, "Seed assignment rejected");
                    report.rejected.push(format!("g {}: {}", assignment, e));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            rules_added = report.rules_added,
            edges_added = report.edges_added,
            assignments_added = report.assignments_added,
            rejected = report.rejected.len(),
            "Seed applied"
        );

        Ok(report)
    }
}
