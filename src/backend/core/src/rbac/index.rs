//! In-memory index from (role, resource) to granted actions.

use std::collections::HashMap;

use super::models::{ActionSet, PolicyRule, RoleName};

/// Granted actions grouped by role, then by exact resource string.
#[derive(Debug, Clone, Default)]
pub struct PolicyIndex {
    grants: HashMap<RoleName, HashMap<String, ActionSet>>,
    rule_count: usize,
}

impl PolicyIndex {
    /// Group `rules` by (role, resource). Repeated rules collapse.
    pub fn build(rules: &[PolicyRule]) -> Self {
        let mut grants: HashMap<RoleName, HashMap<String, ActionSet>> = HashMap::new();
        for rule in rules {
            grants
                .entry(rule.role.clone())
                .or_default()
                .entry(rule.resource.clone())
                .or_default()
                .insert(rule.action);
        }

        let rule_count = grants
            .values()
            .flat_map(|resources| resources.values())
            .map(|actions| actions.len())
            .sum();

        Self { grants, rule_count }
    }

    /// Actions granted to `role` on exactly `resource`. Empty when nothing matches.
    pub fn actions_for(&self, role: &str, resource: &str) -> ActionSet {
        self.grants
            .get(role)
            .and_then(|resources| resources.get(resource))
            .copied()
            .unwrap_or_default()
    }

    /// Resources with at least one grant for `role`.
    pub fn resources_for<'a>(
        &'a self,
        role: &str,
    ) -> impl Iterator<Item = (&'a str, ActionSet)> + 'a {
        self.grants
            .get(role)
            .into_iter()
            .flat_map(|resources| resources.iter().map(|(r, a)| (r.as_str(), *a)))
    }

    /// Roles with at least one grant.
    pub fn roles(&self) -> impl Iterator<Item = &RoleName> {
        self.grants.keys()
    }

    /// Number of distinct (role, resource, action) rules indexed.
    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }
}
