//! RBAC data models: identifiers, actions, policy rules, assignments and
//! inheritance edges.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::AuthzError;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier (the authenticated principal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A role name. Roles have no entity of their own; a role exists as long as
/// some policy rule or inheritance edge mentions it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(pub String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for RoleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Action
// ═══════════════════════════════════════════════════════════════════════════════

/// The four actions a policy rule can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Map an HTTP method to the action it performs.
    ///
    /// `GET → read`, `POST → create`, `PUT | PATCH → update`,
    /// `DELETE → delete`. Any other method maps to no action and must be
    /// denied by the caller.
    pub fn from_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Read),
            "POST" => Some(Self::Create),
            "PUT" | "PATCH" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Create => 0b0001,
            Self::Read => 0b0010,
            Self::Update => 0b0100,
            Self::Delete => 0b1000,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(AuthzError::InvalidInput(format!(
                "unknown action '{}', expected one of create, read, update, delete",
                other
            ))),
        }
    }
}

/// A compact set of actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActionSet(u8);

impl ActionSet {
    pub const EMPTY: ActionSet = ActionSet(0);

    pub fn insert(&mut self, action: Action) {
        self.0 |= action.bit();
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn union(self, other: ActionSet) -> ActionSet {
        ActionSet(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Actions in canonical order (create, read, update, delete).
    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = ActionSet::default();
        for action in iter {
            set.insert(action);
        }
        set
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tuples
// ═══════════════════════════════════════════════════════════════════════════════

/// A grant of one action on one resource to one role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: RoleName,
    pub resource: String,
    pub action: Action,
}

impl PolicyRule {
    pub fn new(role: impl Into<RoleName>, resource: impl Into<String>, action: Action) -> Self {
        Self {
            role: role.into(),
            resource: resource.into(),
            action,
        }
    }

    /// Reject empty or whitespace-padded fields before they reach the store.
    pub fn validate(&self) -> Result<(), AuthzError> {
        validate_field("role", self.role.as_str())?;
        validate_field("resource", &self.resource)
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.role, self.resource, self.action)
    }
}

/// The single active role of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role: RoleName,
}

impl RoleAssignment {
    pub fn new(user_id: impl Into<UserId>, role: impl Into<RoleName>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for RoleAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.user_id, self.role)
    }
}

/// Directed edge: `role` gains every permission of `inherits_from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleInheritance {
    pub role: RoleName,
    pub inherits_from: RoleName,
}

impl RoleInheritance {
    pub fn new(role: impl Into<RoleName>, inherits_from: impl Into<RoleName>) -> Self {
        Self {
            role: role.into(),
            inherits_from: inherits_from.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthzError> {
        validate_field("role", self.role.as_str())?;
        validate_field("inherits_from", self.inherits_from.as_str())
    }
}

impl fmt::Display for RoleInheritance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.role, self.inherits_from)
    }
}

/// Policy rules sharing a role and resource, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGroup {
    pub role: RoleName,
    pub resource: String,
    pub actions: Vec<Action>,
}

fn validate_field(name: &str, value: &str) -> Result<(), AuthzError> {
    if value.is_empty() {
        return Err(AuthzError::InvalidInput(format!("{} must not be empty", name)));
    }
    if value.trim() != value {
        return Err(AuthzError::InvalidInput(format!(
            "{} must not have leading or trailing whitespace",
            name
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalize a request path to the base resource used in policy rules.
///
/// A trailing all-digit segment (a record id) and a trailing slash are
/// dropped, so `/api/users/5` and `/api/users/` both become `/api/users`.
/// No other rewriting happens: `/api/users/5/posts` stays as is.
pub fn normalize_resource_path(path: &str) -> String {
    let trimmed = match path.trim_end_matches('/') {
        "" => return "/".to_string(),
        p => p,
    };

    match trimmed.rsplit_once('/') {
        Some((base, last)) if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) => {
            if base.is_empty() {
                "/".to_string()
            } else {
                base.to_string()
            }
        }
        _ => trimmed.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!("read".parse::<Action>().unwrap(), Action::Read);
        assert_eq!("DELETE".parse::<Action>().unwrap(), Action::Delete);
        assert!("manage".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_from_method() {
        assert_eq!(Action::from_method("GET"), Some(Action::Read));
        assert_eq!(Action::from_method("POST"), Some(Action::Create));
        assert_eq!(Action::from_method("PUT"), Some(Action::Update));
        assert_eq!(Action::from_method("patch"), Some(Action::Update));
        assert_eq!(Action::from_method("DELETE"), Some(Action::Delete));
        assert_eq!(Action::from_method("OPTIONS"), None);
        assert_eq!(Action::from_method("HEAD"), None);
    }

    #[test]
    fn test_action_set() {
        let mut set = ActionSet::default();
        assert!(set.is_empty());

        set.insert(Action::Read);
        set.insert(Action::Delete);
        set.insert(Action::Read);

        assert_eq!(set.len(), 2);
        assert!(set.contains(Action::Read));
        assert!(!set.contains(Action::Create));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Action::Read, Action::Delete]);

        let other: ActionSet = [Action::Create].into_iter().collect();
        assert_eq!(set.union(other).len(), 3);
    }

    #[test]
    fn test_rule_validation() {
        assert!(PolicyRule::new("admin", "/api/users", Action::Read).validate().is_ok());
        assert!(PolicyRule::new("", "/api/users", Action::Read).validate().is_err());
        assert!(PolicyRule::new("admin", " /api", Action::Read).validate().is_err());
        assert!(RoleInheritance::new("editor", "").validate().is_err());
    }

    #[test]
    fn test_rule_ordering_and_display() {
        let a = PolicyRule::new("admin", "/api/a", Action::Read);
        let b = PolicyRule::new("admin", "/api/b", Action::Create);
        assert!(a < b);
        assert_eq!(a.to_string(), "(admin, /api/a, read)");
        assert_eq!(RoleInheritance::new("editor", "viewer").to_string(), "editor -> viewer");
    }

    #[test]
    fn test_normalize_resource_path() {
        assert_eq!(normalize_resource_path("/api/users/5"), "/api/users");
        assert_eq!(normalize_resource_path("/api/users/"), "/api/users");
        assert_eq!(normalize_resource_path("/api/users"), "/api/users");
        assert_eq!(normalize_resource_path("/api/users/5/posts"), "/api/users/5/posts");
        assert_eq!(normalize_resource_path("/api/users/abc"), "/api/users/abc");
        assert_eq!(normalize_resource_path("/42"), "/");
        assert_eq!(normalize_resource_path("/"), "/");
    }

    #[test]
    fn test_user_id_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(UserId::new("u1"), RoleName::new("admin"));
        assert_eq!(map.get("u1"), Some(&RoleName::new("admin")));
    }
}
