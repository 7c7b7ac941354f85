//! Built-in roles and the policy they ship with.
//!
//! | Role  | Grants                                                        |
//! |-------|---------------------------------------------------------------|
//! | admin | read/create/update `/api/me`, full CRUD on `/api/users`       |
//! | user  | read/update `/api/me`                                         |
//!
//! The defaults carry no inheritance edges and no user assignments.

use super::models::{Action, PolicyRule};

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRole {
    Admin,
    User,
}

impl DefaultRole {
    /// Get the role name as stored in policy rules.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Manage user accounts and their own profile",
            Self::User => "Read and update their own profile",
        }
    }

    /// (resource, action) pairs granted to this role.
    pub fn grants(&self) -> &'static [(&'static str, Action)] {
        match self {
            Self::Admin => &[
                ("/api/me", Action::Read),
                ("/api/me", Action::Create),
                ("/api/me", Action::Update),
                ("/api/users", Action::Create),
                ("/api/users", Action::Read),
                ("/api/users", Action::Update),
                ("/api/users", Action::Delete),
            ],
            Self::User => &[("/api/me", Action::Read), ("/api/me", Action::Update)],
        }
    }

    pub fn rules(&self) -> Vec<PolicyRule> {
        self.grants()
            .iter()
            .map(|(resource, action)| PolicyRule::new(self.id(), *resource, *action))
            .collect()
    }

    pub fn all() -> [DefaultRole; 2] {
        [Self::Admin, Self::User]
    }

    /// Every default rule, admin first.
    pub fn all_rules() -> Vec<PolicyRule> {
        Self::all().iter().flat_map(|role| role.rules()).collect()
    }
}
