//! Principals an access evaluator acts for.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A user identity with its group and user-role memberships.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserPrincipal {
    pub user_id: String,
    #[serde(default)]
    pub group_ids: BTreeSet<String>,
    #[serde(default)]
    pub user_role_ids: BTreeSet<String>,
}

impl UserPrincipal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_ids: BTreeSet::new(),
            user_role_ids: BTreeSet::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_ids.insert(group.into());
        self
    }

    pub fn with_user_role(mut self, role: impl Into<String>) -> Self {
        self.user_role_ids.insert(role.into());
        self
    }
}

/// The principal of a session, determined once when the evaluator is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Principal {
    /// Full-trust system identity; every check is granted.
    System,
    /// A single user.
    User(UserPrincipal),
    /// A session acting with the combined rights of several users.
    Delegate(Vec<UserPrincipal>),
}

impl Principal {
    pub fn user(user: UserPrincipal) -> Self {
        Principal::User(user)
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Principal::System)
    }

    /// The user principals this principal stands for.
    pub fn users(&self) -> &[UserPrincipal] {
        match self {
            Principal::System => &[],
            Principal::User(user) => std::slice::from_ref(user),
            Principal::Delegate(users) => users,
        }
    }

    /// Returns true when `value` is one of the principal's user ids.
    pub fn has_user_id(&self, value: &str) -> bool {
        self.users().iter().any(|u| u.user_id == value)
    }

    /// Returns true when `value` is one of the principal's group ids.
    pub fn has_group_id(&self, value: &str) -> bool {
        self.users().iter().any(|u| u.group_ids.contains(value))
    }
}
