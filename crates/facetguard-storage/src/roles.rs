//! In-memory role store.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use facetguard_domain::model::PrivilegeRegistry;
use facetguard_domain::resolver::ResolvedRole;
use facetguard_domain::RoleProvider;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StorageError, StorageResult};

/// A configured role: its own privileges plus the roles it includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub privileges: BTreeSet<String>,
    /// Roles whose privileges this role inherits.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl RoleDefinition {
    pub fn new<I, S>(name: impl Into<String>, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            privileges: privileges.into_iter().map(Into::into).collect(),
            roles: BTreeSet::new(),
        }
    }

    pub fn including(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

/// Role provider over in-memory role definitions.
#[derive(Debug)]
pub struct MemoryRoleStore {
    roles: DashMap<String, RoleDefinition>,
    registry: Arc<PrivilegeRegistry>,
}

impl Default for MemoryRoleStore {
    fn default() -> Self {
        Self::new(Arc::new(PrivilegeRegistry::standard()))
    }
}

impl MemoryRoleStore {
    pub fn new(registry: Arc<PrivilegeRegistry>) -> Self {
        Self {
            roles: DashMap::new(),
            registry,
        }
    }

    /// Creates a store pre-populated with `roles`.
    pub fn with_roles<I>(registry: Arc<PrivilegeRegistry>, roles: I) -> Self
    where
        I: IntoIterator<Item = RoleDefinition>,
    {
        let store = Self::new(registry);
        for role in roles {
            store.put_role(role);
        }
        store
    }

    pub fn registry(&self) -> &Arc<PrivilegeRegistry> {
        &self.registry
    }

    /// Adds or replaces a role.
    pub fn put_role(&self, role: RoleDefinition) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn remove_role(&self, name: &str) -> StorageResult<RoleDefinition> {
        self.roles
            .remove(name)
            .map(|(_, role)| role)
            .ok_or_else(|| StorageError::RoleNotFound {
                role: name.to_string(),
            })
    }

    pub fn role(&self, name: &str) -> Option<RoleDefinition> {
        self.roles.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Privileges of a role and of every role it includes, transitively.
    ///
    /// Returns `None` for unknown roles. Inclusion cycles are cut.
    pub fn effective_privileges(&self, name: &str) -> Option<BTreeSet<String>> {
        self.roles.get(name)?;
        let mut privileges = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut pending = vec![name.to_string()];
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(role) = self.roles.get(&current) else {
                warn!(role = %current, included_by = %name, "included role is not defined");
                continue;
            };
            privileges.extend(role.privileges.iter().cloned());
            pending.extend(role.roles.iter().cloned());
        }
        Some(privileges)
    }
}

impl RoleProvider for MemoryRoleStore {
    fn resolve_roles(&self, role_names: &BTreeSet<String>) -> Vec<ResolvedRole> {
        role_names
            .iter()
            .filter_map(|name| {
                self.effective_privileges(name)
                    .map(|privileges| ResolvedRole::new(name.clone(), privileges))
            })
            .collect()
    }

    fn resolve_permission_names(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        self.registry.expand(names.iter().map(String::as_str))
    }
}
