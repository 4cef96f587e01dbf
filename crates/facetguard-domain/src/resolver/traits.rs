//! Traits for the configuration and role collaborators needed by the resolver.

use std::collections::BTreeSet;

use crate::error::DomainResult;
use crate::model::Domain;

/// A role resolved to the privileges it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub name: String,
    pub privileges: BTreeSet<String>,
}

impl ResolvedRole {
    pub fn new<I, S>(name: impl Into<String>, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            privileges: privileges.into_iter().map(Into::into).collect(),
        }
    }
}

/// Source of configured domains.
pub trait DomainSource: Send + Sync {
    /// Returns every configured domain.
    fn domains(&self) -> DomainResult<Vec<Domain>>;

    /// Returns the domains with a role assignment referencing the user, any
    /// of the groups or any of the user roles.
    ///
    /// Default implementation filters [`DomainSource::domains`]. Override when
    /// the source can answer from an index.
    fn domains_for_principal(
        &self,
        user_id: &str,
        group_ids: &BTreeSet<String>,
        user_role_ids: &BTreeSet<String>,
    ) -> DomainResult<Vec<Domain>> {
        Ok(self
            .domains()?
            .into_iter()
            .filter(|d| !d.roles_for(user_id, group_ids, user_role_ids).is_empty())
            .collect())
    }
}

/// Resolution of role names to privileges and of privilege or action names
/// to leaf permission names.
pub trait RoleProvider: Send + Sync {
    /// Resolves role names; unknown roles are omitted.
    fn resolve_roles(&self, role_names: &BTreeSet<String>) -> Vec<ResolvedRole>;

    /// Expands privilege or action names, aggregates included, into leaf names.
    fn resolve_permission_names(&self, names: &BTreeSet<String>) -> BTreeSet<String>;
}
