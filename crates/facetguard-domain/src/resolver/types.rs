//! Types for the domain resolver.

use std::collections::BTreeSet;

use crate::error::{DomainError, DomainResult};
use crate::model::{FacetAuthDomain, UserPrincipal};

/// Cache key: the exact (user, groups, user roles) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrincipalKey {
    pub user_id: String,
    pub group_ids: BTreeSet<String>,
    pub user_role_ids: BTreeSet<String>,
}

impl From<&UserPrincipal> for PrincipalKey {
    fn from(user: &UserPrincipal) -> Self {
        Self {
            user_id: user.user_id.clone(),
            group_ids: user.group_ids.clone(),
            user_role_ids: user.user_role_ids.clone(),
        }
    }
}

/// The resolved domains of one principal; at most one per domain name.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDomains {
    domains: Vec<FacetAuthDomain>,
    permissions: BTreeSet<String>,
}

impl ResolvedDomains {
    /// Adds a domain.
    ///
    /// A second domain with the same name is rejected with
    /// [`DomainError::AmbiguousResolvedDomain`]; the first one is kept.
    pub fn insert(&mut self, domain: FacetAuthDomain) -> DomainResult<()> {
        if self.get(&domain.name).is_some() {
            return Err(DomainError::AmbiguousResolvedDomain { name: domain.name });
        }
        self.permissions.extend(domain.permissions.iter().cloned());
        self.domains.push(domain);
        Ok(())
    }

    /// Folds another set in, merging same-named domains.
    pub fn merge(&mut self, other: &ResolvedDomains) {
        for domain in other.iter() {
            match self.domains.iter_mut().find(|d| d.name == domain.name) {
                Some(existing) => existing.absorb(domain),
                None => self.domains.push(domain.clone()),
            }
            self.permissions.extend(domain.permissions.iter().cloned());
        }
    }

    pub fn get(&self, name: &str) -> Option<&FacetAuthDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacetAuthDomain> {
        self.domains.iter()
    }

    /// Union of the leaf permissions of all domains.
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
