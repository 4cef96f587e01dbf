//! In-memory domain configuration store.

use dashmap::DashMap;
use facetguard_domain::model::{Domain, DomainDefinition};
use facetguard_domain::{DomainResult, DomainSource};

use crate::error::{StorageError, StorageResult};

/// Domain source over in-memory domains, keyed by configuration path.
///
/// Domains are returned in path order so that duplicate-name resolution is
/// deterministic.
#[derive(Debug, Default)]
pub struct MemoryDomainStore {
    domains: DashMap<String, Domain>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from raw definitions; invalid facet rules are skipped.
    pub fn from_definitions<'a, I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = &'a DomainDefinition>,
    {
        let store = Self::new();
        for definition in definitions {
            store.put_domain(definition.to_domain());
        }
        store
    }

    /// Adds or replaces the domain at its path.
    pub fn put_domain(&self, domain: Domain) {
        self.domains.insert(domain.path.clone(), domain);
    }

    pub fn remove_domain(&self, path: &str) -> StorageResult<Domain> {
        self.domains
            .remove(path)
            .map(|(_, domain)| domain)
            .ok_or_else(|| StorageError::DomainNotFound {
                path: path.to_string(),
            })
    }

    pub fn domain(&self, path: &str) -> Option<Domain> {
        self.domains.get(path).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl DomainSource for MemoryDomainStore {
    fn domains(&self) -> DomainResult<Vec<Domain>> {
        let mut domains: Vec<Domain> = self
            .domains
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        domains.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetguard_domain::model::{AuthRole, DomainRule, FacetKind, FacetRule};
    use std::collections::BTreeSet;

    fn domain(path: &str, user: &str) -> Domain {
        Domain::new(path)
            .with_rule(DomainRule::new(
                "all",
                vec![FacetRule::new(FacetKind::NodeType, "nt:base")],
            ))
            .with_auth_role(AuthRole::new("readonly").with_user(user))
    }

    #[test]
    fn test_domains_are_sorted_by_path() {
        let store = MemoryDomainStore::new();
        store.put_domain(domain("/d/b", "alice"));
        store.put_domain(domain("/d/a", "alice"));

        let paths: Vec<String> = store.domains().unwrap().into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["/d/a".to_string(), "/d/b".to_string()]);
    }

    #[test]
    fn test_principal_filter_uses_all_channels() {
        let store = MemoryDomainStore::new();
        store.put_domain(domain("/d/alice", "alice"));
        store.put_domain(domain("/d/bob", "bob"));
        store.put_domain(
            Domain::new("/d/group").with_auth_role(AuthRole::new("readonly").with_group("staff")),
        );

        let groups: BTreeSet<String> = ["staff".to_string()].into_iter().collect();
        let found = store
            .domains_for_principal("alice", &groups, &BTreeSet::new())
            .unwrap();
        let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/d/alice", "/d/group"]);
    }

    #[test]
    fn test_from_definitions_and_remove() {
        let definition: DomainDefinition = serde_json::from_str(
            r#"{
                "path": "/hippo:configuration/hippo:domains/news",
                "domain_rules": [
                    {"name": "articles", "facet_rules": [{"facet": "nodetype", "value": "doc:article"}]}
                ],
                "auth_roles": [{"role": "readonly", "users": ["alice"]}]
            }"#,
        )
        .unwrap();
        let store = MemoryDomainStore::from_definitions([&definition]);

        let news = store.domain("/hippo:configuration/hippo:domains/news").unwrap();
        assert_eq!(news.domain_rules.len(), 1);
        assert!(store.remove_domain(&news.path).is_ok());
        assert!(store.is_empty());
        assert!(matches!(
            store.remove_domain(&news.path),
            Err(StorageError::DomainNotFound { .. })
        ));
    }
}
