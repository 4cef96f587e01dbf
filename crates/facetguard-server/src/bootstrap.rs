//! Builds the engine from a loaded configuration.

use std::path::Path;
use std::sync::Arc;

use facetguard_domain::model::PrivilegeRegistry;
use facetguard_domain::register_cache_metrics;
use facetguard_storage::{MemoryDomainStore, MemoryNodeStore, MemoryRoleStore};
use tracing::info;

use crate::config::{ConfigLoadError, FacetGuardConfig, SecuritySettings};
use crate::observability::{init_logging, LoggingConfig};
use crate::session::{Resolver, SessionFactory};

/// Loads the configuration at `path`, installs logging from its `logging`
/// section and builds the session factory over `nodes`.
pub fn start<P: AsRef<Path>>(
    path: P,
    nodes: Arc<MemoryNodeStore>,
) -> Result<SessionFactory, ConfigLoadError> {
    let config = FacetGuardConfig::load(path)?;
    if !init_logging(&LoggingConfig::from(&config.logging)) {
        info!("logging already initialised, keeping the existing subscriber");
    }
    Ok(build_session_factory(&config, nodes))
}

/// Standard privileges plus the configured custom privileges and aggregates.
pub fn privilege_registry(security: &SecuritySettings) -> PrivilegeRegistry {
    let mut registry = PrivilegeRegistry::standard();
    for privilege in &security.privileges {
        registry.register_privilege(privilege.clone());
    }
    for aggregate in &security.aggregates {
        registry.register_aggregate(aggregate.name.clone(), aggregate.members.iter().cloned());
    }
    registry
}

/// Wires stores, resolver and session factory over `nodes`.
///
/// Invalid facet rules in the configured domains are logged and their
/// domain rules skipped.
pub fn build_session_factory(
    config: &FacetGuardConfig,
    nodes: Arc<MemoryNodeStore>,
) -> SessionFactory {
    register_cache_metrics();
    metrics::describe_gauge!(
        "facetguard_open_sessions",
        "Number of open access evaluator sessions"
    );

    let registry = Arc::new(privilege_registry(&config.security));
    let roles = Arc::new(MemoryRoleStore::with_roles(
        registry,
        config.security.roles.iter().cloned(),
    ));
    let domains = Arc::new(MemoryDomainStore::from_definitions(&config.security.domains));
    let resolver = Arc::new(Resolver::with_config(
        Arc::clone(&domains),
        Arc::clone(&roles),
        config.resolver.to_resolver_config(),
    ));

    info!(
        domains = domains.len(),
        roles = roles.len(),
        document_type = %config.access.document_type,
        "facetguard engine bootstrapped"
    );

    SessionFactory::new(
        nodes,
        roles,
        domains,
        resolver,
        config.access.to_evaluator_config(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregateDefinition;
    use facetguard_domain::model::privileges::{JCR_ALL, JCR_MODIFY_PROPERTIES, JCR_READ};
    use facetguard_domain::model::{
        AuthRole, DomainDefinition, DomainRuleDefinition, FacetRuleDefinition,
    };
    use facetguard_domain::RoleProvider;
    use facetguard_storage::RoleDefinition;
    use std::collections::BTreeSet;

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_registry_includes_custom_privileges_and_aggregates() {
        let security = SecuritySettings {
            privileges: vec!["custom:publish".to_string()],
            aggregates: vec![AggregateDefinition {
                name: "custom:editorial".to_string(),
                members: vec![JCR_MODIFY_PROPERTIES.to_string(), "custom:publish".to_string()],
            }],
            ..Default::default()
        };

        let registry = privilege_registry(&security);

        assert!(registry.is_aggregate("custom:editorial"));
        assert_eq!(
            registry.expand(["custom:editorial"]),
            names(&[JCR_MODIFY_PROPERTIES, "custom:publish"])
        );
        assert!(registry.expand([JCR_ALL]).contains("custom:publish"));
    }

    #[test]
    fn test_build_skips_invalid_rules_and_uses_configured_roles() {
        // Arrange
        let mut config = FacetGuardConfig::default();
        config.security.roles = vec![RoleDefinition::new("readonly", [JCR_READ])];
        config.security.domains = vec![DomainDefinition {
            path: "/hippo:configuration/hippo:domains/news".to_string(),
            domain_rules: vec![
                DomainRuleDefinition {
                    name: "broken".to_string(),
                    facet_rules: vec![FacetRuleDefinition::new("", "x")],
                },
                DomainRuleDefinition {
                    name: "news".to_string(),
                    facet_rules: vec![FacetRuleDefinition::new("nodetype", "doc:news")],
                },
            ],
            auth_roles: vec![AuthRole::new("readonly").with_user("alice")],
        }];

        // Act
        let factory = build_session_factory(&config, MemoryNodeStore::new_shared());

        // Assert
        let news = factory
            .domains()
            .domain("/hippo:configuration/hippo:domains/news")
            .unwrap();
        assert_eq!(news.domain_rules.len(), 1);
        assert_eq!(news.domain_rules[0].name, "news");
        assert_eq!(
            factory.roles().resolve_permission_names(&names(&["read"])),
            names(&[JCR_READ])
        );
        assert_eq!(
            factory.resolver().config().ttl,
            config.resolver.to_resolver_config().ttl
        );
    }
}
