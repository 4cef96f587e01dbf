//! Session factory: one access evaluator per principal session.
//!
//! The factory owns the shared collaborators (content tree, roles, domains)
//! and the shared domain resolver. Each opened session gets its own
//! evaluator, subscribed to the content tree's change feed until the
//! session is closed or dropped.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use facetguard_domain::model::{DomainDefinition, Principal};
use facetguard_domain::{
    AccessEvaluator, ChangeListener, DomainResolver, DomainResult, EvaluatorConfig,
};
use facetguard_storage::{
    ListenerId, MemoryDomainStore, MemoryNodeStore, MemoryRoleStore, RoleDefinition,
    StorageResult,
};
use tracing::{debug, info, instrument};

/// Evaluator over the in-memory collaborators.
pub type Evaluator = AccessEvaluator<MemoryNodeStore, MemoryRoleStore>;

/// Resolver over the in-memory collaborators.
pub type Resolver = DomainResolver<MemoryDomainStore, MemoryRoleStore>;

type Registry = Arc<DashMap<u64, ListenerId>>;

/// Opens sessions and forwards configuration changes to the resolver.
#[derive(Debug)]
pub struct SessionFactory {
    nodes: Arc<MemoryNodeStore>,
    roles: Arc<MemoryRoleStore>,
    domains: Arc<MemoryDomainStore>,
    resolver: Arc<Resolver>,
    evaluator_config: EvaluatorConfig,
    sessions: Registry,
    next_session: AtomicU64,
}

impl SessionFactory {
    pub fn new(
        nodes: Arc<MemoryNodeStore>,
        roles: Arc<MemoryRoleStore>,
        domains: Arc<MemoryDomainStore>,
        resolver: Arc<Resolver>,
        evaluator_config: EvaluatorConfig,
    ) -> Self {
        Self {
            nodes,
            roles,
            domains,
            resolver,
            evaluator_config,
            sessions: Arc::new(DashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn nodes(&self) -> &Arc<MemoryNodeStore> {
        &self.nodes
    }

    pub fn roles(&self) -> &Arc<MemoryRoleStore> {
        &self.roles
    }

    pub fn domains(&self) -> &Arc<MemoryDomainStore> {
        &self.domains
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Number of sessions not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Resolves the principal's domains and opens an initialized session.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error when domain configuration cannot be read.
    #[instrument(skip(self), fields(users = principal.users().len()))]
    pub fn open_session(&self, principal: Principal) -> DomainResult<Session> {
        let domains = self.resolver.resolve_principal(&principal)?;
        let evaluator = Arc::new(Evaluator::with_config(
            principal,
            domains,
            Arc::clone(&self.nodes),
            Arc::clone(&self.roles),
            self.evaluator_config.clone(),
        ));
        evaluator.initialize()?;

        let listener: Arc<dyn ChangeListener> = evaluator.clone();
        let listener_id = self.nodes.subscribe(&listener);
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(id, listener_id);
        metrics::gauge!("facetguard_open_sessions").set(self.sessions.len() as f64);
        debug!(
            session = id,
            domains = evaluator.resolved_domains().len(),
            "session opened"
        );

        Ok(Session {
            id,
            evaluator,
            nodes: Arc::clone(&self.nodes),
            sessions: Arc::clone(&self.sessions),
        })
    }

    /// Drops every cached domain resolution.
    ///
    /// Open sessions keep the domain set they were opened with.
    pub fn configuration_changed(&self) {
        self.resolver.invalidate_all();
        info!("security configuration changed, domain cache invalidated");
    }

    /// Adds or replaces a domain and invalidates the resolver cache.
    pub fn put_domain(&self, definition: &DomainDefinition) {
        self.domains.put_domain(definition.to_domain());
        self.configuration_changed();
    }

    pub fn remove_domain(&self, path: &str) -> StorageResult<()> {
        self.domains.remove_domain(path)?;
        self.configuration_changed();
        Ok(())
    }

    /// Adds or replaces a role and invalidates the resolver cache.
    pub fn put_role(&self, role: RoleDefinition) {
        self.roles.put_role(role);
        self.configuration_changed();
    }

    pub fn remove_role(&self, name: &str) -> StorageResult<()> {
        self.roles.remove_role(name)?;
        self.configuration_changed();
        Ok(())
    }
}

/// An open session. Dereferences to its evaluator.
///
/// Closing or dropping the session unsubscribes the evaluator from the
/// change feed.
#[derive(Debug)]
pub struct Session {
    id: u64,
    evaluator: Arc<Evaluator>,
    nodes: Arc<MemoryNodeStore>,
    sessions: Registry,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// Closes the session; equivalent to dropping it.
    pub fn close(self) {}
}

impl Deref for Session {
    type Target = Evaluator;

    fn deref(&self) -> &Self::Target {
        &self.evaluator
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.evaluator.close();
        if let Some((_, listener_id)) = self.sessions.remove(&self.id) {
            self.nodes.unsubscribe(listener_id);
        }
        metrics::gauge!("facetguard_open_sessions").set(self.sessions.len() as f64);
        debug!(session = self.id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetguard_domain::model::privileges::{JCR_MODIFY_PROPERTIES, JCR_READ};
    use facetguard_domain::model::{
        AuthRole, DomainRuleDefinition, FacetRuleDefinition, PrivilegeRegistry, UserPrincipal,
    };
    use facetguard_domain::{DomainError, LifecycleState};
    use facetguard_storage::ROOT_ID;

    const DOMAINS: &str = "/hippo:configuration/hippo:domains";

    fn definition(name: &str, rules: Vec<DomainRuleDefinition>, role: &str) -> DomainDefinition {
        DomainDefinition {
            path: format!("{DOMAINS}/{name}"),
            domain_rules: rules,
            auth_roles: vec![AuthRole::new(role).with_group("editors")],
        }
    }

    fn factory() -> SessionFactory {
        let nodes = MemoryNodeStore::new_shared();
        nodes
            .add_node_with_id("/content", "content", "hippostd:folder")
            .unwrap();
        nodes.add_node_with_id("/content/news", "news", "doc:news").unwrap();

        let roles = Arc::new(MemoryRoleStore::with_roles(
            Arc::new(PrivilegeRegistry::standard()),
            [
                RoleDefinition::new("readonly", [JCR_READ]),
                RoleDefinition::new("author", [JCR_MODIFY_PROPERTIES]).including("readonly"),
            ],
        ));
        let domains = Arc::new(MemoryDomainStore::from_definitions([&definition(
            "structure",
            vec![
                DomainRuleDefinition {
                    name: "root".to_string(),
                    facet_rules: vec![FacetRuleDefinition::new("jcr:uuid", ROOT_ID)],
                },
                DomainRuleDefinition {
                    name: "folders".to_string(),
                    facet_rules: vec![FacetRuleDefinition::new(
                        "jcr:primaryType",
                        "hippostd:folder",
                    )],
                },
            ],
            "readonly",
        )]));
        let resolver = Arc::new(Resolver::new(Arc::clone(&domains), Arc::clone(&roles)));
        SessionFactory::new(nodes, roles, domains, resolver, EvaluatorConfig::default())
    }

    fn editor() -> Principal {
        Principal::user(UserPrincipal::new("alice").with_group("editors"))
    }

    fn news_rule() -> DomainRuleDefinition {
        DomainRuleDefinition {
            name: "news".to_string(),
            facet_rules: vec![FacetRuleDefinition::new("jcr:primaryType", "doc:news")],
        }
    }

    #[test]
    fn test_open_session_initializes_and_subscribes() {
        // Arrange
        let factory = factory();

        // Act
        let session = factory.open_session(editor()).unwrap();

        // Assert
        assert_eq!(session.state(), LifecycleState::Initialized);
        assert_eq!(factory.open_sessions(), 1);
        assert_eq!(factory.nodes().listener_count(), 1);
        let content = factory.nodes().node_id("/content").unwrap();
        let news = factory.nodes().node_id("/content/news").unwrap();
        assert!(session.can_read(&content).unwrap());
        assert!(!session.can_read(&news).unwrap());
    }

    #[test]
    fn test_closing_session_unregisters_it() {
        let factory = factory();
        let session = factory.open_session(editor()).unwrap();
        let evaluator = Arc::clone(session.evaluator());

        session.close();

        assert_eq!(factory.open_sessions(), 0);
        assert_eq!(factory.nodes().listener_count(), 0);
        assert_eq!(evaluator.state(), LifecycleState::Closed);
        let content = factory.nodes().node_id("/content").unwrap();
        assert_eq!(evaluator.can_read(&content), Err(DomainError::AlreadyClosed));
    }

    #[test]
    fn test_configuration_change_applies_to_new_sessions() {
        // Arrange
        let factory = factory();
        let news = factory.nodes().node_id("/content/news").unwrap();
        let before = factory.open_session(editor()).unwrap();
        assert!(!before.can_read(&news).unwrap());

        // Act
        factory.put_domain(&definition("news", vec![news_rule()], "author"));
        let after = factory.open_session(editor()).unwrap();

        // Assert
        assert!(after.can_read(&news).unwrap());
        assert!(after
            .check_permission("/content/news", "read,set_property")
            .unwrap());
        assert!(!before.can_read(&news).unwrap());
        assert_eq!(factory.open_sessions(), 2);
    }

    #[test]
    fn test_removing_role_revokes_for_new_sessions() {
        let factory = factory();
        factory.put_domain(&definition("news", vec![news_rule()], "author"));
        let news = factory.nodes().node_id("/content/news").unwrap();
        assert!(factory.open_session(editor()).unwrap().can_read(&news).unwrap());

        factory.remove_role("author").unwrap();

        assert!(!factory.open_session(editor()).unwrap().can_read(&news).unwrap());
        assert!(factory.remove_role("author").is_err());
        assert!(factory.remove_domain(&format!("{DOMAINS}/missing")).is_err());
    }

    #[test]
    fn test_sessions_see_content_changes() {
        let factory = factory();
        let session = factory.open_session(editor()).unwrap();
        let news = factory.nodes().node_id("/content/news").unwrap();
        assert!(!session.can_read(&news).unwrap());

        factory
            .nodes()
            .update_node("/content/news", |view| {
                view.primary_type = "hippostd:folder".to_string();
            })
            .unwrap();

        assert!(session.can_read(&news).unwrap());
    }

    #[test]
    fn test_system_session_reads_everything() {
        let factory = factory();
        let session = factory.open_session(Principal::System).unwrap();
        let news = factory.nodes().node_id("/content/news").unwrap();

        assert!(session.can_read(&news).unwrap());
        assert!(session.resolved_domains().is_empty());
    }
}
