//! Access evaluator.
//!
//! One evaluator per principal session. It answers read checks and privilege
//! checks against the principal's resolved domains, caching read decisions
//! per node.
//!
//! # Read checks
//!
//! A node is readable when its parent is readable and one of the read-granting
//! domains matches the node itself. Read access is never inherited from an
//! enclosing document. Ancestors of allow-listed path targets are readable
//! implicitly so that the targets stay reachable.
//!
//! # Privilege checks
//!
//! Every privilege check requires read access first. Other privileges may be
//! granted by a domain matching either the node or its nearest enclosing
//! document root, so write access does propagate from a document to its
//! descendants.
//!
//! # Concurrency
//!
//! The evaluator is `Send + Sync` so that the change feed can reach it from any
//! thread, but queries are expected to be serialized per session. Read checks
//! walk ancestors iteratively and hold no lock while matching.

mod config;
mod guard;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{EvaluatorConfig, DEFAULT_DOCUMENT_TYPE};

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::{CacheMetrics, CacheMetricsSnapshot, ReadAccessCache, TypeCache};
use crate::error::{DomainError, DomainResult};
use crate::matching::MatchContext;
use crate::model::privileges::JCR_READ;
use crate::model::{FacetAuthDomain, NodeFacetView, NodeId, Principal};
use crate::provider::{ChangeEvent, ChangeKind, ChangeListener, NodeFacetProvider};
use crate::resolver::{ResolvedDomains, RoleProvider};
use crate::revalidator::{compute_implicit_reads, ReferenceRevalidator, ReferenceTable, Revalidation};

use guard::InFlight;

/// Upper bound on the walk to the enclosing document root.
const MAX_DOCUMENT_DEPTH: usize = 4096;

static NEXT_EVALUATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Closed,
}

/// Addresses the node of a privilege query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrPath<'a> {
    Node(&'a NodeId),
    Path(&'a str),
}

impl<'a> From<&'a NodeId> for NodeOrPath<'a> {
    fn from(id: &'a NodeId) -> Self {
        NodeOrPath::Node(id)
    }
}

impl<'a> From<&'a str> for NodeOrPath<'a> {
    fn from(path: &'a str) -> Self {
        NodeOrPath::Path(path)
    }
}

/// Per-session access evaluator.
pub struct AccessEvaluator<P, R> {
    id: u64,
    principal: Principal,
    provider: Arc<P>,
    roles: Arc<R>,
    domains: Arc<ResolvedDomains>,
    config: EvaluatorConfig,
    state: RwLock<LifecycleState>,
    revalidator: RwLock<ReferenceRevalidator>,
    read_cache: Mutex<ReadAccessCache>,
    types: TypeCache,
    metrics: CacheMetrics,
}

impl<P, R> std::fmt::Debug for AccessEvaluator<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEvaluator")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .field("domains", &self.domains.len())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl<P, R> AccessEvaluator<P, R>
where
    P: NodeFacetProvider,
    R: RoleProvider,
{
    /// Creates an uninitialized evaluator with the default configuration.
    pub fn new(
        principal: Principal,
        domains: Arc<ResolvedDomains>,
        provider: Arc<P>,
        roles: Arc<R>,
    ) -> Self {
        Self::with_config(principal, domains, provider, roles, EvaluatorConfig::default())
    }

    /// Creates an uninitialized evaluator.
    pub fn with_config(
        principal: Principal,
        domains: Arc<ResolvedDomains>,
        provider: Arc<P>,
        roles: Arc<R>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            id: NEXT_EVALUATOR_ID.fetch_add(1, Ordering::Relaxed),
            principal,
            provider,
            roles,
            domains,
            read_cache: Mutex::new(ReadAccessCache::new(
                config.permission_cache_size,
                config.virtual_cache_size,
            )),
            types: TypeCache::new(config.type_cache_size),
            config,
            state: RwLock::new(LifecycleState::Uninitialized),
            revalidator: RwLock::new(ReferenceRevalidator::new(ReferenceTable::default(), 0)),
            metrics: CacheMetrics::default(),
        }
    }

    /// Resolves reference rules and builds the implicit-read set.
    ///
    /// Idempotent while initialized; fails once closed.
    pub fn initialize(&self) -> DomainResult<()> {
        let mut state = self.state.write();
        match *state {
            LifecycleState::Closed => return Err(DomainError::AlreadyClosed),
            LifecycleState::Initialized => return Ok(()),
            LifecycleState::Uninitialized => {}
        }

        // read the counter first so that changes during resolution are revalidated
        let counter = self.provider.reference_update_count();
        let provider: &dyn NodeFacetProvider = self.provider.as_ref();
        let references = ReferenceTable::for_domains(&self.domains, provider);
        let implicit_reads = compute_implicit_reads(&self.domains, &references, provider);
        debug!(
            evaluator = self.id,
            domains = self.domains.len(),
            references = references.len(),
            implicit_reads = implicit_reads.len(),
            "access evaluator initialized"
        );

        *self.revalidator.write() = ReferenceRevalidator::new(references, counter);
        {
            let mut cache = self.read_cache.lock();
            cache.clear();
            cache.set_implicit_reads(implicit_reads);
        }
        *state = LifecycleState::Initialized;
        Ok(())
    }

    /// Closes the evaluator; later queries fail with `AlreadyClosed`.
    pub fn close(&self) {
        *self.state.write() = LifecycleState::Closed;
        self.read_cache.lock().clear();
        debug!(evaluator = self.id, "access evaluator closed");
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn resolved_domains(&self) -> &Arc<ResolvedDomains> {
        &self.domains
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Read cache counters of this session.
    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Read cache hit ratio of this session.
    pub fn cache_hit_ratio(&self) -> f64 {
        self.metrics.hit_ratio()
    }

    /// Returns true when the node is readable.
    pub fn can_read(&self, node_id: &NodeId) -> DomainResult<bool> {
        self.ensure_open()?;
        if self.principal.is_system() {
            return Ok(true);
        }
        self.revalidate_if_stale();
        let references = self.revalidator.read().references();
        Ok(self.check_read(node_id, &references))
    }

    /// Returns true when every requested privilege is granted on the node.
    ///
    /// Aggregate names are expanded first. Read access is required for any
    /// request; remaining privileges may be granted by different domains.
    pub fn has_privileges<'a>(
        &self,
        target: impl Into<NodeOrPath<'a>>,
        requested: &BTreeSet<String>,
    ) -> DomainResult<bool> {
        self.ensure_open()?;
        if self.principal.is_system() {
            return Ok(true);
        }
        let node_id = self.resolve_target(target.into())?;
        self.revalidate_if_stale();
        let references = self.revalidator.read().references();

        let mut remaining = self.roles.resolve_permission_names(requested);
        if !self.check_read(&node_id, &references) {
            return Ok(false);
        }
        remaining.remove(JCR_READ);
        if remaining.is_empty() {
            return Ok(true);
        }
        if !self.domains.permissions().is_superset(&remaining) {
            debug!(evaluator = self.id, node = %node_id, "requested privileges exceed resolved privileges");
            return Ok(false);
        }

        let Some(node) = self.facets_or_deny(&node_id) else {
            return Ok(false);
        };
        let ctx = self.match_context(&references);
        for fad in self.domains.iter() {
            let granted: BTreeSet<String> =
                remaining.intersection(&fad.permissions).cloned().collect();
            if granted.is_empty() {
                continue;
            }
            if self.matches_with_document(&ctx, &node, fad) {
                remaining.retain(|p| !granted.contains(p));
                if remaining.is_empty() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Checks comma-separated action names (`read`, `set_property`, `add_node`,
    /// `remove`) on the node at `path`.
    pub fn check_permission(&self, path: &str, actions: &str) -> DomainResult<bool> {
        let names: BTreeSet<String> = actions
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        let privileges = self.roles.resolve_permission_names(&names);
        self.has_privileges(NodeOrPath::Path(path), &privileges)
    }

    /// Which domains grant which leaf privileges on the node.
    ///
    /// Read is attributed only to domains matching the node itself; other
    /// privileges also to domains matching the enclosing document. Empty when
    /// the node is not readable. The system principal bypasses domains, so its
    /// map is empty too.
    pub fn get_resolved_privileges<'a>(
        &self,
        target: impl Into<NodeOrPath<'a>>,
    ) -> DomainResult<BTreeMap<String, BTreeSet<String>>> {
        self.ensure_open()?;
        let mut granted: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        if self.principal.is_system() {
            return Ok(granted);
        }
        let node_id = self.resolve_target(target.into())?;
        self.revalidate_if_stale();
        let references = self.revalidator.read().references();

        if !self.check_read(&node_id, &references) {
            return Ok(granted);
        }
        let Some(node) = self.facets_or_deny(&node_id) else {
            return Ok(granted);
        };
        let ctx = self.match_context(&references);
        for fad in self.domains.iter() {
            let direct = ctx.matches_any_domain_rule(&node, fad);
            let inherited = direct || self.document_matches(&ctx, &node, fad);
            for permission in &fad.permissions {
                let applies = if permission == JCR_READ { direct } else { inherited };
                if applies {
                    granted
                        .entry(permission.clone())
                        .or_default()
                        .insert(fad.path.clone());
                }
            }
        }
        Ok(granted)
    }

    /// Re-resolves reference rules if the provider's update counter moved.
    pub fn revalidate(&self) -> DomainResult<()> {
        self.ensure_open()?;
        self.revalidate_if_stale();
        Ok(())
    }

    /// Drops the cached read decision of one node.
    pub fn invalidate(&self, node_id: &NodeId) {
        self.read_cache.lock().invalidate(node_id);
        self.metrics.record_invalidation();
    }

    fn ensure_open(&self) -> DomainResult<()> {
        match *self.state.read() {
            LifecycleState::Initialized => Ok(()),
            LifecycleState::Uninitialized => Err(DomainError::NotInitialized),
            LifecycleState::Closed => Err(DomainError::AlreadyClosed),
        }
    }

    fn resolve_target(&self, target: NodeOrPath<'_>) -> DomainResult<NodeId> {
        match target {
            NodeOrPath::Node(id) => Ok(id.clone()),
            NodeOrPath::Path(path) => {
                self.provider
                    .resolve_path(path)
                    .ok_or_else(|| DomainError::PathNotFound {
                        path: path.to_string(),
                    })
            }
        }
    }

    fn revalidate_if_stale(&self) {
        let provider: &dyn NodeFacetProvider = self.provider.as_ref();
        if !self.revalidator.read().is_stale(provider) {
            return;
        }
        let mut revalidator = self.revalidator.write();
        match revalidator.revalidate(&self.domains, provider) {
            Revalidation::Reinitialized {
                counter,
                implicit_reads,
            } => {
                let mut cache = self.read_cache.lock();
                cache.clear();
                cache.set_implicit_reads(implicit_reads);
                debug!(evaluator = self.id, counter, "read cache rebuilt after reference change");
            }
            Revalidation::Unchanged { .. } | Revalidation::UpToDate => {}
        }
    }

    fn match_context<'a>(&'a self, references: &'a ReferenceTable) -> MatchContext<'a> {
        MatchContext::new(&self.principal, self.provider.as_ref(), references)
            .with_type_cache(&self.types)
    }

    fn facets_or_deny(&self, node_id: &NodeId) -> Option<NodeFacetView> {
        let facets = self.provider.get_facets(node_id);
        if facets.is_none() {
            let err = DomainError::MissingNodeState {
                node_id: node_id.to_string(),
            };
            warn!(evaluator = self.id, error = %err, "denying access");
        }
        facets
    }

    /// Cached or trivially known read decision.
    fn known_read(&self, node_id: &NodeId) -> Option<bool> {
        if InFlight::contains(self.id, node_id) {
            return Some(true);
        }
        let mut cache = self.read_cache.lock();
        let known = if cache.is_implicit_read(node_id) {
            Some(true)
        } else {
            cache.get(node_id)
        };
        drop(cache);
        match known {
            Some(_) => self.metrics.record_hit(),
            None => self.metrics.record_miss(),
        }
        known
    }

    /// Read check without recursion.
    ///
    /// Walks up until an ancestor with a known decision (cached, implicit,
    /// in flight, new, virtual or the root), then evaluates the collected
    /// chain top-down. A denied ancestor denies and caches every node below it.
    fn check_read(&self, node_id: &NodeId, references: &ReferenceTable) -> bool {
        if let Some(known) = self.known_read(node_id) {
            return known;
        }

        let mut chain: Vec<NodeFacetView> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut current = node_id.clone();
        let parent_readable = loop {
            let Some(node) = self.facets_or_deny(&current) else {
                break false;
            };
            if node.is_new && !node.is_virtual {
                // uncommitted nodes are readable; write access is checked on save
                if chain.is_empty() {
                    return true;
                }
                break true;
            }
            seen.insert(current.clone());
            let parent = if node.is_virtual {
                None
            } else {
                node.parent_id.clone()
            };
            chain.push(node);
            let Some(parent) = parent else {
                break true;
            };
            if seen.contains(&parent) {
                break true;
            }
            if let Some(known) = self.known_read(&parent) {
                break known;
            }
            current = parent;
        };

        let ctx = self.match_context(references);
        let mut allowed = parent_readable;
        for node in chain.into_iter().rev() {
            if allowed {
                let _in_flight = InFlight::enter(self.id, node.id.clone());
                allowed = self
                    .domains
                    .iter()
                    .filter(|fad| fad.grants(JCR_READ))
                    .any(|fad| ctx.matches_any_domain_rule(&node, fad));
            }
            self.read_cache
                .lock()
                .insert(node.id.clone(), node.is_virtual, allowed);
        }
        allowed
    }

    fn matches_with_document(
        &self,
        ctx: &MatchContext<'_>,
        node: &NodeFacetView,
        fad: &FacetAuthDomain,
    ) -> bool {
        ctx.matches_any_domain_rule(node, fad) || self.document_matches(ctx, node, fad)
    }

    /// Matches the nearest enclosing document root; a single hop.
    fn document_matches(
        &self,
        ctx: &MatchContext<'_>,
        node: &NodeFacetView,
        fad: &FacetAuthDomain,
    ) -> bool {
        match self.enclosing_document(node) {
            Some(document) => ctx.matches_any_domain_rule(&document, fad),
            None => false,
        }
    }

    fn enclosing_document(&self, node: &NodeFacetView) -> Option<NodeFacetView> {
        let document_type = self.config.document_type.as_str();
        let mut current = node.parent_id.clone();
        let mut depth = 0;
        while let Some(id) = current {
            depth += 1;
            if depth > MAX_DOCUMENT_DEPTH {
                return None;
            }
            let view = self.provider.get_facets(&id)?;
            let is_document = self.types.get_or_compute(&view.primary_type, document_type, || {
                self.provider
                    .is_type_or_subtype(&view.primary_type, document_type)
            });
            if is_document {
                return Some(view);
            }
            current = view.parent_id.clone();
        }
        None
    }
}

impl<P, R> ChangeListener for AccessEvaluator<P, R>
where
    P: NodeFacetProvider,
    R: RoleProvider,
{
    fn on_change(&self, event: &ChangeEvent) {
        if event.kind == ChangeKind::Created && !event.is_property {
            return;
        }
        if self.state() == LifecycleState::Closed {
            return;
        }
        self.invalidate(&event.node_id);
    }
}
