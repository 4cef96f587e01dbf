//! Domain resolver.
//!
//! Computes the set of [`FacetAuthDomain`]s that apply to a principal and
//! caches it per exact (user, groups, user roles) tuple.
//!
//! # Cache Safety
//!
//! - **Coalescing**: concurrent first lookups of the same tuple compute the
//!   value once (Moka `try_get_with`).
//! - **Invalidation**: [`DomainResolver::invalidate_all`] takes the gate
//!   exclusively while lookups hold it shared, so a value computed from the old
//!   configuration can never be inserted after an invalidation has completed.
//! - **Expiry**: entries also expire after `ttl` (default one day).

mod config;
mod traits;
mod types;


pub use config::{ResolverConfig, DEFAULT_DOMAIN_LOCATION};
pub use traits::{DomainSource, ResolvedRole, RoleProvider};
pub use types::{PrincipalKey, ResolvedDomains};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Domain, FacetAuthDomain, Principal, UserPrincipal};

/// Resolves and caches the domains applicable to principals.
///
/// Shared by all sessions; safe for concurrent use.
pub struct DomainResolver<S, R> {
    source: Arc<S>,
    roles: Arc<R>,
    config: ResolverConfig,
    cache: Cache<PrincipalKey, Arc<ResolvedDomains>>,
    gate: RwLock<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S, R> std::fmt::Debug for DomainResolver<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainResolver")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl<S, R> DomainResolver<S, R>
where
    S: DomainSource + 'static,
    R: RoleProvider + 'static,
{
    /// Creates a resolver with the default configuration.
    pub fn new(source: Arc<S>, roles: Arc<R>) -> Self {
        Self::with_config(source, roles, ResolverConfig::default())
    }

    /// Creates a resolver with a custom configuration.
    pub fn with_config(source: Arc<S>, roles: Arc<R>, config: ResolverConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .build();
        Self {
            source,
            roles,
            config,
            cache,
            gate: RwLock::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The role provider, also used for permission-name expansion.
    pub fn role_provider(&self) -> &Arc<R> {
        &self.roles
    }

    /// Resolves the domains of any principal.
    ///
    /// The system principal resolves to an empty set (it bypasses rules);
    /// a delegate resolves to the merged sets of the users it stands for.
    pub fn resolve_principal(&self, principal: &Principal) -> DomainResult<Arc<ResolvedDomains>> {
        match principal {
            Principal::System => Ok(Arc::new(ResolvedDomains::default())),
            Principal::User(user) => self.resolve(user),
            Principal::Delegate(users) => {
                let mut merged = ResolvedDomains::default();
                for user in users {
                    let resolved = self.resolve(user)?;
                    merged.merge(resolved.as_ref());
                }
                Ok(Arc::new(merged))
            }
        }
    }

    /// Resolves the domains of one user, using the cache.
    pub fn resolve(&self, user: &UserPrincipal) -> DomainResult<Arc<ResolvedDomains>> {
        let key = PrincipalKey::from(user);
        let _shared = self.gate.read();

        if let Some(resolved) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("facetguard_domain_cache_hits_total").increment(1);
            return Ok(resolved);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("facetguard_domain_cache_misses_total").increment(1);
        self.cache
            .try_get_with(key.clone(), || self.compute(&key).map(Arc::new))
            .map_err(|err| (*err).clone())
    }

    /// Drops every cached resolution.
    ///
    /// Call on any structural change to domain, rule or role configuration.
    pub fn invalidate_all(&self) {
        let _exclusive = self.gate.write();
        self.cache.invalidate_all();
        debug!("resolved domain cache invalidated");
    }

    /// Drops the cached resolution of one principal tuple.
    pub fn invalidate(&self, user: &UserPrincipal) {
        let _exclusive = self.gate.write();
        self.cache.invalidate(&PrincipalKey::from(user));
    }

    /// Returns (hits, misses) of the resolution cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Approximate number of cached principal tuples.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    fn compute(&self, key: &PrincipalKey) -> DomainResult<ResolvedDomains> {
        let domains =
            self.source
                .domains_for_principal(&key.user_id, &key.group_ids, &key.user_role_ids)?;

        let mut resolved = ResolvedDomains::default();
        for domain in domains {
            let Some(fad) = self.resolve_domain(domain, key) else {
                continue;
            };
            let path = fad.path.clone();
            if let Err(err) = resolved.insert(fad) {
                error!(error = %err, path = %path, "duplicate resolved domain, keeping the first");
            }
        }
        debug!(
            user = %key.user_id,
            domains = resolved.len(),
            "resolved domains"
        );
        Ok(resolved)
    }

    fn resolve_domain(&self, domain: Domain, key: &PrincipalKey) -> Option<FacetAuthDomain> {
        if !domain.is_within(&self.config.domain_locations) {
            let err = DomainError::InvalidDomainConfiguration {
                path: domain.path.clone(),
                message: format!(
                    "domains must live below one of {:?}",
                    self.config.domain_locations
                ),
            };
            warn!(error = %err, "skipping domain");
            return None;
        }

        let role_names = domain.roles_for(&key.user_id, &key.group_ids, &key.user_role_ids);
        if role_names.is_empty() {
            return None;
        }
        if domain.domain_rules.is_empty() {
            debug!(path = %domain.path, "domain has no domain rules, skipping");
            return None;
        }

        let privileges: BTreeSet<String> = self
            .roles
            .resolve_roles(&role_names)
            .into_iter()
            .flat_map(|role| role.privileges)
            .collect();
        if privileges.is_empty() {
            debug!(path = %domain.path, "roles grant no privileges, skipping");
            return None;
        }
        let permissions = self.roles.resolve_permission_names(&privileges);

        Some(FacetAuthDomain {
            name: domain.name().to_string(),
            path: domain.path.clone(),
            domain_rules: Arc::from(domain.domain_rules),
            roles: role_names,
            privileges,
            permissions,
        })
    }
}
