//! Per-session read-access caching.
//!
//! # Layers
//!
//! | Layer | Key | Eviction |
//! |-------|-----|----------|
//! | persisted | `NodeId` | LRU, bounded by `permission_cache_size` |
//! | virtual | `NodeId` | LRU, bounded by `virtual_cache_size` |
//! | implicit reads | `NodeId` | none; rebuilt wholesale on reference change |
//!
//! Virtual (computed) nodes get their own bounded LRU so that a burst of
//! virtual traversals cannot evict persisted entries. Implicit reads are the
//! ancestors of path-targeted allow-list nodes; they are not evicted because
//! losing one would make its target unreachable.
//!
//! The cache is owned by one evaluator and guarded by the evaluator's lock;
//! it is not shared between sessions.

mod type_cache;

pub use type_cache::TypeCache;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;

use crate::model::NodeId;

pub(crate) fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// Cached read-access decisions for one session.
#[derive(Debug)]
pub struct ReadAccessCache {
    persisted: LruCache<NodeId, bool>,
    virtual_nodes: LruCache<NodeId, bool>,
    implicit_reads: HashSet<NodeId>,
}

impl ReadAccessCache {
    pub fn new(persisted_size: usize, virtual_size: usize) -> Self {
        Self {
            persisted: LruCache::new(capacity(persisted_size)),
            virtual_nodes: LruCache::new(capacity(virtual_size)),
            implicit_reads: HashSet::new(),
        }
    }

    /// Returns a cached decision from the virtual or persisted layer.
    pub fn get(&mut self, node_id: &NodeId) -> Option<bool> {
        if let Some(allowed) = self.virtual_nodes.get(node_id) {
            return Some(*allowed);
        }
        self.persisted.get(node_id).copied()
    }

    pub fn insert(&mut self, node_id: NodeId, is_virtual: bool, allowed: bool) {
        if is_virtual {
            self.virtual_nodes.put(node_id, allowed);
        } else {
            self.persisted.put(node_id, allowed);
        }
    }

    /// Drops any decision cached for `node_id`.
    pub fn invalidate(&mut self, node_id: &NodeId) {
        self.persisted.pop(node_id);
        self.virtual_nodes.pop(node_id);
    }

    /// Clears both decision layers, keeping implicit reads.
    pub fn clear_decisions(&mut self) {
        self.persisted.clear();
        self.virtual_nodes.clear();
    }

    /// Clears everything, implicit reads included.
    pub fn clear(&mut self) {
        self.clear_decisions();
        self.implicit_reads.clear();
    }

    pub fn is_implicit_read(&self, node_id: &NodeId) -> bool {
        self.implicit_reads.contains(node_id)
    }

    pub fn set_implicit_reads(&mut self, implicit_reads: HashSet<NodeId>) {
        self.implicit_reads = implicit_reads;
    }

    pub fn implicit_reads(&self) -> &HashSet<NodeId> {
        &self.implicit_reads
    }

    /// Number of cached decisions across both layers.
    pub fn len(&self) -> usize {
        self.persisted.len() + self.virtual_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for read-cache performance monitoring.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Decisions served from the cache or the implicit-read set.
    pub hits: AtomicU64,
    /// Decisions that needed rule evaluation.
    pub misses: AtomicU64,
    /// Entries dropped by change notifications.
    pub invalidations: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("facetguard_read_cache_hits_total").increment(1);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("facetguard_read_cache_misses_total").increment(1);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Returns the cache hit ratio (hits / (hits + misses)).
    /// Returns 0.0 if no hits or misses have occurred.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Registers cache metric descriptions with the installed recorder.
///
/// Optional; call once during startup for better Prometheus output.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "facetguard_read_cache_hits_total",
        "Total number of read-access cache hits"
    );
    metrics::describe_counter!(
        "facetguard_read_cache_misses_total",
        "Total number of read-access cache misses"
    );
    metrics::describe_counter!(
        "facetguard_domain_cache_hits_total",
        "Total number of resolved-domain cache hits"
    );
    metrics::describe_counter!(
        "facetguard_domain_cache_misses_total",
        "Total number of resolved-domain cache misses"
    );
}
