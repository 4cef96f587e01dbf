//! Reference rule revalidation.
//!
//! Reference rules name their target by a logical reference (a path). The
//! target's identifier can change when the node is removed and recreated, so
//! the resolved identifiers are tracked against the provider's monotonic
//! reference-update counter and re-resolved whenever it advances.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::model::{privileges::JCR_READ, FacetKind, NodeId};
use crate::provider::NodeFacetProvider;
use crate::resolver::ResolvedDomains;

/// Upper bound on re-resolution passes while the counter keeps moving.
const MAX_REVALIDATION_PASSES: usize = 16;

/// Logical reference → currently resolved node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    targets: BTreeMap<String, Option<NodeId>>,
}

impl ReferenceTable {
    /// Resolves every reference id through the provider.
    pub fn resolve_all<'a, I>(reference_ids: I, provider: &dyn NodeFacetProvider) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let targets = reference_ids
            .into_iter()
            .map(|id| (id.to_string(), provider.resolve_path(id)))
            .collect();
        Self { targets }
    }

    /// Builds the table for all reference rules of the resolved domains.
    pub fn for_domains(domains: &ResolvedDomains, provider: &dyn NodeFacetProvider) -> Self {
        let ids: Vec<&str> = domains
            .iter()
            .flat_map(|fad| fad.domain_rules.iter())
            .flat_map(|rule| rule.reference_rules())
            .filter(|rule| !rule.is_wildcard())
            .filter_map(|rule| rule.reference_id())
            .collect();
        Self::resolve_all(ids, provider)
    }

    /// Current target of a reference; `None` when unknown or unresolved.
    pub fn target(&self, reference_id: &str) -> Option<&NodeId> {
        self.targets.get(reference_id).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Re-resolves every entry; returns the refreshed table when any target changed.
    pub fn refreshed(&self, provider: &dyn NodeFacetProvider) -> Option<Self> {
        let fresh = Self::resolve_all(self.targets.keys().map(String::as_str), provider);
        if fresh == *self {
            None
        } else {
            Some(fresh)
        }
    }
}

/// Ancestors of every allow-listed target of a read-granting domain.
///
/// Targets are the nodes named by equality `jcr:path` and `jcr:uuid` rules.
/// Their ancestors need read access so that the target stays reachable; the
/// targets themselves are not included.
pub fn compute_implicit_reads(
    domains: &ResolvedDomains,
    references: &ReferenceTable,
    provider: &dyn NodeFacetProvider,
) -> HashSet<NodeId> {
    let mut implicit = HashSet::new();
    let rules = domains
        .iter()
        .filter(|fad| fad.grants(JCR_READ))
        .flat_map(|fad| fad.domain_rules.iter())
        .flat_map(|rule| rule.facet_rules.iter())
        .filter(|rule| rule.equality() && !rule.is_wildcard())
        .filter(|rule| matches!(rule.kind(), FacetKind::Path | FacetKind::Uuid));

    for rule in rules {
        let target = if rule.is_reference() {
            references.target(rule.operand()).cloned()
        } else {
            Some(NodeId::new(rule.operand()))
        };
        let Some(target) = target else {
            continue;
        };
        let mut current = provider.get_parent_id(&target);
        while let Some(id) = current {
            if !implicit.insert(id.clone()) {
                // the rest of the chain is already recorded
                break;
            }
            current = provider.get_parent_id(&id);
        }
    }
    implicit
}

/// Outcome of one revalidation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    /// The counter did not move.
    UpToDate,
    /// The counter moved but every reference still resolves to the same id.
    Unchanged { counter: u64 },
    /// At least one reference target changed; caches must be rebuilt.
    Reinitialized {
        counter: u64,
        implicit_reads: HashSet<NodeId>,
    },
}

/// Tracks the reference table against the provider's update counter.
#[derive(Debug, Clone)]
pub struct ReferenceRevalidator {
    seen_counter: u64,
    references: Arc<ReferenceTable>,
}

impl ReferenceRevalidator {
    pub fn new(references: ReferenceTable, seen_counter: u64) -> Self {
        Self {
            seen_counter,
            references: Arc::new(references),
        }
    }

    /// Snapshot of the current reference table.
    pub fn references(&self) -> Arc<ReferenceTable> {
        Arc::clone(&self.references)
    }

    pub fn seen_counter(&self) -> u64 {
        self.seen_counter
    }

    /// Returns true when the provider's counter moved past what was seen.
    pub fn is_stale(&self, provider: &dyn NodeFacetProvider) -> bool {
        provider.reference_update_count() != self.seen_counter
    }

    /// Re-resolves references until the counter is stable.
    ///
    /// When any target changed, the implicit-read set is recomputed from the
    /// final table. The caller applies the outcome to its caches while still
    /// holding the exclusive lock it used to call this.
    pub fn revalidate(
        &mut self,
        domains: &ResolvedDomains,
        provider: &dyn NodeFacetProvider,
    ) -> Revalidation {
        let mut reinitialize = false;
        let mut passes = 0;

        loop {
            let observed = provider.reference_update_count();
            if observed == self.seen_counter {
                break;
            }
            if let Some(fresh) = self.references.refreshed(provider) {
                self.references = Arc::new(fresh);
                reinitialize = true;
            }
            self.seen_counter = observed;
            passes += 1;
            if passes >= MAX_REVALIDATION_PASSES {
                debug!(counter = observed, "reference counter still moving, deferring");
                break;
            }
        }

        if passes == 0 {
            return Revalidation::UpToDate;
        }
        if !reinitialize {
            return Revalidation::Unchanged {
                counter: self.seen_counter,
            };
        }

        debug!(
            counter = self.seen_counter,
            references = self.references.len(),
            "reference targets changed, rebuilding implicit reads"
        );
        let implicit_reads = compute_implicit_reads(domains, &self.references, provider);
        Revalidation::Reinitialized {
            counter: self.seen_counter,
            implicit_reads,
        }
    }
}
