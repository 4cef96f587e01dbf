//! Traits for the content tree collaborator and its change feed.

use crate::model::{NodeFacetView, NodeId};

/// Read access to node facets, consumed by the matching engine and evaluator.
///
/// Implementations answer synchronously; any I/O they do is their concern.
pub trait NodeFacetProvider: Send + Sync {
    /// Returns the facets of a node, or `None` when the node does not exist.
    fn get_facets(&self, node_id: &NodeId) -> Option<NodeFacetView>;

    /// Returns the parent of a node; `None` for the root or unknown nodes.
    fn get_parent_id(&self, node_id: &NodeId) -> Option<NodeId>;

    /// Resolves an absolute path to a node id.
    fn resolve_path(&self, path: &str) -> Option<NodeId>;

    /// Returns true when `type_name` is `candidate_ancestor_type` or a subtype of it.
    fn is_type_or_subtype(&self, type_name: &str, candidate_ancestor_type: &str) -> bool;

    /// Monotonic counter advanced whenever a referenceable node is created,
    /// removed or moved.
    ///
    /// Default implementation never advances.
    fn reference_update_count(&self) -> u64 {
        0
    }
}

/// Kind of state change reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Destroyed,
    Discarded,
}

/// A change to a node or to one of its properties.
///
/// For property changes `node_id` is the owning node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub node_id: NodeId,
    pub is_property: bool,
}

impl ChangeEvent {
    pub fn node(kind: ChangeKind, node_id: impl Into<NodeId>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            is_property: false,
        }
    }

    pub fn property(kind: ChangeKind, node_id: impl Into<NodeId>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            is_property: true,
        }
    }
}

/// Synchronous sink for state changes.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}
