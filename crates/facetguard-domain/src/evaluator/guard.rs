//! In-flight marker for re-entrant read checks.
//!
//! A read check marks a node only while its own domain rules are matched; the
//! node is unmarked while its ancestors are evaluated. A nested check of a
//! marked node on the same thread (a provider calling back into the
//! evaluator) is answered positively instead of recursing. Markers are keyed
//! by evaluator so that two sessions on one thread never see each other's
//! checks.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::model::NodeId;

thread_local! {
    static IN_FLIGHT: RefCell<HashSet<(u64, NodeId)>> = RefCell::new(HashSet::new());
}

/// RAII marker; removes itself on drop.
pub(crate) struct InFlight {
    evaluator: u64,
    node: NodeId,
}

impl InFlight {
    pub(crate) fn contains(evaluator: u64, node: &NodeId) -> bool {
        IN_FLIGHT.with(|set| set.borrow().contains(&(evaluator, node.clone())))
    }

    pub(crate) fn enter(evaluator: u64, node: NodeId) -> Self {
        IN_FLIGHT.with(|set| set.borrow_mut().insert((evaluator, node.clone())));
        Self { evaluator, node }
    }

    fn remove(&self) {
        IN_FLIGHT.with(|set| set.borrow_mut().remove(&(self.evaluator, self.node.clone())));
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.remove();
    }
}
