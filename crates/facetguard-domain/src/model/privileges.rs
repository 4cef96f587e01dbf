//! Privilege registry with aggregate and action expansion.
//!
//! The registry is constructed explicitly and shared by `Arc`; there is no
//! process-wide instance.

use std::collections::{BTreeMap, BTreeSet};

pub const JCR_READ: &str = "jcr:read";
pub const JCR_MODIFY_PROPERTIES: &str = "jcr:modifyProperties";
pub const JCR_ADD_CHILD_NODES: &str = "jcr:addChildNodes";
pub const JCR_REMOVE_NODE: &str = "jcr:removeNode";
pub const JCR_REMOVE_CHILD_NODES: &str = "jcr:removeChildNodes";
pub const JCR_NODE_TYPE_MANAGEMENT: &str = "jcr:nodeTypeManagement";
pub const JCR_VERSION_MANAGEMENT: &str = "jcr:versionManagement";
pub const JCR_LOCK_MANAGEMENT: &str = "jcr:lockManagement";
pub const JCR_READ_ACCESS_CONTROL: &str = "jcr:readAccessControl";
pub const JCR_MODIFY_ACCESS_CONTROL: &str = "jcr:modifyAccessControl";
pub const JCR_WRITE: &str = "jcr:write";
pub const JCR_ALL: &str = "jcr:all";

pub const ACTION_READ: &str = "read";
pub const ACTION_SET_PROPERTY: &str = "set_property";
pub const ACTION_ADD_NODE: &str = "add_node";
pub const ACTION_REMOVE: &str = "remove";

const STANDARD_LEAVES: &[&str] = &[
    JCR_READ,
    JCR_MODIFY_PROPERTIES,
    JCR_ADD_CHILD_NODES,
    JCR_REMOVE_NODE,
    JCR_REMOVE_CHILD_NODES,
    JCR_NODE_TYPE_MANAGEMENT,
    JCR_VERSION_MANAGEMENT,
    JCR_LOCK_MANAGEMENT,
    JCR_READ_ACCESS_CONTROL,
    JCR_MODIFY_ACCESS_CONTROL,
];

/// Known privileges, aggregates and action names.
///
/// Names the registry does not know are treated as leaf privileges so that
/// custom privileges configured on roles keep working.
#[derive(Debug, Clone)]
pub struct PrivilegeRegistry {
    leaves: BTreeSet<String>,
    aggregates: BTreeMap<String, BTreeSet<String>>,
    actions: BTreeMap<String, BTreeSet<String>>,
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl PrivilegeRegistry {
    /// Registry with the standard JCR privileges and actions.
    pub fn standard() -> Self {
        let mut registry = Self {
            leaves: STANDARD_LEAVES.iter().map(|s| s.to_string()).collect(),
            aggregates: BTreeMap::new(),
            actions: BTreeMap::new(),
        };
        registry.register_aggregate(
            JCR_WRITE,
            [
                JCR_MODIFY_PROPERTIES,
                JCR_ADD_CHILD_NODES,
                JCR_REMOVE_NODE,
                JCR_REMOVE_CHILD_NODES,
            ],
        );
        registry.register_action(ACTION_READ, [JCR_READ]);
        registry.register_action(ACTION_SET_PROPERTY, [JCR_MODIFY_PROPERTIES]);
        registry.register_action(ACTION_ADD_NODE, [JCR_ADD_CHILD_NODES]);
        registry.register_action(ACTION_REMOVE, [JCR_REMOVE_NODE]);
        registry
    }

    /// Registers a custom leaf privilege; it becomes part of `jcr:all`.
    pub fn register_privilege(&mut self, name: impl Into<String>) {
        self.leaves.insert(name.into());
    }

    /// Registers an aggregate privilege made of other privileges.
    pub fn register_aggregate<I, S>(&mut self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregates
            .insert(name.into(), members.into_iter().map(Into::into).collect());
    }

    /// Registers an action name that expands to privileges.
    pub fn register_action<I, S>(&mut self, name: impl Into<String>, privileges: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions
            .insert(name.into(), privileges.into_iter().map(Into::into).collect());
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        name == JCR_ALL || self.aggregates.contains_key(name)
    }

    /// Expands privilege or action names into leaf privilege names.
    pub fn expand<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = BTreeSet::new();
        let mut visiting = BTreeSet::new();
        for name in names {
            self.expand_into(name, &mut out, &mut visiting);
        }
        out
    }

    fn expand_into(&self, name: &str, out: &mut BTreeSet<String>, visiting: &mut BTreeSet<String>) {
        if !visiting.insert(name.to_string()) {
            return;
        }
        if name == JCR_ALL {
            out.extend(self.leaves.iter().cloned());
            for members in self.aggregates.values() {
                for member in members {
                    self.expand_into(member, out, visiting);
                }
            }
        } else if let Some(members) = self.aggregates.get(name).or_else(|| self.actions.get(name)) {
            for member in members {
                self.expand_into(member, out, visiting);
            }
        } else {
            out.insert(name.to_string());
        }
        visiting.remove(name);
    }
}
