//! In-memory content tree.
//!
//! Serves node facets to the access evaluator and publishes every mutation to
//! subscribed change listeners synchronously, at the moment of the change.
//!
//! # Reference counter
//!
//! Creating, removing or moving a node advances the reference-update counter,
//! since any of these may change what a path resolves to.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use facetguard_domain::model::{NodeFacetView, NodeId, PropertyValue};
use facetguard_domain::{ChangeEvent, ChangeKind, ChangeListener, NodeFacetProvider};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Identifier of the root node.
pub const ROOT_ID: &str = "cafebabe-cafe-babe-cafe-babecafebabe";

/// Primary type of the root node.
pub const ROOT_TYPE: &str = "rep:root";

/// Handle returned by [`MemoryNodeStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// In-memory node store.
///
/// Listeners are held weakly; a dropped session stops receiving events
/// without having to unsubscribe.
pub struct MemoryNodeStore {
    nodes: DashMap<NodeId, NodeFacetView>,
    paths: DashMap<String, NodeId>,
    node_paths: DashMap<NodeId, String>,
    supertypes: DashMap<String, BTreeSet<String>>,
    reference_counter: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Weak<dyn ChangeListener>)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for MemoryNodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNodeStore")
            .field("nodes", &self.nodes.len())
            .field("listeners", &self.listeners.read().len())
            .field("reference_counter", &self.reference_counter)
            .finish()
    }
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNodeStore {
    /// Creates a store holding only the root node.
    pub fn new() -> Self {
        let store = Self {
            nodes: DashMap::new(),
            paths: DashMap::new(),
            node_paths: DashMap::new(),
            supertypes: DashMap::new(),
            reference_counter: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        };
        let root_id = NodeId::new(ROOT_ID);
        store.nodes.insert(
            root_id.clone(),
            NodeFacetView::new(root_id.clone(), None, "", ROOT_TYPE),
        );
        store.paths.insert("/".to_string(), root_id.clone());
        store.node_paths.insert(root_id, "/".to_string());
        store
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Declares the direct supertypes of a node type.
    pub fn register_node_type<I, S>(&self, type_name: &str, supertypes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes
            .entry(type_name.to_string())
            .or_default()
            .extend(supertypes.into_iter().map(Into::into));
    }

    /// Registers a change listener.
    pub fn subscribe(&self, listener: &Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write();
        listeners.retain(|(_, weak)| weak.strong_count() > 0);
        listeners.push((id, Arc::downgrade(listener)));
        id
    }

    /// Removes a change listener; unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(candidate, _)| *candidate != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Adds a node with a generated identifier.
    pub fn add_node(&self, path: &str, primary_type: &str) -> StorageResult<NodeId> {
        let id = NodeId::new(ulid::Ulid::new().to_string());
        self.insert_node(path, NodeFacetView::new(id, None, "", primary_type))
    }

    /// Adds a node with a caller-chosen identifier.
    pub fn add_node_with_id(
        &self,
        path: &str,
        node_id: &str,
        primary_type: &str,
    ) -> StorageResult<NodeId> {
        self.insert_node(path, NodeFacetView::new(node_id, None, "", primary_type))
    }

    /// Adds a prepared node; its parent and name are taken from `path`.
    #[instrument(skip(self, view), fields(node = %view.id))]
    pub fn insert_node(&self, path: &str, mut view: NodeFacetView) -> StorageResult<NodeId> {
        let (parent_path, name) = split_path(path)?;
        if self.paths.contains_key(path) {
            return Err(StorageError::NodeAlreadyExists {
                path: path.to_string(),
            });
        }
        if self.nodes.contains_key(&view.id) {
            return Err(StorageError::DuplicateNodeId {
                node_id: view.id.to_string(),
            });
        }
        let parent_id = self.node_id(parent_path)?;

        view.parent_id = Some(parent_id);
        view.name = name.to_string();
        let id = view.id.clone();
        self.nodes.insert(id.clone(), view);
        self.paths.insert(path.to_string(), id.clone());
        self.node_paths.insert(id.clone(), path.to_string());
        self.reference_counter.fetch_add(1, Ordering::SeqCst);
        debug!(path, "node added");

        self.notify(&ChangeEvent::node(ChangeKind::Created, id.clone()));
        Ok(id)
    }

    /// Removes the node at `path` and all of its descendants.
    #[instrument(skip(self))]
    pub fn remove_node(&self, path: &str) -> StorageResult<()> {
        if path == "/" {
            return Err(StorageError::RootImmutable {
                operation: "removed",
            });
        }
        let removed = self.subtree(path)?;
        for (node_path, id) in &removed {
            self.paths.remove(node_path);
            self.node_paths.remove(id);
            self.nodes.remove(id);
        }
        self.reference_counter.fetch_add(1, Ordering::SeqCst);
        debug!(path, removed = removed.len(), "subtree removed");

        for (_, id) in removed {
            self.notify(&ChangeEvent::node(ChangeKind::Destroyed, id));
        }
        Ok(())
    }

    /// Moves the subtree at `from` to `to`, keeping node identifiers.
    #[instrument(skip(self))]
    pub fn move_node(&self, from: &str, to: &str) -> StorageResult<()> {
        if from == "/" {
            return Err(StorageError::RootImmutable { operation: "moved" });
        }
        let (new_parent_path, new_name) = split_path(to)?;
        if self.paths.contains_key(to) {
            return Err(StorageError::NodeAlreadyExists {
                path: to.to_string(),
            });
        }
        if new_parent_path == from || new_parent_path.starts_with(&format!("{from}/")) {
            return Err(StorageError::InvalidPath {
                path: to.to_string(),
                message: "cannot move a node below itself".to_string(),
            });
        }
        let new_parent = self.node_id(new_parent_path)?;
        let moved = self.subtree(from)?;
        let root_id = self.node_id(from)?;

        for (old_path, id) in &moved {
            let new_path = format!("{to}{}", &old_path[from.len()..]);
            self.paths.remove(old_path);
            self.paths.insert(new_path.clone(), id.clone());
            self.node_paths.insert(id.clone(), new_path);
        }
        if let Some(mut root) = self.nodes.get_mut(&root_id) {
            root.parent_id = Some(new_parent);
            root.name = new_name.to_string();
        }
        self.reference_counter.fetch_add(1, Ordering::SeqCst);

        for (_, id) in moved {
            self.notify(&ChangeEvent::node(ChangeKind::Modified, id));
        }
        Ok(())
    }

    /// Sets a property on the node at `path`.
    pub fn set_property(
        &self,
        path: &str,
        name: &str,
        values: Vec<PropertyValue>,
    ) -> StorageResult<()> {
        let id = self.node_id(path)?;
        let kind = match self.nodes.get_mut(&id) {
            Some(mut node) => {
                node.removed_properties.remove(name);
                match node.properties.insert(name.to_string(), values) {
                    Some(_) => ChangeKind::Modified,
                    None => ChangeKind::Created,
                }
            }
            None => return Err(StorageError::NodeNotFound { path: path.to_string() }),
        };
        self.notify(&ChangeEvent::property(kind, id));
        Ok(())
    }

    /// Removes a property; returns whether it existed.
    ///
    /// The removed values stay visible through `removed_properties` until
    /// [`commit`](Self::commit).
    pub fn remove_property(&self, path: &str, name: &str) -> StorageResult<bool> {
        let id = self.node_id(path)?;
        let existed = match self.nodes.get_mut(&id) {
            Some(mut node) => match node.properties.remove(name) {
                Some(values) => {
                    node.removed_properties.insert(name.to_string(), values);
                    true
                }
                None => false,
            },
            None => return Err(StorageError::NodeNotFound { path: path.to_string() }),
        };
        if existed {
            self.notify(&ChangeEvent::property(ChangeKind::Destroyed, id));
        }
        Ok(existed)
    }

    /// Ends the pending transaction: drops removed property values and
    /// clears the `is_new` flags. Returns the number of nodes touched.
    pub fn commit(&self) -> usize {
        let mut touched = Vec::new();
        for mut node in self.nodes.iter_mut() {
            if node.removed_properties.is_empty() && !node.is_new {
                continue;
            }
            let had_removals = !node.removed_properties.is_empty();
            node.removed_properties.clear();
            node.is_new = false;
            touched.push((node.id.clone(), had_removals));
        }
        debug!(nodes = touched.len(), "committed pending node changes");
        for (id, had_removals) in &touched {
            if *had_removals {
                self.notify(&ChangeEvent::property(ChangeKind::Destroyed, id.clone()));
            }
        }
        touched.len()
    }

    /// Adds a mixin type to the node at `path`.
    pub fn add_mixin(&self, path: &str, mixin: &str) -> StorageResult<()> {
        self.update_node(path, |node| {
            if !node.mixin_types.iter().any(|m| m == mixin) {
                node.mixin_types.push(mixin.to_string());
            }
        })
    }

    /// Applies an arbitrary edit to the node at `path` and reports it as modified.
    pub fn update_node<F>(&self, path: &str, edit: F) -> StorageResult<()>
    where
        F: FnOnce(&mut NodeFacetView),
    {
        let id = self.node_id(path)?;
        match self.nodes.get_mut(&id) {
            Some(mut node) => edit(node.value_mut()),
            None => return Err(StorageError::NodeNotFound { path: path.to_string() }),
        }
        self.notify(&ChangeEvent::node(ChangeKind::Modified, id));
        Ok(())
    }

    /// Resolves a path, failing when no node lives there.
    pub fn node_id(&self, path: &str) -> StorageResult<NodeId> {
        self.paths
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NodeNotFound {
                path: path.to_string(),
            })
    }

    /// Current path of a node.
    pub fn path_of(&self, node_id: &NodeId) -> Option<String> {
        self.node_paths.get(node_id).map(|entry| entry.value().clone())
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// (path, id) of the node at `path` and every descendant.
    fn subtree(&self, path: &str) -> StorageResult<Vec<(String, NodeId)>> {
        self.node_id(path)?;
        let prefix = format!("{path}/");
        Ok(self
            .paths
            .iter()
            .filter(|entry| entry.key() == path || entry.key().starts_with(&prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    fn notify(&self, event: &ChangeEvent) {
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        for listener in listeners {
            listener.on_change(event);
        }
    }
}

impl NodeFacetProvider for MemoryNodeStore {
    fn get_facets(&self, node_id: &NodeId) -> Option<NodeFacetView> {
        self.nodes.get(node_id).map(|entry| entry.value().clone())
    }

    fn get_parent_id(&self, node_id: &NodeId) -> Option<NodeId> {
        self.nodes
            .get(node_id)
            .and_then(|entry| entry.value().parent_id.clone())
    }

    fn resolve_path(&self, path: &str) -> Option<NodeId> {
        self.paths.get(path).map(|entry| entry.value().clone())
    }

    fn is_type_or_subtype(&self, type_name: &str, candidate_ancestor_type: &str) -> bool {
        let mut pending = vec![type_name.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if current == candidate_ancestor_type {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(&current) {
                pending.extend(parents.value().iter().cloned());
            }
        }
        false
    }

    fn reference_update_count(&self) -> u64 {
        self.reference_counter.load(Ordering::SeqCst)
    }
}

/// Splits an absolute path into (parent path, last segment).
fn split_path(path: &str) -> StorageResult<(&str, &str)> {
    let invalid = |message: &str| StorageError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };
    if !path.starts_with('/') {
        return Err(invalid("path must be absolute"));
    }
    if path == "/" {
        return Err(invalid("the root path has no parent"));
    }
    if path.ends_with('/') || path.contains("//") {
        return Err(invalid("path has an empty segment"));
    }
    match path.rfind('/') {
        Some(0) => Ok(("/", &path[1..])),
        Some(idx) => Ok((&path[..idx], &path[idx + 1..])),
        None => Err(invalid("path must be absolute")),
    }
}
