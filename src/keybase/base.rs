use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::Path,
    sync::{mpsc::Sender, Arc},
};

use crate::{
    cache::{CacheSource, ChildrenCacheDocument, ChildrenCacheManager},
    config::KeyConfig,
    error::KeyError,
    event::KeyEvent,
    filters::{NodeTraitAssignment, TraitFilter, TraitSpace},
    identify::{self, IdentificationResult, Selection},
    paths::{Nuid, NuidCodec},
    properties::{FilterId, MetaNode, MetaNodeId, NodeId, NodeType, SpaceId, TaxonRef, TreeNode},
    resolve::{ImageResolver, PrefixImageResolver},
};

use super::graph::{KeyGraph, TreeSource};

/// A key shared between threads. Writers serialize on the lock.
pub type SharedKeyBase = Arc<RwLock<KeyBase>>;

/// The store of one identification key.
///
/// Every public mutating operation runs inside [KeyBase::transaction]: it either commits every
/// record and cache change it made or none of them. Events are queued while an operation runs
/// and sent once the outermost transaction commits.
pub struct KeyBase {
    pub(crate) config: KeyConfig,
    pub(crate) codec: NuidCodec,
    pub(crate) state: KeyGraph,
    pub(crate) images: Arc<dyn ImageResolver>,
    events: Option<Sender<KeyEvent>>,
    pending: Vec<KeyEvent>,
    depth: usize,
}

impl std::fmt::Debug for KeyBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBase")
            .field("root", &self.state.root)
            .field("nodes", &self.state.nodes.len())
            .field("meta_nodes", &self.state.meta_nodes.len())
            .field("filters", &self.state.filters.len())
            .field("pending_events", &self.pending.len())
            .finish()
    }
}

impl KeyBase {
    /// Create a key holding only its root node.
    pub fn new(config: KeyConfig, root_name: &str) -> Result<KeyBase, KeyError> {
        config.validate()?;
        let codec = NuidCodec::new(&config.nuid)?;
        let name = crate::properties::non_blank(Some(root_name))
            .ok_or_else(|| KeyError::Command("the root node needs a name".to_string()))?;
        let meta = MetaNode::new(&name, NodeType::Root);
        let root = TreeNode {
            id: NodeId::new(),
            nuid: codec.root_path()?,
            meta_node: meta.id,
            decision_rule: None,
            parent: None,
        };
        tracing::debug!("[KeyBase::new] root {} at {}", root.id, root.nuid);
        let images = Arc::new(PrefixImageResolver::new(&config.image_url_prefix));
        Ok(KeyBase {
            config,
            codec,
            state: KeyGraph::new(meta, root),
            images,
            events: None,
            pending: Vec::new(),
            depth: 0,
        })
    }

    pub fn with_event_sender(mut self, tx: Sender<KeyEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Replace the resolver used for `image_url` in children caches. Existing caches keep their
    /// urls until rebuilt.
    pub fn with_image_resolver(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = images;
        self
    }

    pub fn into_shared(self) -> SharedKeyBase {
        Arc::new(RwLock::new(self))
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    pub fn codec(&self) -> &NuidCodec {
        &self.codec
    }

    pub fn graph(&self) -> &KeyGraph {
        &self.state
    }

    pub fn root(&self) -> NodeId {
        self.state.root
    }

    pub fn node(&self, id: &NodeId) -> Result<&TreeNode, KeyError> {
        self.state
            .nodes
            .get(id)
            .ok_or_else(|| KeyError::NotFound(format!("tree node {id}")))
    }

    pub fn by_nuid(&self, nuid: &Nuid) -> Result<&TreeNode, KeyError> {
        self.state
            .by_nuid(nuid)
            .ok_or_else(|| KeyError::NotFound(format!("tree node at {nuid}")))
    }

    pub fn meta_node(&self, id: &MetaNodeId) -> Result<&MetaNode, KeyError> {
        self.state
            .meta_nodes
            .get(id)
            .ok_or_else(|| KeyError::NotFound(format!("meta node {id}")))
    }

    /// Meta node of the tree node `id`.
    pub fn meta_of(&self, id: &NodeId) -> Result<&MetaNode, KeyError> {
        let meta = self.node(id)?.meta_node;
        self.meta_node(&meta)
    }

    pub fn filter(&self, id: &FilterId) -> Result<&TraitFilter, KeyError> {
        self.state
            .filters
            .get(id)
            .ok_or_else(|| KeyError::NotFound(format!("filter {id}")))
    }

    /// Filters of `meta` in display order.
    pub fn filters(&self, meta: &MetaNodeId) -> Vec<&TraitFilter> {
        self.state.matrix_filters(meta)
    }

    pub fn space(&self, id: &SpaceId) -> Result<&TraitSpace, KeyError> {
        self.state
            .spaces
            .get(id)
            .ok_or_else(|| KeyError::NotFound(format!("trait space {id}")))
    }

    /// Trait spaces of `filter` in display order.
    pub fn spaces(&self, filter: &FilterId) -> Vec<&TraitSpace> {
        self.state
            .space_order
            .get(filter)
            .map(|ids| ids.iter().filter_map(|id| self.state.spaces.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn assignment(&self, node: &NodeId, filter: &FilterId) -> Option<&NodeTraitAssignment> {
        self.state.assignment(node, filter)
    }

    pub fn children_cache(&self, meta: &MetaNodeId) -> Option<&ChildrenCacheDocument> {
        self.state
            .meta_nodes
            .get(meta)
            .and_then(|meta| meta.children_cache.as_ref())
    }

    /// Tree and crosslink children of `parent` in sibling order.
    pub fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.state.children(parent)
    }

    pub fn tree_children(&self, parent: &NodeId) -> Vec<&TreeNode> {
        self.state.children_of(parent)
    }

    pub fn descendants(&self, id: &NodeId) -> Vec<&TreeNode> {
        self.state.descendants_of(id)
    }

    /// Every `(parent, child)` edge whose child is a tree node of `meta`: the tree edges first,
    /// then crosslinks.
    pub fn node_links(&self, meta: &MetaNodeId) -> Vec<(NodeId, NodeId)> {
        let mut links = Vec::new();
        for child in self.state.tree_nodes_of(meta) {
            if let Some(parent) = self.state.nodes.get(&child).and_then(|node| node.parent) {
                links.push((parent, child));
            }
        }
        for child in self.state.tree_nodes_of(meta) {
            for parent in self.state.crosslink_parents(&child) {
                links.push((parent, child));
            }
        }
        links
    }

    /// Distinct taxa of result nodes, sorted by latname.
    pub fn taxa(&self) -> Vec<&TaxonRef> {
        let mut taxa: BTreeMap<&str, &TaxonRef> = BTreeMap::new();
        for meta in self.state.meta_nodes.values() {
            if meta.node_type != NodeType::Result {
                continue;
            }
            if let Some(taxon) = &meta.taxon {
                taxa.entry(taxon.taxon_latname.as_str()).or_insert(taxon);
            }
        }
        taxa.into_values().collect()
    }

    /// Run the identification matrix over the children of `parent`.
    pub fn identify(
        &self,
        parent: &NodeId,
        selection: &Selection,
    ) -> Result<IdentificationResult, KeyError> {
        let meta = self.meta_of(parent)?;
        let empty = ChildrenCacheDocument::default();
        let doc = meta.children_cache.as_ref().unwrap_or(&empty);
        let weights: BTreeMap<FilterId, u32> = self
            .filters(&meta.id)
            .into_iter()
            .map(|filter| (filter.id, filter.weight))
            .collect();
        identify::identify(doc, &weights, meta.settings.identification_mode, selection)
    }

    /// Group several operations into one. If `f` fails every change made inside it is undone and
    /// none of its events are sent.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, KeyError>
    where
        F: FnOnce(&mut KeyBase) -> Result<T, KeyError>,
    {
        self.atomically(f)
    }

    pub(crate) fn atomically<T, F>(&mut self, f: F) -> Result<T, KeyError>
    where
        F: FnOnce(&mut KeyBase) -> Result<T, KeyError>,
    {
        let snapshot = self.state.clone();
        let queued = self.pending.len();
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        match result {
            Ok(value) => {
                if self.depth == 0 {
                    self.flush_events();
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("[KeyBase] rolling back: {e}");
                self.state = snapshot;
                self.pending.truncate(queued);
                Err(e)
            }
        }
    }

    pub(crate) fn emit(&mut self, event: KeyEvent) {
        self.pending.push(event);
    }

    fn flush_events(&mut self) {
        let events = std::mem::take(&mut self.pending);
        let Some(tx) = &self.events else {
            return;
        };
        for event in events {
            if let Err(e) = tx.send(event) {
                tracing::warn!("[KeyBase] event receiver dropped, no further events are sent: {e}");
                self.events = None;
                return;
            }
        }
    }

    /// Run `f` against the children cache of `meta` and store the result, sorted into sibling
    /// order. A meta node without a cache starts from an empty document.
    pub(crate) fn with_cache<T, F>(&mut self, meta: &MetaNodeId, f: F) -> Result<T, KeyError>
    where
        F: FnOnce(
            &ChildrenCacheManager<'_, KeyGraph>,
            &KeyGraph,
            &mut ChildrenCacheDocument,
        ) -> Result<T, KeyError>,
    {
        let stored = self
            .state
            .meta_nodes
            .get_mut(meta)
            .ok_or_else(|| KeyError::NotFound(format!("meta node {meta}")))?
            .children_cache
            .take();
        let (result, doc) = {
            let manager = ChildrenCacheManager::new(&self.state, self.images.as_ref());
            let mut doc = stored.unwrap_or_else(|| manager.empty_document(meta));
            let result = f(&manager, &self.state, &mut doc);
            let order = manager.child_order(meta);
            manager.sort_items(&mut doc, &order);
            (result, doc)
        };
        if let Some(meta_node) = self.state.meta_nodes.get_mut(meta) {
            meta_node.children_cache = Some(doc);
        }
        let value = result?;
        self.emit(KeyEvent::CacheUpdated(*meta));
        Ok(value)
    }

    /// Recompute the entry of `child` in the cache of `parent`.
    pub(crate) fn refresh_entry(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), KeyError> {
        let meta = self.node(parent)?.meta_node;
        let (parent, child) = (*parent, *child);
        self.with_cache(&meta, |manager, graph, doc| {
            let parent = graph
                .tree_node(&parent)
                .ok_or_else(|| KeyError::NotFound(format!("tree node {parent}")))?;
            let child = graph
                .tree_node(&child)
                .ok_or_else(|| KeyError::NotFound(format!("tree node {child}")))?;
            manager.add_or_update_child(doc, parent, child)
        })
    }

    /// Recompute `child` in the cache of every node listing it.
    pub(crate) fn refresh_child(&mut self, child: &NodeId) -> Result<(), KeyError> {
        for parent in self.state.parents_of(child) {
            self.refresh_entry(&parent, child)?;
        }
        Ok(())
    }

    /// Recompute every entry in the cache of `meta`.
    pub(crate) fn refresh_children_of(&mut self, meta: &MetaNodeId) -> Result<(), KeyError> {
        let edges: Vec<(NodeId, NodeId)> = self
            .state
            .tree_nodes_of(meta)
            .into_iter()
            .flat_map(|parent| {
                self.state
                    .children(&parent)
                    .into_iter()
                    .map(move |child| (parent, child))
            })
            .collect();
        for (parent, child) in edges {
            self.refresh_entry(&parent, &child)?;
        }
        Ok(())
    }

    /// Drop `child` from the cache of `parent`, unless another tree node sharing the parent's
    /// meta node still lists it. In that case the entry is recomputed.
    pub(crate) fn detach_entry(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), KeyError> {
        let meta = self.node(parent)?.meta_node;
        let other_parent = self
            .state
            .tree_nodes_of(&meta)
            .into_iter()
            .find(|other| other != parent && self.state.children(other).contains(child));
        match other_parent {
            Some(other) => self.refresh_entry(&other, child),
            None => {
                let child = *child;
                self.with_cache(&meta, |manager, _, doc| {
                    manager.remove_child(doc, &child);
                    Ok(())
                })
            }
        }
    }

    /// Derive the cache of `node`'s meta node from scratch.
    pub fn rebuild_children_cache(&mut self, node: &NodeId) -> Result<(), KeyError> {
        let meta = self.node(node)?.meta_node;
        self.atomically(|kb| {
            let doc = {
                let manager = ChildrenCacheManager::new(&kb.state, kb.images.as_ref());
                manager.rebuild(&meta)?
            };
            tracing::info!("[KeyBase] rebuilt children cache of {meta}: {} items", doc.items.len());
            if let Some(meta_node) = kb.state.meta_nodes.get_mut(&meta) {
                meta_node.children_cache = Some(doc);
            }
            kb.emit(KeyEvent::CacheUpdated(meta));
            Ok(())
        })
    }

    /// Meta nodes whose stored cache differs from a fresh derivation.
    pub fn verify_caches(&self) -> Result<Vec<MetaNodeId>, KeyError> {
        let manager = ChildrenCacheManager::new(&self.state, self.images.as_ref());
        let mut stale = Vec::new();
        for meta in self.state.meta_nodes.values() {
            let expected = manager.rebuild(&meta.id)?;
            let matches = match &meta.children_cache {
                Some(stored) => *stored == expected,
                None => expected == manager.empty_document(&meta.id),
            };
            if !matches {
                stale.push(meta.id);
            }
        }
        Ok(stale)
    }

    /// Rebuild every stale cache. Returns the repaired meta nodes.
    pub fn rebuild_all_caches(&mut self) -> Result<Vec<MetaNodeId>, KeyError> {
        let stale = self.verify_caches()?;
        self.atomically(|kb| {
            for meta in stale.iter() {
                tracing::warn!("[KeyBase] repairing stale children cache of {meta}");
                let doc = {
                    let manager = ChildrenCacheManager::new(&kb.state, kb.images.as_ref());
                    manager.rebuild(meta)?
                };
                if let Some(meta_node) = kb.state.meta_nodes.get_mut(meta) {
                    meta_node.children_cache = Some(doc);
                }
                kb.emit(KeyEvent::CacheUpdated(*meta));
            }
            Ok(())
        })?;
        Ok(stale)
    }

    /// Check the structural invariants of the store. Returns one message per violation.
    pub fn built_in_test(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let state = &self.state;

        for node in state.nodes.values() {
            if state.nuid_index.get(&node.nuid) != Some(&node.id) {
                errors.push(format!("[built_in_test] {} missing from path index", node.nuid));
            }
            if !state.meta_nodes.contains_key(&node.meta_node) {
                errors.push(format!("[built_in_test] {} has no meta node", node.id));
            }
            match node.parent.and_then(|parent| state.nodes.get(&parent)) {
                Some(parent) => {
                    if !self.codec.is_child_of(&node.nuid, &parent.nuid) {
                        errors.push(format!(
                            "[built_in_test] {} is not a child path of {}",
                            node.nuid, parent.nuid
                        ));
                    }
                }
                None if node.id == state.root => {}
                None => errors.push(format!("[built_in_test] {} has no parent", node.id)),
            }
        }

        for parent in state.nodes.keys() {
            let mut expected: Vec<NodeId> =
                state.children_of(parent).iter().map(|node| node.id).collect();
            if let Some(links) = state.crosslinks.get(parent) {
                expected.extend(links.keys());
            }
            expected.sort();
            let mut listed = state.children(parent);
            listed.sort();
            if listed != expected {
                errors.push(format!(
                    "[built_in_test] sibling order of {parent} lists {} children, expected {}",
                    listed.len(),
                    expected.len()
                ));
            }
        }

        match self.verify_caches() {
            Ok(stale) => {
                for meta in stale {
                    errors.push(format!("[built_in_test] children cache of {meta} is stale"));
                }
            }
            Err(e) => errors.push(format!("[built_in_test] cache derivation failed: {e}")),
        }
        errors
    }

    pub fn export_graph(&self) -> KeyGraph {
        self.state.clone()
    }

    /// Restore a key from an exported graph. Paths are checked against `config`.
    pub fn from_graph(config: KeyConfig, mut graph: KeyGraph) -> Result<KeyBase, KeyError> {
        config.validate()?;
        let codec = NuidCodec::new(&config.nuid)?;
        graph.reindex();
        if graph.nuid_index.len() != graph.nodes.len() {
            return Err(KeyError::Serialization(
                "two tree nodes share a path".to_string(),
            ));
        }
        let root = graph
            .nodes
            .get(&graph.root)
            .ok_or_else(|| KeyError::Serialization(format!("root {} is missing", graph.root)))?;
        if root.parent.is_some() || root.nuid != codec.root_path()? {
            return Err(KeyError::Serialization(format!(
                "root {} is not at the root path",
                root.id
            )));
        }
        let mut issued: BTreeMap<NodeId, u64> = BTreeMap::new();
        for node in graph.nodes.values() {
            codec.parse(node.nuid.as_str())?;
            let Some(parent_id) = node.parent else {
                continue;
            };
            let parent = graph.nodes.get(&parent_id).ok_or_else(|| {
                KeyError::Serialization(format!("parent {parent_id} of {} is missing", node.id))
            })?;
            if !codec.is_child_of(&node.nuid, &parent.nuid) {
                return Err(KeyError::Serialization(format!(
                    "{} is not a child path of {}",
                    node.nuid, parent.nuid
                )));
            }
            let ordinal = codec.ordinal(&node.nuid)?;
            let highest = issued.entry(parent_id).or_default();
            *highest = (*highest).max(ordinal);
        }
        for (parent, highest) in issued {
            let counter = graph.issued_ordinals.entry(parent).or_default();
            *counter = (*counter).max(highest);
        }
        let images = Arc::new(PrefixImageResolver::new(&config.image_url_prefix));
        Ok(KeyBase {
            config,
            codec,
            state: graph,
            images,
            events: None,
            pending: Vec::new(),
            depth: 0,
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<(), KeyError> {
        tracing::debug!("[KeyBase] writing snapshot to {:?}", path);
        let json = serde_json::to_string_pretty(&self.state)?;
        write(path, json)?;
        Ok(())
    }

    pub fn load_json(config: KeyConfig, path: &Path) -> Result<KeyBase, KeyError> {
        tracing::debug!("[KeyBase] reading snapshot from {:?}", path);
        let content = read_to_string(path)?;
        let graph: KeyGraph = serde_json::from_str(&content)?;
        KeyBase::from_graph(config, graph)
    }
}
