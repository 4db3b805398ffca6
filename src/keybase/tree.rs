use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    cache::CacheSource,
    error::KeyError,
    event::KeyEvent,
    properties::{
        non_blank, ImageRef, MetaNode, MetaNodeId, NodeId, NodeSettings, NodeType, TaxonRef,
        TreeNode,
    },
};

use super::{base::KeyBase, graph::TreeSource};

/// Input for [KeyBase::create_node].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewNode {
    pub name: String,
    pub node_type: NodeType,
    pub decision_rule: Option<String>,
    pub taxon: Option<TaxonRef>,
    pub image: Option<ImageRef>,
    pub settings: NodeSettings,
    /// Place another tree node for an existing meta node instead of creating one. Name, type,
    /// taxon, image and settings are ignored in that case.
    pub meta_node: Option<MetaNodeId>,
}

impl NewNode {
    pub fn named(name: &str, node_type: NodeType) -> Self {
        NewNode {
            name: name.to_string(),
            node_type,
            ..Default::default()
        }
    }

    pub fn with_decision_rule(mut self, rule: &str) -> Self {
        self.decision_rule = Some(rule.to_string());
        self
    }

    pub fn with_taxon(mut self, taxon: TaxonRef) -> Self {
        self.taxon = Some(taxon);
        self
    }
}

/// Input for [KeyBase::update_node]. `None` leaves a field as it is; for optional fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub node_type: Option<NodeType>,
    pub decision_rule: Option<Option<String>>,
    pub taxon: Option<Option<TaxonRef>>,
    pub image: Option<Option<ImageRef>>,
    pub settings: Option<NodeSettings>,
}

impl KeyBase {
    /// Add a node below `parent`. The new node is appended to the parent's children.
    pub fn create_node(&mut self, parent: &NodeId, new: NewNode) -> Result<NodeId, KeyError> {
        self.atomically(|kb| kb.insert_child(parent, new))
    }

    fn insert_child(&mut self, parent_id: &NodeId, new: NewNode) -> Result<NodeId, KeyError> {
        let parent = self.node(parent_id)?.clone();
        let parent_meta = self.meta_node(&parent.meta_node)?;
        if parent_meta.node_type == NodeType::Result {
            return Err(KeyError::Command(format!(
                "result node '{}' cannot have children",
                parent_meta.name
            )));
        }
        let decision_rule = non_blank(new.decision_rule.as_deref());

        let meta_id = match new.meta_node {
            Some(meta_id) => {
                let meta = self.meta_node(&meta_id)?;
                if meta.node_type == NodeType::Root {
                    return Err(KeyError::Command(
                        "the root meta node cannot be placed twice".to_string(),
                    ));
                }
                if meta.name.is_empty() && decision_rule.is_none() {
                    return Err(KeyError::Command(
                        "a node needs a name or a decision rule".to_string(),
                    ));
                }
                if self.state.meta_reaches(&meta_id, &parent.meta_node) {
                    return Err(KeyError::CircularReference {
                        parent: parent.nuid.to_string(),
                        child: format!("meta node {meta_id}"),
                    });
                }
                meta_id
            }
            None => {
                if new.node_type == NodeType::Root {
                    return Err(KeyError::Command(
                        "a key has exactly one root node".to_string(),
                    ));
                }
                let name = non_blank(Some(&new.name)).unwrap_or_default();
                if name.is_empty() && decision_rule.is_none() {
                    return Err(KeyError::Command(
                        "a node needs a name or a decision rule".to_string(),
                    ));
                }
                self.check_unique_name(&name, None)?;
                let mut meta = MetaNode::new(&name, new.node_type);
                meta.taxon = new.taxon;
                meta.image = new.image.filter(|image| !image.0.is_empty());
                meta.settings = new.settings;
                let id = meta.id;
                self.state.meta_nodes.insert(id, meta);
                id
            }
        };

        let issued = self.state.issued_ordinals.get(parent_id).copied().unwrap_or(0);
        let nuid = self.codec.next_child_path(&parent.nuid, issued)?;
        self.state.issued_ordinals.insert(*parent_id, issued + 1);

        let node = TreeNode {
            id: NodeId::new(),
            nuid: nuid.clone(),
            meta_node: meta_id,
            decision_rule,
            parent: Some(*parent_id),
        };
        let id = node.id;
        tracing::debug!("[KeyBase::create_node] {id} at {nuid} below {}", parent.nuid);
        self.state.insert_node(node);
        self.state.child_order.entry(*parent_id).or_default().push(id);
        self.refresh_entry(parent_id, &id)?;
        self.emit(KeyEvent::NodeCreated(id, nuid));
        Ok(id)
    }

    fn check_unique_name(&self, name: &str, except: Option<&MetaNodeId>) -> Result<(), KeyError> {
        if name.is_empty() {
            return Ok(());
        }
        let taken = self
            .state
            .meta_nodes
            .values()
            .any(|meta| meta.name == name && Some(&meta.id) != except);
        if taken {
            return Err(KeyError::Command(format!("a node named '{name}' already exists")));
        }
        Ok(())
    }

    /// Edit a node. Name, type, taxon, image and settings live on the meta node and change for
    /// every tree node sharing it; the decision rule belongs to the tree node.
    pub fn update_node(&mut self, id: &NodeId, update: NodeUpdate) -> Result<(), KeyError> {
        self.atomically(|kb| kb.apply_update(id, update))
    }

    fn apply_update(&mut self, id: &NodeId, update: NodeUpdate) -> Result<(), KeyError> {
        let meta_id = self.node(id)?.meta_node;
        let meta = self.meta_node(&meta_id)?.clone();

        if let Some(node_type) = update.node_type {
            if node_type != meta.node_type
                && (node_type == NodeType::Root || meta.node_type == NodeType::Root)
            {
                return Err(KeyError::Command(
                    "the root node type cannot be changed".to_string(),
                ));
            }
            if node_type == NodeType::Result {
                let has_children = self
                    .state
                    .tree_nodes_of(&meta_id)
                    .iter()
                    .any(|node| !self.state.children(node).is_empty());
                if has_children {
                    return Err(KeyError::Command(format!(
                        "'{}' has children and cannot become a result",
                        meta.name
                    )));
                }
            }
        }
        let name = match update.name.as_deref() {
            Some(name) => {
                let name = non_blank(Some(name)).unwrap_or_default();
                self.check_unique_name(&name, Some(&meta_id))?;
                name
            }
            None => meta.name.clone(),
        };

        let node = self
            .state
            .nodes
            .get_mut(id)
            .ok_or_else(|| KeyError::NotFound(format!("tree node {id}")))?;
        if let Some(rule) = update.decision_rule {
            node.decision_rule = non_blank(rule.as_deref());
        }
        if name.is_empty() {
            let unnamed = self
                .state
                .tree_nodes_of(&meta_id)
                .iter()
                .filter_map(|node| self.state.nodes.get(node))
                .any(|node| node.decision_rule.is_none());
            if unnamed {
                return Err(KeyError::Command(
                    "a node needs a name or a decision rule".to_string(),
                ));
            }
        }

        let meta = self
            .state
            .meta_nodes
            .get_mut(&meta_id)
            .ok_or_else(|| KeyError::NotFound(format!("meta node {meta_id}")))?;
        meta.name = name;
        if let Some(node_type) = update.node_type {
            meta.node_type = node_type;
        }
        if let Some(taxon) = update.taxon {
            meta.taxon = taxon;
        }
        if let Some(image) = update.image {
            meta.image = image.filter(|image| !image.0.is_empty());
        }
        if let Some(settings) = update.settings {
            meta.settings = settings;
        }
        tracing::debug!("[KeyBase::update_node] {id} ({})", meta.name);

        for node in self.state.tree_nodes_of(&meta_id) {
            self.refresh_child(&node)?;
            self.emit(KeyEvent::NodeUpdated(node));
        }
        Ok(())
    }

    /// Delete a leaf node. Nodes with tree children have to be deleted with
    /// [KeyBase::delete_branch].
    pub fn delete_node(&mut self, id: &NodeId) -> Result<(), KeyError> {
        self.atomically(|kb| kb.remove_node(id))
    }

    /// Delete `id` and everything below it, deepest nodes first. Returns the removed nodes.
    pub fn delete_branch(&mut self, id: &NodeId) -> Result<Vec<NodeId>, KeyError> {
        self.atomically(|kb| {
            let mut doomed: Vec<NodeId> = kb.state.descendants_of(id).iter().map(|n| n.id).collect();
            // reverse path order visits children before their parents
            doomed.reverse();
            doomed.push(*id);
            for node in doomed.iter() {
                kb.remove_node(node)?;
            }
            tracing::info!("[KeyBase::delete_branch] removed {} nodes", doomed.len());
            Ok(doomed)
        })
    }

    fn remove_node(&mut self, id: &NodeId) -> Result<(), KeyError> {
        let node = self.node(id)?.clone();
        if node.parent.is_none() {
            return Err(KeyError::Command("the root node cannot be deleted".to_string()));
        }
        if !self.state.children_of(id).is_empty() {
            return Err(KeyError::NodeHasChildren(*id));
        }

        // Unhook every edge first so a cache is never refreshed from a half removed node.
        let outgoing: Vec<NodeId> = self
            .state
            .crosslinks
            .remove(id)
            .map(|links| links.into_keys().collect())
            .unwrap_or_default();
        let incoming = self.state.parents_of(id);
        for parent in incoming.iter() {
            let linked = self
                .state
                .crosslinks
                .get_mut(parent)
                .is_some_and(|links| links.remove(id).is_some());
            if linked {
                self.emit(KeyEvent::CrosslinkRemoved(*parent, *id));
            }
            if let Some(order) = self.state.child_order.get_mut(parent) {
                order.retain(|child| child != id);
            }
        }
        self.state.crosslinks.retain(|_, links| !links.is_empty());
        for child in outgoing.iter() {
            self.emit(KeyEvent::CrosslinkRemoved(*id, *child));
        }
        self.state.child_order.remove(id);
        for child in outgoing.iter() {
            self.detach_entry(id, child)?;
        }
        for parent in incoming.iter() {
            self.detach_entry(parent, id)?;
        }

        self.state.assignments.remove(id);
        self.state.issued_ordinals.remove(id);
        self.state.nuid_index.remove(&node.nuid);
        self.state.nodes.remove(id);
        tracing::debug!("[KeyBase::delete_node] {id} at {}", node.nuid);
        self.emit(KeyEvent::NodesRemoved(vec![*id]));

        if self.state.tree_nodes_of(&node.meta_node).is_empty() {
            self.remove_meta(&node.meta_node);
        }
        Ok(())
    }

    /// Drop an unreferenced meta node with its filters, their spaces and every assignment to
    /// those filters.
    fn remove_meta(&mut self, meta: &MetaNodeId) {
        let filters: BTreeSet<_> = self
            .state
            .filter_order
            .remove(meta)
            .unwrap_or_default()
            .into_iter()
            .collect();
        for filter in filters.iter() {
            self.state.filters.remove(filter);
            for space in self.state.space_order.remove(filter).unwrap_or_default() {
                self.state.spaces.remove(&space);
            }
        }
        for assignments in self.state.assignments.values_mut() {
            assignments.retain(|filter, _| !filters.contains(filter));
        }
        self.state.assignments.retain(|_, assignments| !assignments.is_empty());
        self.state.meta_nodes.remove(meta);
        tracing::debug!("[KeyBase::delete_node] meta node {meta} with {} filters", filters.len());
        self.emit(KeyEvent::MetaNodesRemoved(vec![*meta]));
    }

    /// Replace the sibling order of `parent`. `order` must list exactly its current children.
    pub fn reorder_children(&mut self, parent: &NodeId, order: &[NodeId]) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let meta = kb.node(parent)?.meta_node;
            let mut current = kb.state.children(parent);
            let mut proposed = order.to_vec();
            current.sort();
            proposed.sort();
            if current != proposed {
                return Err(KeyError::Command(format!(
                    "new order of {parent} is not a permutation of its children"
                )));
            }
            kb.state.child_order.insert(*parent, order.to_vec());
            tracing::debug!("[KeyBase::reorder_children] {parent}");
            kb.with_cache(&meta, |_, _, _| Ok(()))?;
            kb.emit(KeyEvent::ChildrenReordered(*parent, order.to_vec()));
            Ok(())
        })
    }
}
