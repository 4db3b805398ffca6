use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    cache::CacheSource,
    filters::{NodeTraitAssignment, TraitFilter, TraitSpace},
    paths::Nuid,
    properties::{Crosslink, FilterId, MetaNode, MetaNodeId, NodeId, SpaceId, TreeNode},
};

/// Tree queries answered from node paths.
pub trait TreeSource {
    fn get_root(&self) -> Option<&TreeNode>;
    fn get_by_id(&self, id: &NodeId) -> Option<&TreeNode>;
    /// Direct tree children in path order. Crosslinked children are not included.
    fn children_of(&self, id: &NodeId) -> Vec<&TreeNode>;
    /// Every node below `id` in path order, excluding `id`.
    fn descendants_of(&self, id: &NodeId) -> Vec<&TreeNode>;
}

/// Every source-of-truth record of a key plus the derived children caches. This is the unit a
/// [super::KeyBase] snapshots for rollback and serializes for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGraph {
    pub(crate) root: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, TreeNode>,
    pub(crate) meta_nodes: BTreeMap<MetaNodeId, MetaNode>,
    /// Tree and crosslink children per parent, in sibling order.
    pub(crate) child_order: BTreeMap<NodeId, Vec<NodeId>>,
    /// Number of path ordinals handed out below each node.
    pub(crate) issued_ordinals: BTreeMap<NodeId, u64>,
    pub(crate) filters: BTreeMap<FilterId, TraitFilter>,
    pub(crate) filter_order: BTreeMap<MetaNodeId, Vec<FilterId>>,
    pub(crate) spaces: BTreeMap<SpaceId, TraitSpace>,
    pub(crate) space_order: BTreeMap<FilterId, Vec<SpaceId>>,
    pub(crate) assignments: BTreeMap<NodeId, BTreeMap<FilterId, NodeTraitAssignment>>,
    /// parent -> child -> link
    pub(crate) crosslinks: BTreeMap<NodeId, BTreeMap<NodeId, Crosslink>>,
    #[serde(skip)]
    pub(crate) nuid_index: BTreeMap<Nuid, NodeId>,
}

impl KeyGraph {
    pub(crate) fn new(root_meta: MetaNode, root: TreeNode) -> KeyGraph {
        let mut graph = KeyGraph {
            root: root.id,
            nodes: BTreeMap::new(),
            meta_nodes: BTreeMap::new(),
            child_order: BTreeMap::new(),
            issued_ordinals: BTreeMap::new(),
            filters: BTreeMap::new(),
            filter_order: BTreeMap::new(),
            spaces: BTreeMap::new(),
            space_order: BTreeMap::new(),
            assignments: BTreeMap::new(),
            crosslinks: BTreeMap::new(),
            nuid_index: BTreeMap::new(),
        };
        graph.meta_nodes.insert(root_meta.id, root_meta);
        graph.insert_node(root);
        graph
    }

    pub(crate) fn insert_node(&mut self, node: TreeNode) {
        self.nuid_index.insert(node.nuid.clone(), node.id);
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn reindex(&mut self) {
        self.nuid_index = self
            .nodes
            .values()
            .map(|node| (node.nuid.clone(), node.id))
            .collect();
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, TreeNode> {
        &self.nodes
    }

    pub fn meta_nodes(&self) -> &BTreeMap<MetaNodeId, MetaNode> {
        &self.meta_nodes
    }

    pub fn filters(&self) -> &BTreeMap<FilterId, TraitFilter> {
        &self.filters
    }

    pub fn spaces(&self) -> &BTreeMap<SpaceId, TraitSpace> {
        &self.spaces
    }

    pub fn by_nuid(&self, nuid: &Nuid) -> Option<&TreeNode> {
        self.nuid_index.get(nuid).and_then(|id| self.nodes.get(id))
    }

    /// Nodes whose path starts with `prefix`, including an exact match, in path order.
    fn with_prefix<'a>(&'a self, prefix: &'a Nuid) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.nuid_index
            .range(prefix.clone()..)
            .take_while(move |(nuid, _)| nuid.is_descendant_or_self_of(prefix))
            .filter_map(move |(_, id)| self.nodes.get(id))
    }

    /// Crosslinks `(parent, child)` in which `child` is the child.
    pub(crate) fn crosslink_parents(&self, child: &NodeId) -> Vec<NodeId> {
        self.crosslinks
            .iter()
            .filter(|(_, links)| links.contains_key(child))
            .map(|(parent, _)| *parent)
            .collect()
    }

    /// Every node listing `child` among its children: the tree parent first, then crosslink
    /// parents.
    pub(crate) fn parents_of(&self, child: &NodeId) -> Vec<NodeId> {
        let mut parents: Vec<NodeId> = self
            .nodes
            .get(child)
            .and_then(|node| node.parent)
            .into_iter()
            .collect();
        parents.extend(self.crosslink_parents(child));
        parents
    }

    /// More than one tree node points at some meta node.
    pub(crate) fn has_shared_meta(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.nodes.values().any(|node| !seen.insert(node.meta_node))
    }

    /// Whether walking children from `from` can arrive at a tree node of `to`. Children are
    /// collected over every tree node sharing a meta node, like the children caches do.
    pub(crate) fn meta_reaches(&self, from: &MetaNodeId, to: &MetaNodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![*from];
        while let Some(meta) = stack.pop() {
            if meta == *to {
                return true;
            }
            if !visited.insert(meta) {
                continue;
            }
            for parent in self.tree_nodes_of(&meta) {
                stack.extend(
                    self.children(&parent)
                        .iter()
                        .filter_map(|child| self.nodes.get(child))
                        .map(|child| child.meta_node),
                );
            }
        }
        false
    }

    pub(crate) fn filter_space_ids(&self, filter: &FilterId) -> BTreeSet<SpaceId> {
        self.space_order
            .get(filter)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl TreeSource for KeyGraph {
    fn get_root(&self) -> Option<&TreeNode> {
        self.nodes.get(&self.root)
    }

    fn get_by_id(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    fn children_of(&self, id: &NodeId) -> Vec<&TreeNode> {
        match self.nodes.get(id) {
            Some(parent) => self
                .with_prefix(&parent.nuid)
                .filter(|node| node.parent == Some(*id))
                .collect(),
            None => Vec::new(),
        }
    }

    fn descendants_of(&self, id: &NodeId) -> Vec<&TreeNode> {
        match self.nodes.get(id) {
            Some(parent) => self
                .with_prefix(&parent.nuid)
                .filter(|node| node.id != *id)
                .collect(),
            None => Vec::new(),
        }
    }
}

impl CacheSource for KeyGraph {
    fn tree_node(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    fn meta_node(&self, id: &MetaNodeId) -> Option<&MetaNode> {
        self.meta_nodes.get(id)
    }

    fn matrix_filters(&self, meta: &MetaNodeId) -> Vec<&TraitFilter> {
        self.filter_order
            .get(meta)
            .map(|ids| ids.iter().filter_map(|id| self.filters.get(id)).collect())
            .unwrap_or_default()
    }

    fn assignment(&self, node: &NodeId, filter: &FilterId) -> Option<&NodeTraitAssignment> {
        self.assignments
            .get(node)
            .and_then(|assignments| assignments.get(filter))
    }

    fn trait_space(&self, id: &SpaceId) -> Option<&TraitSpace> {
        self.spaces.get(id)
    }

    fn crosslink(&self, parent: &NodeId, child: &NodeId) -> Option<&Crosslink> {
        self.crosslinks
            .get(parent)
            .and_then(|links| links.get(child))
    }

    fn children(&self, parent: &NodeId) -> Vec<NodeId> {
        self.child_order.get(parent).cloned().unwrap_or_default()
    }

    fn tree_nodes_of(&self, meta: &MetaNodeId) -> Vec<NodeId> {
        let mut nodes: Vec<&TreeNode> = self
            .nodes
            .values()
            .filter(|node| node.meta_node == *meta)
            .collect();
        nodes.sort_by(|a, b| a.nuid.cmp(&b.nuid));
        nodes.into_iter().map(|node| node.id).collect()
    }
}
