//! Children caches.
//!
//! Every [MetaNode] that has children owns a [ChildrenCacheDocument]: a read-optimized list of
//! its children together with the space each child occupies in each of the parent's matrix
//! filters. End-user identification runs exclusively against these documents, so they have to
//! match the source records after every committed change.
//!
//! [ChildrenCacheManager] applies the incremental updates. It reads source records through the
//! [CacheSource] trait and never writes anything but the document it is handed.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    error::KeyError,
    filters::{
        taxon::matching_entries, EncodedSpace, FilterType, NodeTraitAssignment, SpaceValue,
        TraitFilter, TraitSpace,
    },
    properties::{
        Crosslink, FilterId, MetaNode, MetaNodeId, NodeId, NodeType, SpaceId, TaxonRef, TreeNode,
    },
    resolve::ImageResolver,
};

/// One child as listed in its parent's cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildEntry {
    pub id: NodeId,
    pub meta_node_id: MetaNodeId,
    pub name: String,
    pub node_type: NodeType,
    pub image_url: Option<String>,
    pub decision_rule: Option<String>,
    pub taxon: Option<TaxonRef>,
    /// Only non-empty spaces are listed.
    pub space: BTreeMap<FilterId, SpaceValue>,
    /// Sum of the weights of the filters listed in `space`.
    pub max_points: u32,
    /// Client side state. Always stored as `true`.
    pub is_visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChildrenCache")]
pub struct ChildrenCacheDocument {
    pub items: Vec<ChildEntry>,
    pub matrix_filter_types: BTreeMap<FilterId, FilterType>,
}

#[derive(Deserialize)]
struct RawChildrenCache {
    #[serde(default)]
    items: Vec<RawChildEntry>,
    #[serde(default)]
    matrix_filter_types: BTreeMap<FilterId, FilterType>,
}

#[derive(Deserialize)]
struct RawChildEntry {
    id: NodeId,
    meta_node_id: MetaNodeId,
    #[serde(default)]
    name: String,
    node_type: NodeType,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    decision_rule: Option<String>,
    #[serde(default)]
    taxon: Option<TaxonRef>,
    #[serde(default)]
    space: BTreeMap<FilterId, Value>,
    #[serde(default)]
    max_points: u32,
    #[serde(default = "visible")]
    is_visible: bool,
}

fn visible() -> bool {
    true
}

impl TryFrom<RawChildrenCache> for ChildrenCacheDocument {
    type Error = KeyError;

    fn try_from(raw: RawChildrenCache) -> Result<Self, Self::Error> {
        let mut items = Vec::with_capacity(raw.items.len());
        for item in raw.items {
            let mut space = BTreeMap::new();
            for (filter, value) in item.space {
                let filter_type = raw
                    .matrix_filter_types
                    .get(&filter)
                    .ok_or(KeyError::DanglingFilterReference(filter))?;
                space.insert(
                    filter,
                    SpaceValue::from_json(*filter_type, &value).map_err(|e| e.for_filter(filter))?,
                );
            }
            items.push(ChildEntry {
                id: item.id,
                meta_node_id: item.meta_node_id,
                name: item.name,
                node_type: item.node_type,
                image_url: item.image_url,
                decision_rule: item.decision_rule,
                taxon: item.taxon,
                space,
                max_points: item.max_points,
                is_visible: item.is_visible,
            });
        }
        Ok(ChildrenCacheDocument {
            items,
            matrix_filter_types: raw.matrix_filter_types,
        })
    }
}

impl ChildrenCacheDocument {
    pub fn get(&self, id: &NodeId) -> Option<&ChildEntry> {
        self.items.iter().find(|item| item.id == *id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// Replace the entry with the same id in place, or append.
    fn upsert(&mut self, entry: ChildEntry) {
        match self.items.iter_mut().find(|item| item.id == entry.id) {
            Some(item) => *item = entry,
            None => self.items.push(entry),
        }
    }

    fn check_references(&self, entry: &ChildEntry) -> Result<(), KeyError> {
        match entry
            .space
            .keys()
            .find(|filter| !self.matrix_filter_types.contains_key(filter))
        {
            Some(filter) => Err(KeyError::DanglingFilterReference(*filter)),
            None => Ok(()),
        }
    }

    fn check_filter(&self, filter: &FilterId) -> Result<FilterType, KeyError> {
        self.matrix_filter_types
            .get(filter)
            .copied()
            .ok_or(KeyError::DanglingFilterReference(*filter))
    }
}

/// Read access to the source records a children cache is derived from.
pub trait CacheSource {
    fn tree_node(&self, id: &NodeId) -> Option<&TreeNode>;
    fn meta_node(&self, id: &MetaNodeId) -> Option<&MetaNode>;
    /// Filters defined on `meta`, in display order.
    fn matrix_filters(&self, meta: &MetaNodeId) -> Vec<&TraitFilter>;
    fn assignment(&self, node: &NodeId, filter: &FilterId) -> Option<&NodeTraitAssignment>;
    fn trait_space(&self, id: &SpaceId) -> Option<&TraitSpace>;
    fn crosslink(&self, parent: &NodeId, child: &NodeId) -> Option<&Crosslink>;
    /// Tree and crosslink children of `parent` in sibling order.
    fn children(&self, parent: &NodeId) -> Vec<NodeId>;
    /// Tree nodes pointing at `meta`, ordered by path.
    fn tree_nodes_of(&self, meta: &MetaNodeId) -> Vec<NodeId>;
}

pub struct ChildrenCacheManager<'a, S: CacheSource> {
    source: &'a S,
    images: &'a dyn ImageResolver,
}

impl<'a, S: CacheSource> ChildrenCacheManager<'a, S> {
    pub fn new(source: &'a S, images: &'a dyn ImageResolver) -> Self {
        ChildrenCacheManager { source, images }
    }

    /// A document without items that already knows every filter of `meta`.
    pub fn empty_document(&self, meta: &MetaNodeId) -> ChildrenCacheDocument {
        ChildrenCacheDocument {
            items: Vec::new(),
            matrix_filter_types: self
                .source
                .matrix_filters(meta)
                .into_iter()
                .map(|filter| (filter.id, filter.filter_type))
                .collect(),
        }
    }

    /// Compute the entry `child` has in the cache of `parent`'s meta node.
    pub fn child_entry(&self, parent: &TreeNode, child: &TreeNode) -> Result<ChildEntry, KeyError> {
        let meta = self
            .source
            .meta_node(&child.meta_node)
            .ok_or_else(|| KeyError::NotFound(format!("meta node {}", child.meta_node)))?;

        let mut space = BTreeMap::new();
        let mut max_points = 0u32;
        for filter in self.source.matrix_filters(&parent.meta_node) {
            let value = match filter.filter_type {
                FilterType::Taxon => meta
                    .taxon
                    .as_ref()
                    .map(|taxon| SpaceValue::Taxa(matching_entries(filter.taxon_entries(), taxon))),
                filter_type => match self.source.assignment(&child.id, &filter.id) {
                    Some(assignment) => Some(
                        filter_type
                            .node_space_as_list(&assignment.space, |id| {
                                self.source.trait_space(id).map(|s| &s.encoded_space)
                            })
                            .map_err(|e| e.for_filter(filter.id))?,
                    ),
                    None => None,
                },
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                max_points = max_points.saturating_add(filter.weight);
                space.insert(filter.id, value);
            }
        }

        let decision_rule = self
            .source
            .crosslink(&parent.id, &child.id)
            .and_then(|link| link.decision_rule.clone())
            .or_else(|| child.decision_rule.clone());

        Ok(ChildEntry {
            id: child.id,
            meta_node_id: meta.id,
            name: meta.name.clone(),
            node_type: meta.node_type,
            image_url: meta
                .image
                .as_ref()
                .and_then(|image| self.images.image_url(image)),
            decision_rule,
            taxon: meta.taxon.clone(),
            space,
            max_points,
            is_visible: true,
        })
    }

    /// Recompute and upsert `child`'s entry. Inactive children are removed instead.
    pub fn add_or_update_child(
        &self,
        doc: &mut ChildrenCacheDocument,
        parent: &TreeNode,
        child: &TreeNode,
    ) -> Result<(), KeyError> {
        let active = self
            .source
            .meta_node(&child.meta_node)
            .map(MetaNode::is_active)
            .ok_or_else(|| KeyError::NotFound(format!("meta node {}", child.meta_node)))?;
        if !active {
            self.remove_child(doc, &child.id);
            return Ok(());
        }
        let entry = self.child_entry(parent, child)?;
        doc.check_references(&entry)?;
        tracing::debug!(
            "[cache] upsert child {} ({}) with {} spaces",
            entry.id,
            entry.name,
            entry.space.len()
        );
        doc.upsert(entry);
        Ok(())
    }

    pub fn remove_child(&self, doc: &mut ChildrenCacheDocument, child: &NodeId) -> bool {
        let before = doc.items.len();
        doc.items.retain(|item| item.id != *child);
        before != doc.items.len()
    }

    pub fn add_matrix_filter(&self, doc: &mut ChildrenCacheDocument, filter: &TraitFilter) {
        doc.matrix_filter_types
            .insert(filter.id, filter.filter_type);
    }

    /// Forget `filter` and strip it from every item, including its share of `max_points`.
    pub fn remove_matrix_filter(&self, doc: &mut ChildrenCacheDocument, filter: &TraitFilter) {
        doc.matrix_filter_types.remove(&filter.id);
        for item in doc.items.iter_mut() {
            if item.space.remove(&filter.id).is_some() {
                item.max_points = item.max_points.saturating_sub(filter.weight);
            }
        }
    }

    /// Swap `old` for `new` in every item's list for `filter`.
    pub fn update_matrix_filter_space(
        &self,
        doc: &mut ChildrenCacheDocument,
        filter: &FilterId,
        old: &EncodedSpace,
        new: &EncodedSpace,
    ) -> Result<usize, KeyError> {
        let filter_type = doc.check_filter(filter)?;
        if !old.fits(filter_type) || !new.fits(filter_type) {
            return Err(KeyError::invalid_space(
                filter_type,
                new,
                format!("cannot replace {old} in a {filter_type}"),
            )
            .for_filter(*filter));
        }
        let mut changed = 0;
        for item in doc.items.iter_mut() {
            if let Some(value) = item.space.get_mut(filter) {
                if value.replace(old, new) {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Drop a deleted trait space's value from every item. Items left without any value for the
    /// filter lose the key and the filter's weight.
    pub fn remove_matrix_filter_space(
        &self,
        doc: &mut ChildrenCacheDocument,
        filter: &TraitFilter,
        value: &EncodedSpace,
    ) -> Result<usize, KeyError> {
        doc.check_filter(&filter.id)?;
        if !filter.filter_type.is_multispace() {
            return Ok(0);
        }
        let mut changed = 0;
        for item in doc.items.iter_mut() {
            let emptied = match item.space.get_mut(&filter.id) {
                Some(space) => {
                    if space.remove(value) {
                        changed += 1;
                        space.is_empty()
                    } else {
                        false
                    }
                }
                None => false,
            };
            if emptied {
                item.space.remove(&filter.id);
                item.max_points = item.max_points.saturating_sub(filter.weight);
            }
        }
        Ok(changed)
    }

    /// Order items like `order`. Items missing from `order` keep their relative order at the end.
    pub fn sort_items(&self, doc: &mut ChildrenCacheDocument, order: &[NodeId]) {
        let rank: BTreeMap<&NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        doc.items
            .sort_by_key(|item| rank.get(&item.id).copied().unwrap_or(usize::MAX));
    }

    /// Combined sibling order of every tree node sharing `meta`.
    pub fn child_order(&self, meta: &MetaNodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        for parent in self.source.tree_nodes_of(meta) {
            for child in self.source.children(&parent) {
                if !order.contains(&child) {
                    order.push(child);
                }
            }
        }
        order
    }

    /// Derive `meta`'s document from scratch.
    pub fn rebuild(&self, meta: &MetaNodeId) -> Result<ChildrenCacheDocument, KeyError> {
        let mut doc = self.empty_document(meta);
        for parent_id in self.source.tree_nodes_of(meta) {
            let parent = self
                .source
                .tree_node(&parent_id)
                .ok_or_else(|| KeyError::NotFound(format!("tree node {parent_id}")))?;
            for child_id in self.source.children(&parent_id) {
                let child = self
                    .source
                    .tree_node(&child_id)
                    .ok_or_else(|| KeyError::NotFound(format!("tree node {child_id}")))?;
                self.add_or_update_child(&mut doc, parent, child)?;
            }
        }
        let order = self.child_order(meta);
        self.sort_items(&mut doc, &order);
        Ok(doc)
    }
}
