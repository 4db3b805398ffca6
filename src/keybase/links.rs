use std::collections::{BTreeMap, BTreeSet};

use crate::{
    crosslink::CrosslinkManager,
    error::KeyError,
    event::KeyEvent,
    paths::Nuid,
    properties::{non_blank, Crosslink, NodeId, NodeType},
};

use super::base::KeyBase;

impl KeyBase {
    /// Paths of every stored crosslink as `(parent, child)`.
    fn link_paths(&self) -> Vec<(Nuid, Nuid)> {
        self.state
            .crosslinks
            .values()
            .flat_map(|links| links.values())
            .filter_map(|link| {
                let parent = self.state.nodes.get(&link.parent)?;
                let child = self.state.nodes.get(&link.child)?;
                Some((parent.nuid.clone(), child.nuid.clone()))
            })
            .collect()
    }

    /// List `child` below `parent` in addition to its tree position.
    pub fn add_crosslink(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        decision_rule: Option<&str>,
    ) -> Result<(), KeyError> {
        let rule = non_blank(decision_rule);
        self.atomically(|kb| kb.link(parent, vec![(*child, rule)]))
    }

    /// Link several children at once. Either all links are added or none.
    pub fn add_crosslinks(&mut self, parent: &NodeId, children: &[NodeId]) -> Result<(), KeyError> {
        let links = children.iter().map(|child| (*child, None)).collect();
        self.atomically(|kb| kb.link(parent, links))
    }

    fn link(
        &mut self,
        parent_id: &NodeId,
        children: Vec<(NodeId, Option<String>)>,
    ) -> Result<(), KeyError> {
        let parent = self.node(parent_id)?.clone();
        if self.meta_node(&parent.meta_node)?.node_type == NodeType::Result {
            return Err(KeyError::Command(
                "result nodes cannot have children".to_string(),
            ));
        }

        let mut batch = BTreeSet::new();
        let mut proposed = Vec::with_capacity(children.len());
        for (child_id, _) in children.iter() {
            let child = self.node(child_id)?;
            if child.parent.is_none() {
                return Err(KeyError::Command("the root cannot be linked".to_string()));
            }
            if child.parent == Some(*parent_id) {
                return Err(KeyError::Command(format!(
                    "{} is already a child of {}",
                    child.nuid, parent.nuid
                )));
            }
            let duplicate = !batch.insert(*child_id)
                || self
                    .state
                    .crosslinks
                    .get(parent_id)
                    .is_some_and(|links| links.contains_key(child_id));
            if duplicate {
                return Err(KeyError::Command(format!(
                    "{} is already linked below {}",
                    child.nuid, parent.nuid
                )));
            }
            proposed.push((parent.nuid.clone(), child.nuid.clone()));
        }

        let mut paths = self.link_paths();
        let existing = paths.len();
        paths.extend(proposed.iter().cloned());
        if let Some(cycle) = CrosslinkManager::find_cycle(&paths) {
            let culprit = cycle
                .iter()
                .copied()
                .find(|index| *index >= existing)
                .or_else(|| cycle.first().copied())
                .unwrap_or(existing);
            let (parent_path, child_path) = &paths[culprit];
            return Err(KeyError::CircularReference {
                parent: parent_path.to_string(),
                child: child_path.to_string(),
            });
        }

        let shared = self.state.has_shared_meta();
        for (child_id, rule) in children {
            let child = self.node(&child_id)?.clone();
            if shared && self.state.meta_reaches(&child.meta_node, &parent.meta_node) {
                return Err(KeyError::CircularReference {
                    parent: parent.nuid.to_string(),
                    child: child.nuid.to_string(),
                });
            }
            tracing::debug!("[KeyBase::add_crosslink] {} -> {}", parent.nuid, child.nuid);
            self.state.crosslinks.entry(*parent_id).or_default().insert(
                child_id,
                Crosslink {
                    parent: *parent_id,
                    child: child_id,
                    decision_rule: rule,
                },
            );
            self.state.child_order.entry(*parent_id).or_default().push(child_id);
            self.refresh_entry(parent_id, &child_id)?;
            self.emit(KeyEvent::CrosslinkAdded(*parent_id, child_id));
        }
        Ok(())
    }

    /// Replace the decision rule shown for `child` below `parent`.
    pub fn update_crosslink(
        &mut self,
        parent: &NodeId,
        child: &NodeId,
        decision_rule: Option<&str>,
    ) -> Result<(), KeyError> {
        let rule = non_blank(decision_rule);
        self.atomically(|kb| {
            let link = kb
                .state
                .crosslinks
                .get_mut(parent)
                .and_then(|links| links.get_mut(child))
                .ok_or_else(|| KeyError::NotFound(format!("crosslink {parent} -> {child}")))?;
            link.decision_rule = rule;
            kb.refresh_entry(parent, child)
        })
    }

    pub fn remove_crosslink(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let removed = kb
                .state
                .crosslinks
                .get_mut(parent)
                .and_then(|links| links.remove(child))
                .ok_or_else(|| KeyError::NotFound(format!("crosslink {parent} -> {child}")))?;
            kb.state.crosslinks.retain(|_, links| !links.is_empty());
            if let Some(order) = kb.state.child_order.get_mut(parent) {
                order.retain(|other| other != child);
            }
            tracing::debug!("[KeyBase::remove_crosslink] {} -> {}", removed.parent, removed.child);
            kb.detach_entry(parent, child)?;
            kb.emit(KeyEvent::CrosslinkRemoved(*parent, *child));
            Ok(())
        })
    }

    /// Nodes that could be linked below `parent` without a loop, in path order.
    pub fn crosslink_candidates(&self, parent: &NodeId) -> Result<Vec<NodeId>, KeyError> {
        let parent_node = self.node(parent)?;
        if self.meta_of(parent)?.node_type == NodeType::Result {
            return Ok(Vec::new());
        }
        let linked = self.state.crosslinks.get(parent);
        let mut paths = self.link_paths();
        let mut candidates = Vec::new();
        for node in self.state.nuid_index.values().filter_map(|id| self.state.nodes.get(id)) {
            let excluded = node.parent.is_none()
                || node.nuid.is_descendant_or_self_of(&parent_node.nuid)
                || linked.is_some_and(|links| links.contains_key(&node.id));
            if excluded {
                continue;
            }
            paths.push((parent_node.nuid.clone(), node.nuid.clone()));
            if !CrosslinkManager::check_circularity(&paths) {
                candidates.push(node.id);
            }
            paths.pop();
        }
        Ok(candidates)
    }

    pub fn crosslinks(&self) -> Vec<&Crosslink> {
        self.state
            .crosslinks
            .values()
            .flat_map(|links| links.values())
            .collect()
    }

    /// Crosslinks as `parent path -> [child paths]`.
    pub fn crosslink_map(&self) -> BTreeMap<Nuid, Vec<Nuid>> {
        let mut map: BTreeMap<Nuid, Vec<Nuid>> = BTreeMap::new();
        for (parent, child) in self.link_paths() {
            map.entry(parent).or_default().push(child);
        }
        for children in map.values_mut() {
            children.sort();
        }
        map
    }
}
