use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    paths::Nuid,
    properties::{FilterId, MetaNodeId, NodeId, SpaceId},
};

/// Change notifications emitted by a [crate::keybase::KeyBase]. Events are only sent once the
/// operation that produced them has been committed; a rolled back operation emits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    /// Node id, assigned path
    NodeCreated(NodeId, Nuid),
    NodeUpdated(NodeId),
    NodesRemoved(Vec<NodeId>),
    MetaNodesRemoved(Vec<MetaNodeId>),
    /// Parent, new sibling order
    ChildrenReordered(NodeId, Vec<NodeId>),
    /// Parent, child
    CrosslinkAdded(NodeId, NodeId),
    /// Parent, child
    CrosslinkRemoved(NodeId, NodeId),
    FilterUpdated(FilterId),
    FilterRemoved(FilterId),
    SpaceUpdated(FilterId, SpaceId),
    SpaceRemoved(FilterId, SpaceId),
    /// Node, filter
    AssignmentChanged(NodeId, FilterId),
    /// The children cache of a meta node was written.
    CacheUpdated(MetaNodeId),
}

impl Display for KeyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyEvent::NodeCreated(id, nuid) => write!(f, "NodeCreated({id} at {nuid})"),
            KeyEvent::NodeUpdated(id) => write!(f, "NodeUpdated({id})"),
            KeyEvent::NodesRemoved(ids) => write!(f, "NodesRemoved({} nodes)", ids.len()),
            KeyEvent::MetaNodesRemoved(ids) => {
                write!(f, "MetaNodesRemoved({} meta nodes)", ids.len())
            }
            KeyEvent::ChildrenReordered(parent, order) => {
                write!(f, "ChildrenReordered({parent}, {} children)", order.len())
            }
            KeyEvent::CrosslinkAdded(parent, child) => {
                write!(f, "CrosslinkAdded({parent} -> {child})")
            }
            KeyEvent::CrosslinkRemoved(parent, child) => {
                write!(f, "CrosslinkRemoved({parent} -> {child})")
            }
            KeyEvent::FilterUpdated(id) => write!(f, "FilterUpdated({id})"),
            KeyEvent::FilterRemoved(id) => write!(f, "FilterRemoved({id})"),
            KeyEvent::SpaceUpdated(filter, space) => write!(f, "SpaceUpdated({filter}, {space})"),
            KeyEvent::SpaceRemoved(filter, space) => write!(f, "SpaceRemoved({filter}, {space})"),
            KeyEvent::AssignmentChanged(node, filter) => {
                write!(f, "AssignmentChanged({node}, {filter})")
            }
            KeyEvent::CacheUpdated(meta) => write!(f, "CacheUpdated({meta})"),
        }
    }
}
