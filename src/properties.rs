/// [crate::properties] contains the persisted records of an identification key: the tree
/// structure ([TreeNode]), the content shared between tree positions ([MetaNode]), secondary
/// edges ([Crosslink]) and the identifiers tying them together.
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

pub use uuid::Uuid;

use crate::{cache::ChildrenCacheDocument, error::KeyError, paths::Nuid};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                $name(Uuid::nil())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                $name(uuid)
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(Uuid::parse_str(s)?))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}",
                    self.0.hyphenated().encode_lower(&mut Uuid::encode_buffer())
                )
            }
        }
    };
}

uuid_id!(
    /// Identifies a position in the tree.
    NodeId
);
uuid_id!(
    /// Identifies the content record a tree position points at.
    MetaNodeId
);
uuid_id!(
    /// Identifies a matrix filter defined on a meta node.
    FilterId
);
uuid_id!(
    /// Identifies one predefined value of a multi-space filter.
    SpaceId
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    #[default]
    Node,
    Result,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NodeType::Root => "root",
            NodeType::Node => "node",
            NodeType::Result => "result",
        };
        write!(f, "{label}")
    }
}

/// How end users walk a node's children: `Fluid` ranks every candidate by matched points,
/// `Strict` hides candidates that contradict any selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentificationMode {
    #[default]
    Fluid,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub identification_mode: IdentificationMode,
    /// Inactive nodes stay in the tree but are left out of their parents' children caches.
    pub is_active: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            identification_mode: IdentificationMode::default(),
            is_active: true,
            extra: BTreeMap::new(),
        }
    }
}

/// A taxon as provided by an external taxonomic source. `taxon_nuid` follows the same prefix
/// convention as tree paths, so higher taxa are prefixes of their members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonRef {
    pub taxon_source: String,
    pub taxon_latname: String,
    pub taxon_author: Option<String>,
    pub name_uuid: String,
    pub taxon_nuid: String,
}

impl TaxonRef {
    /// `other` is this taxon or one of its members in the same taxonomic source.
    pub fn contains(&self, other: &TaxonRef) -> bool {
        self.taxon_source == other.taxon_source
            && crate::paths::is_descendant_or_self(&other.taxon_nuid, &self.taxon_nuid)
    }
}

/// Opaque handle understood by an [crate::resolve::ImageResolver].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl Display for ImageRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content of a node. Usually referenced by exactly one [TreeNode]; it is deleted together with
/// the last tree node pointing at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaNode {
    pub id: MetaNodeId,
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub taxon: Option<TaxonRef>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub settings: NodeSettings,
    /// Derived state, written only through [crate::cache::ChildrenCacheManager].
    #[serde(default)]
    pub children_cache: Option<ChildrenCacheDocument>,
}

impl MetaNode {
    pub fn new(name: &str, node_type: NodeType) -> MetaNode {
        MetaNode {
            id: MetaNodeId::new(),
            name: name.to_string(),
            node_type,
            taxon: None,
            image: None,
            settings: NodeSettings::default(),
            children_cache: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.settings.is_active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub nuid: Nuid,
    pub meta_node: MetaNodeId,
    #[serde(default)]
    pub decision_rule: Option<String>,
    /// `None` only for the root.
    #[serde(default)]
    pub parent: Option<NodeId>,
}

/// A secondary parent/child edge. The child keeps its tree position; the crosslink only makes
/// it reachable from one more parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crosslink {
    pub parent: NodeId,
    pub child: NodeId,
    /// Replaces the child's own decision rule when listed under this parent.
    #[serde(default)]
    pub decision_rule: Option<String>,
}

/// Trim an optional text field, mapping blank input to `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn taxon(source: &str, nuid: &str, latname: &str) -> TaxonRef {
        TaxonRef {
            taxon_source: source.to_string(),
            taxon_latname: latname.to_string(),
            taxon_author: None,
            name_uuid: Uuid::new_v4().to_string(),
            taxon_nuid: nuid.to_string(),
        }
    }

    #[test]
    fn taxon_containment_respects_source() {
        let animalia = taxon("taxonomy.sources.col", "001", "Animalia");
        let lynx = taxon("taxonomy.sources.col", "001004002", "Lynx lynx");
        let lynx_elsewhere = taxon("taxonomy.sources.custom", "001004002", "Lynx lynx");
        assert!(animalia.contains(&lynx));
        assert!(animalia.contains(&animalia));
        assert!(!lynx.contains(&animalia));
        assert!(!animalia.contains(&lynx_elsewhere));
    }

    #[test]
    fn settings_keep_unknown_keys() {
        let settings: NodeSettings =
            serde_json::from_str(r#"{"is_active": false, "color": "green"}"#).unwrap();
        assert!(!settings.is_active);
        assert_eq!(settings.identification_mode, IdentificationMode::Fluid);
        assert_eq!(
            settings.extra.get("color"),
            Some(&serde_json::Value::String("green".to_string()))
        );
    }

    #[test]
    fn ids_parse_and_display() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<FilterId>().is_err());
    }
}
