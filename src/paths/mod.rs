//! Hierarchical node identifiers (NUIDs).
//!
//! Every node of a key carries a path built from fixed-width segments, one per level. The
//! ancestry questions the rest of the crate needs (is this node below that one, would this
//! crosslink close a loop) are answered with string prefix tests on those paths, without
//! walking the tree.
pub mod nuid;

pub use nuid::{is_ancestor, is_descendant_or_self, Nuid, NuidCodec};
