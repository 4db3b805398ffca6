//! The store of an identification key.
//!
//! # Module Organization
//!
//! - [`graph`]: source-of-truth records ([KeyGraph]) and the path based tree queries
//!   ([TreeSource])
//! - [`base`]: [KeyBase] itself: transactions, events, cache plumbing and snapshots
//! - `tree`: node creation, editing, deletion and sibling order
//! - `matrix`: matrix filters, trait spaces and node assignments
//! - `links`: crosslinks
//!
//! Every mutation validates first, then changes the records, then brings every affected
//! children cache up to date, all inside one transaction.
//!
//! ```rust
//! use nature_key::{config::KeyConfig, keybase::{KeyBase, NewNode}, properties::NodeType};
//!
//! let mut key = KeyBase::new(KeyConfig::default(), "Trees of Europe").unwrap();
//! let root = key.root();
//! let oak = key.create_node(&root, NewNode::named("Oak", NodeType::Result)).unwrap();
//! assert_eq!(key.node(&oak).unwrap().nuid.as_str(), "001001");
//! ```

mod base;
mod graph;
mod links;
mod matrix;
mod tree;


pub use base::{KeyBase, SharedKeyBase};
pub use graph::{KeyGraph, TreeSource};
pub use matrix::{FilterUpdate, NewFilter};
pub use tree::{NewNode, NodeUpdate};
