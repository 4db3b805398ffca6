//! # nature-key
//!
//! The core of an interactive identification key: a tree of choices that leads end users from
//! a broad group ("Plants") to a result ("Common oak") by comparing the characteristics of the
//! candidates at each step.
//!
//! ## Overview
//!
//! An editor builds the tree. Every node can define **matrix filters** (a color, a size range,
//! a number of petals, a taxonomic group) and every child declares which part of each filter's
//! space it occupies. End users then pick values and the children are ranked or filtered by
//! how well they match.
//!
//! Identification never walks the source records. Each parent carries a denormalized
//! **children cache** listing its children with their spaces, and every mutation of the key
//! keeps those caches exactly equal to what a full rebuild would produce.
//!
//! ## Architecture
//!
//! - **[`paths`]**: fixed-width hierarchical node identifiers (NUIDs) and their prefix tests
//! - **[`filters`]**: the closed set of filter types with their space encodings
//! - **[`properties`]**: tree nodes, meta nodes, crosslinks and identifiers
//! - **[`cache`]**: children cache documents and their incremental maintenance
//! - **[`crosslink`]**: cycle detection for secondary parent/child edges
//! - **[`keybase`]**: the transactional store tying everything together
//! - **[`identify`]**: the identification matrix run against a children cache
//! - **[`resolve`]**: seams to taxonomic sources and image storage
//! - **[`event`]**: change notifications
//!
//! ## Quick Start
//!
//! ```rust
//! use nature_key::{
//!     config::KeyConfig,
//!     filters::{AssignedSpace, FilterType, FormValue, SpaceNumber},
//!     identify::{Selected, Selection},
//!     keybase::{KeyBase, NewFilter, NewNode},
//!     properties::NodeType,
//! };
//!
//! # fn main() -> Result<(), nature_key::KeyError> {
//! let mut key = KeyBase::new(KeyConfig::default(), "Garden flowers")?;
//! let root = key.root();
//! let root_meta = key.node(&root)?.meta_node;
//!
//! let petals = key.add_filter(&root_meta, NewFilter::new("Petals", FilterType::Number))?;
//! key.set_filter_space_from_form(&petals, &FormValue::Single("4,5,6".into()))?;
//!
//! let poppy = key.create_node(&root, NewNode::named("Poppy", NodeType::Result))?;
//! let four = SpaceNumber::new(4.0)?;
//! key.assign(&poppy, &petals, AssignedSpace::Numbers(vec![four]))?;
//!
//! let selection = Selection::from([(petals, Selected::Numbers(vec![four]))]);
//! let result = key.identify(&root, &selection)?;
//! assert_eq!(result.candidates[0].name, "Poppy");
//! assert_eq!(result.candidates[0].points, 50);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod crosslink;
pub mod error;
pub mod event;
pub mod filters;
pub mod identify;
pub mod keybase;
pub mod paths;
pub mod properties;
pub mod resolve;
#[cfg(test)]
mod tests;

pub use error::*;
