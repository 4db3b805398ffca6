//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use nature_key::{
    config::KeyConfig,
    filters::{AssignedSpace, FilterType, FormValue, SpaceNumber},
    keybase::{KeyBase, NewFilter, NewNode},
    properties::{FilterId, NodeId, NodeType, SpaceId},
};
use std::collections::BTreeSet;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn n(value: f64) -> SpaceNumber {
    SpaceNumber::new(value).unwrap()
}

#[allow(dead_code)]
pub fn spaces(ids: &[SpaceId]) -> AssignedSpace {
    AssignedSpace::Spaces(ids.iter().copied().collect::<BTreeSet<_>>())
}

/// Handles into the key built by [create_flower_key].
#[allow(dead_code)]
pub struct FlowerKey {
    pub key: KeyBase,
    pub root: NodeId,
    pub poppy: NodeId,
    pub bluebell: NodeId,
    pub daisy: NodeId,
    /// NumberFilter `[1, 3, 5.5, 10]`, weight 30
    pub petals: FilterId,
    /// ColorFilter, weight 50
    pub color: FilterId,
    /// DescriptiveTextAndImages, weight 20
    pub leaf: FilterId,
    pub blue: SpaceId,
    pub red: SpaceId,
    pub white_to_yellow: SpaceId,
    pub lobed: SpaceId,
    pub narrow: SpaceId,
}

/// ```text
/// Wild flowers        petals (1, 3, 5.5, 10), color, leaf shape
/// ├── Poppy           red, 3 + 5.5, lobed
/// ├── Bluebell        blue, 3, narrow
/// └── Daisy           white to yellow, 10
/// ```
#[allow(dead_code)]
pub fn create_flower_key() -> FlowerKey {
    init_logging();
    let mut key = KeyBase::new(KeyConfig::default(), "Wild flowers").unwrap();
    let root = key.root();
    let root_meta = key.node(&root).unwrap().meta_node;

    let petals = key
        .add_filter(&root_meta, NewFilter::new("Petals", FilterType::Number).with_weight(30))
        .unwrap();
    key.set_filter_space_from_form(&petals, &FormValue::Single("1,3,5.5,10".into()))
        .unwrap();
    let color = key
        .add_filter(&root_meta, NewFilter::new("Flower color", FilterType::Color))
        .unwrap();
    let blue = key
        .add_space_from_form(&color, &FormValue::Single("#6f6fff".into()), None)
        .unwrap();
    let red = key
        .add_space_from_form(&color, &FormValue::Single("255,0,0".into()), None)
        .unwrap();
    let white_to_yellow = key
        .add_space_from_form(
            &color,
            &FormValue::Multiple(vec!["#ffffff".into(), "#ffff00".into()]),
            None,
        )
        .unwrap();
    let leaf = key
        .add_filter(
            &root_meta,
            NewFilter::new("Leaf shape", FilterType::DescriptiveTextAndImages).with_weight(20),
        )
        .unwrap();
    let lobed = key
        .add_space_from_form(&leaf, &FormValue::Single("Lobed".into()), None)
        .unwrap();
    let narrow = key
        .add_space_from_form(&leaf, &FormValue::Single("Narrow".into()), None)
        .unwrap();

    let poppy = key
        .create_node(&root, NewNode::named("Poppy", NodeType::Result))
        .unwrap();
    let bluebell = key
        .create_node(&root, NewNode::named("Bluebell", NodeType::Result))
        .unwrap();
    let daisy = key
        .create_node(&root, NewNode::named("Daisy", NodeType::Result))
        .unwrap();

    key.assign(&poppy, &color, spaces(&[red])).unwrap();
    key.assign(&poppy, &petals, AssignedSpace::Numbers(vec![n(3.0), n(5.5)]))
        .unwrap();
    key.assign(&poppy, &leaf, spaces(&[lobed])).unwrap();
    key.assign(&bluebell, &color, spaces(&[blue])).unwrap();
    key.assign(&bluebell, &petals, AssignedSpace::Numbers(vec![n(3.0)]))
        .unwrap();
    key.assign(&bluebell, &leaf, spaces(&[narrow])).unwrap();
    key.assign(&daisy, &color, spaces(&[white_to_yellow])).unwrap();
    key.assign(&daisy, &petals, AssignedSpace::Numbers(vec![n(10.0)]))
        .unwrap();

    FlowerKey {
        key,
        root,
        poppy,
        bluebell,
        daisy,
        petals,
        color,
        leaf,
        blue,
        red,
        white_to_yellow,
        lobed,
        narrow,
    }
}

/// Fail with every violated invariant.
#[allow(dead_code)]
pub fn assert_consistent(key: &KeyBase) {
    let errors = key.built_in_test();
    assert!(
        errors.is_empty(),
        "key should be consistent:\n{}",
        errors.join("\n")
    );
}
