//! Shared test utilities for KeyBase testing

use crate::{
    config::KeyConfig,
    filters::{
        color::Rgba, AssignedSpace, ColorValue, EncodedSpace, FilterType, FormValue, RangeSpace,
        SpaceNumber,
    },
    keybase::{KeyBase, NewFilter, NewNode},
    properties::{FilterId, NodeId, NodeType, SpaceId, TaxonRef},
    resolve::StaticTaxonResolver,
};
use std::collections::BTreeSet;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn n(value: f64) -> SpaceNumber {
    SpaceNumber::new(value).unwrap()
}

pub fn range(min: f64, max: f64) -> RangeSpace {
    RangeSpace::new(n(min), n(max)).unwrap()
}

pub fn spaces(ids: &[SpaceId]) -> AssignedSpace {
    AssignedSpace::Spaces(ids.iter().copied().collect::<BTreeSet<_>>())
}

pub fn taxon(nuid: &str, latname: &str) -> TaxonRef {
    TaxonRef {
        taxon_source: "col".to_string(),
        taxon_latname: latname.to_string(),
        taxon_author: None,
        name_uuid: format!("uuid-{latname}"),
        taxon_nuid: nuid.to_string(),
    }
}

/// A tiny taxonomy with two predefined groups.
pub fn test_taxonomy() -> StaticTaxonResolver {
    [
        taxon("001", "Animalia"),
        taxon("001001", "Aves"),
        taxon("001002", "Insecta"),
        taxon("001001005", "Erithacus rubecula"),
        taxon("001002007", "Bombus terrestris"),
    ]
    .into_iter()
    .collect()
}

/// Handles into the key built by [create_test_key].
pub struct TestKey {
    pub key: KeyBase,
    pub root: NodeId,
    pub birds: NodeId,
    pub insects: NodeId,
    pub robin: NodeId,
    pub blackbird: NodeId,
    pub bumblebee: NodeId,
    /// TaxonFilter on the root
    pub group: FilterId,
    /// ColorFilter on birds
    pub plumage: FilterId,
    /// RangeFilter on birds
    pub wing_span: FilterId,
    /// NumberFilter on insects
    pub legs: FilterId,
    pub red: SpaceId,
    pub black: SpaceId,
    pub brown: SpaceId,
}

/// ```text
/// Garden visitors            group (taxon: Aves, Insecta)
/// ├── Birds                  plumage (color), wing span (range)
/// │   ├── Robin              red + brown, 20-22
/// │   └── Blackbird          black, 34-38
/// └── Insects                legs (number: 6, 8)
///     └── Bumblebee          6
/// ```
pub fn create_test_key() -> TestKey {
    init_logging();
    let mut key = KeyBase::new(KeyConfig::default(), "Garden visitors").unwrap();
    let root = key.root();
    let root_meta = key.node(&root).unwrap().meta_node;

    let birds = key
        .create_node(
            &root,
            NewNode::named("Birds", NodeType::Node).with_taxon(taxon("001001", "Aves")),
        )
        .unwrap();
    let insects = key
        .create_node(
            &root,
            NewNode::named("Insects", NodeType::Node).with_taxon(taxon("001002", "Insecta")),
        )
        .unwrap();
    let robin = key
        .create_node(
            &birds,
            NewNode::named("Robin", NodeType::Result)
                .with_taxon(taxon("001001005", "Erithacus rubecula"))
                .with_decision_rule("orange breast"),
        )
        .unwrap();
    let blackbird = key
        .create_node(&birds, NewNode::named("Blackbird", NodeType::Result))
        .unwrap();
    let bumblebee = key
        .create_node(
            &insects,
            NewNode::named("Bumblebee", NodeType::Result)
                .with_taxon(taxon("001002007", "Bombus terrestris")),
        )
        .unwrap();

    let group = key
        .add_filter(&root_meta, NewFilter::new("Group", FilterType::Taxon))
        .unwrap();
    let taxonomy = test_taxonomy();
    key.set_taxon_filter_space(
        &group,
        &["Aves".to_string(), "Insecta".to_string()],
        None,
        &["col".to_string()],
        &taxonomy,
    )
    .unwrap();

    let birds_meta = key.node(&birds).unwrap().meta_node;
    let plumage = key
        .add_filter(&birds_meta, NewFilter::new("Plumage", FilterType::Color).with_weight(40))
        .unwrap();
    let wing_span = key
        .add_filter(&birds_meta, NewFilter::new("Wing span", FilterType::Range).with_weight(20))
        .unwrap();
    key.set_filter_space(&wing_span, EncodedSpace::Range(range(10.0, 60.0)))
        .unwrap();
    let red = key
        .add_space(&plumage, EncodedSpace::Color(ColorValue::Single(Rgba::opaque(255, 0, 0))), None)
        .unwrap();
    let black = key
        .add_space(&plumage, EncodedSpace::Color(ColorValue::Single(Rgba::opaque(0, 0, 0))), None)
        .unwrap();
    let brown = key
        .add_space_from_form(&plumage, &FormValue::Single("#8b4513".into()), None)
        .unwrap();

    let insects_meta = key.node(&insects).unwrap().meta_node;
    let legs = key
        .add_filter(&insects_meta, NewFilter::new("Legs", FilterType::Number).with_weight(10))
        .unwrap();
    key.set_filter_space_from_form(&legs, &FormValue::Single("6,8".into()))
        .unwrap();

    key.assign(&robin, &plumage, spaces(&[red, brown])).unwrap();
    key.assign(&robin, &wing_span, AssignedSpace::Range(range(20.0, 22.0)))
        .unwrap();
    key.assign(&blackbird, &plumage, spaces(&[black])).unwrap();
    key.assign(&blackbird, &wing_span, AssignedSpace::Range(range(34.0, 38.0)))
        .unwrap();
    key.assign(&bumblebee, &legs, AssignedSpace::Numbers(vec![n(6.0)]))
        .unwrap();

    TestKey {
        key,
        root,
        birds,
        insects,
        robin,
        blackbird,
        bumblebee,
        group,
        plumage,
        wing_span,
        legs,
        red,
        black,
        brown,
    }
}

/// Fail with every violated invariant.
pub fn assert_consistent(key: &KeyBase) {
    let errors = key.built_in_test();
    assert!(
        errors.is_empty(),
        "key should be consistent:\n{}",
        errors.join("\n")
    );
}
