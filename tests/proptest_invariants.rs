//! Property-based invariant tests for paths, crosslinks and children caches.
//!
//! 1. Crosslink loop detection agrees with a cycle check on the full directed graph.
//! 2. Path ancestry is creation ancestry.
//! 3. Caches kept up incrementally equal caches rebuilt from scratch.
//! 4. Form values that encode also validate and display.

mod common;

use common::*;
use nature_key::{
    config::KeyConfig,
    crosslink::CrosslinkManager,
    filters::{AssignedSpace, EncodedSpace, FilterType, FormValue},
    keybase::{FilterUpdate, KeyBase, NewNode, NodeUpdate},
    paths::{is_ancestor, Nuid, NuidCodec},
    properties::{NodeId, NodeSettings, NodeType},
};
use petgraph::{algo::is_cyclic_directed, graph::DiGraph};
use proptest::{prelude::*, sample::Index};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Node `i + 1` hangs below one of the nodes `0..=i`. Returns each node's parent and path.
fn random_tree(codec: &NuidCodec, parents: &[Index]) -> Vec<(Option<usize>, Nuid)> {
    let mut nodes = vec![(None, codec.root_path().unwrap())];
    let mut issued = vec![0u64];
    for (i, choice) in parents.iter().enumerate() {
        let parent = choice.index(i + 1);
        let path = codec
            .next_child_path(&nodes[parent].1, issued[parent])
            .unwrap();
        issued[parent] += 1;
        issued.push(0);
        nodes.push((Some(parent), path));
    }
    nodes
}

fn true_ancestor(parents: &[Option<usize>], ancestor: usize, mut node: usize) -> bool {
    while let Some(parent) = parents[node] {
        if parent == ancestor {
            return true;
        }
        node = parent;
    }
    false
}

fn pick<T: Copy>(items: &[T], mask: u8) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, item)| *item)
        .collect()
}

#[derive(Debug, Clone)]
enum Op {
    Petals(usize, u8),
    Colors(usize, u8),
    Leaves(usize, u8),
    Weight(usize, u32),
    PetalSpace(u8),
    AddColor(u8, u8, u8),
    DeleteSpace(usize),
    Active(usize, bool),
    Rename(usize, u8),
    Link(usize),
    Unlink(usize),
    Reverse,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, any::<u8>()).prop_map(|(node, mask)| Op::Petals(node, mask)),
        (0..3usize, any::<u8>()).prop_map(|(node, mask)| Op::Colors(node, mask)),
        (0..3usize, any::<u8>()).prop_map(|(node, mask)| Op::Leaves(node, mask)),
        (0..3usize, 0u32..=100).prop_map(|(filter, weight)| Op::Weight(filter, weight)),
        any::<u8>().prop_map(Op::PetalSpace),
        (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Op::AddColor(r, g, b)),
        (0..5usize).prop_map(Op::DeleteSpace),
        (0..4usize, any::<bool>()).prop_map(|(node, active)| Op::Active(node, active)),
        (0..3usize, 0u8..4).prop_map(|(node, name)| Op::Rename(node, name)),
        (0..3usize).prop_map(Op::Link),
        (0..3usize).prop_map(Op::Unlink),
        Just(Op::Reverse),
    ]
}

/// Apply `op`, reporting whether the key accepted it.
fn apply(flowers: &mut FlowerKey, meadow: NodeId, op: &Op) -> bool {
    let nodes = [flowers.poppy, flowers.bluebell, flowers.daisy, meadow];
    let filters = [flowers.petals, flowers.color, flowers.leaf];
    let spaces = [
        flowers.blue,
        flowers.red,
        flowers.white_to_yellow,
        flowers.lobed,
        flowers.narrow,
    ];
    let petal_values = [n(1.0), n(3.0), n(5.5), n(10.0)];
    let key = &mut flowers.key;
    match op {
        Op::Petals(node, mask) => key
            .assign(
                &nodes[*node],
                &flowers.petals,
                AssignedSpace::Numbers(pick(&petal_values, *mask)),
            )
            .is_ok(),
        Op::Colors(node, mask) => key
            .assign(&nodes[*node], &flowers.color, spaces_of(&spaces[..3], *mask))
            .is_ok(),
        Op::Leaves(node, mask) => key
            .assign(&nodes[*node], &flowers.leaf, spaces_of(&spaces[3..], *mask))
            .is_ok(),
        Op::Weight(filter, weight) => key
            .update_filter(
                &filters[*filter],
                FilterUpdate {
                    weight: Some(*weight),
                    ..Default::default()
                },
            )
            .is_ok(),
        Op::PetalSpace(mask) => key
            .set_filter_space(
                &flowers.petals,
                EncodedSpace::Numbers(pick(&petal_values, *mask)),
            )
            .is_ok(),
        Op::AddColor(r, g, b) => key
            .add_space_from_form(
                &flowers.color,
                &FormValue::Single(format!("{r},{g},{b}")),
                None,
            )
            .is_ok(),
        Op::DeleteSpace(space) => key.delete_space(&spaces[*space]).is_ok(),
        Op::Active(node, active) => key
            .update_node(
                &nodes[*node],
                NodeUpdate {
                    settings: Some(NodeSettings {
                        is_active: *active,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .is_ok(),
        Op::Rename(node, name) => key
            .update_node(
                &nodes[*node],
                NodeUpdate {
                    name: Some(format!("Flower {name}")),
                    ..Default::default()
                },
            )
            .is_ok(),
        Op::Link(node) => key.add_crosslink(&meadow, &nodes[*node], None).is_ok(),
        Op::Unlink(node) => key.remove_crosslink(&meadow, &nodes[*node]).is_ok(),
        Op::Reverse => {
            let mut order = key.children(&flowers.root);
            order.reverse();
            key.reorder_children(&flowers.root, &order).is_ok()
        }
    }
}

fn spaces_of(ids: &[nature_key::properties::SpaceId], mask: u8) -> AssignedSpace {
    spaces(&pick(ids, mask))
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Crosslink loops match graph cycles
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn crosslink_cycles_match_graph_cycles(
        parents in prop::collection::vec(any::<Index>(), 1..24),
        links in prop::collection::vec((any::<Index>(), any::<Index>()), 0..6),
    ) {
        let codec = NuidCodec::default();
        let tree = random_tree(&codec, &parents);
        let count = tree.len();

        let mut graph = DiGraph::<(), ()>::new();
        let vertices: Vec<_> = (0..count).map(|_| graph.add_node(())).collect();
        for (child, (parent, _)) in tree.iter().enumerate() {
            if let Some(parent) = parent {
                graph.add_edge(vertices[*parent], vertices[child], ());
            }
        }
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(links.len());
        for (parent, child) in links.iter() {
            let (parent, child) = (parent.index(count), child.index(count));
            graph.add_edge(vertices[parent], vertices[child], ());
            pairs.push((tree[parent].1.as_str(), tree[child].1.as_str()));
        }

        prop_assert_eq!(
            CrosslinkManager::check_circularity(&pairs),
            is_cyclic_directed(&graph),
            "crosslinks {:?}",
            pairs
        );
        if let Some(cycle) = CrosslinkManager::find_cycle(&pairs) {
            prop_assert!(!cycle.is_empty());
            prop_assert!(cycle.iter().all(|i| *i < pairs.len()));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Path ancestry is creation ancestry
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ancestry_follows_creation(parents in prop::collection::vec(any::<Index>(), 1..20)) {
        let mut key = KeyBase::new(KeyConfig::default(), "Root").unwrap();
        let mut ids = vec![key.root()];
        let mut parent_of = vec![None];
        for (i, choice) in parents.iter().enumerate() {
            let parent = choice.index(i + 1);
            let id = key
                .create_node(&ids[parent], NewNode::named(&format!("Node {i}"), NodeType::Node))
                .unwrap();
            ids.push(id);
            parent_of.push(Some(parent));
        }

        for a in 0..ids.len() {
            let a_path = key.node(&ids[a]).unwrap().nuid.as_str();
            for b in 0..ids.len() {
                let b_path = key.node(&ids[b]).unwrap().nuid.as_str();
                prop_assert_eq!(
                    is_ancestor(a_path, b_path),
                    true_ancestor(&parent_of, a, b),
                    "{} vs {}",
                    a_path,
                    b_path
                );
            }
        }
        prop_assert!(key.built_in_test().is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Incremental caches equal rebuilt caches
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn caches_match_rebuild(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let mut flowers = create_flower_key();
        let meadow = flowers
            .key
            .create_node(&flowers.root, NewNode::named("Meadow", NodeType::Node))
            .unwrap();
        for op in ops.iter() {
            let applied = apply(&mut flowers, meadow, op);
            tracing::debug!("{op:?} applied: {applied}");
        }
        let stale = flowers.key.verify_caches().unwrap();
        prop_assert!(stale.is_empty(), "stale caches after {:?}", ops);
        let errors = flowers.key.built_in_test();
        prop_assert!(errors.is_empty(), "{}", errors.join("\n"));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Encoded form values validate and display
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn form_values_encode_to_fitting_spaces(
        min in -1000i32..1000,
        span in 0i32..1000,
        rgb in (any::<u8>(), any::<u8>(), any::<u8>()),
        numbers in prop::collection::vec(-50i32..50, 0..6),
        text in "[a-zA-Z ]{0,12}",
    ) {
        let range = FormValue::Multiple(vec![min.to_string(), (min + span).to_string()]);
        let encoded = FilterType::Range.encode_from_form_value(&range).unwrap();
        prop_assert!(encoded.fits(FilterType::Range));
        prop_assert!(FilterType::Range.validate_encoded_space(&encoded.to_json()));
        prop_assert!(!FilterType::Range.decode_to_display(&encoded).is_empty());

        let color = FormValue::Single(format!("#{:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2));
        let encoded = FilterType::Color.encode_from_form_value(&color).unwrap();
        prop_assert!(FilterType::Color.validate_encoded_space(&encoded.to_json()));
        prop_assert_eq!(
            FilterType::Color.decode_to_display(&encoded),
            format!("rgba({},{},{},1)", rgb.0, rgb.1, rgb.2)
        );

        let listed: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
        let encoded = FilterType::Number
            .encode_from_form_value(&FormValue::Single(listed.join(",")))
            .unwrap();
        prop_assert!(FilterType::Number.validate_encoded_space(&encoded.to_json()));

        match FilterType::TextOnly.encode_from_form_value(&FormValue::Single(text.clone())) {
            Ok(encoded) => prop_assert_eq!(encoded, EncodedSpace::Text(text.trim().to_string())),
            Err(_) => prop_assert!(text.trim().is_empty()),
        }
    }
}
