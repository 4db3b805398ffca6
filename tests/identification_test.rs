//! Walking a key the way an end user does: select values, read the ranked candidates.

mod common;

use common::*;
use nature_key::{
    filters::{ColorValue, Rgba, SpaceValue},
    identify::{Selected, Selection},
    keybase::NodeUpdate,
    properties::{FilterId, IdentificationMode, NodeSettings},
    KeyError,
};
use test_log::test;

fn names(result: &nature_key::identify::IdentificationResult) -> Vec<&str> {
    result.visible().map(|c| c.name.as_str()).collect()
}

#[test]
fn test_fluid_mode_ranks_every_candidate() {
    let flowers = create_flower_key();
    let selection: Selection = [(
        flowers.color,
        Selected::Colors(vec![ColorValue::Single(Rgba::opaque(255, 0, 0))]),
    )]
    .into_iter()
    .collect();
    let result = flowers.key.identify(&flowers.root, &selection).unwrap();

    assert_eq!(result.mode, IdentificationMode::Fluid);
    assert_eq!(names(&result), vec!["Poppy", "Bluebell", "Daisy"]);
    assert_eq!(result.candidates[0].points, 50);
    assert_eq!(result.candidates[0].max_points, 100);
    assert_eq!(result.candidates[0].matched, vec![flowers.color]);
    assert!(result.candidates[1..].iter().all(|c| c.points == 0));
}

#[test]
fn test_fluid_mode_keeps_sibling_order_on_ties() {
    let flowers = create_flower_key();
    let selection: Selection = [(flowers.petals, Selected::Numbers(vec![n(3.0)]))]
        .into_iter()
        .collect();
    let result = flowers.key.identify(&flowers.root, &selection).unwrap();
    let points: Vec<(&str, u32)> = result
        .candidates
        .iter()
        .map(|c| (c.name.as_str(), c.points))
        .collect();
    assert_eq!(points, vec![("Poppy", 30), ("Bluebell", 30), ("Daisy", 0)]);
}

#[test]
fn test_strict_mode_hides_contradicting_candidates() {
    let mut flowers = create_flower_key();
    flowers
        .key
        .update_node(
            &flowers.root,
            NodeUpdate {
                settings: Some(NodeSettings {
                    identification_mode: IdentificationMode::Strict,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();

    let mut selection = Selection::new();
    selection.insert(flowers.petals, Selected::Numbers(vec![n(3.0)]));
    let result = flowers.key.identify(&flowers.root, &selection).unwrap();
    assert_eq!(names(&result), vec!["Poppy", "Bluebell"]);
    // possible values merge what the visible candidates still hold
    assert_eq!(
        result.possible_values.get(&flowers.petals),
        Some(&SpaceValue::Numbers(vec![n(3.0), n(5.5)]))
    );
    assert_eq!(
        result.possible_values.get(&flowers.leaf),
        Some(&SpaceValue::Texts(vec!["Lobed".to_string(), "Narrow".to_string()]))
    );

    selection.insert(flowers.leaf, Selected::Texts(vec!["Narrow".to_string()]));
    let result = flowers.key.identify(&flowers.root, &selection).unwrap();
    assert_eq!(names(&result), vec!["Bluebell"]);
    assert_eq!(result.candidates.len(), 3);
    assert_eq!(
        result.possible_values.get(&flowers.color),
        Some(&SpaceValue::Colors(vec![ColorValue::Single(
            Rgba::from_hex("#6f6fff").unwrap()
        )]))
    );
}

#[test]
fn test_gradients_are_selected_as_a_whole() {
    let flowers = create_flower_key();
    let gradient = ColorValue::Gradient(Rgba::opaque(255, 255, 255), Rgba::opaque(255, 255, 0));
    let selection: Selection = [(flowers.color, Selected::Colors(vec![gradient]))]
        .into_iter()
        .collect();
    let result = flowers.key.identify(&flowers.root, &selection).unwrap();
    assert_eq!(result.candidates[0].name, "Daisy");
    assert_eq!(result.candidates[0].points, 50);
}

#[test]
fn test_selections_must_fit_the_parent_filters() {
    let flowers = create_flower_key();

    let shape = [(flowers.petals, Selected::Value(n(3.0)))]
        .into_iter()
        .collect::<Selection>();
    assert!(matches!(
        flowers.key.identify(&flowers.root, &shape),
        Err(KeyError::InvalidEncodedSpace { .. })
    ));

    // a filter the root does not define
    let foreign = FilterId::new();
    let dangling = [(foreign, Selected::Value(n(1.0)))]
        .into_iter()
        .collect::<Selection>();
    assert_eq!(
        flowers.key.identify(&flowers.root, &dangling),
        Err(KeyError::DanglingFilterReference(foreign))
    );
}

#[test]
fn test_empty_selection_matches_everyone() {
    let flowers = create_flower_key();
    let result = flowers
        .key
        .identify(&flowers.root, &Selection::new())
        .unwrap();
    assert_eq!(names(&result), vec!["Poppy", "Bluebell", "Daisy"]);
    assert!(result.candidates.iter().all(|c| c.matched.is_empty()));
}
