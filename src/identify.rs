//! The identification matrix: rank the children listed in a children cache against the
//! characteristics an end user selected.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    cache::{ChildEntry, ChildrenCacheDocument},
    error::KeyError,
    filters::{ColorValue, FilterType, SpaceNumber, SpaceValue, TaxonFilterEntry},
    properties::{FilterId, IdentificationMode, NodeId},
};

/// What an end user picked for one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selected {
    /// A measured value, matched against range filters.
    Value(SpaceNumber),
    Numbers(Vec<SpaceNumber>),
    Colors(Vec<ColorValue>),
    Texts(Vec<String>),
    Taxon(TaxonFilterEntry),
}

pub type Selection = BTreeMap<FilterId, Selected>;

impl Selected {
    fn fits(&self, filter_type: FilterType) -> bool {
        matches!(
            (self, filter_type),
            (Selected::Value(_), FilterType::Range)
                | (Selected::Numbers(_), FilterType::Number)
                | (Selected::Colors(_), FilterType::Color)
                | (
                    Selected::Texts(_),
                    FilterType::DescriptiveTextAndImages | FilterType::TextOnly
                )
                | (Selected::Taxon(_), FilterType::Taxon)
        )
    }

    /// The item occupies every selected value.
    fn matches(&self, item: &ChildEntry, space: Option<&SpaceValue>) -> bool {
        match (self, space) {
            (Selected::Value(value), Some(SpaceValue::Range(range))) => range.contains(*value),
            (Selected::Numbers(selected), Some(SpaceValue::Numbers(numbers))) => {
                selected.iter().all(|n| numbers.contains(n))
            }
            (Selected::Colors(selected), Some(SpaceValue::Colors(colors))) => {
                selected.iter().all(|c| colors.contains(c))
            }
            (Selected::Texts(selected), Some(SpaceValue::Texts(texts))) => {
                selected.iter().all(|t| texts.contains(t))
            }
            (Selected::Taxon(entry), _) => item
                .taxon
                .as_ref()
                .is_some_and(|taxon| entry.contains(taxon)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: NodeId,
    pub name: String,
    /// Summed weights of the selected filters this candidate matches.
    pub points: u32,
    pub max_points: u32,
    pub matched: Vec<FilterId>,
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationResult {
    pub mode: IdentificationMode,
    /// Fluid mode lists candidates by points, best first. Strict mode keeps sibling order.
    pub candidates: Vec<Candidate>,
    /// Per filter, every value still held by a visible candidate.
    pub possible_values: BTreeMap<FilterId, SpaceValue>,
}

impl IdentificationResult {
    pub fn visible(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.is_visible)
    }
}

/// Score every item of `doc`. `weights` holds the weight of each filter of the parent.
pub fn identify(
    doc: &ChildrenCacheDocument,
    weights: &BTreeMap<FilterId, u32>,
    mode: IdentificationMode,
    selection: &Selection,
) -> Result<IdentificationResult, KeyError> {
    for (filter, selected) in selection.iter() {
        let filter_type = doc
            .matrix_filter_types
            .get(filter)
            .ok_or(KeyError::DanglingFilterReference(*filter))?;
        if !selected.fits(*filter_type) {
            return Err(KeyError::invalid_space(
                filter_type,
                format!("{selected:?}"),
                "selection does not fit the filter",
            )
            .for_filter(*filter));
        }
    }

    let mut candidates: Vec<Candidate> = doc
        .items
        .iter()
        .map(|item| {
            let matched: Vec<FilterId> = selection
                .iter()
                .filter(|(filter, selected)| selected.matches(item, item.space.get(filter)))
                .map(|(filter, _)| *filter)
                .collect();
            let points = matched
                .iter()
                .map(|filter| weights.get(filter).copied().unwrap_or(0))
                .fold(0u32, u32::saturating_add);
            let is_visible = match mode {
                IdentificationMode::Fluid => true,
                IdentificationMode::Strict => matched.len() == selection.len(),
            };
            Candidate {
                id: item.id,
                name: item.name.clone(),
                points,
                max_points: item.max_points,
                matched,
                is_visible,
            }
        })
        .collect();
    if mode == IdentificationMode::Fluid {
        candidates.sort_by(|a, b| b.points.cmp(&a.points));
    }
    tracing::debug!(
        "[identify] {} of {} candidates visible for {} selections",
        candidates.iter().filter(|c| c.is_visible).count(),
        candidates.len(),
        selection.len()
    );

    let mut possible_values: BTreeMap<FilterId, SpaceValue> = BTreeMap::new();
    for candidate in candidates.iter().filter(|c| c.is_visible) {
        let Some(item) = doc.get(&candidate.id) else {
            continue;
        };
        for (filter, value) in item.space.iter() {
            match possible_values.get_mut(filter) {
                Some(merged) => merge(merged, value),
                None => {
                    possible_values.insert(*filter, value.clone());
                }
            }
        }
    }
    for value in possible_values.values_mut() {
        normalize(value);
    }

    Ok(IdentificationResult {
        mode,
        candidates,
        possible_values,
    })
}

/// Union of two values of the same filter. Ranges merge into their hull.
fn merge(into: &mut SpaceValue, other: &SpaceValue) {
    match (into, other) {
        (SpaceValue::Range(range), SpaceValue::Range(other)) => {
            let min = range.min().min(other.min());
            let max = range.max().max(other.max());
            if let Ok(hull) = crate::filters::RangeSpace::new(min, max) {
                *range = hull;
            }
        }
        (SpaceValue::Numbers(numbers), SpaceValue::Numbers(other)) => {
            numbers.extend(other.iter().copied())
        }
        (SpaceValue::Colors(colors), SpaceValue::Colors(other)) => {
            for color in other {
                if !colors.contains(color) {
                    colors.push(*color);
                }
            }
        }
        (SpaceValue::Texts(texts), SpaceValue::Texts(other)) => {
            for text in other {
                if !texts.contains(text) {
                    texts.push(text.clone());
                }
            }
        }
        (SpaceValue::Taxa(entries), SpaceValue::Taxa(other)) => {
            for entry in other {
                if !entries.iter().any(|e| e.latname == entry.latname) {
                    entries.push(entry.clone());
                }
            }
        }
        _ => {}
    }
}

fn normalize(value: &mut SpaceValue) {
    match value {
        SpaceValue::Numbers(numbers) => {
            numbers.sort();
            numbers.dedup();
        }
        SpaceValue::Texts(texts) => texts.sort(),
        SpaceValue::Taxa(entries) => entries.sort_by(|a, b| a.latname.cmp(&b.latname)),
        SpaceValue::Range(_) | SpaceValue::Colors(_) => {}
    }
}
