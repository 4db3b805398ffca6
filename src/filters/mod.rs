//! Matrix filters and their spaces.
//!
//! A parent node defines [TraitFilter]s describing how its children differ (a color, a size
//! range, a taxonomic group). The closed [FilterType] enum carries everything that varies per
//! kind of filter:
//!
//! | type                         | space lives on               | child carries            |
//! |------------------------------|------------------------------|--------------------------|
//! | `RangeFilter`                | filter (`[min, max]`)        | own `[min, max]`         |
//! | `NumberFilter`               | filter (ascending numbers)   | subset of the numbers    |
//! | `ColorFilter`                | one [TraitSpace] per color   | set of space ids         |
//! | `DescriptiveTextAndImagesFilter` | one [TraitSpace] per text | set of space ids        |
//! | `TextOnlyFilter`             | one [TraitSpace] per text    | set of space ids         |
//! | `TaxonFilter`                | filter (taxon entries)       | derived from its taxon   |
//!
//! Unknown filter type strings are rejected when parsed ([KeyError::UnsupportedFilterType]).
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::{
    error::KeyError,
    properties::{FilterId, ImageRef, MetaNodeId, NodeId, SpaceId},
};

pub mod color;
pub mod numeric;
pub mod space;
pub mod taxon;
pub mod text;

pub use color::{ColorValue, Rgba};
pub use space::{EncodedSpace, RangeSpace, SpaceNumber, SpaceValue};
pub use taxon::TaxonFilterEntry;

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum FilterType {
    #[serde(rename = "RangeFilter")]
    Range,
    #[serde(rename = "NumberFilter")]
    Number,
    #[serde(rename = "ColorFilter")]
    Color,
    #[serde(rename = "DescriptiveTextAndImagesFilter")]
    DescriptiveTextAndImages,
    #[serde(rename = "TextOnlyFilter")]
    TextOnly,
    #[serde(rename = "TaxonFilter")]
    Taxon,
}

pub type FilterTypeSet = EnumSet<FilterType>;

/// Filter types whose values are individual [TraitSpace] records.
pub fn multispace_types() -> FilterTypeSet {
    FilterType::Color | FilterType::DescriptiveTextAndImages | FilterType::TextOnly
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Range => "RangeFilter",
            FilterType::Number => "NumberFilter",
            FilterType::Color => "ColorFilter",
            FilterType::DescriptiveTextAndImages => "DescriptiveTextAndImagesFilter",
            FilterType::TextOnly => "TextOnlyFilter",
            FilterType::Taxon => "TaxonFilter",
        }
    }

    pub fn is_multispace(&self) -> bool {
        multispace_types().contains(*self)
    }

    pub fn default_definition(&self) -> FilterDefinition {
        match self {
            FilterType::Range => FilterDefinition {
                step: Some(SpaceNumber::ONE),
                unit: Some(String::new()),
                unit_verbose: Some(String::new()),
                ..Default::default()
            },
            FilterType::Number => FilterDefinition {
                unit: Some(String::new()),
                unit_verbose: Some(String::new()),
                ..Default::default()
            },
            FilterType::Color
            | FilterType::DescriptiveTextAndImages
            | FilterType::TextOnly
            | FilterType::Taxon => FilterDefinition::default(),
        }
    }

    /// Space a freshly created filter starts with. Multi-space filters have no filter level
    /// space; they start without any [TraitSpace].
    pub fn empty_encoded_space(&self) -> Option<EncodedSpace> {
        match self {
            FilterType::Range => Some(EncodedSpace::Range(RangeSpace::empty())),
            FilterType::Number => Some(EncodedSpace::Numbers(Vec::new())),
            FilterType::Taxon => Some(EncodedSpace::Taxa(Vec::new())),
            FilterType::Color | FilterType::DescriptiveTextAndImages | FilterType::TextOnly => {
                None
            }
        }
    }

    pub fn validate_encoded_space(&self, value: &Value) -> bool {
        EncodedSpace::from_json(*self, value).is_ok()
    }

    pub fn encode_from_form_value(&self, raw: &FormValue) -> Result<EncodedSpace, KeyError> {
        match self {
            FilterType::Range => numeric::range_from_form_value(raw).map(EncodedSpace::Range),
            FilterType::Number => numeric::numbers_from_form_value(raw).map(EncodedSpace::Numbers),
            FilterType::Color => ColorValue::from_form_value(raw).map(EncodedSpace::Color),
            FilterType::DescriptiveTextAndImages | FilterType::TextOnly => {
                text::text_from_form_value(*self, raw).map(EncodedSpace::Text)
            }
            FilterType::Taxon => {
                let json = match raw {
                    FormValue::Single(json) => json.as_str(),
                    FormValue::Multiple(_) => {
                        return Err(KeyError::invalid_space(
                            self,
                            raw,
                            "expected a JSON list of taxon filter entries",
                        ))
                    }
                };
                let value: Value = serde_json::from_str(json)
                    .map_err(|e| KeyError::invalid_space(self, raw, e.to_string()))?;
                EncodedSpace::from_json(*self, &value)
            }
        }
    }

    /// Text shown to end users for a space. Colors render as CSS, texts as themselves, everything
    /// else as compact JSON.
    pub fn decode_to_display(&self, space: &EncodedSpace) -> String {
        match (self, space) {
            (FilterType::Color, EncodedSpace::Color(color)) => color.to_string(),
            (
                FilterType::DescriptiveTextAndImages | FilterType::TextOnly,
                EncodedSpace::Text(text),
            ) => text.clone(),
            _ => space.to_string(),
        }
    }

    /// Normalize and check a node's assignment against the filter and the ids of the filter's
    /// trait spaces.
    pub fn validate_assignment(
        &self,
        filter: &TraitFilter,
        assigned: AssignedSpace,
        filter_spaces: &BTreeSet<SpaceId>,
    ) -> Result<AssignedSpace, KeyError> {
        let invalid = |value: &AssignedSpace, reason: &str| {
            KeyError::invalid_space(self, value, reason).for_filter(filter.id)
        };
        match (self, assigned) {
            (FilterType::Range, AssignedSpace::Range(range)) => Ok(AssignedSpace::Range(range)),
            (FilterType::Number, AssignedSpace::Numbers(mut numbers)) => {
                numbers.sort();
                numbers.dedup();
                let undefined = numbers
                    .iter()
                    .copied()
                    .find(|n| !filter.numbers().contains(n));
                match undefined {
                    Some(n) => Err(invalid(
                        &AssignedSpace::Numbers(numbers),
                        &format!("{n} is not one of the filter's numbers"),
                    )),
                    None => Ok(AssignedSpace::Numbers(numbers)),
                }
            }
            (
                FilterType::Color | FilterType::DescriptiveTextAndImages | FilterType::TextOnly,
                AssignedSpace::Spaces(ids),
            ) => {
                if ids.iter().any(|id| !filter_spaces.contains(id)) {
                    return Err(invalid(
                        &AssignedSpace::Spaces(ids),
                        "space does not belong to the filter",
                    ));
                }
                Ok(AssignedSpace::Spaces(ids))
            }
            (FilterType::Taxon, assigned) => Err(invalid(
                &assigned,
                "taxon filters derive the space from the node's taxon",
            )),
            (_, assigned) => Err(invalid(&assigned, "assignment shape does not fit the filter")),
        }
    }

    /// The value a child carries in a children cache for an assignment. Space ids are looked up
    /// through `lookup`.
    pub fn node_space_as_list<'a, F>(
        &self,
        assigned: &AssignedSpace,
        lookup: F,
    ) -> Result<SpaceValue, KeyError>
    where
        F: Fn(&SpaceId) -> Option<&'a EncodedSpace>,
    {
        match (self, assigned) {
            (FilterType::Range, AssignedSpace::Range(range)) => Ok(SpaceValue::Range(*range)),
            (FilterType::Number, AssignedSpace::Numbers(numbers)) => {
                Ok(SpaceValue::Numbers(numbers.clone()))
            }
            (FilterType::Color, AssignedSpace::Spaces(ids)) => {
                let mut colors = Vec::with_capacity(ids.len());
                for id in ids {
                    match lookup(id) {
                        Some(EncodedSpace::Color(color)) => colors.push(*color),
                        _ => return Err(KeyError::NotFound(format!("color space {id}"))),
                    }
                }
                Ok(SpaceValue::Colors(colors))
            }
            (FilterType::DescriptiveTextAndImages | FilterType::TextOnly, AssignedSpace::Spaces(ids)) => {
                let mut texts = Vec::with_capacity(ids.len());
                for id in ids {
                    match lookup(id) {
                        Some(EncodedSpace::Text(text)) => texts.push(text.clone()),
                        _ => return Err(KeyError::NotFound(format!("text space {id}"))),
                    }
                }
                Ok(SpaceValue::Texts(texts))
            }
            (filter_type, assigned) => Err(KeyError::invalid_space(
                filter_type,
                assigned,
                "assignment shape does not fit the filter",
            )),
        }
    }
}

impl Display for FilterType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RangeFilter" => Ok(FilterType::Range),
            "NumberFilter" => Ok(FilterType::Number),
            "ColorFilter" => Ok(FilterType::Color),
            "DescriptiveTextAndImagesFilter" => Ok(FilterType::DescriptiveTextAndImages),
            "TextOnlyFilter" => Ok(FilterType::TextOnly),
            "TaxonFilter" => Ok(FilterType::Taxon),
            other => Err(KeyError::UnsupportedFilterType(other.to_string())),
        }
    }
}

/// Raw input from an editing form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FormValue {
    /// Non-empty items, splitting a single value on commas.
    pub fn split_items(&self) -> Vec<&str> {
        match self {
            FormValue::Single(value) => value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect(),
            FormValue::Multiple(values) => values
                .iter()
                .map(|value| value.trim())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }
}

impl Display for FormValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormValue::Single(value) => write!(f, "{value:?}"),
            FormValue::Multiple(values) => write!(f, "{values:?}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// End users may select more than one value at once.
    #[serde(default)]
    pub allow_multiple_values: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_verbose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<SpaceNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTraitFilter")]
pub struct TraitFilter {
    pub id: FilterId,
    /// The parent whose children this filter tells apart.
    pub meta_node: MetaNodeId,
    pub filter_type: FilterType,
    pub name: String,
    pub description: Option<String>,
    pub weight: u32,
    pub definition: FilterDefinition,
    /// Filter level space of Range, Number and Taxon filters. Always `None` for multi-space
    /// types.
    pub encoded_space: Option<EncodedSpace>,
}

#[derive(Deserialize)]
struct RawTraitFilter {
    id: FilterId,
    meta_node: MetaNodeId,
    filter_type: FilterType,
    name: String,
    #[serde(default)]
    description: Option<String>,
    weight: u32,
    #[serde(default)]
    definition: FilterDefinition,
    #[serde(default)]
    encoded_space: Option<Value>,
}

impl TryFrom<RawTraitFilter> for TraitFilter {
    type Error = KeyError;

    fn try_from(raw: RawTraitFilter) -> Result<Self, Self::Error> {
        let encoded_space = match (raw.filter_type.is_multispace(), raw.encoded_space) {
            (true, None) | (true, Some(Value::Null)) => None,
            (true, Some(value)) => {
                return Err(KeyError::invalid_space(
                    raw.filter_type,
                    value,
                    "multi-space filters keep their values in trait spaces",
                )
                .for_filter(raw.id))
            }
            (false, None) | (false, Some(Value::Null)) => raw.filter_type.empty_encoded_space(),
            (false, Some(value)) => Some(
                EncodedSpace::from_json(raw.filter_type, &value).map_err(|e| e.for_filter(raw.id))?,
            ),
        };
        Ok(TraitFilter {
            id: raw.id,
            meta_node: raw.meta_node,
            filter_type: raw.filter_type,
            name: raw.name,
            description: raw.description,
            weight: raw.weight,
            definition: raw.definition,
            encoded_space,
        })
    }
}

impl TraitFilter {
    pub fn new(meta_node: MetaNodeId, filter_type: FilterType, name: &str, weight: u32) -> Self {
        TraitFilter {
            id: FilterId::new(),
            meta_node,
            filter_type,
            name: name.to_string(),
            description: None,
            weight,
            definition: filter_type.default_definition(),
            encoded_space: filter_type.empty_encoded_space(),
        }
    }

    pub fn numbers(&self) -> &[SpaceNumber] {
        match &self.encoded_space {
            Some(EncodedSpace::Numbers(numbers)) => numbers,
            _ => &[],
        }
    }

    pub fn taxon_entries(&self) -> &[TaxonFilterEntry] {
        match &self.encoded_space {
            Some(EncodedSpace::Taxa(entries)) => entries,
            _ => &[],
        }
    }

    /// Choices offered by a number filter, printed without trailing zeros.
    pub fn number_choices(&self) -> Vec<String> {
        self.numbers().iter().map(|n| n.to_string()).collect()
    }
}

/// One predefined value of a Color, DescriptiveTextAndImages or TextOnly filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTraitSpace")]
pub struct TraitSpace {
    pub id: SpaceId,
    pub filter: FilterId,
    pub encoded_space: EncodedSpace,
    /// Only DescriptiveTextAndImages spaces carry an image.
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Deserialize)]
struct RawTraitSpace {
    id: SpaceId,
    filter: FilterId,
    encoded_space: Value,
    #[serde(default)]
    image: Option<ImageRef>,
}

impl TryFrom<RawTraitSpace> for TraitSpace {
    type Error = KeyError;

    fn try_from(raw: RawTraitSpace) -> Result<Self, Self::Error> {
        Ok(TraitSpace {
            id: raw.id,
            filter: raw.filter,
            encoded_space: EncodedSpace::from_multispace_json(&raw.encoded_space)
                .map_err(|e| e.for_filter(raw.filter))?,
            image: raw.image,
        })
    }
}

/// What a node declares for one filter of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssignedSpace {
    Range(RangeSpace),
    Numbers(Vec<SpaceNumber>),
    Spaces(BTreeSet<SpaceId>),
}

impl Display for AssignedSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignedSpace::Range(range) => write!(f, "{range}"),
            AssignedSpace::Numbers(numbers) => {
                let printed: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
                write!(f, "[{}]", printed.join(","))
            }
            AssignedSpace::Spaces(ids) => {
                let printed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", printed.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTraitAssignment {
    pub node: NodeId,
    pub filter: FilterId,
    pub space: AssignedSpace,
}
