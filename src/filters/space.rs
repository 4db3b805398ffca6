//! Typed representations of filter spaces.
//!
//! [EncodedSpace] is what a filter (or one of its [crate::filters::TraitSpace]s) stores.
//! [SpaceValue] is what a child carries for one filter inside a children cache. Both serialize
//! to the bare JSON value (no type tag): the surrounding record always knows the filter type, so
//! decoding goes through [EncodedSpace::from_json] / [SpaceValue::from_json] instead of a
//! derived `Deserialize`.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::{
    error::KeyError,
    filters::{color::ColorValue, taxon::TaxonFilterEntry, FilterType},
};

/// A finite decimal that prints without trailing zeros (`1200.0000` prints as `1200`) and
/// serializes integral values as JSON integers.
#[derive(Debug, Clone, Copy)]
pub struct SpaceNumber(f64);

impl SpaceNumber {
    pub const ZERO: SpaceNumber = SpaceNumber(0.0);
    pub const ONE: SpaceNumber = SpaceNumber(1.0);

    pub fn new(value: f64) -> Result<SpaceNumber, KeyError> {
        if !value.is_finite() {
            return Err(KeyError::Serialization(format!(
                "{value} is not a finite number"
            )));
        }
        // fold -0.0 into 0.0 so equality and ordering agree
        Ok(SpaceNumber(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    fn as_integer(&self) -> Option<i64> {
        if self.0.fract() == 0.0 && self.0.abs() < 9.0e15 {
            Some(self.0 as i64)
        } else {
            None
        }
    }
}

impl PartialEq for SpaceNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SpaceNumber {}

impl PartialOrd for SpaceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SpaceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for SpaceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.as_integer() {
            Some(integer) => write!(f, "{integer}"),
            // f64's Display is the shortest representation that round-trips, never zero padded
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for SpaceNumber {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = trimmed
            .parse::<f64>()
            .map_err(|e| KeyError::Serialization(format!("'{trimmed}' is not a number: {e}")))?;
        SpaceNumber::new(value)
    }
}

impl TryFrom<f64> for SpaceNumber {
    type Error = KeyError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        SpaceNumber::new(value)
    }
}

impl Serialize for SpaceNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(integer) => serializer.serialize_i64(integer),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for SpaceNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        SpaceNumber::new(value).map_err(serde::de::Error::custom)
    }
}

/// Inclusive numeric interval, serialized as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[SpaceNumber; 2]", into = "[SpaceNumber; 2]")]
pub struct RangeSpace {
    min: SpaceNumber,
    max: SpaceNumber,
}

impl RangeSpace {
    pub fn new(min: SpaceNumber, max: SpaceNumber) -> Result<RangeSpace, KeyError> {
        if min > max {
            return Err(KeyError::invalid_space(
                FilterType::Range,
                format!("[{min},{max}]"),
                "min is larger than max",
            ));
        }
        Ok(RangeSpace { min, max })
    }

    pub fn empty() -> RangeSpace {
        RangeSpace {
            min: SpaceNumber::ZERO,
            max: SpaceNumber::ZERO,
        }
    }

    pub fn min(&self) -> SpaceNumber {
        self.min
    }

    pub fn max(&self) -> SpaceNumber {
        self.max
    }

    pub fn contains(&self, value: SpaceNumber) -> bool {
        self.min <= value && value <= self.max
    }
}

impl TryFrom<[SpaceNumber; 2]> for RangeSpace {
    type Error = KeyError;

    fn try_from(value: [SpaceNumber; 2]) -> Result<Self, Self::Error> {
        RangeSpace::new(value[0], value[1])
    }
}

impl From<RangeSpace> for [SpaceNumber; 2] {
    fn from(range: RangeSpace) -> Self {
        [range.min, range.max]
    }
}

impl Display for RangeSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.min, self.max)
    }
}

/// The value a filter or trait space holds, one variant per storage shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EncodedSpace {
    Range(RangeSpace),
    /// Ascending, without duplicates.
    Numbers(Vec<SpaceNumber>),
    Color(ColorValue),
    Text(String),
    Taxa(Vec<TaxonFilterEntry>),
}

impl EncodedSpace {
    /// Decode `value` as the space of a `filter_type` filter, rejecting anything that does not
    /// have exactly the expected shape.
    pub fn from_json(filter_type: FilterType, value: &Value) -> Result<EncodedSpace, KeyError> {
        let invalid = |reason: String| KeyError::invalid_space(filter_type, value, reason);
        match filter_type {
            FilterType::Range => serde_json::from_value::<RangeSpace>(value.clone())
                .map(EncodedSpace::Range)
                .map_err(|e| invalid(e.to_string())),
            FilterType::Number => {
                let numbers = serde_json::from_value::<Vec<SpaceNumber>>(value.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                if !numbers.windows(2).all(|w| w[0] < w[1]) {
                    return Err(invalid("numbers must be strictly ascending".to_string()));
                }
                Ok(EncodedSpace::Numbers(numbers))
            }
            FilterType::Color => serde_json::from_value::<ColorValue>(value.clone())
                .map(EncodedSpace::Color)
                .map_err(|e| invalid(e.to_string())),
            FilterType::DescriptiveTextAndImages | FilterType::TextOnly => match value {
                Value::String(text) if !text.trim().is_empty() => {
                    Ok(EncodedSpace::Text(text.clone()))
                }
                Value::String(_) => Err(invalid("text is empty".to_string())),
                _ => Err(invalid("expected a string".to_string())),
            },
            FilterType::Taxon => {
                let entries = serde_json::from_value::<Vec<TaxonFilterEntry>>(value.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                if let Some(entry) = entries.iter().find(|e| e.latname.trim().is_empty()) {
                    return Err(invalid(format!(
                        "taxon filter entry with {} taxa has no latname",
                        entry.taxa.len()
                    )));
                }
                Ok(EncodedSpace::Taxa(entries))
            }
        }
    }

    /// Trait spaces of multi-space filters are stored without their filter type; a string is
    /// text, anything else must be a color.
    pub(crate) fn from_multispace_json(value: &Value) -> Result<EncodedSpace, KeyError> {
        match value {
            Value::String(_) => EncodedSpace::from_json(FilterType::TextOnly, value),
            _ => EncodedSpace::from_json(FilterType::Color, value),
        }
    }

    pub fn fits(&self, filter_type: FilterType) -> bool {
        matches!(
            (self, filter_type),
            (EncodedSpace::Range(_), FilterType::Range)
                | (EncodedSpace::Numbers(_), FilterType::Number)
                | (EncodedSpace::Color(_), FilterType::Color)
                | (
                    EncodedSpace::Text(_),
                    FilterType::DescriptiveTextAndImages | FilterType::TextOnly
                )
                | (EncodedSpace::Taxa(_), FilterType::Taxon)
        )
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Display for EncodedSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// What a child exposes for one filter in a children cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpaceValue {
    Range(RangeSpace),
    Numbers(Vec<SpaceNumber>),
    Colors(Vec<ColorValue>),
    Texts(Vec<String>),
    Taxa(Vec<TaxonFilterEntry>),
}

impl SpaceValue {
    pub fn from_json(filter_type: FilterType, value: &Value) -> Result<SpaceValue, KeyError> {
        let invalid = |reason: String| KeyError::invalid_space(filter_type, value, reason);
        let space = match filter_type {
            FilterType::Range => serde_json::from_value(value.clone()).map(SpaceValue::Range),
            FilterType::Number => serde_json::from_value(value.clone()).map(SpaceValue::Numbers),
            FilterType::Color => serde_json::from_value(value.clone()).map(SpaceValue::Colors),
            FilterType::DescriptiveTextAndImages | FilterType::TextOnly => {
                serde_json::from_value(value.clone()).map(SpaceValue::Texts)
            }
            FilterType::Taxon => serde_json::from_value(value.clone()).map(SpaceValue::Taxa),
        };
        space.map_err(|e| invalid(e.to_string()))
    }

    /// Empty lists contribute nothing to a child's max points. A range is never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            SpaceValue::Range(_) => false,
            SpaceValue::Numbers(numbers) => numbers.is_empty(),
            SpaceValue::Colors(colors) => colors.is_empty(),
            SpaceValue::Texts(texts) => texts.is_empty(),
            SpaceValue::Taxa(entries) => entries.is_empty(),
        }
    }

    /// Swap `old` for `new` wherever it occurs. Returns whether anything changed. Shapes that do
    /// not hold discrete values are left untouched.
    pub fn replace(&mut self, old: &EncodedSpace, new: &EncodedSpace) -> bool {
        match (self, old, new) {
            (SpaceValue::Colors(colors), EncodedSpace::Color(old), EncodedSpace::Color(new)) => {
                replace_all(colors, old, new)
            }
            (SpaceValue::Texts(texts), EncodedSpace::Text(old), EncodedSpace::Text(new)) => {
                replace_all(texts, old, new)
            }
            _ => false,
        }
    }

    /// Drop `value` wherever it occurs. Returns whether anything changed.
    pub fn remove(&mut self, value: &EncodedSpace) -> bool {
        match (self, value) {
            (SpaceValue::Colors(colors), EncodedSpace::Color(color)) => {
                let before = colors.len();
                colors.retain(|c| c != color);
                before != colors.len()
            }
            (SpaceValue::Texts(texts), EncodedSpace::Text(text)) => {
                let before = texts.len();
                texts.retain(|t| t != text);
                before != texts.len()
            }
            _ => false,
        }
    }
}

fn replace_all<T: PartialEq + Clone>(items: &mut [T], old: &T, new: &T) -> bool {
    let mut changed = false;
    for item in items.iter_mut().filter(|item| *item == old) {
        *item = new.clone();
        changed = true;
    }
    changed
}
