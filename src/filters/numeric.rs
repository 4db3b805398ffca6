//! Form parsing for the numeric filter types.
use crate::{
    error::KeyError,
    filters::{
        space::{RangeSpace, SpaceNumber},
        FilterType, FormValue,
    },
};

fn parse_all(filter_type: FilterType, raw: &FormValue) -> Result<Vec<SpaceNumber>, KeyError> {
    raw.split_items()
        .into_iter()
        .map(|item| {
            item.parse::<SpaceNumber>()
                .map_err(|e| KeyError::invalid_space(filter_type, raw, e.to_string()))
        })
        .collect()
}

/// Exactly two numbers, `min` first.
pub fn range_from_form_value(raw: &FormValue) -> Result<RangeSpace, KeyError> {
    match parse_all(FilterType::Range, raw)?.as_slice() {
        [min, max] => RangeSpace::new(*min, *max),
        _ => Err(KeyError::invalid_space(
            FilterType::Range,
            raw,
            "expected a min and a max value",
        )),
    }
}

/// Any amount of numbers, returned ascending and without duplicates.
pub fn numbers_from_form_value(raw: &FormValue) -> Result<Vec<SpaceNumber>, KeyError> {
    let mut numbers = parse_all(FilterType::Number, raw)?;
    numbers.sort();
    numbers.dedup();
    Ok(numbers)
}
