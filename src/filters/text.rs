use unicode_normalization::UnicodeNormalization;

use crate::{
    error::KeyError,
    filters::{FilterType, FormValue},
};

/// Trimmed and NFC normalized, so visually identical inputs compare equal in caches.
pub fn text_from_form_value(filter_type: FilterType, raw: &FormValue) -> Result<String, KeyError> {
    let text = match raw {
        FormValue::Single(text) => text.as_str(),
        FormValue::Multiple(items) => match items.as_slice() {
            [text] => text.as_str(),
            _ => {
                return Err(KeyError::invalid_space(
                    filter_type,
                    raw,
                    "expected a single text",
                ))
            }
        },
    };
    let normalized: String = text.trim().nfc().collect();
    if normalized.is_empty() {
        return Err(KeyError::invalid_space(filter_type, raw, "text is empty"));
    }
    Ok(normalized)
}
