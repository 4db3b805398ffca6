use std::{fmt, io, sync::mpsc::SendError};

use hex::FromHexError;
use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::{
    event::KeyEvent,
    properties::{FilterId, NodeId},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum KeyError {
    #[error("Path overflow: ordinal {ordinal} does not fit a {width} character segment (capacity {capacity})")]
    PathOverflow {
        ordinal: u64,
        width: usize,
        capacity: u64,
    },
    #[error("Invalid encoded space for {filter_type}{}: {value} ({reason})", filter_label(.filter))]
    InvalidEncodedSpace {
        filter: Option<FilterId>,
        filter_type: String,
        value: String,
        reason: String,
    },
    #[error("Cache references filter {0} which is not a matrix filter of its meta node")]
    DanglingFilterReference(FilterId),
    #[error("Node {0} has children. Delete the branch instead")]
    NodeHasChildren(NodeId),
    #[error("Circular reference: crosslink {parent} -> {child} would create a cycle")]
    CircularReference { parent: String, child: String },
    #[error("Unsupported filter type: {0}")]
    UnsupportedFilterType(String),
    #[error("Invalid Command: {0}")]
    Command(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

fn filter_label(filter: &Option<FilterId>) -> String {
    filter.map(|f| format!(" filter {f}")).unwrap_or_default()
}

impl KeyError {
    pub(crate) fn invalid_space(
        filter_type: impl fmt::Display,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> KeyError {
        KeyError::InvalidEncodedSpace {
            filter: None,
            filter_type: filter_type.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the offending filter to an [KeyError::InvalidEncodedSpace]. Other variants pass
    /// through untouched.
    pub fn for_filter(self, id: FilterId) -> KeyError {
        match self {
            KeyError::InvalidEncodedSpace {
                filter_type,
                value,
                reason,
                ..
            } => KeyError::InvalidEncodedSpace {
                filter: Some(id),
                filter_type,
                value,
                reason,
            },
            other => other,
        }
    }
}

impl From<toml::de::Error> for KeyError {
    fn from(src: toml::de::Error) -> KeyError {
        KeyError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for KeyError {
    fn from(src: toml::ser::Error) -> KeyError {
        KeyError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for KeyError {
    fn from(src: JsonError) -> KeyError {
        KeyError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for KeyError {
    fn from(src: uuid::Error) -> KeyError {
        KeyError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<FromHexError> for KeyError {
    fn from(src: FromHexError) -> KeyError {
        KeyError::Serialization(format!("Hex decoding failed: {src}"))
    }
}

impl From<io::Error> for KeyError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => KeyError::NotFound(format!("{x}")),
            _ => KeyError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<RegexError> for KeyError {
    fn from(x: RegexError) -> Self {
        KeyError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<SendError<KeyEvent>> for KeyError {
    fn from(x: SendError<KeyEvent>) -> Self {
        KeyError::Io(format!(
            "Channel update send Error, could not transmit key event {:?}",
            x.0
        ))
    }
}
