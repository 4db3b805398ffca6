use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use crate::{config::NuidConfig, error::KeyError};

/// Hierarchical node identifier. A concatenation of fixed-width segments, one per tree level,
/// each segment encoding the ordinal a node received among its siblings when it was created.
///
/// Ancestry reduces to prefix tests on the string, which is why a `Nuid` never changes once
/// issued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nuid(String);

impl Nuid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` lies strictly above `other` in the tree.
    pub fn is_ancestor_of(&self, other: &Nuid) -> bool {
        is_ancestor(self.as_str(), other.as_str())
    }

    pub fn is_descendant_or_self_of(&self, ancestor: &Nuid) -> bool {
        is_descendant_or_self(self.as_str(), ancestor.as_str())
    }
}

impl Display for Nuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Nuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&Nuid> for String {
    fn from(nuid: &Nuid) -> String {
        nuid.0.clone()
    }
}

/// `a` is a strict ancestor of `b`.
pub fn is_ancestor(a: &str, b: &str) -> bool {
    b.len() > a.len() && b.starts_with(a)
}

/// `descendant` equals `ancestor` or lies below it. Also used for taxon nuids, which follow the
/// same prefix convention in their own taxonomic source.
pub fn is_descendant_or_self(descendant: &str, ancestor: &str) -> bool {
    descendant.starts_with(ancestor)
}

/// Converts sibling ordinals to fixed-width segments and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NuidCodec {
    width: usize,
    alphabet: Vec<u8>,
    capacity: u64,
}

impl Default for NuidCodec {
    fn default() -> Self {
        let config = NuidConfig::default();
        let alphabet = config.alphabet.into_bytes();
        let capacity = capacity(alphabet.len() as u64, config.segment_width);
        NuidCodec {
            width: config.segment_width,
            alphabet,
            capacity,
        }
    }
}

fn capacity(base: u64, width: usize) -> u64 {
    u32::try_from(width)
        .ok()
        .and_then(|w| base.checked_pow(w))
        .unwrap_or(u64::MAX)
}

impl NuidCodec {
    pub fn new(config: &NuidConfig) -> Result<NuidCodec, KeyError> {
        let base = config.alphabet.chars().count();
        if base <= 10 || !config.alphabet.is_ascii() {
            return Err(KeyError::Config(format!(
                "nuid alphabet '{}' must hold more than 10 ascii symbols",
                config.alphabet
            )));
        }
        let mut seen = BTreeSet::new();
        if !config.alphabet.bytes().all(|symbol| seen.insert(symbol)) {
            return Err(KeyError::Config(format!(
                "nuid alphabet '{}' contains duplicate symbols",
                config.alphabet
            )));
        }
        if config.segment_width == 0 {
            return Err(KeyError::Config(
                "nuid segment width must be at least 1".to_string(),
            ));
        }
        let alphabet = config.alphabet.as_bytes().to_vec();
        Ok(NuidCodec {
            width: config.segment_width,
            capacity: capacity(alphabet.len() as u64, config.segment_width),
            alphabet,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn base(&self) -> u64 {
        self.alphabet.len() as u64
    }

    /// Number of distinct segments. Valid ordinals are `1..capacity`.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn encode(&self, ordinal: u64) -> Result<String, KeyError> {
        if ordinal == 0 {
            return Err(KeyError::Command(
                "nuid ordinals are 1-based, 0 cannot be encoded".to_string(),
            ));
        }
        if ordinal >= self.capacity {
            return Err(KeyError::PathOverflow {
                ordinal,
                width: self.width,
                capacity: self.capacity,
            });
        }
        let base = self.base();
        let mut digits = vec![self.alphabet[0]; self.width];
        let mut rest = ordinal;
        for slot in digits.iter_mut().rev() {
            *slot = self.alphabet[(rest % base) as usize];
            rest /= base;
        }
        Ok(digits.into_iter().map(char::from).collect())
    }

    pub fn decode(&self, segment: &str) -> Result<u64, KeyError> {
        if segment.len() != self.width {
            return Err(KeyError::Serialization(format!(
                "nuid segment '{segment}' is not {} characters wide",
                self.width
            )));
        }
        let base = self.base();
        segment.bytes().try_fold(0u64, |acc, byte| {
            let digit = self
                .alphabet
                .iter()
                .position(|a| *a == byte)
                .ok_or_else(|| {
                    KeyError::Serialization(format!(
                        "nuid segment '{segment}' contains symbol '{}' outside the alphabet",
                        char::from(byte)
                    ))
                })?;
            acc.checked_mul(base)
                .and_then(|v| v.checked_add(digit as u64))
                .ok_or_else(|| KeyError::Serialization(format!("nuid segment '{segment}' overflows")))
        })
    }

    /// Validate a stored path string.
    pub fn parse(&self, path: &str) -> Result<Nuid, KeyError> {
        if path.is_empty() || path.len() % self.width != 0 {
            return Err(KeyError::Serialization(format!(
                "nuid '{path}' is not a whole number of {} character segments",
                self.width
            )));
        }
        for segment in path.as_bytes().chunks(self.width) {
            let segment = std::str::from_utf8(segment)
                .map_err(|e| KeyError::Serialization(format!("nuid '{path}': {e}")))?;
            if self.decode(segment)? == 0 {
                return Err(KeyError::Serialization(format!(
                    "nuid '{path}' contains an empty segment"
                )));
            }
        }
        Ok(Nuid(path.to_string()))
    }

    pub fn root_path(&self) -> Result<Nuid, KeyError> {
        Ok(Nuid(self.encode(1)?))
    }

    /// Path of the next child under `parent`, where `sibling_count` is the number of ordinals
    /// already issued beneath it. Issued ordinals are never reused, even after deletions.
    pub fn next_child_path(&self, parent: &Nuid, sibling_count: u64) -> Result<Nuid, KeyError> {
        let ordinal = sibling_count.checked_add(1).ok_or(KeyError::PathOverflow {
            ordinal: sibling_count,
            width: self.width,
            capacity: self.capacity,
        })?;
        let segment = self.encode(ordinal)?;
        Ok(Nuid(format!("{}{}", parent.0, segment)))
    }

    pub fn parent_path(&self, nuid: &Nuid) -> Option<Nuid> {
        if nuid.len() <= self.width {
            return None;
        }
        Some(Nuid(nuid.0[..nuid.len() - self.width].to_string()))
    }

    /// Root sits at depth 0.
    pub fn depth(&self, nuid: &Nuid) -> usize {
        (nuid.len() / self.width).saturating_sub(1)
    }

    pub fn segments<'a>(&self, nuid: &'a Nuid) -> impl Iterator<Item = &'a str> + 'a {
        let width = self.width;
        (0..nuid.len() / width).map(move |i| &nuid.0[i * width..(i + 1) * width])
    }

    /// Ordinal of the last segment.
    pub fn ordinal(&self, nuid: &Nuid) -> Result<u64, KeyError> {
        let start = nuid.len().saturating_sub(self.width);
        self.decode(&nuid.0[start..])
    }

    pub fn is_child_of(&self, child: &Nuid, parent: &Nuid) -> bool {
        child.len() == parent.len() + self.width && is_ancestor(parent.as_str(), child.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_encode_default_codec() {
        let codec = NuidCodec::default();
        assert_eq!(codec.encode(1).unwrap(), "001");
        assert_eq!(codec.encode(10).unwrap(), "00a");
        assert_eq!(codec.encode(36).unwrap(), "010");
        assert_eq!(codec.encode(46655).unwrap(), "zzz");
        assert_eq!(codec.decode("010").unwrap(), 36);
        assert_eq!(codec.decode("zzz").unwrap(), 46655);
    }

    #[test]
    fn test_encode_overflow() {
        let codec = NuidCodec::default();
        assert_eq!(codec.capacity(), 46656);
        assert!(matches!(
            codec.encode(46656),
            Err(KeyError::PathOverflow {
                ordinal: 46656,
                width: 3,
                capacity: 46656
            })
        ));
        assert!(codec.encode(0).is_err());
    }

    #[test]
    fn test_ancestry() {
        assert!(is_ancestor("001", "001002"));
        assert!(!is_ancestor("001002", "001002"));
        assert!(!is_ancestor("001002", "001"));
        assert!(!is_ancestor("002", "001002"));
        assert!(is_descendant_or_self("001002", "001002"));
        assert!(is_descendant_or_self("001002003", "001"));
        assert!(!is_descendant_or_self("001", "001002"));
    }

    #[test]
    fn test_path_navigation() {
        let codec = NuidCodec::default();
        let root = codec.root_path().unwrap();
        assert_eq!(root.as_str(), "001");
        let child = codec.next_child_path(&root, 0).unwrap();
        assert_eq!(child.as_str(), "001001");
        let grandchild = codec.next_child_path(&child, 11).unwrap();
        assert_eq!(grandchild.as_str(), "00100100c");
        assert_eq!(codec.parent_path(&grandchild), Some(child.clone()));
        assert_eq!(codec.parent_path(&root), None);
        assert_eq!(codec.depth(&root), 0);
        assert_eq!(codec.depth(&grandchild), 2);
        assert_eq!(codec.ordinal(&grandchild).unwrap(), 12);
        assert_eq!(
            codec.segments(&grandchild).collect::<Vec<_>>(),
            vec!["001", "001", "00c"]
        );
        assert!(codec.is_child_of(&child, &root));
        assert!(!codec.is_child_of(&grandchild, &root));
        assert!(root.is_ancestor_of(&grandchild));
        assert!(grandchild.is_descendant_or_self_of(&child));
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        let codec = NuidCodec::default();
        assert!(codec.parse("001002").is_ok());
        assert!(codec.parse("0010").is_err());
        assert!(codec.parse("").is_err());
        assert!(codec.parse("001000").is_err());
        assert!(codec.parse("00A").is_err());
    }

    #[test]
    fn test_custom_alphabet() {
        let codec = NuidCodec::new(&NuidConfig {
            segment_width: 2,
            alphabet: "0123456789ABCDEF".to_string(),
        })
        .unwrap();
        assert_eq!(codec.encode(255).unwrap(), "FF");
        assert!(matches!(
            codec.encode(256),
            Err(KeyError::PathOverflow { .. })
        ));
        assert!(NuidCodec::new(&NuidConfig {
            segment_width: 2,
            alphabet: "0123456789".to_string(),
        })
        .is_err());
    }

    #[test]
    fn test_repeated_symbols_are_rejected() {
        // two ordinals would share the segment "0a"
        let repeated = NuidCodec::new(&NuidConfig {
            segment_width: 2,
            alphabet: "0123456789aa".to_string(),
        });
        assert!(matches!(repeated, Err(KeyError::Config(_))));
    }
}
