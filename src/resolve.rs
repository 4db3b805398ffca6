//! Seams to the collaborators a key depends on but does not own: the taxonomic sources that
//! turn latin names into [TaxonRef]s and the image store that turns [ImageRef]s into URLs.
use std::collections::BTreeMap;

use crate::{
    error::KeyError,
    properties::{ImageRef, TaxonRef},
};

pub trait TaxonResolver: Send + Sync {
    /// Look up `latname` in `taxon_source`. `Ok(None)` means the source does not know the name.
    fn resolve(&self, taxon_source: &str, latname: &str) -> Result<Option<TaxonRef>, KeyError>;
}

/// In-memory taxonomy, keyed by `(taxon_source, latname)`.
#[derive(Debug, Clone, Default)]
pub struct StaticTaxonResolver {
    taxa: BTreeMap<(String, String), TaxonRef>,
}

impl StaticTaxonResolver {
    pub fn insert(&mut self, taxon: TaxonRef) -> Option<TaxonRef> {
        self.taxa.insert(
            (taxon.taxon_source.clone(), taxon.taxon_latname.clone()),
            taxon,
        )
    }

    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.taxa.keys().map(|(source, _)| source.clone()).collect();
        sources.dedup();
        sources
    }
}

impl FromIterator<TaxonRef> for StaticTaxonResolver {
    fn from_iter<I: IntoIterator<Item = TaxonRef>>(iter: I) -> Self {
        let mut resolver = StaticTaxonResolver::default();
        for taxon in iter {
            resolver.insert(taxon);
        }
        resolver
    }
}

impl TaxonResolver for StaticTaxonResolver {
    fn resolve(&self, taxon_source: &str, latname: &str) -> Result<Option<TaxonRef>, KeyError> {
        Ok(self
            .taxa
            .get(&(taxon_source.to_string(), latname.to_string()))
            .cloned())
    }
}

pub trait ImageResolver: Send + Sync {
    fn image_url(&self, image: &ImageRef) -> Option<String>;
}

/// Joins a fixed prefix (a media root or CDN base) and the image identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixImageResolver {
    prefix: String,
}

impl PrefixImageResolver {
    pub fn new(prefix: &str) -> Self {
        PrefixImageResolver {
            prefix: prefix.to_string(),
        }
    }
}

impl ImageResolver for PrefixImageResolver {
    fn image_url(&self, image: &ImageRef) -> Option<String> {
        if image.0.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.prefix, image.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn static_resolver_lookup() {
        let resolver: StaticTaxonResolver = [TaxonRef {
            taxon_source: "taxonomy.sources.col".to_string(),
            taxon_latname: "Aves".to_string(),
            taxon_author: Some("Linnaeus, 1758".to_string()),
            name_uuid: "a7c4b1d2".to_string(),
            taxon_nuid: "001002003".to_string(),
        }]
        .into_iter()
        .collect();
        assert!(resolver
            .resolve("taxonomy.sources.col", "Aves")
            .unwrap()
            .is_some());
        assert!(resolver
            .resolve("taxonomy.sources.custom", "Aves")
            .unwrap()
            .is_none());
        assert_eq!(resolver.sources(), vec!["taxonomy.sources.col".to_string()]);
    }

    #[test]
    fn prefix_image_resolver() {
        let resolver = PrefixImageResolver::new("/media/");
        assert_eq!(
            resolver.image_url(&ImageRef("nodes/owl.jpg".to_string())),
            Some("/media/nodes/owl.jpg".to_string())
        );
        assert_eq!(resolver.image_url(&ImageRef(String::new())), None);
    }
}
