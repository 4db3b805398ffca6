//! Taxonomic filters.
//!
//! A taxon filter's space is a list of entries, each bundling the taxa (possibly from several
//! taxonomic sources) that make up one choice such as "Birds". Children are never assigned a
//! taxon space directly: a child falls into every entry that contains its own taxon.
use serde::{Deserialize, Serialize};

use crate::{error::KeyError, properties::TaxonRef, resolve::TaxonResolver};

/// Higher taxa offered out of the box, as `(latname, label)`. Comma separated latnames group
/// several taxa under one choice.
pub const PREDEFINED_TAXONOMIC_FILTERS: [(&str, &str); 16] = [
    ("Animalia", "Animals"),
    ("Plantae", "Plants"),
    ("Fungi", "Mushrooms"),
    ("Chordata", "Chordates"),
    ("Mammalia", "Mammals"),
    ("Aves", "Birds"),
    ("Amphibia", "Amphibians"),
    ("Anura", "Frogs"),
    (
        "Holocephali,Elasmobranchii,Sarcopterygii,Actinopterygii",
        "Fish",
    ),
    ("Arthropoda", "Arthropods"),
    ("Insecta", "Insects"),
    ("Lepidoptera", "Butterflies"),
    ("Coleoptera", "Bugs"),
    ("Odonata", "Dragonflies and damselflies"),
    ("Arachnida", "Spiders"),
    ("Mollusca", "Molluscs"),
];

pub fn is_predefined(latname: &str) -> bool {
    PREDEFINED_TAXONOMIC_FILTERS
        .iter()
        .any(|(predefined, _)| *predefined == latname)
}

pub fn predefined_label(latname: &str) -> Option<&'static str> {
    PREDEFINED_TAXONOMIC_FILTERS
        .iter()
        .find(|(predefined, _)| *predefined == latname)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonFilterEntry {
    pub taxa: Vec<TaxonRef>,
    /// Overarching latname of the choice, comma separated for grouped taxa.
    pub latname: String,
    pub is_custom: bool,
}

impl TaxonFilterEntry {
    /// True if `taxon` is one of the entry's taxa or belongs to one of them.
    pub fn contains(&self, taxon: &TaxonRef) -> bool {
        self.taxa.iter().any(|filter_taxon| filter_taxon.contains(taxon))
    }

    pub fn label(&self) -> &str {
        predefined_label(&self.latname).unwrap_or(&self.latname)
    }
}

/// Resolve every comma separated part of `latname` in each of `sources`. Unresolvable parts are
/// skipped, duplicates are dropped.
pub fn make_taxonfilter_entry(
    latname: &str,
    sources: &[String],
    resolver: &dyn TaxonResolver,
) -> Result<TaxonFilterEntry, KeyError> {
    let mut entry = TaxonFilterEntry {
        taxa: Vec::new(),
        latname: latname.to_string(),
        is_custom: !is_predefined(latname),
    };
    for source in sources {
        for part in latname.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match resolver.resolve(source, part)? {
                Some(taxon) if !entry.taxa.contains(&taxon) => entry.taxa.push(taxon),
                Some(_) => {}
                None => tracing::debug!("taxon {part} not found in {source}"),
            }
        }
    }
    Ok(entry)
}

/// Rebuild a taxon filter space from the latnames an editor selected.
///
/// Predefined latnames are resolved afresh in all `sources`; custom latnames keep their entry
/// from `existing`. A `custom_taxon` adds a new custom entry made of that taxon plus its
/// namesakes in the other sources.
pub fn build_taxonfilter_space(
    selected: &[String],
    custom_taxon: Option<&TaxonRef>,
    existing: &[TaxonFilterEntry],
    sources: &[String],
    resolver: &dyn TaxonResolver,
) -> Result<Vec<TaxonFilterEntry>, KeyError> {
    let mut space = Vec::new();
    for latname in selected {
        if is_predefined(latname) {
            space.push(make_taxonfilter_entry(latname, sources, resolver)?);
        } else {
            space.extend(
                existing
                    .iter()
                    .filter(|entry| entry.is_custom && &entry.latname == latname)
                    .cloned(),
            );
        }
    }
    if let Some(custom) = custom_taxon {
        let remaining: Vec<String> = sources
            .iter()
            .filter(|source| **source != custom.taxon_source)
            .cloned()
            .collect();
        let mut entry = make_taxonfilter_entry(&custom.taxon_latname, &remaining, resolver)?;
        entry.taxa.push(custom.clone());
        entry.is_custom = true;
        space.push(entry);
    }
    Ok(space)
}

/// Entries of `space` a child with `taxon` falls into.
pub fn matching_entries(space: &[TaxonFilterEntry], taxon: &TaxonRef) -> Vec<TaxonFilterEntry> {
    space
        .iter()
        .filter(|entry| entry.contains(taxon))
        .cloned()
        .collect()
}

/// Choices offered to end users, sorted by latname.
pub fn choices(space: &[TaxonFilterEntry]) -> Vec<(&str, &str)> {
    let mut choices: Vec<(&str, &str)> = space
        .iter()
        .map(|entry| (entry.latname.as_str(), entry.label()))
        .collect();
    choices.sort();
    choices
}
