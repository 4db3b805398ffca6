use serde::{Deserialize, Serialize};

use crate::{
    error::KeyError,
    event::KeyEvent,
    filters::{
        taxon::build_taxonfilter_space, AssignedSpace, EncodedSpace, FilterDefinition,
        FilterType, FormValue, NodeTraitAssignment, TraitFilter, TraitSpace,
    },
    properties::{non_blank, FilterId, ImageRef, MetaNodeId, NodeId, NodeType, SpaceId, TaxonRef},
    resolve::TaxonResolver,
};

use super::base::KeyBase;

/// Input for [KeyBase::add_filter]. Weight and definition fall back to the configured default
/// weight and the filter type's default definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilter {
    pub name: String,
    pub filter_type: FilterType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub definition: Option<FilterDefinition>,
}

impl NewFilter {
    pub fn new(name: &str, filter_type: FilterType) -> Self {
        NewFilter {
            name: name.to_string(),
            filter_type,
            description: None,
            weight: None,
            definition: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Input for [KeyBase::update_filter]. The filter type never changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub weight: Option<u32>,
    pub definition: Option<FilterDefinition>,
}

impl KeyBase {
    fn check_weight(&self, weight: u32) -> Result<(), KeyError> {
        if weight > self.config.max_filter_weight {
            return Err(KeyError::Command(format!(
                "filter weight {weight} exceeds the maximum of {}",
                self.config.max_filter_weight
            )));
        }
        Ok(())
    }

    fn check_filter_name(
        &self,
        meta: &MetaNodeId,
        name: &str,
        except: Option<&FilterId>,
    ) -> Result<String, KeyError> {
        let name = non_blank(Some(name))
            .ok_or_else(|| KeyError::Command("a filter needs a name".to_string()))?;
        let taken = self
            .filters(meta)
            .iter()
            .any(|filter| filter.name == name && Some(&filter.id) != except);
        if taken {
            return Err(KeyError::Command(format!(
                "a filter named '{name}' already exists on this node"
            )));
        }
        Ok(name)
    }

    /// Define a matrix filter on `meta`. Its children start without a space for it.
    pub fn add_filter(&mut self, meta: &MetaNodeId, new: NewFilter) -> Result<FilterId, KeyError> {
        self.atomically(|kb| {
            if kb.meta_node(meta)?.node_type == NodeType::Result {
                return Err(KeyError::Command(
                    "result nodes have no children to filter".to_string(),
                ));
            }
            let name = kb.check_filter_name(meta, &new.name, None)?;
            let weight = new.weight.unwrap_or(kb.config.default_filter_weight);
            kb.check_weight(weight)?;

            let mut filter = TraitFilter::new(*meta, new.filter_type, &name, weight);
            filter.description = non_blank(new.description.as_deref());
            if let Some(definition) = new.definition {
                filter.definition = definition;
            }
            let id = filter.id;
            tracing::debug!("[KeyBase::add_filter] {} '{name}' on {meta}", filter.filter_type);
            kb.with_cache(meta, |manager, _, doc| {
                manager.add_matrix_filter(doc, &filter);
                Ok(())
            })?;
            kb.state.filters.insert(id, filter);
            kb.state.filter_order.entry(*meta).or_default().push(id);
            kb.emit(KeyEvent::FilterUpdated(id));
            Ok(id)
        })
    }

    /// Edit a filter. A weight change is applied to the max points of every child.
    pub fn update_filter(&mut self, id: &FilterId, update: FilterUpdate) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let current = kb.filter(id)?.clone();
            let name = match update.name.as_deref() {
                Some(name) => kb.check_filter_name(&current.meta_node, name, Some(id))?,
                None => current.name.clone(),
            };
            if let Some(weight) = update.weight {
                kb.check_weight(weight)?;
            }

            let filter = kb
                .state
                .filters
                .get_mut(id)
                .ok_or_else(|| KeyError::NotFound(format!("filter {id}")))?;
            filter.name = name;
            if let Some(description) = update.description {
                filter.description = non_blank(description.as_deref());
            }
            if let Some(definition) = update.definition {
                filter.definition = definition;
            }
            if let Some(weight) = update.weight {
                filter.weight = weight;
            }
            tracing::debug!("[KeyBase::update_filter] {id} '{}'", filter.name);
            if update.weight.is_some_and(|weight| weight != current.weight) {
                kb.refresh_children_of(&current.meta_node)?;
            }
            kb.emit(KeyEvent::FilterUpdated(*id));
            Ok(())
        })
    }

    /// Remove a filter together with its trait spaces and every assignment to it.
    pub fn delete_filter(&mut self, id: &FilterId) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let filter = kb
                .state
                .filters
                .remove(id)
                .ok_or_else(|| KeyError::NotFound(format!("filter {id}")))?;
            if let Some(order) = kb.state.filter_order.get_mut(&filter.meta_node) {
                order.retain(|other| other != id);
            }
            for space in kb.state.space_order.remove(id).unwrap_or_default() {
                kb.state.spaces.remove(&space);
            }
            for assignments in kb.state.assignments.values_mut() {
                assignments.remove(id);
            }
            kb.state.assignments.retain(|_, assignments| !assignments.is_empty());
            tracing::debug!("[KeyBase::delete_filter] {id} '{}'", filter.name);
            kb.with_cache(&filter.meta_node, |manager, _, doc| {
                manager.remove_matrix_filter(doc, &filter);
                Ok(())
            })?;
            kb.emit(KeyEvent::FilterRemoved(*id));
            Ok(())
        })
    }

    /// Parse form input into a space for `filter` without storing anything.
    pub fn encode_filter_space(
        &self,
        filter: &FilterId,
        raw: &FormValue,
    ) -> Result<EncodedSpace, KeyError> {
        let filter = self.filter(filter)?;
        filter
            .filter_type
            .encode_from_form_value(raw)
            .map_err(|e| e.for_filter(filter.id))
    }

    /// Replace the filter level space of a Range, Number or Taxon filter.
    ///
    /// Number assignments lose the numbers that are no longer offered. Number and Taxon filters
    /// refresh every child; a Range filter's space does not show up in children caches.
    pub fn set_filter_space(&mut self, id: &FilterId, space: EncodedSpace) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let filter = kb.filter(id)?;
            let filter_type = filter.filter_type;
            let meta = filter.meta_node;
            if filter_type.is_multispace() {
                return Err(KeyError::invalid_space(
                    filter_type,
                    &space,
                    "multi-space filters keep their values in trait spaces",
                )
                .for_filter(*id));
            }
            if !space.fits(filter_type) {
                return Err(KeyError::invalid_space(filter_type, &space, "wrong shape").for_filter(*id));
            }
            let space =
                EncodedSpace::from_json(filter_type, &space.to_json()).map_err(|e| e.for_filter(*id))?;

            if let EncodedSpace::Numbers(offered) = &space {
                for assignments in kb.state.assignments.values_mut() {
                    let emptied = match assignments.get_mut(id) {
                        Some(NodeTraitAssignment {
                            space: AssignedSpace::Numbers(numbers),
                            ..
                        }) => {
                            numbers.retain(|n| offered.contains(n));
                            numbers.is_empty()
                        }
                        _ => false,
                    };
                    if emptied {
                        assignments.remove(id);
                    }
                }
                kb.state.assignments.retain(|_, assignments| !assignments.is_empty());
            }

            tracing::debug!("[KeyBase::set_filter_space] {id} = {space}");
            if let Some(filter) = kb.state.filters.get_mut(id) {
                filter.encoded_space = Some(space);
            }
            if filter_type != FilterType::Range {
                kb.refresh_children_of(&meta)?;
            }
            kb.emit(KeyEvent::FilterUpdated(*id));
            Ok(())
        })
    }

    pub fn set_filter_space_from_form(
        &mut self,
        id: &FilterId,
        raw: &FormValue,
    ) -> Result<(), KeyError> {
        let space = self.encode_filter_space(id, raw)?;
        self.set_filter_space(id, space)
    }

    /// Rebuild a taxon filter's entries from the latnames an editor selected plus an optional
    /// custom taxon, resolving predefined groups in every source of `resolver` listed in
    /// `sources`.
    pub fn set_taxon_filter_space(
        &mut self,
        id: &FilterId,
        selected: &[String],
        custom_taxon: Option<&TaxonRef>,
        sources: &[String],
        resolver: &dyn TaxonResolver,
    ) -> Result<(), KeyError> {
        let filter = self.filter(id)?;
        if filter.filter_type != FilterType::Taxon {
            return Err(KeyError::Command(format!(
                "{} is a {}, not a TaxonFilter",
                filter.name, filter.filter_type
            )));
        }
        let entries = build_taxonfilter_space(
            selected,
            custom_taxon,
            filter.taxon_entries(),
            sources,
            resolver,
        )?;
        self.set_filter_space(id, EncodedSpace::Taxa(entries))
    }

    /// Replace the display order of `meta`'s filters. `order` must list exactly its filters.
    pub fn reorder_filters(&mut self, meta: &MetaNodeId, order: &[FilterId]) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let mut current = kb.state.filter_order.get(meta).cloned().unwrap_or_default();
            let mut proposed = order.to_vec();
            current.sort();
            proposed.sort();
            if current != proposed {
                return Err(KeyError::Command(format!(
                    "new filter order of {meta} is not a permutation of its filters"
                )));
            }
            kb.state.filter_order.insert(*meta, order.to_vec());
            Ok(())
        })
    }

    fn check_space(
        &self,
        filter: &TraitFilter,
        space: &EncodedSpace,
        except: Option<&SpaceId>,
    ) -> Result<(), KeyError> {
        if !filter.filter_type.is_multispace() {
            return Err(KeyError::invalid_space(
                filter.filter_type,
                space,
                "only Color and text filters have trait spaces",
            )
            .for_filter(filter.id));
        }
        if !space.fits(filter.filter_type) {
            return Err(
                KeyError::invalid_space(filter.filter_type, space, "wrong shape").for_filter(filter.id)
            );
        }
        let duplicate = self
            .spaces(&filter.id)
            .iter()
            .any(|other| other.encoded_space == *space && Some(&other.id) != except);
        if duplicate {
            return Err(KeyError::Command(format!(
                "{} already offers {}",
                filter.name,
                filter.filter_type.decode_to_display(space)
            )));
        }
        Ok(())
    }

    fn check_image(&self, filter: &TraitFilter, image: &Option<ImageRef>) -> Result<(), KeyError> {
        if image.is_some() && filter.filter_type != FilterType::DescriptiveTextAndImages {
            return Err(KeyError::Command(format!(
                "{} spaces cannot carry an image",
                filter.filter_type
            )));
        }
        Ok(())
    }

    /// Offer one more value in a Color or text filter.
    pub fn add_space(
        &mut self,
        filter: &FilterId,
        space: EncodedSpace,
        image: Option<ImageRef>,
    ) -> Result<SpaceId, KeyError> {
        self.atomically(|kb| {
            let owner = kb.filter(filter)?;
            kb.check_space(owner, &space, None)?;
            kb.check_image(owner, &image)?;
            let record = TraitSpace {
                id: SpaceId::new(),
                filter: *filter,
                encoded_space: space,
                image: image.filter(|image| !image.0.is_empty()),
            };
            let id = record.id;
            tracing::debug!("[KeyBase::add_space] {id} = {} on {filter}", record.encoded_space);
            kb.state.spaces.insert(id, record);
            kb.state.space_order.entry(*filter).or_default().push(id);
            kb.emit(KeyEvent::SpaceUpdated(*filter, id));
            Ok(id)
        })
    }

    pub fn add_space_from_form(
        &mut self,
        filter: &FilterId,
        raw: &FormValue,
        image: Option<ImageRef>,
    ) -> Result<SpaceId, KeyError> {
        let space = self.encode_filter_space(filter, raw)?;
        self.add_space(filter, space, image)
    }

    /// Change the value of a trait space. Children holding the space see the new value.
    pub fn update_space(&mut self, id: &SpaceId, space: EncodedSpace) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let record = kb.space(id)?.clone();
            let filter = kb.filter(&record.filter)?.clone();
            kb.check_space(&filter, &space, Some(id))?;
            tracing::debug!(
                "[KeyBase::update_space] {id}: {} -> {space}",
                record.encoded_space
            );
            if let Some(stored) = kb.state.spaces.get_mut(id) {
                stored.encoded_space = space.clone();
            }
            let changed = kb.with_cache(&filter.meta_node, |manager, _, doc| {
                manager.update_matrix_filter_space(doc, &filter.id, &record.encoded_space, &space)
            })?;
            tracing::debug!("[KeyBase::update_space] {changed} cached children changed");
            kb.emit(KeyEvent::SpaceUpdated(filter.id, *id));
            Ok(())
        })
    }

    pub fn set_space_image(&mut self, id: &SpaceId, image: Option<ImageRef>) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let filter_id = kb.space(id)?.filter;
            let filter = kb.filter(&filter_id)?;
            kb.check_image(filter, &image)?;
            if let Some(stored) = kb.state.spaces.get_mut(id) {
                stored.image = image.filter(|image| !image.0.is_empty());
            }
            kb.emit(KeyEvent::SpaceUpdated(filter_id, *id));
            Ok(())
        })
    }

    /// Remove a trait space. Assignments and cached children drop the value; a child left
    /// without any value for the filter loses the filter's weight.
    pub fn delete_space(&mut self, id: &SpaceId) -> Result<(), KeyError> {
        self.atomically(|kb| {
            let record = kb
                .state
                .spaces
                .remove(id)
                .ok_or_else(|| KeyError::NotFound(format!("trait space {id}")))?;
            let filter = kb.filter(&record.filter)?.clone();
            if let Some(order) = kb.state.space_order.get_mut(&filter.id) {
                order.retain(|other| other != id);
            }
            for assignments in kb.state.assignments.values_mut() {
                let emptied = match assignments.get_mut(&filter.id) {
                    Some(NodeTraitAssignment {
                        space: AssignedSpace::Spaces(ids),
                        ..
                    }) => ids.remove(id) && ids.is_empty(),
                    _ => false,
                };
                if emptied {
                    assignments.remove(&filter.id);
                }
            }
            kb.state.assignments.retain(|_, assignments| !assignments.is_empty());
            tracing::debug!("[KeyBase::delete_space] {id} = {}", record.encoded_space);
            kb.with_cache(&filter.meta_node, |manager, _, doc| {
                manager.remove_matrix_filter_space(doc, &filter, &record.encoded_space)
            })?;
            kb.emit(KeyEvent::SpaceRemoved(filter.id, *id));
            Ok(())
        })
    }

    /// Declare which space `node` occupies in `filter`. The node has to be listed below a node
    /// defining the filter. An empty number or space selection clears the assignment.
    pub fn assign(
        &mut self,
        node: &NodeId,
        filter: &FilterId,
        space: AssignedSpace,
    ) -> Result<(), KeyError> {
        self.atomically(|kb| {
            kb.node(node)?;
            let owner = kb.filter(filter)?;
            let listed = kb.state.parents_of(node).iter().any(|parent| {
                kb.state
                    .nodes
                    .get(parent)
                    .is_some_and(|parent| parent.meta_node == owner.meta_node)
            });
            if !listed {
                return Err(KeyError::Command(format!(
                    "{node} is not a child of a node defining filter '{}'",
                    owner.name
                )));
            }
            let space_ids = kb.state.filter_space_ids(filter);
            let space = owner
                .filter_type
                .validate_assignment(owner, space, &space_ids)?;
            let empty = match &space {
                AssignedSpace::Range(_) => false,
                AssignedSpace::Numbers(numbers) => numbers.is_empty(),
                AssignedSpace::Spaces(ids) => ids.is_empty(),
            };
            tracing::debug!("[KeyBase::assign] {node} / {filter} = {space}");
            if empty {
                kb.remove_assignment(node, filter);
            } else {
                kb.state.assignments.entry(*node).or_default().insert(
                    *filter,
                    NodeTraitAssignment {
                        node: *node,
                        filter: *filter,
                        space,
                    },
                );
            }
            kb.refresh_child(node)?;
            kb.emit(KeyEvent::AssignmentChanged(*node, *filter));
            Ok(())
        })
    }

    /// Returns whether an assignment existed.
    pub fn clear_assignment(&mut self, node: &NodeId, filter: &FilterId) -> Result<bool, KeyError> {
        self.atomically(|kb| {
            kb.node(node)?;
            kb.filter(filter)?;
            if !kb.remove_assignment(node, filter) {
                return Ok(false);
            }
            tracing::debug!("[KeyBase::clear_assignment] {node} / {filter}");
            kb.refresh_child(node)?;
            kb.emit(KeyEvent::AssignmentChanged(*node, *filter));
            Ok(true)
        })
    }

    fn remove_assignment(&mut self, node: &NodeId, filter: &FilterId) -> bool {
        let removed = self
            .state
            .assignments
            .get_mut(node)
            .is_some_and(|assignments| assignments.remove(filter).is_some());
        if self.state.assignments.get(node).is_some_and(|a| a.is_empty()) {
            self.state.assignments.remove(node);
        }
        removed
    }
}
