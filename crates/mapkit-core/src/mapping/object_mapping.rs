//! Object mappings
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::property::{AttributeMapping, RelationshipMapping};
use super::Mapping;
use crate::connection::ConnectionDescription;
use crate::keypath::{METADATA_PREFIX, PARENT_PREFIX, ROOT_PREFIX};
use crate::object::Entity;
use crate::serialization::RequestMapping;
use crate::transformer::{built_in, CompoundValueTransformer, TransformResult, ValueTransformer};
use crate::value::Value;
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::sync::{Arc, OnceLock};

/// Describes how representations become objects of one entity.
///
/// Property mappings are keyed by destination: registering a second mapping
/// for the same destination replaces the first.
///
/// ```
/// use mapkit_core::{Entity, ObjectMapping, ValueKind};
/// use std::sync::Arc;
///
/// let user = Arc::new(Entity::new("User").attribute("userID", ValueKind::Integer));
/// let mapping = ObjectMapping::new(user)
///     .attribute("id", "userID")
///     .with_identification_attributes(["userID"]);
/// assert_eq!(mapping.attribute_mappings().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ObjectMapping {
    entity: Arc<Entity>,
    attribute_mappings: IndexMap<String, AttributeMapping>,
    relationship_mappings: IndexMap<String, RelationshipMapping>,
    identification_attributes: Vec<String>,
    modification_attribute: Option<String>,
    maps_relationships_if_unmodified: bool,
    assigns_default_for_missing_attributes: bool,
    assigns_nil_for_missing_relationships: bool,
    forces_collection_mapping: bool,
    date_formats: Vec<String>,
    value_transformer: Option<Arc<dyn ValueTransformer>>,
    connections: Vec<Arc<ConnectionDescription>>,
    resolved_transformer: OnceLock<Arc<dyn ValueTransformer>>,
}

impl ObjectMapping {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            attribute_mappings: IndexMap::new(),
            relationship_mappings: IndexMap::new(),
            identification_attributes: Vec::new(),
            modification_attribute: None,
            maps_relationships_if_unmodified: false,
            assigns_default_for_missing_attributes: false,
            assigns_nil_for_missing_relationships: false,
            forces_collection_mapping: false,
            date_formats: Vec::new(),
            value_transformer: None,
            connections: Vec::new(),
            resolved_transformer: OnceLock::new(),
        }
    }

    // Builder methods

    pub fn attribute(self, source_key_path: impl Into<String>, destination_key_path: impl Into<String>) -> Self {
        self.attribute_mapping(AttributeMapping::new(source_key_path, destination_key_path))
    }

    /// Attributes whose source and destination names are identical
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self = self.attribute(name.clone(), name);
        }
        self
    }

    /// Attributes from `(source, destination)` pairs
    pub fn attributes_from<I, S, D>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        for (source, destination) in pairs {
            self = self.attribute(source, destination);
        }
        self
    }

    pub fn attribute_mapping(mut self, mapping: AttributeMapping) -> Self {
        let destination = mapping.destination_key_path().to_string();
        self.relationship_mappings.shift_remove(&destination);
        self.attribute_mappings.insert(destination, mapping);
        self
    }

    /// Map the key of each representation of a forced collection onto an
    /// attribute; also enables forced collection mapping
    pub fn attribute_from_key_of_representation(mut self, destination_key_path: impl Into<String>) -> Self {
        self.forces_collection_mapping = true;
        self.attribute_mapping(AttributeMapping::from_key_of_representation(destination_key_path))
    }

    pub fn relationship(
        self,
        source_key_path: impl Into<String>,
        destination_key_path: impl Into<String>,
        mapping: impl Into<Mapping>,
    ) -> Self {
        self.relationship_mapping(RelationshipMapping::new(source_key_path, destination_key_path, mapping))
    }

    pub fn relationship_mapping(mut self, mapping: RelationshipMapping) -> Self {
        let destination = mapping.destination_key_path().to_string();
        self.attribute_mappings.shift_remove(&destination);
        self.relationship_mappings.insert(destination, mapping);
        self
    }

    pub fn with_identification_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identification_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_modification_attribute(mut self, name: impl Into<String>) -> Self {
        self.modification_attribute = Some(name.into());
        self
    }

    pub fn with_maps_relationships_if_unmodified(mut self, enabled: bool) -> Self {
        self.maps_relationships_if_unmodified = enabled;
        self
    }

    pub fn with_assigns_default_for_missing_attributes(mut self, enabled: bool) -> Self {
        self.assigns_default_for_missing_attributes = enabled;
        self
    }

    pub fn with_assigns_nil_for_missing_relationships(mut self, enabled: bool) -> Self {
        self.assigns_nil_for_missing_relationships = enabled;
        self
    }

    pub fn with_forces_collection_mapping(mut self, enabled: bool) -> Self {
        self.forces_collection_mapping = enabled;
        self
    }

    /// Formats tried, in order, before the stock date parsing
    pub fn with_date_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_formats = formats.into_iter().map(Into::into).collect();
        self.resolved_transformer = OnceLock::new();
        self
    }

    /// Replace the stock transformer registry for this mapping
    pub fn with_value_transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.value_transformer = Some(transformer);
        self.resolved_transformer = OnceLock::new();
        self
    }

    pub fn with_connection(mut self, connection: ConnectionDescription) -> Self {
        self.connections.push(Arc::new(connection));
        self
    }

    // Accessors

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub fn attribute_mappings(&self) -> impl ExactSizeIterator<Item = &AttributeMapping> {
        self.attribute_mappings.values()
    }

    pub fn relationship_mappings(&self) -> impl ExactSizeIterator<Item = &RelationshipMapping> {
        self.relationship_mappings.values()
    }

    pub fn attribute_mapping_for(&self, destination_key_path: &str) -> Option<&AttributeMapping> {
        self.attribute_mappings.get(destination_key_path)
    }

    pub fn relationship_mapping_for(&self, destination_key_path: &str) -> Option<&RelationshipMapping> {
        self.relationship_mappings.get(destination_key_path)
    }

    pub fn identification_attributes(&self) -> &[String] {
        &self.identification_attributes
    }

    pub fn modification_attribute(&self) -> Option<&str> {
        self.modification_attribute.as_deref()
    }

    pub fn maps_relationships_if_unmodified(&self) -> bool {
        self.maps_relationships_if_unmodified
    }

    pub fn assigns_default_for_missing_attributes(&self) -> bool {
        self.assigns_default_for_missing_attributes
    }

    pub fn assigns_nil_for_missing_relationships(&self) -> bool {
        self.assigns_nil_for_missing_relationships
    }

    pub fn forces_collection_mapping(&self) -> bool {
        self.forces_collection_mapping
    }

    pub fn date_formats(&self) -> &[String] {
        &self.date_formats
    }

    pub fn connections(&self) -> &[Arc<ConnectionDescription>] {
        &self.connections
    }

    /// Destination attribute fed by the key of representation
    pub fn key_attribute(&self) -> Option<&str> {
        self.attribute_mappings
            .values()
            .find(|m| m.source_key_path().is_none())
            .map(AttributeMapping::destination_key_path)
    }

    /// The transformer used for attributes without their own
    pub fn value_transformer(&self) -> Arc<dyn ValueTransformer> {
        self.resolved_transformer
            .get_or_init(|| match &self.value_transformer {
                Some(transformer) => transformer.clone(),
                None => {
                    let mut compound = CompoundValueTransformer::default_transformer();
                    if !self.date_formats.is_empty() {
                        compound.add(built_in::date_formatter(self.date_formats.clone()));
                    }
                    Arc::new(compound)
                }
            })
            .clone()
    }

    /// Coerce a resolved source value to the declared class of the
    /// attribute's destination. Nulls, values already of that class and
    /// destinations that are not declared attributes pass through.
    pub fn transform_value(&self, attribute: &AttributeMapping, value: Value) -> TransformResult<Value> {
        let Some(kind) = self.entity.attribute_kind(attribute.destination_key_path()) else {
            return Ok(value);
        };
        if value.is_null() || value.kind() == kind {
            return Ok(value);
        }
        let transformer = attribute
            .value_transformer()
            .cloned()
            .unwrap_or_else(|| self.value_transformer());
        transformer.transform(&value, kind)
    }

    /// Substitute the `(attribute)` placeholder with the representation key
    pub fn expand_source_key_path(&self, source_key_path: &str, key: Option<&str>) -> String {
        match (self.key_attribute(), key) {
            (Some(attribute), Some(key)) => source_key_path.replace(&format!("({})", attribute), key),
            _ => source_key_path.to_string(),
        }
    }

    /// Split a forced-collection dictionary into one single-entry
    /// representation per key. `None` when the mapping does not force
    /// collections or the value is not a dictionary.
    pub fn collection_fragments(&self, representation: &Json) -> Option<Vec<Json>> {
        if !self.forces_collection_mapping {
            return None;
        }
        let map = representation.as_object()?;
        Some(
            map.iter()
                .map(|(key, value)| {
                    let mut single = serde_json::Map::new();
                    single.insert(key.clone(), value.clone());
                    Json::Object(single)
                })
                .collect(),
        )
    }

    /// Request mapping turning objects of this entity back into
    /// representations. Properties sourced from the key of representation
    /// or from pseudo-paths have no inverse and are left out.
    pub fn inverse_mapping(&self) -> RequestMapping {
        let mut inverse = RequestMapping::new(self.entity.name()).with_date_formats(self.date_formats.clone());
        for mapping in self.attribute_mappings.values() {
            let Some(source) = mapping.source_key_path() else {
                continue;
            };
            if is_pseudo_path(source) || source.contains('(') {
                continue;
            }
            inverse = inverse.attribute(mapping.destination_key_path(), source);
        }
        for mapping in self.relationship_mappings.values() {
            let (Some(source), Mapping::Object(nested)) = (mapping.source_key_path(), mapping.mapping()) else {
                continue;
            };
            inverse = inverse.relationship(mapping.destination_key_path(), source, nested.inverse_mapping());
        }
        inverse
    }
}

pub(crate) fn is_pseudo_path(path: &str) -> bool {
    [METADATA_PREFIX, PARENT_PREFIX, ROOT_PREFIX]
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{}.", prefix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssignmentPolicy;
    use crate::value::ValueKind;
    use serde_json::json;

    fn user() -> Arc<Entity> {
        Arc::new(
            Entity::new("User")
                .attribute("name", ValueKind::String)
                .attribute("email", ValueKind::String)
                .attribute("birthDate", ValueKind::Date)
                .to_many("friends", "User"),
        )
    }

    #[test]
    fn test_last_registration_wins() {
        let mapping = ObjectMapping::new(user())
            .attribute("name", "name")
            .attribute("full_name", "name");
        assert_eq!(mapping.attribute_mappings().len(), 1);
        assert_eq!(mapping.attribute_mapping_for("name").unwrap().source_key_path(), Some("full_name"));

        let nested = ObjectMapping::new(user()).attribute("name", "name");
        let mapping = mapping.relationship("name", "name", nested);
        assert_eq!(mapping.attribute_mappings().len(), 0);
        assert_eq!(mapping.relationship_mappings().len(), 1);
    }

    #[test]
    fn test_relationship_defaults_to_set_policy() {
        let friends = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user()).relationship_mapping(
            RelationshipMapping::new("friends", "friends", friends).with_assignment_policy(AssignmentPolicy::Union),
        );
        let relationship = mapping.relationship_mapping_for("friends").unwrap();
        assert_eq!(relationship.assignment_policy(), AssignmentPolicy::Union);
        assert!(matches!(relationship.mapping(), Mapping::Object(_)));
    }

    #[test]
    fn test_key_of_representation_and_placeholders() {
        let mapping = ObjectMapping::new(user())
            .attribute_from_key_of_representation("name")
            .attribute("(name).email", "email");
        assert!(mapping.forces_collection_mapping());
        assert_eq!(mapping.key_attribute(), Some("name"));
        assert_eq!(mapping.expand_source_key_path("(name).email", Some("blake")), "blake.email");

        let fragments = mapping
            .collection_fragments(&json!({"blake": {"email": "b@x"}, "rachit": {"email": "r@x"}}))
            .unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], json!({"blake": {"email": "b@x"}}));
    }

    #[test]
    fn test_date_formats_are_consulted_first() {
        let mapping = ObjectMapping::new(user()).with_date_formats(["%d.%m.%Y"]);
        let date = mapping
            .value_transformer()
            .transform(&Value::from("27.11.1982"), ValueKind::Date)
            .unwrap();
        assert_eq!(date.kind(), ValueKind::Date);
    }

    #[test]
    fn test_builder_changes_after_first_use_take_effect() {
        let mapping = ObjectMapping::new(user());
        assert!(mapping
            .value_transformer()
            .transform(&Value::from("27.11.1982"), ValueKind::Date)
            .is_err());

        let mapping = mapping.with_date_formats(["%d.%m.%Y"]);
        let date = mapping
            .value_transformer()
            .transform(&Value::from("27.11.1982"), ValueKind::Date)
            .unwrap();
        assert_eq!(date.kind(), ValueKind::Date);

        let identity = built_in::identity();
        let mapping = mapping.with_value_transformer(identity.clone());
        assert_eq!(mapping.value_transformer().name(), identity.name());
    }

    #[test]
    fn test_inverse_mapping_swaps_paths() {
        let friends = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user())
            .attribute("full_name", "name")
            .attribute("@metadata.mapping.collectionIndex", "email")
            .relationship("friends", "friends", friends);
        let inverse = mapping.inverse_mapping();
        assert_eq!(inverse.attributes(), &[("name".to_string(), "full_name".to_string())]);
        assert_eq!(inverse.relationships().len(), 1);
    }

    #[test]
    fn test_pseudo_paths() {
        assert!(is_pseudo_path("@metadata.mapping.collectionIndex"));
        assert!(is_pseudo_path("@parent.name"));
        assert!(is_pseudo_path("@root"));
        assert!(!is_pseudo_path("@rootless"));
    }
}
