//! Mapping one representation onto one object
//!
//! A [`MappingOperation`] runs synchronously on the calling thread: attributes
//! first, then relationships (each through a child operation), then
//! connections. Per-property failures are reported to the observer and
//! recorded in the [`MappingInfo`]; only structural failures are returned.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::info::{MappingInfo, PropertyOutcome};
use super::observer::MappingObserver;
use super::source::{CancellationToken, Metadata, SourceContext};
use crate::config::MappingOptions;
use crate::connection::Related;
use crate::data_source::MappingDataSource;
use crate::error::{AssignmentPolicy, Error, Result};
use crate::mapping::{AttributeMapping, Mapping, ObjectMapping, RelationshipMapping};
use crate::object::{Cardinality, ObjectRef, RelationshipDescriptor};
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a completed (or cancelled) pass
struct Mapped {
    mapping: Arc<ObjectMapping>,
    object: ObjectRef,
    is_new: bool,
    info: MappingInfo,
}

/// Maps one source representation onto one destination object.
///
/// Single use: a second call to [`perform_mapping`](Self::perform_mapping)
/// is a configuration error.
pub struct MappingOperation<'a> {
    representation: &'a Json,
    parent: Option<&'a SourceContext<'a>>,
    metadata: Metadata,
    mapping: Mapping,
    destination: Option<ObjectRef>,
    existing: Option<ObjectRef>,
    data_source: &'a dyn MappingDataSource,
    options: Arc<MappingOptions>,
    observer: Option<&'a dyn MappingObserver>,
    cancellation: CancellationToken,
    depth: usize,
    performed: bool,
    result: Option<Mapped>,
}

impl<'a> MappingOperation<'a> {
    pub fn new(representation: &'a Json, mapping: impl Into<Mapping>, data_source: &'a dyn MappingDataSource) -> Self {
        Self {
            representation,
            parent: None,
            metadata: Metadata::new(),
            mapping: mapping.into(),
            destination: None,
            existing: None,
            data_source,
            options: Arc::new(MappingOptions::default()),
            observer: None,
            cancellation: CancellationToken::new(),
            depth: 0,
            performed: false,
            result: None,
        }
    }

    /// Map onto this object instead of asking the data source
    pub fn with_destination(mut self, object: ObjectRef) -> Self {
        self.destination = Some(object);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Representation this one is nested in, for `@parent` and `@root`
    pub fn with_parent(mut self, parent: &'a SourceContext<'a>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_options(self, options: MappingOptions) -> Self {
        self.with_shared_options(Arc::new(options))
    }

    pub(crate) fn with_shared_options(mut self, options: Arc<MappingOptions>) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn MappingObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn with_existing(mut self, existing: Option<ObjectRef>) -> Self {
        self.existing = existing;
        self
    }

    fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Object the representation was mapped onto
    pub fn destination_object(&self) -> Option<&ObjectRef> {
        self.result.as_ref().map(|r| &r.object)
    }

    pub fn is_new_destination_object(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_new)
    }

    pub fn mapping_info(&self) -> Option<&MappingInfo> {
        self.result.as_ref().map(|r| &r.info)
    }

    /// Concrete mapping used, after dynamic resolution
    pub fn object_mapping(&self) -> Option<&Arc<ObjectMapping>> {
        self.result.as_ref().map(|r| &r.mapping)
    }

    /// Run the mapping. A dynamic mapping that matches nothing and a
    /// cancelled operation both finish with `Ok` and whatever was mapped.
    pub fn perform_mapping(&mut self) -> Result<()> {
        if self.performed {
            return Err(Error::Configuration {
                message: "mapping operation has already been performed".to_string(),
                source: None,
            });
        }
        self.performed = true;
        if self.depth > self.options.max_relationship_depth {
            return Err(Error::Configuration {
                message: format!(
                    "relationship nesting exceeds max_relationship_depth ({})",
                    self.options.max_relationship_depth
                ),
                source: None,
            });
        }

        let result = {
            let source = match self.parent {
                Some(parent) => SourceContext::nested(self.representation, parent, &self.metadata),
                None => SourceContext::new(self.representation, &self.metadata),
            };
            self.run(&source)?
        };
        self.result = result;
        Ok(())
    }

    fn run(&self, source: &SourceContext<'_>) -> Result<Option<Mapped>> {
        if self.is_cancelled() {
            return Ok(None);
        }
        let Some(mapping) = self.mapping.object_mapping_for(self.representation) else {
            log::debug!("No dynamic mapping matched representation; skipping");
            return Ok(None);
        };
        if self.mapping.is_dynamic() {
            if let Some(observer) = self.observer {
                observer.did_select_object_mapping(self.representation, &mapping);
            }
        }

        if !has_mappable_values(source, &mapping) {
            return Err(Error::MappingNotFound {
                key_paths: source_key_paths(&mapping),
            });
        }

        let (object, is_new) = match &self.destination {
            Some(object) => (object.clone(), false),
            None => {
                let destination = self
                    .data_source
                    .destination_object(source, &mapping, self.existing.as_ref())?;
                (destination.object, destination.is_new)
            }
        };
        log::trace!(
            "Mapping {} onto {} ({})",
            mapping.entity().name(),
            object.object_id(),
            if is_new { "new" } else { "existing" }
        );

        let mut info = MappingInfo::new(mapping.entity().name(), is_new);
        let unmodified = !is_new && self.is_unmodified(source, &mapping, &object);
        if unmodified && !mapping.maps_relationships_if_unmodified() {
            log::debug!("{} is unmodified; skipping", object.object_id());
            return Ok(Some(Mapped { mapping, object, is_new, info }));
        }

        if !unmodified && !self.is_cancelled() {
            self.map_attributes(source, &mapping, &object, &mut info)?;
        }
        if is_new || info.has_set_properties() {
            self.data_source.did_map_attributes(&object, is_new)?;
        }

        for relationship in mapping.relationship_mappings() {
            if self.is_cancelled() {
                break;
            }
            self.map_relationship(source, &mapping, &object, relationship, &mut info)?;
        }

        self.map_connections(&mapping, &object, &mut info);
        Ok(Some(Mapped { mapping, object, is_new, info }))
    }

    fn is_unmodified(&self, source: &SourceContext<'_>, mapping: &ObjectMapping, object: &ObjectRef) -> bool {
        let Some(key) = mapping.modification_attribute() else {
            return false;
        };
        let Some(attribute) = mapping.attribute_mapping_for(key) else {
            return false;
        };
        let Some(value) = source.attribute_value(mapping, attribute) else {
            return false;
        };
        match (mapping.transform_value(attribute, value), object.value(key)) {
            (Ok(value), Some(current)) => value.is_equivalent(&current),
            _ => false,
        }
    }

    fn map_attributes(
        &self,
        source: &SourceContext<'_>,
        mapping: &ObjectMapping,
        object: &ObjectRef,
        info: &mut MappingInfo,
    ) -> Result<()> {
        for attribute in mapping.attribute_mappings() {
            let key = attribute.destination_key_path();
            let path = attribute.source_key_path().unwrap_or(key);
            let value = match source.attribute_value(mapping, attribute) {
                Some(value) => {
                    self.notify(|o| o.did_find_value(path, &value));
                    value
                }
                None => {
                    self.notify(|o| o.did_not_find_value(path));
                    if !mapping.assigns_default_for_missing_attributes() {
                        info.record(key, PropertyOutcome::NotFound);
                        continue;
                    }
                    mapping
                        .entity()
                        .attributes()
                        .get(key)
                        .and_then(|a| a.default.clone())
                        .unwrap_or(Value::Null)
                }
            };

            let value = match self.transform(mapping, attribute, value) {
                Ok(value) => value,
                Err(error) if self.options.abort_on_transformation_failure => return Err(error),
                Err(error) => {
                    log::warn!("Skipping {}.{}: {}", mapping.entity().name(), key, error);
                    self.notify(|o| o.did_fail_mapping_property(object, key, &error));
                    info.record(key, PropertyOutcome::Failed(error.to_string()));
                    continue;
                }
            };
            let outcome = self.set_attribute(object, key, value);
            info.record(key, outcome);
        }
        Ok(())
    }

    fn transform(&self, mapping: &ObjectMapping, attribute: &AttributeMapping, value: Value) -> Result<Value> {
        mapping
            .transform_value(attribute, value)
            .map_err(|source| Error::Transformation {
                key_path: attribute.destination_key_path().to_string(),
                source,
            })
    }

    fn set_attribute(&self, object: &ObjectRef, key: &str, value: Value) -> PropertyOutcome {
        if self.options.skip_unchanged_values {
            let unchanged = match object.value(key) {
                Some(current) => current.is_equivalent(&value),
                None => value.is_null(),
            };
            if unchanged {
                self.notify(|o| o.did_not_set_unchanged_value(object, key, &value));
                return PropertyOutcome::Unchanged;
            }
        }
        self.notify(|o| o.will_set_value(object, key, &value));
        match object.set_value(key, value.clone()) {
            Ok(()) => {
                self.notify(|o| o.did_set_value(object, key, &value));
                PropertyOutcome::Set
            }
            Err(error) => {
                log::warn!("Failed to set {} on {}: {}", key, object.object_id(), error);
                self.notify(|o| o.did_fail_mapping_property(object, key, &error));
                PropertyOutcome::Failed(error.to_string())
            }
        }
    }

    fn map_relationship(
        &self,
        source: &SourceContext<'_>,
        mapping: &ObjectMapping,
        object: &ObjectRef,
        relationship: &RelationshipMapping,
        info: &mut MappingInfo,
    ) -> Result<()> {
        let key = relationship.destination_key_path();
        let Some(descriptor) = mapping.entity().relationship(key).cloned() else {
            let error = Error::UnknownProperty {
                entity: mapping.entity().name().to_string(),
                key: key.to_string(),
            };
            self.notify(|o| o.did_fail_mapping_property(object, key, &error));
            info.record(key, PropertyOutcome::Failed(error.to_string()));
            return Ok(());
        };

        let nested = match relationship.source_key_path() {
            None => Some(source.representation().clone()),
            Some(path) => source.json_for_key_path(&mapping.expand_source_key_path(path, source.representation_key(mapping))),
        };
        let path = relationship.source_key_path().unwrap_or(key);
        let nested = match nested {
            Some(nested) => {
                self.notify(|o| o.did_find_value(path, &Value::from(&nested)));
                nested
            }
            None => {
                self.notify(|o| o.did_not_find_value(path));
                if mapping.assigns_nil_for_missing_relationships() {
                    let outcome = self.assign_relationship(object, key, &descriptor, AssignmentPolicy::Set, Value::Null)?;
                    info.record(key, outcome);
                } else {
                    info.record(key, PropertyOutcome::NotFound);
                }
                return Ok(());
            }
        };

        let policy = relationship.assignment_policy();
        let existing = object.value(key);
        let hint = |index: Option<usize>| -> Option<ObjectRef> {
            if policy == AssignmentPolicy::Union {
                return None;
            }
            match (&existing, index) {
                (Some(Value::Object(current)), None) => Some(current.clone()),
                (Some(current), Some(index)) => current.as_collection()?.get(index)?.as_object().cloned(),
                _ => None,
            }
        };

        let value = if nested.is_null() {
            Value::Null
        } else if let Some(elements) = self.collection_elements(relationship.mapping(), &nested) {
            let mut objects = Vec::with_capacity(elements.len());
            let mut children = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                if let Some((child, child_info)) =
                    self.map_nested(source, element, relationship.mapping(), object, Some(index), hint(Some(index)))?
                {
                    objects.push(child);
                    children.push(child_info);
                }
            }
            info.record_relationship(key, children);
            match descriptor.cardinality {
                Cardinality::ToMany { .. } => descriptor.collection_of(objects),
                Cardinality::ToOne => Value::Array(objects.into_iter().map(Value::Object).collect()),
            }
        } else {
            match self.map_nested(source, &nested, relationship.mapping(), object, None, hint(None))? {
                Some((child, child_info)) => {
                    info.record_relationship(key, vec![child_info]);
                    match descriptor.cardinality {
                        Cardinality::ToMany { .. } => descriptor.collection_of(vec![child]),
                        Cardinality::ToOne => Value::Object(child),
                    }
                }
                None => {
                    info.record(key, PropertyOutcome::NotFound);
                    return Ok(());
                }
            }
        };

        let outcome = self.assign_relationship(object, key, &descriptor, policy, value)?;
        info.record(key, outcome);
        Ok(())
    }

    /// Elements of a to-many representation, decided by its runtime shape
    fn collection_elements(&self, mapping: &Mapping, nested: &Json) -> Option<Vec<Json>> {
        if let Json::Array(items) = nested {
            return Some(items.clone());
        }
        mapping.as_object().and_then(|m| m.collection_fragments(nested))
    }

    fn map_nested(
        &self,
        source: &SourceContext<'_>,
        representation: &Json,
        mapping: &Mapping,
        parent: &ObjectRef,
        index: Option<usize>,
        existing: Option<ObjectRef>,
    ) -> Result<Option<(ObjectRef, MappingInfo)>> {
        let mut child = MappingOperation::new(representation, mapping.clone(), self.data_source)
            .with_parent(source)
            .with_metadata(source.metadata().child(index, parent.clone()))
            .with_shared_options(self.options.clone())
            .with_cancellation_token(self.cancellation.clone())
            .with_existing(existing)
            .with_depth(self.depth + 1);
        if let Some(observer) = self.observer {
            child = child.with_observer(observer);
        }
        match child.perform_mapping() {
            Ok(()) => Ok(child.result.map(|r| (r.object, r.info))),
            Err(Error::MappingNotFound { .. }) => {
                log::trace!("Nested representation at index {:?} has nothing mappable; skipping", index);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Write a relationship value under an assignment policy. Equivalent
    /// values are never rewritten.
    fn assign_relationship(
        &self,
        object: &ObjectRef,
        key: &str,
        descriptor: &RelationshipDescriptor,
        policy: AssignmentPolicy,
        value: Value,
    ) -> Result<PropertyOutcome> {
        let existing = object.value(key).unwrap_or(Value::Null);
        let value = match policy {
            AssignmentPolicy::Union => {
                if !descriptor.cardinality.is_to_many() {
                    return Err(Error::UnsupportedAssignmentPolicy {
                        relationship: key.to_string(),
                        policy,
                        message: "union requires a to-many relationship".to_string(),
                    });
                }
                let mut seen = HashSet::new();
                let merged: Vec<ObjectRef> = existing
                    .objects()
                    .into_iter()
                    .chain(value.objects())
                    .filter(|o| seen.insert(o.object_id()))
                    .collect();
                descriptor.collection_of(merged)
            }
            AssignmentPolicy::Set | AssignmentPolicy::Replace => value,
        };

        if value.is_equivalent(&existing) {
            self.notify(|o| o.did_not_set_unchanged_value(object, key, &value));
            return Ok(PropertyOutcome::Unchanged);
        }

        self.notify(|o| o.will_set_value(object, key, &value));
        if let Err(error) = object.set_value(key, value.clone()) {
            log::warn!("Failed to set relationship {} on {}: {}", key, object.object_id(), error);
            self.notify(|o| o.did_fail_mapping_property(object, key, &error));
            return Ok(PropertyOutcome::Failed(error.to_string()));
        }
        self.notify(|o| o.did_set_value(object, key, &value));

        if policy == AssignmentPolicy::Replace {
            let kept: HashSet<_> = value.objects().iter().map(|o| o.object_id()).collect();
            for orphan in existing.objects().into_iter().filter(|o| !kept.contains(&o.object_id())) {
                log::debug!("Deleting orphaned {} from {}", orphan.object_id(), key);
                self.data_source.delete_object(&orphan)?;
            }
        }
        Ok(PropertyOutcome::Set)
    }

    fn map_connections(&self, mapping: &ObjectMapping, object: &ObjectRef, info: &mut MappingInfo) {
        for connection in mapping.connections() {
            if self.is_cancelled() {
                return;
            }
            let Some(resolver) = self.data_source.connection_resolver_for(connection) else {
                log::warn!(
                    "No connection resolver for {}.{}; skipping",
                    mapping.entity().name(),
                    connection.relationship()
                );
                continue;
            };
            let related = match resolver.find_connected(object, connection) {
                Ok(Related::None) => {
                    log::trace!("Nothing to connect for {}", connection.relationship());
                    continue;
                }
                Ok(related) => related,
                Err(error) => {
                    log::debug!("Failed to connect {}: {}", connection.relationship(), error);
                    self.notify(|o| o.did_fail_connecting(object, connection, &error));
                    continue;
                }
            };
            let descriptor = connection.descriptor();
            let value = match &related {
                Related::One(target) if !descriptor.cardinality.is_to_many() => Value::Object(target.clone()),
                other => descriptor.collection_of(other.objects()),
            };
            match self.assign_relationship(object, connection.relationship(), descriptor, connection.assignment_policy(), value) {
                Ok(outcome) => {
                    info.record_connection(connection.relationship(), outcome);
                    self.notify(|o| o.did_connect_relationship(object, connection, &related));
                }
                Err(error) => self.notify(|o| o.did_fail_connecting(object, connection, &error)),
            }
        }
    }

    fn notify<F>(&self, event: F)
    where
        F: FnOnce(&dyn MappingObserver),
    {
        if let Some(observer) = self.observer {
            event(observer);
        }
    }
}

impl std::fmt::Debug for MappingOperation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingOperation")
            .field("mapping", &self.mapping)
            .field("depth", &self.depth)
            .field("performed", &self.performed)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Whether any property mapping finds something in the representation
fn has_mappable_values(source: &SourceContext<'_>, mapping: &ObjectMapping) -> bool {
    let key = source.representation_key(mapping);
    mapping
        .attribute_mappings()
        .any(|attribute| source.attribute_value(mapping, attribute).is_some())
        || mapping.relationship_mappings().any(|relationship| match relationship.source_key_path() {
            None => true,
            Some(path) => source
                .json_for_key_path(&mapping.expand_source_key_path(path, key))
                .is_some(),
        })
}

fn source_key_paths(mapping: &ObjectMapping) -> Vec<Option<String>> {
    mapping
        .attribute_mappings()
        .map(|a| a.source_key_path().map(str::to_string))
        .chain(mapping.relationship_mappings().map(|r| r.source_key_path().map(str::to_string)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::ObjectDataSource;
    use crate::mapping::{DynamicMapping, Matcher};
    use crate::object::{Entity, Record};
    use crate::value::ValueKind;
    use serde_json::json;
    use std::cell::RefCell;

    fn user() -> Arc<Entity> {
        Arc::new(
            Entity::new("User")
                .attribute("name", ValueKind::String)
                .attribute("age", ValueKind::Integer)
                .attribute_with_default("role", ValueKind::String, Value::from("member"))
                .attribute("index", ValueKind::Integer)
                .to_one("best_friend", "User")
                .to_many("friends", "User"),
        )
    }

    fn map(doc: &Json, mapping: impl Into<Mapping>, destination: Option<ObjectRef>) -> Result<MappingOperation<'_>> {
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut op = MappingOperation::new(doc, mapping, &SOURCE);
        if let Some(destination) = destination {
            op = op.with_destination(destination);
        }
        op.perform_mapping()?;
        Ok(op)
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl MappingObserver for Recorder {
        fn did_not_find_value(&self, key_path: &str) {
            self.events.borrow_mut().push(format!("missing {}", key_path));
        }

        fn did_set_value(&self, _object: &ObjectRef, key: &str, _value: &Value) {
            self.events.borrow_mut().push(format!("set {}", key));
        }

        fn did_not_set_unchanged_value(&self, _object: &ObjectRef, key: &str, _value: &Value) {
            self.events.borrow_mut().push(format!("unchanged {}", key));
        }
    }

    #[test]
    fn test_maps_and_transforms_attributes() {
        let doc = json!({"name": "Blake", "age": "31"});
        let op = map(&doc, ObjectMapping::new(user()).attributes(["name", "age"]), None).unwrap();
        let object = op.destination_object().unwrap();
        assert!(op.is_new_destination_object());
        assert_eq!(object.value("name"), Some(Value::from("Blake")));
        assert_eq!(object.value("age"), Some(Value::from(31)));
    }

    #[test]
    fn test_second_pass_reports_unchanged() {
        let doc = json!({"name": "Blake", "age": 31, "friends": [{"name": "Rachit"}]});
        let friends = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = Arc::new(ObjectMapping::new(user()).attributes(["name", "age"]).relationship("friends", "friends", friends));
        let object = Record::create(user());

        map(&doc, mapping.clone(), Some(object.clone())).unwrap();
        let first_friends = object.value("friends").unwrap();

        let recorder = Recorder::default();
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut op = MappingOperation::new(&doc, mapping, &SOURCE)
            .with_destination(object.clone())
            .with_observer(&recorder);
        op.perform_mapping().unwrap();

        let info = op.mapping_info().unwrap();
        assert!(info.all_unchanged());
        assert_eq!(info.outcome("friends"), Some(&PropertyOutcome::Unchanged));
        assert!(recorder.events.borrow().iter().all(|e| !e.starts_with("set ")));
        assert!(object.value("friends").unwrap().is_equivalent(&first_friends));
    }

    #[test]
    fn test_missing_values_are_not_written() {
        let doc = json!({"name": "Blake"});
        let recorder = Recorder::default();
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut op = MappingOperation::new(&doc, ObjectMapping::new(user()).attributes(["name", "age"]), &SOURCE)
            .with_observer(&recorder);
        op.perform_mapping().unwrap();
        let object = op.destination_object().unwrap();
        assert!(object.value("age").is_none());
        assert_eq!(op.mapping_info().unwrap().outcome("age"), Some(&PropertyOutcome::NotFound));
        assert!(recorder.events.borrow().contains(&"missing age".to_string()));
    }

    #[test]
    fn test_defaults_for_missing_attributes() {
        let doc = json!({"name": "Blake"});
        let mapping = ObjectMapping::new(user())
            .attributes(["name", "role"])
            .with_assigns_default_for_missing_attributes(true);
        let op = map(&doc, mapping, None).unwrap();
        assert_eq!(op.destination_object().unwrap().value("role"), Some(Value::from("member")));
    }

    #[test]
    fn test_null_clears_attribute() {
        let object = Record::create(user());
        object.set_value("name", Value::from("Blake")).unwrap();
        let doc = json!({"name": null});
        map(&doc, ObjectMapping::new(user()).attributes(["name"]), Some(object.clone())).unwrap();
        assert_eq!(object.value("name"), Some(Value::Null));
    }

    #[test]
    fn test_transformation_failure_skips_or_aborts() {
        let doc = json!({"name": "Blake", "age": "thirty"});
        let mapping = Arc::new(ObjectMapping::new(user()).attributes(["name", "age"]));
        let op = map(&doc, mapping.clone(), None).unwrap();
        let info = op.mapping_info().unwrap();
        assert!(matches!(info.outcome("age"), Some(PropertyOutcome::Failed(_))));
        assert_eq!(info.outcome("name"), Some(&PropertyOutcome::Set));

        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut strict = MappingOperation::new(&doc, mapping, &SOURCE)
            .with_options(MappingOptions::default().with_abort_on_transformation_failure(true));
        let err = strict.perform_mapping().unwrap_err();
        assert!(matches!(err, Error::Transformation { .. }));
    }

    #[test]
    fn test_nothing_mappable_is_not_found() {
        let doc = json!({"unrelated": true});
        let err = map(&doc, ObjectMapping::new(user()).attributes(["name"]), None).unwrap_err();
        match err {
            Error::MappingNotFound { key_paths } => assert_eq!(key_paths, vec![Some("name".to_string())]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_not_restartable() {
        let doc = json!({"name": "Blake"});
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut op = MappingOperation::new(&doc, ObjectMapping::new(user()).attributes(["name"]), &SOURCE);
        op.perform_mapping().unwrap();
        assert!(matches!(op.perform_mapping(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_runtime_collection_and_metadata() {
        let doc = json!({"name": "Blake", "friends": [{"name": "a"}, {"name": "b"}]});
        let friend = ObjectMapping::new(user())
            .attributes(["name"])
            .attribute("@metadata.mapping.collectionIndex", "index")
            .attribute("@parent.name", "role");
        let mapping = ObjectMapping::new(user()).attributes(["name"]).relationship("friends", "best_friend", friend);
        let op = map(&doc, mapping, None).unwrap();
        let object = op.destination_object().unwrap();
        let value = object.value("best_friend").unwrap();
        let friends = value.objects();
        assert_eq!(friends.len(), 2);
        assert_eq!(friends[1].value("index"), Some(Value::from(1)));
        assert_eq!(friends[0].value("role"), Some(Value::from("Blake")));
        assert_eq!(op.mapping_info().unwrap().relationship("best_friend").unwrap().len(), 2);
    }

    #[test]
    fn test_single_dictionary_under_to_many_maps_one_object() {
        let doc = json!({"name": "Blake", "friends": {"name": "Rachit"}});
        let friend = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user()).attributes(["name"]).relationship("friends", "friends", friend);
        let op = map(&doc, mapping, None).unwrap();
        let friends = op.destination_object().unwrap().value("friends").unwrap();
        assert_eq!(friends.kind(), ValueKind::Set);
        let friends = friends.objects();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].value("name"), Some(Value::from("Rachit")));
        assert_eq!(op.mapping_info().unwrap().relationship("friends").unwrap().len(), 1);
    }

    #[test]
    fn test_one_element_array_under_to_one_maps_a_collection() {
        let doc = json!({"name": "Blake", "friend": [{"name": "Rachit"}]});
        let friend = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user()).attributes(["name"]).relationship("friend", "best_friend", friend);
        let op = map(&doc, mapping, None).unwrap();
        let value = op.destination_object().unwrap().value("best_friend").unwrap();
        assert_eq!(value.kind(), ValueKind::Array);
        let friends = value.objects();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].value("name"), Some(Value::from("Rachit")));
    }

    #[test]
    fn test_union_merges_and_rejects_to_one() {
        let friend_mapping = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user()).relationship_mapping(
            RelationshipMapping::new("friends", "friends", friend_mapping.clone()).with_assignment_policy(AssignmentPolicy::Union),
        );
        let object = Record::create(user());
        let a = Record::create(user());
        object.set_value("friends", Value::set_of(vec![Value::Object(a.clone())])).unwrap();

        let doc = json!({"friends": [{"name": "b"}]});
        map(&doc, mapping, Some(object.clone())).unwrap();
        let friends = object.value("friends").unwrap().objects();
        assert_eq!(friends.len(), 2);
        assert_eq!(friends[0].object_id(), a.object_id());

        let to_one = ObjectMapping::new(user()).relationship_mapping(
            RelationshipMapping::new("friend", "best_friend", friend_mapping).with_assignment_policy(AssignmentPolicy::Union),
        );
        let doc = json!({"friend": {"name": "c"}});
        let err = map(&doc, to_one, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAssignmentPolicy { .. }));
    }

    #[test]
    fn test_missing_relationship_assigns_nil_when_asked() {
        let object = Record::create(user());
        object.set_value("best_friend", Value::Object(Record::create(user()))).unwrap();
        let friend = ObjectMapping::new(user()).attributes(["name"]);
        let mapping = ObjectMapping::new(user())
            .attributes(["name"])
            .relationship("friend", "best_friend", friend)
            .with_assigns_nil_for_missing_relationships(true);
        let doc = json!({"name": "Blake"});
        map(&doc, mapping, Some(object.clone())).unwrap();
        assert_eq!(object.value("best_friend"), Some(Value::Null));
    }

    #[test]
    fn test_dynamic_mapping_without_match_is_skipped() {
        let dynamic = DynamicMapping::new().matcher(Matcher::key_value(
            "type",
            "admin",
            ObjectMapping::new(user()).attributes(["name"]),
        ));
        let doc = json!({"type": "guest", "name": "x"});
        let op = map(&doc, dynamic, None).unwrap();
        assert!(op.destination_object().is_none());
    }

    #[test]
    fn test_modification_attribute_skips_unmodified() {
        let entity = Arc::new(
            Entity::new("Post")
                .attribute("title", ValueKind::String)
                .attribute("updated", ValueKind::Integer),
        );
        let mapping = Arc::new(
            ObjectMapping::new(entity.clone())
                .attributes(["title", "updated"])
                .with_modification_attribute("updated"),
        );
        let object = Record::create(entity);
        object.set_value("title", Value::from("old")).unwrap();
        object.set_value("updated", Value::from(5)).unwrap();

        let doc = json!({"title": "new", "updated": 5});
        map(&doc, mapping.clone(), Some(object.clone())).unwrap();
        assert_eq!(object.value("title"), Some(Value::from("old")));

        let doc = json!({"title": "new", "updated": 6});
        map(&doc, mapping, Some(object.clone())).unwrap();
        assert_eq!(object.value("title"), Some(Value::from("new")));
    }

    #[test]
    fn test_cancelled_operation_is_not_an_error() {
        let doc = json!({"name": "Blake"});
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let token = CancellationToken::new();
        token.cancel();
        let mut op = MappingOperation::new(&doc, ObjectMapping::new(user()).attributes(["name"]), &SOURCE)
            .with_cancellation_token(token);
        op.perform_mapping().unwrap();
        assert!(op.is_cancelled());
        assert!(op.destination_object().is_none());
    }

    #[test]
    fn test_depth_limit() {
        let doc = json!({"friend": {"friend": {"name": "deep"}}});
        let inner = ObjectMapping::new(user()).attributes(["name"]);
        let middle = ObjectMapping::new(user()).relationship("friend", "best_friend", inner);
        let outer = ObjectMapping::new(user()).relationship("friend", "best_friend", middle);
        static SOURCE: ObjectDataSource = ObjectDataSource;
        let mut op = MappingOperation::new(&doc, outer, &SOURCE)
            .with_options(MappingOptions::default().with_max_relationship_depth(1));
        assert!(matches!(op.perform_mapping(), Err(Error::Configuration { .. })));
    }
}
