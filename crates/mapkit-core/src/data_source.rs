//! Destination object supply for mapping operations
//!
//! A [`MappingDataSource`] decides which object a representation maps onto.
//! [`ObjectDataSource`] always builds fresh records; [`ManagedObjectDataSource`]
//! finds existing objects by their identification attributes before
//! inserting new ones into an [`ObjectContext`].
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::cache::{AttributeValues, EntityCache, InMemoryObjectCache, ManagedObjectCaching};
use crate::connection::{ConnectionDescription, ConnectionResolver, EntityCacheConnectionResolver};
use crate::error::{Error, Result};
use crate::mapping::ObjectMapping;
use crate::object::{ObjectRef, Record};
use crate::operation::SourceContext;
use crate::store::ObjectContext;
use crate::value::Value;
use std::sync::Arc;

/// Object chosen for a representation
#[derive(Debug, Clone)]
pub struct Destination {
    pub object: ObjectRef,
    pub is_new: bool,
}

impl Destination {
    pub fn existing(object: ObjectRef) -> Self {
        Self { object, is_new: false }
    }

    pub fn created(object: ObjectRef) -> Self {
        Self { object, is_new: true }
    }
}

/// Supplies destination objects and resolves connections
pub trait MappingDataSource: Send + Sync {
    /// Object `source` maps onto. `existing` is the object currently held by
    /// the relationship being mapped, if any.
    fn destination_object(
        &self,
        source: &SourceContext<'_>,
        mapping: &ObjectMapping,
        existing: Option<&ObjectRef>,
    ) -> Result<Destination>;

    /// Called once the attributes of `object` are mapped, for new objects and
    /// for existing ones with at least one attribute written
    fn did_map_attributes(&self, _object: &ObjectRef, _is_new: bool) -> Result<()> {
        Ok(())
    }

    /// Called for objects orphaned by a replace assignment
    fn delete_object(&self, _object: &ObjectRef) -> Result<()> {
        Ok(())
    }

    fn connection_resolver_for(&self, _connection: &ConnectionDescription) -> Option<Arc<dyn ConnectionResolver>> {
        None
    }
}

/// Builds plain [`Record`]s, reusing the existing relationship target when
/// it is of the mapped entity
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectDataSource;

impl ObjectDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl MappingDataSource for ObjectDataSource {
    fn destination_object(
        &self,
        _source: &SourceContext<'_>,
        mapping: &ObjectMapping,
        existing: Option<&ObjectRef>,
    ) -> Result<Destination> {
        if let Some(existing) = existing {
            if existing.entity().name() == mapping.entity().name() {
                return Ok(Destination::existing(existing.clone()));
            }
        }
        Ok(Destination::created(Record::create(mapping.entity().clone())))
    }
}

/// Find-or-create against an [`ObjectContext`]
pub struct ManagedObjectDataSource {
    context: Arc<ObjectContext>,
    cache: Arc<dyn ManagedObjectCaching>,
    resolver: Option<Arc<dyn ConnectionResolver>>,
}

impl ManagedObjectDataSource {
    pub fn new(context: Arc<ObjectContext>, cache: Arc<dyn ManagedObjectCaching>) -> Self {
        Self {
            context,
            cache,
            resolver: None,
        }
    }

    /// Lookups and connections both served by one entity cache
    pub fn with_entity_cache(context: Arc<ObjectContext>, entity_cache: Arc<EntityCache>) -> Self {
        let resolver = EntityCacheConnectionResolver::new(entity_cache.clone(), context.clone());
        Self::new(context, Arc::new(InMemoryObjectCache::new(entity_cache))).with_connection_resolver(Arc::new(resolver))
    }

    pub fn with_connection_resolver(mut self, resolver: Arc<dyn ConnectionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn context(&self) -> &Arc<ObjectContext> {
        &self.context
    }

    /// Identification values read from the representation and coerced to
    /// their declared kinds; `None` when any of them is missing
    fn identification_values(&self, source: &SourceContext<'_>, mapping: &ObjectMapping) -> Result<Option<AttributeValues>> {
        let mut values = AttributeValues::new();
        for attribute in mapping.identification_attributes() {
            let Some(attribute_mapping) = mapping.attribute_mapping_for(attribute) else {
                return Err(Error::Configuration {
                    message: format!(
                        "identification attribute '{}' of {} has no attribute mapping",
                        attribute,
                        mapping.entity().name()
                    ),
                    source: None,
                });
            };
            let value = match source.attribute_value(mapping, attribute_mapping) {
                None | Some(Value::Null) => return Ok(None),
                Some(value) => value,
            };
            let value = mapping
                .transform_value(attribute_mapping, value)
                .map_err(|source| Error::Transformation {
                    key_path: attribute.clone(),
                    source,
                })?;
            values.insert(attribute.clone(), value);
        }
        Ok(Some(values))
    }

    fn insert(&self, mapping: &ObjectMapping, values: Option<AttributeValues>) -> Result<Destination> {
        let object = self.context.insert_entity(mapping.entity().clone())?;
        for (key, value) in values.into_iter().flatten() {
            object.set_value(&key, value)?;
        }
        log::trace!("Inserted {} for {}", object.object_id(), mapping.entity().name());
        Ok(Destination::created(object))
    }
}

impl MappingDataSource for ManagedObjectDataSource {
    fn destination_object(
        &self,
        source: &SourceContext<'_>,
        mapping: &ObjectMapping,
        existing: Option<&ObjectRef>,
    ) -> Result<Destination> {
        if mapping.identification_attributes().is_empty() {
            if let Some(existing) = existing.filter(|e| e.entity().name() == mapping.entity().name()) {
                return Ok(Destination::existing(existing.clone()));
            }
            return self.insert(mapping, None);
        }

        let Some(values) = self.identification_values(source, mapping)? else {
            log::debug!(
                "Representation lacks identification attributes of {}; inserting",
                mapping.entity().name()
            );
            return self.insert(mapping, None);
        };

        let found = self.cache.managed_objects(mapping.entity(), &values, &self.context)?;
        match found.into_iter().min_by_key(|o| o.object_id()) {
            Some(object) => {
                log::trace!("Found existing {} for {}", object.object_id(), mapping.entity().name());
                Ok(Destination::existing(object))
            }
            None => self.insert(mapping, Some(values)),
        }
    }

    /// New objects are reported to the cache only now, so indexes keyed on
    /// non-identification attributes see their mapped values
    fn did_map_attributes(&self, object: &ObjectRef, is_new: bool) -> Result<()> {
        if is_new {
            self.cache.did_create_object(object)
        } else {
            self.cache.did_update_object(object)
        }
    }

    fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.cache.did_delete_object(object)?;
        self.context.delete(object)
    }

    fn connection_resolver_for(&self, _connection: &ConnectionDescription) -> Option<Arc<dyn ConnectionResolver>> {
        self.resolver.clone()
    }
}

impl std::fmt::Debug for ManagedObjectDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObjectDataSource")
            .field("context", &self.context)
            .field("has_connection_resolver", &self.resolver.is_some())
            .finish()
    }
}
