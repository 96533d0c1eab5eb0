//! Find-or-create lookup strategies for managed objects
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::{AttributeValues, EntityCache};
use crate::error::Result;
use crate::object::{Entity, ObjectRef};
use crate::predicate::Predicate;
use crate::store::ObjectContext;
use std::sync::Arc;

/// Lookup of existing managed objects by attribute values.
///
/// The managed data source consults this before inserting, and reports the
/// objects it creates and deletes so an index can stay current.
pub trait ManagedObjectCaching: Send + Sync {
    fn managed_objects(
        &self,
        entity: &Entity,
        attribute_values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Vec<ObjectRef>>;

    fn did_create_object(&self, _object: &ObjectRef) -> Result<()> {
        Ok(())
    }

    /// An existing object had attributes rewritten
    fn did_update_object(&self, _object: &ObjectRef) -> Result<()> {
        Ok(())
    }

    fn did_delete_object(&self, _object: &ObjectRef) -> Result<()> {
        Ok(())
    }
}

/// Lookups served from an [`EntityCache`], loading attribute caches on
/// first use
#[derive(Debug)]
pub struct InMemoryObjectCache {
    entity_cache: Arc<EntityCache>,
}

impl InMemoryObjectCache {
    pub fn new(entity_cache: Arc<EntityCache>) -> Self {
        Self { entity_cache }
    }

    pub fn entity_cache(&self) -> &Arc<EntityCache> {
        &self.entity_cache
    }
}

impl ManagedObjectCaching for InMemoryObjectCache {
    fn managed_objects(
        &self,
        entity: &Entity,
        attribute_values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Vec<ObjectRef>> {
        let attributes: Vec<String> = attribute_values.keys().cloned().collect();
        let cache = self
            .entity_cache
            .cache_objects_for_entity(entity.name(), &attributes, true)?;
        cache.objects_with_attribute_values(attribute_values, context)
    }

    fn did_create_object(&self, object: &ObjectRef) -> Result<()> {
        self.entity_cache.add_objects(std::slice::from_ref(object))
    }

    /// Re-adding moves the object to its current key in every loaded cache
    fn did_update_object(&self, object: &ObjectRef) -> Result<()> {
        self.entity_cache.add_objects(std::slice::from_ref(object))
    }

    fn did_delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.entity_cache.remove_objects(std::slice::from_ref(object))
    }
}

/// Lookups answered by fetching through the context every time
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchObjectCache;

impl FetchObjectCache {
    pub fn new() -> Self {
        Self
    }
}

/// Equality clause per attribute, IN for collection values
pub(crate) fn predicate_for_attribute_values(values: &AttributeValues) -> Predicate {
    let clauses = values
        .iter()
        .map(|(key, value)| match value.as_collection() {
            Some(items) => Predicate::in_values(key.clone(), items.to_vec()),
            None => Predicate::equals(key.clone(), value.clone()),
        })
        .collect();
    Predicate::and(clauses)
}

impl ManagedObjectCaching for FetchObjectCache {
    fn managed_objects(
        &self,
        entity: &Entity,
        attribute_values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Vec<ObjectRef>> {
        let predicate = predicate_for_attribute_values(attribute_values);
        log::trace!("Fetching {} matching {:?}", entity.name(), predicate);
        context.fetch(entity.name(), Some(&predicate), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::attribute_values;
    use crate::object::Schema;
    use crate::queue::SerialQueue;
    use crate::store::ObjectStore;
    use crate::value::{Value, ValueKind};

    fn context() -> (Arc<ObjectStore>, ObjectContext) {
        let schema = Schema::new().with_entity(
            Entity::new("Event")
                .attribute("eventID", ValueKind::String)
                .attribute("title", ValueKind::String),
        );
        let store = Arc::new(ObjectStore::new(Arc::new(schema)));
        let context = ObjectContext::new(store.clone());
        for id in ["a", "b"] {
            let event = context.insert("Event").unwrap();
            event.set_value("eventID", Value::from(id)).unwrap();
        }
        context.save().unwrap();
        (store, context)
    }

    fn strategies(store: &Arc<ObjectStore>) -> Vec<Box<dyn ManagedObjectCaching>> {
        let queue = SerialQueue::new("test.managed").unwrap();
        vec![
            Box::new(FetchObjectCache::new()),
            Box::new(InMemoryObjectCache::new(Arc::new(EntityCache::new(store.clone(), queue)))),
        ]
    }

    #[test]
    fn test_strategies_agree_on_lookup() {
        let (store, context) = context();
        let entity = store.schema().entity("Event").unwrap();
        for strategy in strategies(&store) {
            let found = strategy
                .managed_objects(&entity, &attribute_values([("eventID", "b")]), &context)
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].value("eventID"), Some(Value::from("b")));

            let none = strategy
                .managed_objects(&entity, &attribute_values([("eventID", "z")]), &context)
                .unwrap();
            assert!(none.is_empty());
        }
    }

    #[test]
    fn test_created_objects_become_visible() {
        let (store, context) = context();
        let entity = store.schema().entity("Event").unwrap();
        for strategy in strategies(&store) {
            let lookup = attribute_values([("eventID", "pending")]);
            strategy.managed_objects(&entity, &lookup, &context).unwrap();
            let event = context.insert("Event").unwrap();
            event.set_value("eventID", Value::from("pending")).unwrap();
            strategy.did_create_object(&event).unwrap();
            assert_eq!(strategy.managed_objects(&entity, &lookup, &context).unwrap().len(), 1);

            strategy.did_delete_object(&event).unwrap();
            context.delete(&event).unwrap();
            assert!(strategy.managed_objects(&entity, &lookup, &context).unwrap().is_empty());
        }
    }
}
