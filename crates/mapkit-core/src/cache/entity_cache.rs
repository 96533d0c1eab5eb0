//! Attribute caches for a whole store
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::{AttributeValues, EntityAttributeCache};
use crate::config::MappingOptions;
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use crate::queue::SerialQueue;
use crate::store::{ObjectContext, ObjectStore};
use std::sync::{Arc, RwLock};

/// Collection of [`EntityAttributeCache`]s sharing one store and one
/// callback queue. Object additions and removals fan out to every cache
/// whose entity covers the object.
pub struct EntityCache {
    store: Arc<ObjectStore>,
    callback_queue: SerialQueue,
    caches: RwLock<Vec<Arc<EntityAttributeCache>>>,
}

impl EntityCache {
    pub fn new(store: Arc<ObjectStore>, callback_queue: SerialQueue) -> Self {
        Self {
            store,
            callback_queue,
            caches: RwLock::new(Vec::new()),
        }
    }

    /// Completions delivered on a queue named by the options'
    /// `callback_queue_label`
    pub fn with_options(store: Arc<ObjectStore>, options: &MappingOptions) -> Result<Self> {
        Ok(Self::new(store, options.callback_queue()?))
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn callback_queue(&self) -> &SerialQueue {
        &self.callback_queue
    }

    fn find_or_register(
        &self,
        entity: &str,
        attributes: &[String],
        includes_subentities: bool,
    ) -> Result<Arc<EntityAttributeCache>> {
        if let Some(cache) = self.attribute_cache(entity, attributes) {
            return Ok(cache);
        }
        let mut caches = self.caches.write().map_err(|_| Error::poisoned("entity cache"))?;
        if let Some(cache) = caches.iter().find(|c| c.entity() == entity && c.is_keyed_by(attributes)) {
            return Ok(cache.clone());
        }
        let cache = Arc::new(EntityAttributeCache::new(
            entity,
            attributes.to_vec(),
            includes_subentities,
            self.store.clone(),
            self.callback_queue.clone(),
        )?);
        caches.push(cache.clone());
        Ok(cache)
    }

    /// Register and load an attribute cache; an existing loaded cache for the
    /// same attributes is reused
    pub fn cache_objects_for_entity(
        &self,
        entity: &str,
        attributes: &[String],
        includes_subentities: bool,
    ) -> Result<Arc<EntityAttributeCache>> {
        let cache = self.find_or_register(entity, attributes, includes_subentities)?;
        if !cache.is_loaded() {
            cache.load()?;
        }
        Ok(cache)
    }

    /// [`cache_objects_for_entity`](Self::cache_objects_for_entity) with the
    /// load on the cache's work queue
    pub fn cache_objects_for_entity_async<F>(
        &self,
        entity: &str,
        attributes: &[String],
        includes_subentities: bool,
        completion: F,
    ) where
        F: FnOnce(Result<Arc<EntityAttributeCache>>) + Send + 'static,
    {
        match self.find_or_register(entity, attributes, includes_subentities) {
            Ok(cache) => {
                let loaded = cache.clone();
                cache.load_async(move |result| completion(result.map(|_| loaded)));
            }
            Err(e) => self.callback_queue.dispatch(move || completion(Err(e))),
        }
    }

    /// Whether a loaded cache exists for exactly these attributes
    pub fn is_entity_cached(&self, entity: &str, attributes: &[String]) -> bool {
        self.attribute_cache(entity, attributes).is_some_and(|c| c.is_loaded())
    }

    pub fn attribute_cache(&self, entity: &str, attributes: &[String]) -> Option<Arc<EntityAttributeCache>> {
        let caches = self.caches.read().ok()?;
        caches
            .iter()
            .find(|c| c.entity() == entity && c.is_keyed_by(attributes))
            .cloned()
    }

    pub fn attribute_caches_for_entity(&self, entity: &str) -> Vec<Arc<EntityAttributeCache>> {
        self.caches
            .read()
            .map(|caches| caches.iter().filter(|c| c.entity() == entity).cloned().collect())
            .unwrap_or_default()
    }

    fn cache_for_lookup(&self, entity: &str, values: &AttributeValues) -> Result<Arc<EntityAttributeCache>> {
        let attributes: Vec<String> = values.keys().cloned().collect();
        self.attribute_cache(entity, &attributes)
            .ok_or(Error::CacheNotLoaded { entity: entity.to_string(), attributes })
    }

    pub fn object_with_attribute_values(
        &self,
        entity: &str,
        values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Option<ObjectRef>> {
        self.cache_for_lookup(entity, values)?
            .object_with_attribute_values(values, context)
    }

    pub fn objects_with_attribute_values(
        &self,
        entity: &str,
        values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Vec<ObjectRef>> {
        self.cache_for_lookup(entity, values)?
            .objects_with_attribute_values(values, context)
    }

    fn all_caches(&self) -> Result<Vec<Arc<EntityAttributeCache>>> {
        Ok(self.caches.read().map_err(|_| Error::poisoned("entity cache"))?.clone())
    }

    /// Index objects in every loaded cache covering their entity
    pub fn add_objects(&self, objects: &[ObjectRef]) -> Result<()> {
        for cache in self.all_caches()?.iter().filter(|c| c.is_loaded()) {
            cache.add_objects(objects)?;
        }
        Ok(())
    }

    pub fn remove_objects(&self, objects: &[ObjectRef]) -> Result<()> {
        for cache in self.all_caches()?.iter().filter(|c| c.is_loaded()) {
            cache.remove_objects(objects)?;
        }
        Ok(())
    }

    /// Flush every attribute cache
    pub fn flush(&self) -> Result<()> {
        for cache in self.all_caches()? {
            cache.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("caches", &self.caches.read().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}
