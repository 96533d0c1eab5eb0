//! Attribute-value index for one entity
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::AttributeValues;
use crate::error::{Error, Result};
use crate::object::{ObjectId, ObjectRef};
use crate::queue::SerialQueue;
use crate::store::{ObjectContext, ObjectStore};
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Default)]
struct CacheState {
    loaded: bool,
    index: HashMap<String, BTreeSet<ObjectId>>,
}

/// Index from attribute values to identity tokens.
///
/// Only identity tokens are held, never live objects; lookups re-hydrate
/// them against the context the caller passes in. The index reflects the
/// committed state seen by [`load`](Self::load) plus whatever has been
/// added or removed explicitly since.
///
/// Reads on a loaded cache run concurrently with each other; load, add,
/// remove and flush are exclusive. The `_async` variants run on the cache's
/// private work queue and deliver their completion on the callback queue.
pub struct EntityAttributeCache {
    entity: String,
    attributes: Vec<String>,
    includes_subentities: bool,
    store: Arc<ObjectStore>,
    state: RwLock<CacheState>,
    work_queue: SerialQueue,
    callback_queue: SerialQueue,
}

impl EntityAttributeCache {
    pub fn new(
        entity: impl Into<String>,
        attributes: Vec<String>,
        includes_subentities: bool,
        store: Arc<ObjectStore>,
        callback_queue: SerialQueue,
    ) -> Result<Self> {
        let entity = entity.into();
        store.schema().entity(&entity)?;
        if attributes.is_empty() {
            return Err(Error::Configuration {
                message: format!("attribute cache for {} needs at least one attribute", entity),
                source: None,
            });
        }
        let work_queue = SerialQueue::new(format!("mapkit.cache.{}", entity))?;
        Ok(Self {
            entity,
            attributes,
            includes_subentities,
            store,
            state: RwLock::new(CacheState::default()),
            work_queue,
            callback_queue,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Key attributes in configuration order
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn includes_subentities(&self) -> bool {
        self.includes_subentities
    }

    /// Whether this cache is keyed by exactly these attributes, in any order
    pub fn is_keyed_by(&self, attributes: &[String]) -> bool {
        attributes.len() == self.attributes.len() && attributes.iter().all(|a| self.attributes.contains(a))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheState>> {
        self.state.read().map_err(|_| Error::poisoned("attribute cache"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheState>> {
        self.state.write().map_err(|_| Error::poisoned("attribute cache"))
    }

    fn loaded(&self) -> Result<RwLockReadGuard<'_, CacheState>> {
        let state = self.read()?;
        if !state.loaded {
            return Err(Error::CacheNotLoaded {
                entity: self.entity.clone(),
                attributes: self.attributes.clone(),
            });
        }
        Ok(state)
    }

    /// Rebuild the index from one bulk read of the store.
    ///
    /// The write lock is held across the read so no add, remove or flush can
    /// land between the fetch and the swap.
    pub fn load(&self) -> Result<()> {
        let span = tracing::debug_span!("cache_load", entity = %self.entity, attributes = ?self.attributes);
        let _enter = span.enter();

        let mut state = self.write()?;
        let rows = self
            .store
            .fetch_attribute_values(&self.entity, &self.attributes, self.includes_subentities)?;
        let mut index: HashMap<String, BTreeSet<ObjectId>> = HashMap::new();
        for (id, values) in &rows {
            index.entry(stored_key(values)).or_default().insert(*id);
        }
        state.index = index;
        state.loaded = true;
        log::debug!(
            "Loaded attribute cache for {} by {:?}: {} objects under {} keys",
            self.entity,
            self.attributes,
            rows.len(),
            state.index.len()
        );
        Ok(())
    }

    /// [`load`](Self::load) on the work queue
    pub fn load_async<F>(self: &Arc<Self>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let cache = Arc::clone(self);
        self.work_queue.dispatch(move || {
            let result = cache.load();
            cache.callback_queue.dispatch(move || completion(result));
        });
    }

    pub fn is_loaded(&self) -> bool {
        self.read().map(|s| s.loaded).unwrap_or(false)
    }

    /// Number of distinct indexed objects
    pub fn count(&self) -> Result<usize> {
        let state = self.loaded()?;
        let ids: BTreeSet<ObjectId> = state.index.values().flatten().copied().collect();
        Ok(ids.len())
    }

    /// Number of distinct attribute value tuples
    pub fn count_of_attribute_values(&self) -> Result<usize> {
        Ok(self.loaded()?.index.len())
    }

    /// Number of objects matching the given values
    pub fn count_with_attribute_values(&self, values: &AttributeValues) -> Result<usize> {
        Ok(self.matching_ids(values)?.len())
    }

    pub fn contains_object(&self, object: &ObjectRef) -> Result<bool> {
        let id = object.object_id();
        Ok(self.loaded()?.index.values().any(|ids| ids.contains(&id)))
    }

    pub fn contains_object_with_attribute_values(&self, values: &AttributeValues) -> Result<bool> {
        Ok(!self.matching_ids(values)?.is_empty())
    }

    /// Identity tokens matching the values, ascending
    pub fn matching_ids(&self, values: &AttributeValues) -> Result<Vec<ObjectId>> {
        let keys = self.lookup_keys(values)?;
        let state = self.loaded()?;
        let mut ids = BTreeSet::new();
        for key in keys {
            if let Some(found) = state.index.get(&key) {
                ids.extend(found.iter().copied());
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// The matching object with the lowest identity token
    pub fn object_with_attribute_values(
        &self,
        values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Option<ObjectRef>> {
        for id in self.matching_ids(values)? {
            match context.existing_object(id) {
                Ok(object) => return Ok(Some(object)),
                Err(Error::ObjectNotFound { .. }) => {
                    log::trace!("Skipping stale token {} in {} cache", id, self.entity);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// All matching objects, ordered by identity token
    pub fn objects_with_attribute_values(
        &self,
        values: &AttributeValues,
        context: &ObjectContext,
    ) -> Result<Vec<ObjectRef>> {
        let mut objects = Vec::new();
        for id in self.matching_ids(values)? {
            match context.existing_object(id) {
                Ok(object) => objects.push(object),
                Err(Error::ObjectNotFound { .. }) => {
                    log::trace!("Skipping stale token {} in {} cache", id, self.entity);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(objects)
    }

    fn accepts(&self, object: &ObjectRef) -> bool {
        let name = object.entity().name();
        if self.includes_subentities {
            self.store.schema().is_kind_of(name, &self.entity)
        } else {
            name == self.entity
        }
    }

    /// Index objects under their current attribute values.
    ///
    /// Re-adding an object moves it to its current key. Objects of other
    /// entities are ignored.
    pub fn add_objects(&self, objects: &[ObjectRef]) -> Result<()> {
        let mut state = self.write()?;
        for object in objects.iter().filter(|o| self.accepts(o)) {
            let id = object.object_id();
            remove_id(&mut state.index, id);
            let values: Vec<Value> = self
                .attributes
                .iter()
                .map(|a| object.value(a).unwrap_or(Value::Null))
                .collect();
            state.index.entry(stored_key(&values)).or_default().insert(id);
        }
        Ok(())
    }

    pub fn add_objects_async<F>(self: &Arc<Self>, objects: Vec<ObjectRef>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let cache = Arc::clone(self);
        self.work_queue.dispatch(move || {
            let result = cache.add_objects(&objects);
            cache.callback_queue.dispatch(move || completion(result));
        });
    }

    pub fn remove_objects(&self, objects: &[ObjectRef]) -> Result<()> {
        let mut state = self.write()?;
        for object in objects {
            remove_id(&mut state.index, object.object_id());
        }
        Ok(())
    }

    pub fn remove_objects_async<F>(self: &Arc<Self>, objects: Vec<ObjectRef>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let cache = Arc::clone(self);
        self.work_queue.dispatch(move || {
            let result = cache.remove_objects(&objects);
            cache.callback_queue.dispatch(move || completion(result));
        });
    }

    /// Discard the index; the cache is unloaded afterwards
    pub fn flush(&self) -> Result<()> {
        let mut state = self.write()?;
        state.index.clear();
        state.loaded = false;
        log::debug!("Flushed attribute cache for {} by {:?}", self.entity, self.attributes);
        Ok(())
    }

    /// Every key a lookup expands to: collection values fan out into one key
    /// per element, so pairs combine as OR within and AND across.
    fn lookup_keys(&self, values: &AttributeValues) -> Result<Vec<String>> {
        let provided: Vec<String> = values.keys().cloned().collect();
        if !self.is_keyed_by(&provided) {
            return Err(Error::CacheKeyMismatch {
                entity: self.entity.clone(),
                expected: self.attributes.clone(),
                provided,
            });
        }

        let mut keys: Vec<String> = vec![String::new()];
        for (position, attribute) in self.attributes.iter().enumerate() {
            let candidates: Vec<String> = match values.get(attribute) {
                Some(value) => match value.as_collection() {
                    Some(items) => items.iter().map(Value::cache_key).collect(),
                    None => vec![value.cache_key()],
                },
                None => Vec::new(),
            };
            keys = keys
                .iter()
                .flat_map(|prefix| {
                    candidates.iter().map(move |candidate| {
                        if position == 0 {
                            candidate.clone()
                        } else {
                            format!("{}{}{}", prefix, KEY_SEPARATOR, candidate)
                        }
                    })
                })
                .collect();
        }
        Ok(keys)
    }
}

fn stored_key(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::cache_key)
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}

fn remove_id(index: &mut HashMap<String, BTreeSet<ObjectId>>, id: ObjectId) {
    index.retain(|_, ids| {
        ids.remove(&id);
        !ids.is_empty()
    });
}

impl std::fmt::Debug for EntityAttributeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityAttributeCache")
            .field("entity", &self.entity)
            .field("attributes", &self.attributes)
            .field("includes_subentities", &self.includes_subentities)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::attribute_values;
    use crate::object::{Entity, Schema};
    use crate::value::ValueKind;
    use std::sync::mpsc;

    fn fixture() -> (Arc<ObjectStore>, ObjectContext) {
        let schema = Schema::new()
            .with_entity(
                Entity::new("User")
                    .attribute("userID", ValueKind::Integer)
                    .attribute("gender", ValueKind::String),
            )
            .with_entity(Entity::new("Admin").parent("User").attribute("userID", ValueKind::Integer));
        let store = Arc::new(ObjectStore::new(Arc::new(schema)));
        let context = ObjectContext::new(store.clone());
        for (id, gender) in [(1, "male"), (2, "female"), (3, "male"), (4, "male")] {
            let user = context.insert("User").unwrap();
            user.set_value("userID", Value::from(id)).unwrap();
            user.set_value("gender", Value::from(gender)).unwrap();
        }
        context.save().unwrap();
        (store, context)
    }

    fn cache(store: &Arc<ObjectStore>, attributes: &[&str]) -> EntityAttributeCache {
        let queue = SerialQueue::new("test.cache.callbacks").unwrap();
        EntityAttributeCache::new(
            "User",
            attributes.iter().map(|a| a.to_string()).collect(),
            true,
            store.clone(),
            queue,
        )
        .unwrap()
    }

    #[test]
    fn test_unloaded_cache_rejects_lookups() {
        let (store, _) = fixture();
        let cache = cache(&store, &["userID"]);
        assert!(!cache.is_loaded());
        let err = cache.count().unwrap_err();
        assert!(matches!(err, Error::CacheNotLoaded { .. }));
    }

    #[test]
    fn test_load_and_counts() {
        let (store, context) = fixture();
        let cache = cache(&store, &["gender"]);
        cache.load().unwrap();
        assert!(cache.is_loaded());
        assert_eq!(cache.count().unwrap(), 4);
        assert_eq!(cache.count_of_attribute_values().unwrap(), 2);
        let male = attribute_values([("gender", "male")]);
        assert_eq!(cache.count_with_attribute_values(&male).unwrap(), 3);
        let found = cache.objects_with_attribute_values(&male, &context).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].object_id() < w[1].object_id()));
    }

    #[test]
    fn test_numeric_and_string_keys_collide() {
        let (store, context) = fixture();
        let cache = cache(&store, &["userID"]);
        cache.load().unwrap();
        let by_string = attribute_values([("userID", "2")]);
        let found = cache.object_with_attribute_values(&by_string, &context).unwrap().unwrap();
        assert_eq!(found.value("gender"), Some(Value::from("female")));
    }

    #[test]
    fn test_collection_values_are_or_and_pairs_are_and() {
        let (store, context) = fixture();
        let cache = cache(&store, &["userID", "gender"]);
        cache.load().unwrap();
        let mut lookup = AttributeValues::new();
        lookup.insert("gender".into(), Value::from("male"));
        lookup.insert(
            "userID".into(),
            Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]),
        );
        let found = cache.objects_with_attribute_values(&lookup, &context).unwrap();
        let ids: Vec<i64> = found.iter().filter_map(|o| o.value("userID")?.as_i64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_mismatched_attribute_set_is_error() {
        let (store, _) = fixture();
        let cache = cache(&store, &["userID", "gender"]);
        cache.load().unwrap();
        let err = cache.matching_ids(&attribute_values([("userID", 1)])).unwrap_err();
        assert!(matches!(err, Error::CacheKeyMismatch { .. }));
    }

    #[test]
    fn test_pending_objects_invisible_until_added() {
        let (store, context) = fixture();
        let cache = cache(&store, &["userID"]);
        cache.load().unwrap();
        let pending = context.insert("Admin").unwrap();
        pending.set_value("userID", Value::from(99)).unwrap();
        let lookup = attribute_values([("userID", 99)]);
        assert!(cache.object_with_attribute_values(&lookup, &context).unwrap().is_none());

        cache.add_objects(&[pending.clone()]).unwrap();
        let found = cache.object_with_attribute_values(&lookup, &context).unwrap().unwrap();
        assert_eq!(found.object_id(), pending.object_id());
        assert!(cache.contains_object(&pending).unwrap());

        cache.remove_objects(&[pending.clone()]).unwrap();
        assert!(!cache.contains_object_with_attribute_values(&lookup).unwrap());
    }

    #[test]
    fn test_readding_moves_object_to_new_key() {
        let (store, context) = fixture();
        let cache = cache(&store, &["userID"]);
        cache.load().unwrap();
        let user = context.fetch("User", Some(&crate::predicate::Predicate::equals("userID", 4)), true).unwrap().remove(0);
        user.set_value("userID", Value::from(40)).unwrap();
        cache.add_objects(&[user]).unwrap();
        assert!(!cache.contains_object_with_attribute_values(&attribute_values([("userID", 4)])).unwrap());
        assert!(cache.contains_object_with_attribute_values(&attribute_values([("userID", 40)])).unwrap());
        assert_eq!(cache.count().unwrap(), 4);
    }

    #[test]
    fn test_flush_unloads() {
        let (store, _) = fixture();
        let cache = cache(&store, &["userID"]);
        cache.load().unwrap();
        cache.flush().unwrap();
        assert!(!cache.is_loaded());
        assert!(cache.count_of_attribute_values().is_err());
    }

    #[test]
    fn test_reload_never_drops_concurrent_additions() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (store, context) = fixture();
        let cache = cache(&store, &["userID"]);
        cache.load().unwrap();
        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    cache.load().unwrap();
                }
            });
            for id in 100..150 {
                let user = context.insert("User").unwrap();
                user.set_value("userID", Value::from(id)).unwrap();
                context.save().unwrap();
                cache.add_objects(&[user]).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        for id in 100..150 {
            assert!(cache.contains_object_with_attribute_values(&attribute_values([("userID", id)])).unwrap());
        }
        assert_eq!(cache.count().unwrap(), 54);
    }

    #[test]
    fn test_async_load_completes_on_callback_queue() {
        let (store, _) = fixture();
        let cache = Arc::new(cache(&store, &["userID"]));
        let (tx, rx) = mpsc::channel();
        cache.load_async(move |result| {
            let thread = std::thread::current().name().map(str::to_string);
            tx.send((result.is_ok(), thread)).unwrap();
        });
        let (ok, thread) = rx.recv().unwrap();
        assert!(ok);
        assert_eq!(thread.as_deref(), Some("test.cache.callbacks"));
        assert!(cache.is_loaded());
    }
}
