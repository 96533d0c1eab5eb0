//! Unit of work over an [`ObjectStore`]
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::{ObjectStore, StoredRecord};
use crate::error::{Error, Result};
use crate::object::{Entity, ObjectId, ObjectRef, Record};
use crate::predicate::Predicate;
use crate::value::Value;
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct ContextState {
    registered: HashMap<ObjectId, ObjectRef>,
    inserted: IndexSet<ObjectId>,
    deleted: HashSet<ObjectId>,
}

/// Live objects over a store, with pending changes until [`save`](Self::save).
///
/// Identity tokens from a cache are re-hydrated through
/// [`existing_object`](Self::existing_object); each context hands out at
/// most one live object per token.
pub struct ObjectContext {
    store: Arc<ObjectStore>,
    state: Mutex<ContextState>,
}

impl ObjectContext {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ContextState::default()),
        }
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    fn state(&self) -> Result<MutexGuard<'_, ContextState>> {
        self.state.lock().map_err(|_| Error::poisoned("context"))
    }

    /// Insert a new object of the named entity
    pub fn insert(&self, entity: &str) -> Result<ObjectRef> {
        let entity = self.store.schema().entity(entity)?;
        self.insert_entity(entity)
    }

    /// Insert a new object for an entity descriptor
    pub fn insert_entity(&self, entity: Arc<Entity>) -> Result<ObjectRef> {
        let object: ObjectRef = Arc::new(Record::new(entity));
        let mut state = self.state()?;
        state.registered.insert(object.object_id(), object.clone());
        state.inserted.insert(object.object_id());
        Ok(object)
    }

    /// Mark an object for deletion; pending inserts are simply discarded
    pub fn delete(&self, object: &ObjectRef) -> Result<()> {
        let id = object.object_id();
        let mut state = self.state()?;
        if state.inserted.shift_remove(&id) {
            state.registered.remove(&id);
        } else {
            state.deleted.insert(id);
        }
        Ok(())
    }

    pub fn is_deleted(&self, id: ObjectId) -> bool {
        self.state().map(|s| s.deleted.contains(&id)).unwrap_or(false)
    }

    pub fn is_inserted(&self, id: ObjectId) -> bool {
        self.state().map(|s| s.inserted.contains(&id)).unwrap_or(false)
    }

    /// Live object for a token, materializing it from the store if needed
    pub fn existing_object(&self, id: ObjectId) -> Result<ObjectRef> {
        {
            let state = self.state()?;
            if state.deleted.contains(&id) {
                return Err(Error::ObjectNotFound { id });
            }
            if let Some(object) = state.registered.get(&id) {
                return Ok(object.clone());
            }
        }

        let stored = self.store.record(id)?.ok_or(Error::ObjectNotFound { id })?;
        let entity = self.store.schema().entity(&stored.entity)?;
        let record: ObjectRef = Arc::new(Record::with_id(id, entity));
        for (key, value) in &stored.attributes {
            record.set_value(key, value.clone())?;
        }

        {
            let mut state = self.state()?;
            if let Some(object) = state.registered.get(&id) {
                return Ok(object.clone());
            }
            state.registered.insert(id, record.clone());
        }

        // Registered before resolving relationships so cycles terminate.
        for (name, ids) in &stored.relationships {
            let Some(descriptor) = record.entity().relationship(name).cloned() else {
                continue;
            };
            let related: Vec<ObjectRef> = ids
                .iter()
                .filter_map(|related_id| self.existing_object(*related_id).ok())
                .collect();
            let value = if descriptor.cardinality.is_to_many() {
                descriptor.collection_of(related)
            } else {
                related.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
            };
            record.set_value(name, value)?;
        }
        Ok(record)
    }

    /// All live objects of an entity matching an optional predicate,
    /// including pending inserts, ordered by token
    pub fn fetch(&self, entity: &str, predicate: Option<&Predicate>, include_subentities: bool) -> Result<Vec<ObjectRef>> {
        let mut ids: Vec<ObjectId> = self.store.fetch_ids(entity, include_subentities)?;
        {
            let state = self.state()?;
            let schema = self.store.schema();
            for id in &state.inserted {
                if let Some(object) = state.registered.get(id) {
                    let name = object.entity().name();
                    let matches = if include_subentities { schema.is_kind_of(name, entity) } else { name == entity };
                    if matches {
                        ids.push(*id);
                    }
                }
            }
            ids.retain(|id| !state.deleted.contains(id));
        }
        ids.sort();
        ids.dedup();

        let mut objects = Vec::with_capacity(ids.len());
        for id in ids {
            let object = self.existing_object(id)?;
            if predicate.map_or(true, |p| p.evaluate(&object)) {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    /// Objects inserted since the last save
    pub fn inserted_objects(&self) -> Vec<ObjectRef> {
        self.state()
            .map(|s| s.inserted.iter().filter_map(|id| s.registered.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Pending inserts or deletions
    pub fn has_changes(&self) -> bool {
        self.state()
            .map(|s| !s.inserted.is_empty() || !s.deleted.is_empty())
            .unwrap_or(false)
    }

    /// Commit every live object and pending deletion to the store
    pub fn save(&self) -> Result<()> {
        let mut state = self.state()?;
        let deletes: Vec<ObjectId> = state.deleted.iter().copied().collect();
        for id in &deletes {
            state.registered.remove(id);
        }
        let upserts: Vec<(ObjectId, StoredRecord)> = state
            .registered
            .iter()
            .map(|(id, object)| (*id, StoredRecord::snapshot(object.as_ref())))
            .collect();
        self.store.commit(upserts, &deletes)?;
        log::debug!(
            "Saved context: {} inserted, {} deleted",
            state.inserted.len(),
            deletes.len()
        );
        state.inserted.clear();
        state.deleted.clear();
        Ok(())
    }
}

impl std::fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Schema;
    use crate::value::ValueKind;

    fn store() -> Arc<ObjectStore> {
        let schema = Schema::new()
            .with_entity(
                Entity::new("User")
                    .attribute("userID", ValueKind::Integer)
                    .attribute("name", ValueKind::String)
                    .to_many("friends", "User"),
            )
            .with_entity(Entity::new("Admin").parent("User").attribute("userID", ValueKind::Integer));
        Arc::new(ObjectStore::new(Arc::new(schema)))
    }

    #[test]
    fn test_insert_save_and_rehydrate() {
        let store = store();
        let context = ObjectContext::new(store.clone());
        let user = context.insert("User").unwrap();
        user.set_value("userID", Value::from(1)).unwrap();
        user.set_value("name", Value::from("Blake")).unwrap();
        assert!(context.is_inserted(user.object_id()));
        assert!(context.has_changes());
        context.save().unwrap();
        assert!(!context.is_inserted(user.object_id()));
        assert!(!context.has_changes());
        assert_eq!(store.len(), 1);

        let other = ObjectContext::new(store);
        let copy = other.existing_object(user.object_id()).unwrap();
        assert_eq!(copy.value("name"), Some(Value::from("Blake")));
        assert!(!Arc::ptr_eq(&copy, &user));
        assert!(Arc::ptr_eq(&copy, &other.existing_object(user.object_id()).unwrap()));
    }

    #[test]
    fn test_cyclic_relationships_rehydrate() {
        let store = store();
        let context = ObjectContext::new(store.clone());
        let a = context.insert("User").unwrap();
        let b = context.insert("User").unwrap();
        a.set_value("friends", Value::set_of(vec![Value::Object(b.clone())])).unwrap();
        b.set_value("friends", Value::set_of(vec![Value::Object(a.clone())])).unwrap();
        context.save().unwrap();

        let other = ObjectContext::new(store);
        let a2 = other.existing_object(a.object_id()).unwrap();
        let friends = a2.value("friends").unwrap().objects();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].object_id(), b.object_id());
        let back = friends[0].value("friends").unwrap().objects();
        assert!(Arc::ptr_eq(&back[0], &a2));
    }

    #[test]
    fn test_fetch_includes_pending_and_subentities() {
        let store = store();
        let context = ObjectContext::new(store);
        let user = context.insert("User").unwrap();
        user.set_value("userID", Value::from(1)).unwrap();
        let admin = context.insert("Admin").unwrap();
        admin.set_value("userID", Value::from(2)).unwrap();

        assert_eq!(context.fetch("User", None, true).unwrap().len(), 2);
        assert_eq!(context.fetch("User", None, false).unwrap().len(), 1);
        let only_two = Predicate::equals("userID", 2);
        let found = context.fetch("User", Some(&only_two), true).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object_id(), admin.object_id());
    }

    #[test]
    fn test_delete_removes_on_save() {
        let store = store();
        let context = ObjectContext::new(store.clone());
        let user = context.insert("User").unwrap();
        context.save().unwrap();
        context.delete(&user).unwrap();
        assert!(context.is_deleted(user.object_id()));
        assert!(context.existing_object(user.object_id()).is_err());
        context.save().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_deleting_pending_insert_discards_it() {
        let store = store();
        let context = ObjectContext::new(store.clone());
        let user = context.insert("User").unwrap();
        context.delete(&user).unwrap();
        context.save().unwrap();
        assert!(store.is_empty());
        assert!(context.inserted_objects().is_empty());
    }
}
