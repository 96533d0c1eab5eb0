//! In-memory persistence collaborator
//!
//! The [`ObjectStore`] holds committed snapshots keyed by identity token and
//! answers the bulk attribute query the attribute caches are built from.
//! An [`ObjectContext`] is the unit of work: it hands out live objects,
//! tracks pending inserts and deletes, and commits them on save.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod context;

pub use context::ObjectContext;

use crate::error::{Error, Result};
use crate::object::{MappableObject, ObjectId, Schema};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Committed state of one object
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub entity: String,
    pub attributes: HashMap<String, Value>,
    pub relationships: HashMap<String, Vec<ObjectId>>,
}

impl StoredRecord {
    /// Snapshot a live object; related objects are stored by token
    pub fn snapshot(object: &dyn MappableObject) -> Self {
        let entity = object.entity();
        let mut attributes = HashMap::new();
        let mut relationships = HashMap::new();
        for (key, value) in object.values() {
            if entity.attribute_kind(&key).is_some() {
                attributes.insert(key, value);
            } else if entity.relationship(&key).is_some() {
                let ids = value.objects().iter().map(|o| o.object_id()).collect();
                relationships.insert(key, ids);
            }
        }
        Self {
            entity: entity.name().to_string(),
            attributes,
            relationships,
        }
    }
}

/// Committed object storage
#[derive(Debug)]
pub struct ObjectStore {
    schema: Arc<Schema>,
    records: RwLock<HashMap<ObjectId, StoredRecord>>,
}

impl ObjectStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn matches_entity(&self, record: &StoredRecord, entity: &str, include_subentities: bool) -> bool {
        if include_subentities {
            self.schema.is_kind_of(&record.entity, entity)
        } else {
            record.entity == entity
        }
    }

    /// Bulk read of attribute values.
    ///
    /// Returns only identity tokens and the requested attribute values (in
    /// request order, missing values as null), never whole objects.
    pub fn fetch_attribute_values(
        &self,
        entity: &str,
        attributes: &[String],
        include_subentities: bool,
    ) -> Result<Vec<(ObjectId, Vec<Value>)>> {
        self.schema.entity(entity)?;
        let records = self.records.read().map_err(|_| Error::poisoned("store"))?;
        let mut rows: Vec<(ObjectId, Vec<Value>)> = records
            .iter()
            .filter(|(_, record)| self.matches_entity(record, entity, include_subentities))
            .map(|(id, record)| {
                let values = attributes
                    .iter()
                    .map(|a| record.attributes.get(a).cloned().unwrap_or(Value::Null))
                    .collect();
                (*id, values)
            })
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        Ok(rows)
    }

    /// Tokens of every committed object of an entity, ascending
    pub fn fetch_ids(&self, entity: &str, include_subentities: bool) -> Result<Vec<ObjectId>> {
        self.schema.entity(entity)?;
        let records = self.records.read().map_err(|_| Error::poisoned("store"))?;
        let mut ids: Vec<ObjectId> = records
            .iter()
            .filter(|(_, record)| self.matches_entity(record, entity, include_subentities))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn record(&self, id: ObjectId) -> Result<Option<StoredRecord>> {
        let records = self.records.read().map_err(|_| Error::poisoned("store"))?;
        Ok(records.get(&id).cloned())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.read().map(|r| r.contains_key(&id)).unwrap_or(false)
    }

    /// Number of committed objects
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a unit of work atomically
    pub(crate) fn commit(&self, upserts: Vec<(ObjectId, StoredRecord)>, deletes: &[ObjectId]) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Error::poisoned("store"))?;
        for id in deletes {
            records.remove(id);
        }
        for (id, record) in upserts {
            records.insert(id, record);
        }
        log::debug!("Committed store changes, {} objects stored", records.len());
        Ok(())
    }
}
