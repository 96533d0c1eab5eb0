//! Destination object model
//!
//! Destination types are described by an [`Entity`], an explicit accessor
//! table naming every attribute with its declared [`ValueKind`] and every
//! relationship with its target and cardinality. The engine reads and writes
//! objects only through the [`MappableObject`] trait, so nothing is
//! introspected at mapping time.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Opaque, context-independent identity token of an object.
///
/// Tokens are plain integers so they can cross threads and contexts freely;
/// they order by creation, which gives deterministic tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocate a fresh token
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x-object://{}", self.0)
    }
}

/// Declared attribute of an entity
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub kind: ValueKind,
    pub default: Option<Value>,
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany { ordered: bool },
}

impl Cardinality {
    pub fn is_to_many(self) -> bool {
        matches!(self, Cardinality::ToMany { .. })
    }
}

/// Declared relationship of an entity
#[derive(Debug, Clone)]
pub struct RelationshipDescriptor {
    pub target: String,
    pub cardinality: Cardinality,
}

impl RelationshipDescriptor {
    /// Wrap related objects in the collection class this relationship stores
    pub fn collection_of(&self, objects: Vec<ObjectRef>) -> Value {
        let items = objects.into_iter().map(Value::Object);
        match self.cardinality {
            Cardinality::ToMany { ordered: true } => Value::ordered_set_of(items),
            _ => Value::set_of(items),
        }
    }
}

/// Type descriptor and property accessor table for destination objects
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    parent: Option<String>,
    attributes: IndexMap<String, AttributeDescriptor>,
    relationships: IndexMap<String, RelationshipDescriptor>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
        }
    }

    /// Declare the parent entity this one is a sub-entity of
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.attributes.insert(name.into(), AttributeDescriptor { kind, default: None });
        self
    }

    /// Declare an attribute with the value used when a mapping assigns defaults
    pub fn attribute_with_default(mut self, name: impl Into<String>, kind: ValueKind, default: Value) -> Self {
        self.attributes.insert(name.into(), AttributeDescriptor { kind, default: Some(default) });
        self
    }

    pub fn to_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor { target: target.into(), cardinality: Cardinality::ToOne },
        );
        self
    }

    pub fn to_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor { target: target.into(), cardinality: Cardinality::ToMany { ordered: false } },
        );
        self
    }

    pub fn ordered_to_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDescriptor { target: target.into(), cardinality: Cardinality::ToMany { ordered: true } },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn attributes(&self) -> &IndexMap<String, AttributeDescriptor> {
        &self.attributes
    }

    pub fn relationships(&self) -> &IndexMap<String, RelationshipDescriptor> {
        &self.relationships
    }

    pub fn attribute_kind(&self, name: &str) -> Option<ValueKind> {
        self.attributes.get(name).map(|a| a.kind)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.relationships.contains_key(name)
    }
}

/// Registry of entities, resolving the sub-entity hierarchy
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: IndexMap<String, Arc<Entity>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.register(entity);
        self
    }

    pub fn register(&mut self, entity: Entity) -> Arc<Entity> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.name().to_string(), entity.clone());
        entity
    }

    pub fn entity(&self, name: &str) -> Result<Arc<Entity>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity { name: name.to_string() })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<Entity>> {
        self.entities.values()
    }

    /// Whether `entity` is `ancestor` or one of its sub-entities
    pub fn is_kind_of(&self, entity: &str, ancestor: &str) -> bool {
        let mut current = Some(entity);
        let mut hops = 0;
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.entities.len() {
                return false;
            }
            current = self.entities.get(name).and_then(|e| e.parent_name());
        }
        false
    }
}

/// Shared handle to a destination object
pub type ObjectRef = Arc<dyn MappableObject>;

/// Property access for destination objects.
///
/// Implementations use interior mutability: objects are shared between the
/// mapping pass, the context that owns them and the caller.
pub trait MappableObject: Send + Sync + fmt::Debug {
    fn object_id(&self) -> ObjectId;

    fn entity(&self) -> &Arc<Entity>;

    /// Current value for a property, `None` when never assigned
    fn value(&self, key: &str) -> Option<Value>;

    fn set_value(&self, key: &str, value: Value) -> Result<()>;

    /// Snapshot of all assigned properties
    fn values(&self) -> HashMap<String, Value>;
}

/// Dynamic object backed by an entity accessor table
pub struct Record {
    id: ObjectId,
    entity: Arc<Entity>,
    values: RwLock<HashMap<String, Value>>,
}

impl Record {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self::with_id(ObjectId::next(), entity)
    }

    pub fn with_id(id: ObjectId, entity: Arc<Entity>) -> Self {
        Self {
            id,
            entity,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Create a shared record
    pub fn create(entity: Arc<Entity>) -> ObjectRef {
        Arc::new(Self::new(entity))
    }

    fn validate(&self, key: &str, value: &Value) -> Result<()> {
        if let Some(kind) = self.entity.attribute_kind(key) {
            if value.is_null() || value.kind() == kind || (kind == ValueKind::Float && value.kind() == ValueKind::Integer) {
                return Ok(());
            }
            return Err(Error::Validation {
                entity: self.entity.name().to_string(),
                key: key.to_string(),
                message: format!("expected {}, got {}", kind, value.kind()),
            });
        }
        if self.entity.relationship(key).is_some() {
            let all_objects = match value {
                Value::Null | Value::Object(_) => true,
                other => other
                    .as_collection()
                    .is_some_and(|items| items.iter().all(|v| matches!(v, Value::Object(_)))),
            };
            if all_objects {
                return Ok(());
            }
            return Err(Error::Validation {
                entity: self.entity.name().to_string(),
                key: key.to_string(),
                message: format!("relationship cannot hold {}", value.kind()),
            });
        }
        Err(Error::UnknownProperty {
            entity: self.entity.name().to_string(),
            key: key.to_string(),
        })
    }
}

impl MappableObject for Record {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.validate(key, &value)?;
        let mut values = self.values.write().map_err(|_| Error::poisoned("record"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn values(&self) -> HashMap<String, Value> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Related objects are printed by token only; graphs may be cyclic.
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("entity", &self.entity.name())
            .finish()
    }
}

/// Evaluate a dotted key path against an object, traversing relationships.
///
/// Crossing a to-many relationship collects the remaining path across every
/// related object into an array.
pub fn value_for_key_path(object: &ObjectRef, key_path: &str) -> Option<Value> {
    let mut segments = key_path.split('.');
    let first = segments.next()?;
    let mut current = object.value(first)?;
    for segment in segments {
        current = match current {
            Value::Object(related) => related.value(segment)?,
            Value::Array(items) | Value::OrderedSet(items) | Value::Set(items) => Value::Array(
                items
                    .iter()
                    .filter_map(|item| item.as_object().and_then(|o| o.value(segment)))
                    .collect(),
            ),
            Value::Dictionary(map) => map.get(segment)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_entity() -> Arc<Entity> {
        Arc::new(
            Entity::new("User")
                .attribute("name", ValueKind::String)
                .attribute("age", ValueKind::Integer)
                .to_one("team", "Team")
                .to_many("friends", "User"),
        )
    }

    #[test]
    fn test_record_validates_declared_kinds() {
        let user = Record::create(user_entity());
        user.set_value("name", Value::from("Blake")).unwrap();
        assert_eq!(user.value("name"), Some(Value::from("Blake")));

        let err = user.set_value("age", Value::from("old")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = user.set_value("missing", Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }

    #[test]
    fn test_record_relationship_accepts_objects_only() {
        let entity = user_entity();
        let user = Record::create(entity.clone());
        let friend = Record::create(entity);
        user.set_value("friends", Value::set_of(vec![Value::Object(friend)])).unwrap();
        assert!(user.set_value("team", Value::from(3)).is_err());
    }

    #[test]
    fn test_key_path_traverses_to_many() {
        let entity = user_entity();
        let user = Record::create(entity.clone());
        let a = Record::create(entity.clone());
        let b = Record::create(entity);
        a.set_value("name", Value::from("a")).unwrap();
        b.set_value("name", Value::from("b")).unwrap();
        user.set_value("friends", Value::ordered_set_of(vec![Value::Object(a), Value::Object(b)])).unwrap();

        let names = value_for_key_path(&user, "friends.name").unwrap();
        assert_eq!(names, Value::Array(vec![Value::from("a"), Value::from("b")]));
        assert!(value_for_key_path(&user, "team.name").is_none());
    }

    #[test]
    fn test_schema_sub_entities() {
        let schema = Schema::new()
            .with_entity(Entity::new("Animal"))
            .with_entity(Entity::new("Cat").parent("Animal"))
            .with_entity(Entity::new("Kitten").parent("Cat"));
        assert!(schema.is_kind_of("Kitten", "Animal"));
        assert!(schema.is_kind_of("Cat", "Cat"));
        assert!(!schema.is_kind_of("Animal", "Cat"));
        assert!(schema.entity("Dog").is_err());
    }

    #[test]
    fn test_object_ids_are_monotonic() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(a < b);
    }
}
