//! Connection resolution against the entity cache
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::{ConnectionDescription, ConnectionKind};
use crate::cache::{AttributeValues, EntityCache};
use crate::error::{Error, Result};
use crate::object::{self, Cardinality, ObjectRef};
use crate::store::ObjectContext;
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// Outcome of resolving a connection
#[derive(Debug, Clone)]
pub enum Related {
    /// Nothing to connect; the relationship is left untouched
    None,
    One(ObjectRef),
    Many(Vec<ObjectRef>),
}

impl Related {
    pub fn is_none(&self) -> bool {
        matches!(self, Related::None)
    }

    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            Related::None => Vec::new(),
            Related::One(object) => vec![object.clone()],
            Related::Many(objects) => objects.clone(),
        }
    }

    /// Shape the result for the relationship's cardinality; a to-one takes
    /// the first object
    fn for_cardinality(self, cardinality: Cardinality) -> Related {
        match (self, cardinality) {
            (Related::Many(objects), Cardinality::ToOne) => {
                objects.into_iter().next().map(Related::One).unwrap_or(Related::None)
            }
            (Related::One(object), Cardinality::ToMany { .. }) => Related::Many(vec![object]),
            (related, _) => related,
        }
    }
}

/// Finds the objects a connection points at
pub trait ConnectionResolver: Send + Sync {
    fn find_connected(&self, source: &ObjectRef, connection: &ConnectionDescription) -> Result<Related>;
}

/// Resolves foreign keys through attribute caches, loading them on first use
#[derive(Debug)]
pub struct EntityCacheConnectionResolver {
    entity_cache: Arc<EntityCache>,
    context: Arc<ObjectContext>,
}

impl EntityCacheConnectionResolver {
    pub fn new(entity_cache: Arc<EntityCache>, context: Arc<ObjectContext>) -> Self {
        Self { entity_cache, context }
    }

    fn resolve_foreign_key(
        &self,
        source: &ObjectRef,
        connection: &ConnectionDescription,
        pairs: &[(String, String)],
    ) -> Result<Related> {
        let mut values = AttributeValues::new();
        for (source_attribute, destination_attribute) in pairs {
            match object::value_for_key_path(source, source_attribute) {
                None | Some(Value::Null) => {
                    log::trace!(
                        "No value for {} on {}; {} not connected",
                        source_attribute,
                        source.object_id(),
                        connection.relationship()
                    );
                    return Ok(Related::None);
                }
                Some(value) => {
                    values.insert(destination_attribute.clone(), value);
                }
            }
        }

        let target = &connection.descriptor().target;
        let attributes = connection.destination_attributes();
        let cache = self.entity_cache.cache_objects_for_entity(target, &attributes, true)?;
        let candidates = cache.objects_with_attribute_values(&values, &self.context)?;
        let matches: Vec<ObjectRef> = candidates
            .into_iter()
            .filter(|candidate| connection.includes_subentities() || candidate.entity().name() == target)
            .filter(|candidate| {
                connection
                    .destination_predicate()
                    .map_or(true, |predicate| predicate.evaluate(candidate))
            })
            .collect();
        Ok(Related::Many(matches))
    }

    fn resolve_key_path(&self, source: &ObjectRef, connection: &ConnectionDescription, key_path: &str) -> Result<Related> {
        let Some(mut value) = object::value_for_key_path(source, key_path) else {
            return Ok(Related::None);
        };
        if let Some(transformer) = connection.value_transformer() {
            let output = match connection.descriptor().cardinality {
                Cardinality::ToOne => ValueKind::Object,
                Cardinality::ToMany { ordered: true } => ValueKind::OrderedSet,
                Cardinality::ToMany { ordered: false } => ValueKind::Set,
            };
            value = transformer.transform(&value, output).map_err(|source| Error::Transformation {
                key_path: key_path.to_string(),
                source,
            })?;
        }
        Ok(match value {
            Value::Null => Related::None,
            Value::Object(object) => Related::One(object),
            other => Related::Many(other.objects()),
        })
    }
}

impl ConnectionResolver for EntityCacheConnectionResolver {
    fn find_connected(&self, source: &ObjectRef, connection: &ConnectionDescription) -> Result<Related> {
        if let Some(gate) = connection.source_predicate() {
            if !gate.evaluate(source) {
                log::trace!("Source predicate rejected {} for {}", source.object_id(), connection.relationship());
                return Ok(Related::None);
            }
        }
        let related = match connection.kind() {
            ConnectionKind::ForeignKey(pairs) => self.resolve_foreign_key(source, connection, pairs)?,
            ConnectionKind::KeyPath(key_path) => self.resolve_key_path(source, connection, key_path)?,
        };
        Ok(related.for_cardinality(connection.descriptor().cardinality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Entity, Schema};
    use crate::predicate::Predicate;
    use crate::queue::SerialQueue;
    use crate::store::ObjectStore;

    struct Fixture {
        context: Arc<ObjectContext>,
        resolver: EntityCacheConnectionResolver,
    }

    fn fixture() -> Fixture {
        let schema = Schema::new()
            .with_entity(
                Entity::new("User")
                    .attribute("userID", ValueKind::Integer)
                    .attribute("gender", ValueKind::String),
            )
            .with_entity(Entity::new("Admin").parent("User").attribute("userID", ValueKind::Integer).attribute("gender", ValueKind::String))
            .with_entity(
                Entity::new("Team")
                    .attribute("teamMemberIDs", ValueKind::Array)
                    .attribute("gender", ValueKind::String)
                    .attribute("captainID", ValueKind::Integer)
                    .to_many("members", "User")
                    .to_one("captain", "User"),
            );
        let store = Arc::new(ObjectStore::new(Arc::new(schema)));
        let context = Arc::new(ObjectContext::new(store.clone()));
        for (id, gender, entity) in [(1, "male", "User"), (2, "female", "User"), (3, "male", "Admin"), (4, "male", "User")] {
            let user = context.insert(entity).unwrap();
            user.set_value("userID", Value::from(id)).unwrap();
            user.set_value("gender", Value::from(gender)).unwrap();
        }
        context.save().unwrap();
        let cache = Arc::new(EntityCache::new(store, SerialQueue::new("test.resolver").unwrap()));
        Fixture {
            resolver: EntityCacheConnectionResolver::new(cache, context.clone()),
            context,
        }
    }

    fn team(context: &ObjectContext, ids: Vec<i64>) -> ObjectRef {
        let team = context.insert("Team").unwrap();
        team.set_value("teamMemberIDs", Value::Array(ids.into_iter().map(Value::from).collect())).unwrap();
        team.set_value("gender", Value::from("male")).unwrap();
        team
    }

    fn ids(related: &Related) -> Vec<i64> {
        related.objects().iter().filter_map(|o| o.value("userID")?.as_i64()).collect()
    }

    #[test]
    fn test_collection_is_or_and_pairs_are_and() {
        let f = fixture();
        let team = team(&f.context, vec![1, 2, 3]);
        let entity = team.entity().clone();
        let connection =
            ConnectionDescription::foreign_key(&entity, "members", [("teamMemberIDs", "userID"), ("gender", "gender")]).unwrap();
        let related = f.resolver.find_connected(&team, &connection).unwrap();
        assert_eq!(ids(&related), vec![1, 3]);
    }

    #[test]
    fn test_subentities_can_be_excluded() {
        let f = fixture();
        let team = team(&f.context, vec![1, 2, 3]);
        let entity = team.entity().clone();
        let connection = ConnectionDescription::foreign_key(&entity, "members", [("teamMemberIDs", "userID")])
            .unwrap()
            .with_includes_subentities(false);
        assert_eq!(ids(&f.resolver.find_connected(&team, &connection).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_predicates_gate_and_filter() {
        let f = fixture();
        let team = team(&f.context, vec![1, 2, 3, 4]);
        let entity = team.entity().clone();
        let filtered = ConnectionDescription::foreign_key(&entity, "members", [("teamMemberIDs", "userID")])
            .unwrap()
            .with_destination_predicate(Predicate::equals("gender", "female"));
        assert_eq!(ids(&f.resolver.find_connected(&team, &filtered).unwrap()), vec![2]);

        let gated = ConnectionDescription::foreign_key(&entity, "members", [("teamMemberIDs", "userID")])
            .unwrap()
            .with_source_predicate(Predicate::equals("gender", "female"));
        assert!(f.resolver.find_connected(&team, &gated).unwrap().is_none());
    }

    #[test]
    fn test_to_one_takes_lowest_token() {
        let f = fixture();
        let team = team(&f.context, vec![]);
        let entity = team.entity().clone();
        let connection = ConnectionDescription::foreign_key(&entity, "captain", [("gender", "gender")]).unwrap();
        let related = f.resolver.find_connected(&team, &connection).unwrap();
        assert!(matches!(related, Related::One(_)));
        assert_eq!(ids(&related), vec![1]);
    }

    #[test]
    fn test_nil_source_value_connects_nothing() {
        let f = fixture();
        let team = f.context.insert("Team").unwrap();
        let entity = team.entity().clone();
        let connection = ConnectionDescription::foreign_key(&entity, "captain", [("captainID", "userID")]).unwrap();
        assert!(f.resolver.find_connected(&team, &connection).unwrap().is_none());
    }

    #[test]
    fn test_key_path_connection() {
        let f = fixture();
        let team = team(&f.context, vec![1]);
        let members = ConnectionDescription::foreign_key(&team.entity().clone(), "members", [("teamMemberIDs", "userID")]).unwrap();
        let related = f.resolver.find_connected(&team, &members).unwrap();
        team.set_value("members", Value::set_of(related.objects().into_iter().map(Value::Object))).unwrap();

        let entity = team.entity().clone();
        let captain = ConnectionDescription::key_path(&entity, "captain", "members").unwrap();
        let related = f.resolver.find_connected(&team, &captain).unwrap();
        assert_eq!(ids(&related), vec![1]);
        assert!(matches!(related, Related::One(_)));
    }

    #[test]
    fn test_unknown_relationship_is_rejected() {
        let entity = Entity::new("Team");
        let err = ConnectionDescription::key_path(&entity, "captain", "x").unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }
}
