//! Turning objects back into representations
//!
//! A [`RequestMapping`] is the inverse of an object mapping: it names object
//! properties and the document key paths they are written to.
//! [`ObjectSerializer`] follows one to build a `serde_json::Value`. Dates
//! are written with the first of the mapping's date formats when it has any.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::Result;
use crate::keypath;
use crate::object::{self, ObjectId, ObjectRef};
use crate::transformer::{built_in, ValueTransformer};
use crate::value::{Value, ValueKind};
use serde_json::{Map, Value as Json};

/// Object property to document key path pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMapping {
    entity: String,
    attributes: Vec<(String, String)>,
    relationships: Vec<(String, String, RequestMapping)>,
    date_formats: Vec<String>,
}

impl RequestMapping {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            date_formats: Vec::new(),
        }
    }

    /// Formats for writing dates; only the first is used
    pub fn with_date_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Write object key path `object_key` to document key path `json_path`
    pub fn attribute(mut self, object_key: impl Into<String>, json_path: impl Into<String>) -> Self {
        self.attributes.push((object_key.into(), json_path.into()));
        self
    }

    pub fn relationship(mut self, object_key: impl Into<String>, json_path: impl Into<String>, mapping: RequestMapping) -> Self {
        self.relationships.push((object_key.into(), json_path.into(), mapping));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn relationships(&self) -> &[(String, String, RequestMapping)] {
        &self.relationships
    }

    pub fn date_formats(&self) -> &[String] {
        &self.date_formats
    }

    /// JSON for an attribute value, dates rendered with the date formats
    fn attribute_json(&self, value: Value) -> Json {
        if !matches!(value, Value::Date(_)) || self.date_formats.is_empty() {
            return value.to_json();
        }
        match built_in::date_formatter(self.date_formats.clone()).transform(&value, ValueKind::String) {
            Ok(formatted) => formatted.to_json(),
            Err(e) => {
                log::warn!("Writing {} date as ISO 8601: {}", self.entity, e);
                value.to_json()
            }
        }
    }
}

/// Serializes objects through a [`RequestMapping`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Unassigned properties are left out; an object reached again through
    /// its own relationships is written as `null`.
    pub fn serialize(object: &ObjectRef, mapping: &RequestMapping) -> Result<Json> {
        let mut path = Vec::new();
        serialize_object(object, mapping, &mut path)
    }
}

fn serialize_object(object: &ObjectRef, mapping: &RequestMapping, path: &mut Vec<ObjectId>) -> Result<Json> {
    let id = object.object_id();
    if path.contains(&id) {
        log::warn!("Cycle through {} while serializing {}; writing null", id, mapping.entity());
        return Ok(Json::Null);
    }
    path.push(id);

    let mut document = Json::Object(Map::new());
    for (object_key, json_path) in &mapping.attributes {
        if let Some(value) = object::value_for_key_path(object, object_key) {
            keypath::set_value_at(json_path, &mut document, mapping.attribute_json(value))?;
        }
    }
    for (object_key, json_path, nested) in &mapping.relationships {
        let related = match object.value(object_key) {
            None => continue,
            Some(Value::Null) => Json::Null,
            Some(Value::Object(target)) => serialize_object(&target, nested, path)?,
            Some(collection) => Json::Array(
                collection
                    .objects()
                    .iter()
                    .map(|target| serialize_object(target, nested, path))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        keypath::set_value_at(json_path, &mut document, related)?;
    }

    path.pop();
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Entity, Record};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn user() -> Arc<Entity> {
        Arc::new(
            Entity::new("User")
                .attribute("name", ValueKind::String)
                .attribute("age", ValueKind::Integer)
                .to_one("best_friend", "User")
                .ordered_to_many("friends", "User"),
        )
    }

    #[test]
    fn test_nested_paths_and_relationships() {
        let blake = Record::create(user());
        blake.set_value("name", Value::from("Blake")).unwrap();
        blake.set_value("age", Value::from(31)).unwrap();
        let friend = Record::create(user());
        friend.set_value("name", Value::from("Rachit")).unwrap();
        blake.set_value("friends", Value::ordered_set_of(vec![Value::Object(friend)])).unwrap();

        let mapping = RequestMapping::new("User")
            .attribute("name", "user.name")
            .attribute("age", "user.age")
            .relationship("friends", "user.friends", RequestMapping::new("User").attribute("name", "name"));
        let json = ObjectSerializer::serialize(&blake, &mapping).unwrap();
        assert_eq!(
            json,
            json!({"user": {"name": "Blake", "age": 31, "friends": [{"name": "Rachit"}]}})
        );
    }

    #[test]
    fn test_dates_use_first_date_format() {
        let entity = Arc::new(Entity::new("Person").attribute("born", ValueKind::Date));
        let person = Record::create(entity);
        let born = chrono::Utc.with_ymd_and_hms(1982, 11, 27, 0, 0, 0).unwrap();
        person.set_value("born", Value::Date(born)).unwrap();

        let mapping = RequestMapping::new("Person").attribute("born", "birth_date");
        let iso = ObjectSerializer::serialize(&person, &mapping).unwrap();
        assert_eq!(iso, json!({"birth_date": "1982-11-27T00:00:00.000Z"}));

        let formatted = ObjectSerializer::serialize(&person, &mapping.with_date_formats(["%d.%m.%Y", "%Y"])).unwrap();
        assert_eq!(formatted, json!({"birth_date": "27.11.1982"}));
    }

    #[test]
    fn test_cycles_terminate() {
        let a = Record::create(user());
        let b = Record::create(user());
        a.set_value("best_friend", Value::Object(b.clone())).unwrap();
        b.set_value("best_friend", Value::Object(a.clone())).unwrap();

        let inner = RequestMapping::new("User").relationship("best_friend", "friend", RequestMapping::new("User"));
        let mapping = RequestMapping::new("User").relationship("best_friend", "friend", inner);
        let json = ObjectSerializer::serialize(&a, &mapping).unwrap();
        assert_eq!(json, json!({"friend": {"friend": null}}));
    }
}
