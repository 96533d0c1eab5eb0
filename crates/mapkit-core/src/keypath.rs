//! Key path evaluation over parsed documents
//!
//! A key path is a dotted address (`user.address.city`) into nested
//! dictionaries. Stepping through an array applies the remaining path to
//! every element and collects the results, so `users.id` over an array of
//! users yields the array of ids.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use serde_json::{Map, Value as Json};
use std::fmt;

/// Reserved prefix resolving against the metadata chain
pub const METADATA_PREFIX: &str = "@metadata";
/// Reserved prefix resolving against the parent representation
pub const PARENT_PREFIX: &str = "@parent";
/// Reserved prefix resolving against the root representation
pub const ROOT_PREFIX: &str = "@root";

/// A parsed, validated key path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted key path
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::InvalidKeyPath {
                path: path.to_string(),
                message: "key path is empty".to_string(),
            });
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if let Some(position) = segments.iter().position(|s| s.is_empty()) {
            return Err(Error::InvalidKeyPath {
                path: path.to_string(),
                message: format!("empty segment at position {}", position),
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment, used to detect reserved prefixes
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// Remaining path after the first segment
    pub fn tail(&self) -> Option<KeyPath> {
        if self.segments.len() > 1 {
            Some(Self { segments: self.segments[1..].to_vec() })
        } else {
            None
        }
    }

    /// Evaluate against a document; `None` when any segment is missing
    pub fn evaluate(&self, data: &Json) -> Option<Json> {
        evaluate_segments(&self.segments, data)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

fn evaluate_segments(segments: &[String], data: &Json) -> Option<Json> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(data.clone());
    };
    match data {
        Json::Object(map) => evaluate_segments(rest, map.get(first.as_str())?),
        Json::Array(items) => Some(Json::Array(
            items
                .iter()
                .filter_map(|item| evaluate_segments(segments, item))
                .collect(),
        )),
        _ => None,
    }
}

/// Evaluate a dotted key path string against a document
pub fn value_at(path: &str, data: &Json) -> Result<Option<Json>> {
    Ok(KeyPath::parse(path)?.evaluate(data))
}

/// Write a value at a dotted key path, creating intermediate dictionaries
pub fn set_value_at(path: &str, data: &mut Json, value: Json) -> Result<()> {
    let key_path = KeyPath::parse(path)?;
    let (last, parents) = key_path
        .segments
        .split_last()
        .ok_or_else(|| Error::InvalidKeyPath { path: path.to_string(), message: "key path is empty".to_string() })?;

    let mut current = data;
    for segment in parents {
        if !current.is_object() {
            *current = Json::Object(Map::new());
        }
        let map = current.as_object_mut().ok_or_else(|| Error::InvalidKeyPath {
            path: path.to_string(),
            message: format!("cannot descend into '{}'", segment),
        })?;
        current = map.entry(segment.clone()).or_insert_with(|| Json::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Json::Object(Map::new());
    }
    if let Json::Object(map) = current {
        map.insert(last.clone(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_dot_notation() {
        let data = json!({"user": {"address": {"city": "Durham"}}});
        assert_eq!(value_at("user.address.city", &data).unwrap(), Some(json!("Durham")));
        assert_eq!(value_at("user.phone", &data).unwrap(), None);
    }

    #[test]
    fn test_array_collection_semantics() {
        let data = json!({"users": [{"id": 1}, {"id": 2}, {"name": "no id"}]});
        assert_eq!(value_at("users.id", &data).unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn test_scalar_intermediate_is_missing() {
        let data = json!({"count": 3});
        assert_eq!(value_at("count.value", &data).unwrap(), None);
    }

    #[test]
    fn test_invalid_paths() {
        assert!(KeyPath::parse("").is_err());
        assert!(KeyPath::parse("a..b").is_err());
        assert!(KeyPath::parse(".a").is_err());
    }

    #[test]
    fn test_head_and_tail() {
        let path = KeyPath::parse("@metadata.mapping.collectionIndex").unwrap();
        assert_eq!(path.head(), METADATA_PREFIX);
        assert_eq!(path.tail().unwrap().to_string(), "mapping.collectionIndex");
        assert!(KeyPath::parse("name").unwrap().tail().is_none());
    }

    #[test]
    fn test_set_value_creates_intermediates() {
        let mut data = json!({});
        set_value_at("user.address.city", &mut data, json!("Durham")).unwrap();
        set_value_at("user.name", &mut data, json!("Blake")).unwrap();
        assert_eq!(data, json!({"user": {"address": {"city": "Durham"}, "name": "Blake"}}));
    }
}
