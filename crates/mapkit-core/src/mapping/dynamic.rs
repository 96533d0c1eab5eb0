//! Mappings chosen per representation at run time
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::ObjectMapping;
use crate::predicate::{KeyValueSource, Predicate};
use crate::value::{Value, ValueKind};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// Strategy answering which object mapping, if any, fits a representation
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Value at the key path is equivalent to `expected`
    KeyValue {
        key_path: String,
        expected: Value,
        mapping: Arc<ObjectMapping>,
    },
    /// Value at the key path selects a mapping from a table
    ValueMap {
        key_path: String,
        mappings: Vec<(Value, Arc<ObjectMapping>)>,
    },
    /// Value at the key path is of the given class
    Kind {
        key_path: String,
        kind: ValueKind,
        mapping: Arc<ObjectMapping>,
    },
    /// Representation satisfies a predicate
    Predicate {
        predicate: Predicate,
        mapping: Arc<ObjectMapping>,
    },
}

impl Matcher {
    pub fn key_value(key_path: impl Into<String>, expected: impl Into<Value>, mapping: impl Into<Arc<ObjectMapping>>) -> Self {
        Matcher::KeyValue {
            key_path: key_path.into(),
            expected: expected.into(),
            mapping: mapping.into(),
        }
    }

    pub fn value_map<I, V>(key_path: impl Into<String>, mappings: I) -> Self
    where
        I: IntoIterator<Item = (V, Arc<ObjectMapping>)>,
        V: Into<Value>,
    {
        Matcher::ValueMap {
            key_path: key_path.into(),
            mappings: mappings.into_iter().map(|(v, m)| (v.into(), m)).collect(),
        }
    }

    pub fn kind(key_path: impl Into<String>, kind: ValueKind, mapping: impl Into<Arc<ObjectMapping>>) -> Self {
        Matcher::Kind {
            key_path: key_path.into(),
            kind,
            mapping: mapping.into(),
        }
    }

    pub fn predicate(predicate: Predicate, mapping: impl Into<Arc<ObjectMapping>>) -> Self {
        Matcher::Predicate {
            predicate,
            mapping: mapping.into(),
        }
    }

    /// The mapping this matcher selects for a representation
    pub fn matching_mapping(&self, representation: &Json) -> Option<Arc<ObjectMapping>> {
        match self {
            Matcher::KeyValue { key_path, expected, mapping } => representation
                .value_for_key_path(key_path)
                .filter(|v| v.is_equivalent(expected))
                .map(|_| mapping.clone()),
            Matcher::ValueMap { key_path, mappings } => {
                let value = representation.value_for_key_path(key_path)?;
                mappings
                    .iter()
                    .find(|(candidate, _)| candidate.is_equivalent(&value))
                    .map(|(_, mapping)| mapping.clone())
            }
            Matcher::Kind { key_path, kind, mapping } => representation
                .value_for_key_path(key_path)
                .filter(|v| v.kind() == *kind)
                .map(|_| mapping.clone()),
            Matcher::Predicate { predicate, mapping } => {
                predicate.evaluate(representation).then(|| mapping.clone())
            }
        }
    }
}

/// Fallback consulted when no matcher applies
pub type SelectorFn = dyn Fn(&Json) -> Option<Arc<ObjectMapping>> + Send + Sync;

/// A mapping with no fixed entity. Matchers are asked in registration
/// order, the first match wins and the selector is the fallback.
#[derive(Clone, Default)]
pub struct DynamicMapping {
    matchers: Vec<Matcher>,
    selector: Option<Arc<SelectorFn>>,
}

impl DynamicMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&Json) -> Option<Arc<ObjectMapping>> + Send + Sync + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Every mapping a matcher can select; selector results are unknowable
    pub fn object_mappings(&self) -> Vec<Arc<ObjectMapping>> {
        let mut mappings = Vec::new();
        for matcher in &self.matchers {
            match matcher {
                Matcher::ValueMap { mappings: table, .. } => mappings.extend(table.iter().map(|(_, m)| m.clone())),
                Matcher::KeyValue { mapping, .. } | Matcher::Kind { mapping, .. } | Matcher::Predicate { mapping, .. } => {
                    mappings.push(mapping.clone())
                }
            }
        }
        mappings
    }

    pub fn object_mapping_for(&self, representation: &Json) -> Option<Arc<ObjectMapping>> {
        self.matchers
            .iter()
            .find_map(|m| m.matching_mapping(representation))
            .or_else(|| self.selector.as_ref().and_then(|select| select(representation)))
    }
}

impl fmt::Debug for DynamicMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMapping")
            .field("matchers", &self.matchers.len())
            .field("selector", &self.selector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Entity;
    use serde_json::json;

    fn mapping(entity: &str) -> Arc<ObjectMapping> {
        Arc::new(ObjectMapping::new(Arc::new(Entity::new(entity))).attributes(["name"]))
    }

    #[test]
    fn test_first_matching_matcher_wins() {
        let boy = mapping("Boy");
        let girl = mapping("Girl");
        let dynamic = DynamicMapping::new()
            .matcher(Matcher::key_value("type", "Boy", boy.clone()))
            .matcher(Matcher::key_value("type", "Girl", girl.clone()))
            .matcher(Matcher::predicate(Predicate::exists("name"), girl.clone()));

        let chosen = dynamic.object_mapping_for(&json!({"type": "Boy", "name": "Blake"})).unwrap();
        assert!(Arc::ptr_eq(&chosen, &boy));
        let chosen = dynamic.object_mapping_for(&json!({"name": "Sarah"})).unwrap();
        assert!(Arc::ptr_eq(&chosen, &girl));
        assert!(dynamic.object_mapping_for(&json!({"type": "Other"})).is_none());
    }

    #[test]
    fn test_value_map_and_kind_matchers() {
        let cat = mapping("Cat");
        let dog = mapping("Dog");
        let numbered = mapping("Numbered");
        let dynamic = DynamicMapping::new()
            .matcher(Matcher::value_map("species", [("cat", cat.clone()), ("dog", dog.clone())]))
            .matcher(Matcher::kind("id", ValueKind::Integer, numbered.clone()));

        assert!(Arc::ptr_eq(&dynamic.object_mapping_for(&json!({"species": "dog"})).unwrap(), &dog));
        assert!(Arc::ptr_eq(&dynamic.object_mapping_for(&json!({"id": 3})).unwrap(), &numbered));
        assert!(dynamic.object_mapping_for(&json!({"id": "3"})).is_none());
        assert_eq!(dynamic.object_mappings().len(), 3);
    }

    #[test]
    fn test_selector_is_fallback() {
        let fallback = mapping("Fallback");
        let preferred = mapping("Preferred");
        let chosen = fallback.clone();
        let dynamic = DynamicMapping::new()
            .matcher(Matcher::key_value("kind", "preferred", preferred.clone()))
            .selector(move |_| Some(chosen.clone()));

        assert!(Arc::ptr_eq(&dynamic.object_mapping_for(&json!({"kind": "preferred"})).unwrap(), &preferred));
        assert!(Arc::ptr_eq(&dynamic.object_mapping_for(&json!({})).unwrap(), &fallback));
    }
}
