//! Source representations and their side channels
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::keypath::{self, METADATA_PREFIX, PARENT_PREFIX, ROOT_PREFIX};
use crate::mapping::{AttributeMapping, ObjectMapping};
use crate::object::ObjectRef;
use crate::value::Value;
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const COLLECTION_INDEX_KEY: &str = "mapping.collectionIndex";
const PARENT_OBJECT_KEY: &str = "mapping.parentObject";

/// Shared cooperative cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Chain of metadata providers plus the synthetic relationship keys.
///
/// Lookups try the synthetic keys, then providers from the most recently
/// added back to the first.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    providers: Vec<Arc<Json>>,
    collection_index: Option<usize>,
    parent_object: Option<ObjectRef>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider more specific than the existing ones
    pub fn with_provider(mut self, provider: Json) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Metadata for a nested mapping inside a relationship of `parent`
    pub fn child(&self, collection_index: Option<usize>, parent: ObjectRef) -> Self {
        Self {
            providers: self.providers.clone(),
            collection_index,
            parent_object: Some(parent),
        }
    }

    pub fn collection_index(&self) -> Option<usize> {
        self.collection_index
    }

    pub fn parent_object(&self) -> Option<&ObjectRef> {
        self.parent_object.as_ref()
    }

    /// Value at a key path relative to `@metadata`
    pub fn value_for_key_path(&self, key_path: &str) -> Option<Value> {
        match key_path {
            COLLECTION_INDEX_KEY => return self.collection_index.map(|i| Value::Integer(i as i64)),
            PARENT_OBJECT_KEY => return self.parent_object.clone().map(Value::Object),
            _ => {}
        }
        self.providers
            .iter()
            .rev()
            .find_map(|provider| keypath::value_at(key_path, provider).ok().flatten())
            .map(Value::from)
    }
}

/// One representation being mapped, with links up the representation tree
/// for `@parent` and `@root` lookups
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    representation: &'a Json,
    parent: Option<&'a SourceContext<'a>>,
    metadata: &'a Metadata,
}

impl<'a> SourceContext<'a> {
    pub fn new(representation: &'a Json, metadata: &'a Metadata) -> Self {
        Self {
            representation,
            parent: None,
            metadata,
        }
    }

    pub fn nested(representation: &'a Json, parent: &'a SourceContext<'a>, metadata: &'a Metadata) -> Self {
        Self {
            representation,
            parent: Some(parent),
            metadata,
        }
    }

    pub fn representation(&self) -> &'a Json {
        self.representation
    }

    pub fn parent(&self) -> Option<&'a SourceContext<'a>> {
        self.parent
    }

    pub fn metadata(&self) -> &'a Metadata {
        self.metadata
    }

    /// Outermost representation of this mapping pass
    pub fn root(&self) -> &'a Json {
        let mut current = *self;
        while let Some(parent) = current.parent {
            current = *parent;
        }
        current.representation
    }

    /// Key of a forced-collection representation
    pub fn representation_key(&self, mapping: &ObjectMapping) -> Option<&'a str> {
        if !mapping.forces_collection_mapping() {
            return None;
        }
        match self.representation.as_object() {
            Some(map) if map.len() == 1 => map.keys().next().map(String::as_str),
            _ => None,
        }
    }

    /// Nested representation at a key path, following `@parent` and `@root`
    pub fn json_for_key_path(&self, key_path: &str) -> Option<Json> {
        if let Some(rest) = strip_prefix(key_path, PARENT_PREFIX) {
            let parent = self.parent?;
            return match rest {
                Some(rest) => parent.json_for_key_path(rest),
                None => Some(parent.representation.clone()),
            };
        }
        if let Some(rest) = strip_prefix(key_path, ROOT_PREFIX) {
            let root = self.root();
            return match rest {
                Some(rest) => keypath::value_at(rest, root).ok().flatten(),
                None => Some(root.clone()),
            };
        }
        if let Some(rest) = strip_prefix(key_path, METADATA_PREFIX) {
            return self.metadata.value_for_key_path(rest?).map(|v| v.to_json());
        }
        keypath::value_at(key_path, self.representation).ok().flatten()
    }

    /// Attribute value at a key path; metadata lookups may yield objects
    pub fn value_for_key_path(&self, key_path: &str) -> Option<Value> {
        if let Some(rest) = strip_prefix(key_path, METADATA_PREFIX) {
            return self.metadata.value_for_key_path(rest?);
        }
        if let Some(rest) = strip_prefix(key_path, PARENT_PREFIX) {
            let parent = self.parent?;
            return match rest {
                Some(rest) => parent.value_for_key_path(rest),
                None => Some(Value::from(parent.representation)),
            };
        }
        self.json_for_key_path(key_path).map(Value::from)
    }

    /// Resolve the source value of an attribute mapping, substituting the
    /// representation key where the mapping asks for it
    pub fn attribute_value(&self, mapping: &ObjectMapping, attribute: &AttributeMapping) -> Option<Value> {
        let key = self.representation_key(mapping);
        match attribute.source_key_path() {
            None => key.map(Value::from),
            Some(path) => self.value_for_key_path(&mapping.expand_source_key_path(path, key)),
        }
    }
}

/// `Some(None)` for the bare prefix, `Some(Some(rest))` for `prefix.rest`
fn strip_prefix<'p>(key_path: &'p str, prefix: &str) -> Option<Option<&'p str>> {
    if key_path == prefix {
        return Some(None);
    }
    key_path
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(Some)
}
