//! Attribute-value indexes over the object store
//!
//! An [`EntityAttributeCache`] maps the values of one or more attributes of
//! an entity to the identity tokens of the stored objects carrying them. It
//! is built by a single bulk read and kept current with explicit add and
//! remove calls. The [`EntityCache`] groups the attribute caches of a store,
//! and the [`ManagedObjectCaching`] strategies put a find-or-create lookup in
//! front of either an index or a plain fetch.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod entity_attribute_cache;
pub mod entity_cache;
pub mod managed;

pub use entity_attribute_cache::EntityAttributeCache;
pub use entity_cache::EntityCache;
pub use managed::{FetchObjectCache, InMemoryObjectCache, ManagedObjectCaching};

use crate::value::Value;
use indexmap::IndexMap;

/// Attribute name to lookup value. A collection value means any of its
/// elements.
pub type AttributeValues = IndexMap<String, Value>;

/// Build attribute values from `(name, value)` pairs
pub fn attribute_values<K, V, I>(pairs: I) -> AttributeValues
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
