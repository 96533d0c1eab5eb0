//! Declarative mapping definitions
//!
//! A [`Mapping`] says how a representation becomes an object. It is either a
//! concrete [`ObjectMapping`] bound to one entity, or a [`DynamicMapping`]
//! that picks an object mapping per representation at run time. Object
//! mappings hold [`AttributeMapping`]s and [`RelationshipMapping`]s; the
//! latter nest another `Mapping`, so definitions form a tree built bottom-up.
//!
//! # Module Organization
//!
//! - [`property`] - attribute and relationship mappings
//! - [`object_mapping`] - entity-bound mappings and their options
//! - [`dynamic`] - matchers and selector based mapping selection
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod dynamic;
pub mod object_mapping;
pub mod property;

pub use dynamic::{DynamicMapping, Matcher};
pub use object_mapping::ObjectMapping;
pub use property::{AttributeMapping, RelationshipMapping};

use serde_json::Value as Json;
use std::sync::Arc;

/// Object or dynamic mapping
#[derive(Debug, Clone)]
pub enum Mapping {
    Object(Arc<ObjectMapping>),
    Dynamic(Arc<DynamicMapping>),
}

impl Mapping {
    /// The concrete mapping for a representation; `None` when a dynamic
    /// mapping has nothing that fits
    pub fn object_mapping_for(&self, representation: &Json) -> Option<Arc<ObjectMapping>> {
        match self {
            Mapping::Object(mapping) => Some(mapping.clone()),
            Mapping::Dynamic(dynamic) => dynamic.object_mapping_for(representation),
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ObjectMapping>> {
        match self {
            Mapping::Object(mapping) => Some(mapping),
            Mapping::Dynamic(_) => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Mapping::Dynamic(_))
    }
}

impl From<ObjectMapping> for Mapping {
    fn from(mapping: ObjectMapping) -> Self {
        Mapping::Object(Arc::new(mapping))
    }
}

impl From<Arc<ObjectMapping>> for Mapping {
    fn from(mapping: Arc<ObjectMapping>) -> Self {
        Mapping::Object(mapping)
    }
}

impl From<DynamicMapping> for Mapping {
    fn from(mapping: DynamicMapping) -> Self {
        Mapping::Dynamic(Arc::new(mapping))
    }
}

impl From<Arc<DynamicMapping>> for Mapping {
    fn from(mapping: Arc<DynamicMapping>) -> Self {
        Mapping::Dynamic(mapping)
    }
}
