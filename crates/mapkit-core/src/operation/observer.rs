//! Hooks for watching a mapping pass
//!
//! Every hook has an empty default body; implement the ones you need.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::connection::{ConnectionDescription, Related};
use crate::error::Error;
use crate::mapping::ObjectMapping;
use crate::object::ObjectRef;
use crate::value::Value;
use serde_json::Value as Json;

/// Property-level events of a [`MappingOperation`](super::MappingOperation)
pub trait MappingObserver {
    fn did_find_value(&self, _key_path: &str, _value: &Value) {}

    fn did_not_find_value(&self, _key_path: &str) {}

    fn will_set_value(&self, _object: &ObjectRef, _key: &str, _value: &Value) {}

    fn did_set_value(&self, _object: &ObjectRef, _key: &str, _value: &Value) {}

    fn did_not_set_unchanged_value(&self, _object: &ObjectRef, _key: &str, _value: &Value) {}

    fn did_select_object_mapping(&self, _representation: &Json, _mapping: &ObjectMapping) {}

    fn did_connect_relationship(&self, _object: &ObjectRef, _connection: &ConnectionDescription, _related: &Related) {}

    fn did_fail_connecting(&self, _object: &ObjectRef, _connection: &ConnectionDescription, _error: &Error) {}

    fn did_fail_mapping_property(&self, _object: &ObjectRef, _key: &str, _error: &Error) {}
}

/// Document-level events of a [`MapperOperation`](super::MapperOperation)
pub trait MapperObserver {
    fn did_find_representation(&self, _key_path: Option<&str>, _representation: &Json) {}

    fn did_not_find_representation(&self, _key_path: Option<&str>) {}

    fn did_start(&self) {}

    fn did_finish(&self) {}

    fn did_fail(&self, _error: &Error) {}

    fn did_cancel(&self) {}

    /// Observer handed to every nested mapping operation
    fn mapping_observer(&self) -> Option<&dyn MappingObserver> {
        None
    }
}
