//! Mapkit Core - Object mapping engine for parsed documents
//!
//! This crate maps parsed documents (`serde_json::Value` trees) onto typed
//! object graphs and back, driven by declarative mapping descriptions.
//!
//! # Main Components
//!
//! - **Value Transformers**: Coerce source values to declared property kinds
//! - **Mappings**: Object, dynamic, attribute and relationship mappings
//! - **Operations**: `MappingOperation` for one representation, `MapperOperation` for a document
//! - **Caching**: Attribute-value indexes for find-or-create and connections
//! - **Connections**: Populate relationships from foreign keys or key paths
//!
//! # Example
//!
//! ```
//! use mapkit_core::{Entity, MapperOperation, ObjectMapping, Result, Value, ValueKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! fn example() -> Result<()> {
//!     let user = Arc::new(Entity::new("User").attribute("name", ValueKind::String));
//!     let mapping = ObjectMapping::new(user).attribute("full_name", "name");
//!     let document = json!({"user": {"full_name": "Blake Watters"}});
//!
//!     let mut mapper = MapperOperation::new(document, [(Some("user".to_string()), mapping)]);
//!     let result = mapper.execute(None)?;
//!     let object = result.first_object().expect("mapped user");
//!     assert_eq!(object.value("name"), Some(Value::from("Blake Watters")));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod cache;
pub mod config;
pub mod connection;
pub mod data_source;
pub mod error;
pub mod keypath;
pub mod mapping;
pub mod object;
pub mod operation;
pub mod predicate;
pub mod queue;
pub mod serialization;
pub mod store;
pub mod transformer;
pub mod value;

// Re-export main types for convenience
pub use error::{AssignmentPolicy, Error, Result};
pub use config::MappingOptions;
pub use value::{Decimal, Value, ValueKind};
pub use object::{Entity, MappableObject, ObjectId, ObjectRef, Record, Schema};
pub use transformer::{CompoundValueTransformer, TransformError, ValueTransformer};
pub use mapping::{AttributeMapping, DynamicMapping, Mapping, Matcher, ObjectMapping, RelationshipMapping};
pub use predicate::Predicate;
pub use connection::{ConnectionDescription, ConnectionResolver, EntityCacheConnectionResolver, Related};
pub use cache::{EntityAttributeCache, EntityCache, FetchObjectCache, InMemoryObjectCache, ManagedObjectCaching};
pub use store::{ObjectContext, ObjectStore};
pub use data_source::{ManagedObjectDataSource, MappingDataSource, ObjectDataSource};
pub use operation::{
    CancellationToken, MappedValue, MapperObserver, MapperOperation, MappingInfo, MappingObserver,
    MappingOperation, MappingResult, Metadata, PropertyOutcome, TargetObject,
};
pub use serialization::{ObjectSerializer, RequestMapping};
pub use queue::SerialQueue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::Configuration {
            message: "Test error".to_string(),
            source: None,
        };
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_assignment_policy_default() {
        assert_eq!(AssignmentPolicy::default(), AssignmentPolicy::Set);
        assert_ne!(AssignmentPolicy::Set, AssignmentPolicy::Union);
    }
}
