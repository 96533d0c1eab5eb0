//! Attribute and relationship mappings
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::Mapping;
use crate::error::AssignmentPolicy;
use crate::transformer::ValueTransformer;
use std::fmt;
use std::sync::Arc;

/// Maps one source key path onto one destination attribute
#[derive(Clone)]
pub struct AttributeMapping {
    source_key_path: Option<String>,
    destination_key_path: String,
    value_transformer: Option<Arc<dyn ValueTransformer>>,
}

impl AttributeMapping {
    pub fn new(source_key_path: impl Into<String>, destination_key_path: impl Into<String>) -> Self {
        Self {
            source_key_path: Some(source_key_path.into()),
            destination_key_path: destination_key_path.into(),
            value_transformer: None,
        }
    }

    /// Maps the key a forced-collection representation was found under
    pub fn from_key_of_representation(destination_key_path: impl Into<String>) -> Self {
        Self {
            source_key_path: None,
            destination_key_path: destination_key_path.into(),
            value_transformer: None,
        }
    }

    /// Transformer used for this attribute instead of the mapping's
    pub fn with_value_transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.value_transformer = Some(transformer);
        self
    }

    /// `None` for the key-of-representation mapping
    pub fn source_key_path(&self) -> Option<&str> {
        self.source_key_path.as_deref()
    }

    pub fn destination_key_path(&self) -> &str {
        &self.destination_key_path
    }

    pub fn value_transformer(&self) -> Option<&Arc<dyn ValueTransformer>> {
        self.value_transformer.as_ref()
    }
}

impl fmt::Debug for AttributeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AttributeMapping({} -> {})",
            self.source_key_path.as_deref().unwrap_or("(key)"),
            self.destination_key_path
        )
    }
}

/// Maps a nested representation onto a relationship through another mapping
#[derive(Debug, Clone)]
pub struct RelationshipMapping {
    source_key_path: Option<String>,
    destination_key_path: String,
    mapping: Mapping,
    assignment_policy: AssignmentPolicy,
}

impl RelationshipMapping {
    pub fn new(
        source_key_path: impl Into<String>,
        destination_key_path: impl Into<String>,
        mapping: impl Into<Mapping>,
    ) -> Self {
        Self {
            source_key_path: Some(source_key_path.into()),
            destination_key_path: destination_key_path.into(),
            mapping: mapping.into(),
            assignment_policy: AssignmentPolicy::default(),
        }
    }

    /// Relationship whose data sits in the parent representation itself
    pub fn from_parent_representation(destination_key_path: impl Into<String>, mapping: impl Into<Mapping>) -> Self {
        Self {
            source_key_path: None,
            destination_key_path: destination_key_path.into(),
            mapping: mapping.into(),
            assignment_policy: AssignmentPolicy::default(),
        }
    }

    pub fn with_assignment_policy(mut self, policy: AssignmentPolicy) -> Self {
        self.assignment_policy = policy;
        self
    }

    pub fn source_key_path(&self) -> Option<&str> {
        self.source_key_path.as_deref()
    }

    pub fn destination_key_path(&self) -> &str {
        &self.destination_key_path
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn assignment_policy(&self) -> AssignmentPolicy {
        self.assignment_policy
    }
}
