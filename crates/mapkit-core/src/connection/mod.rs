//! Relationship connections
//!
//! A [`ConnectionDescription`] populates a relationship from data already in
//! the store instead of from nested representation data: either by matching
//! foreign-key attributes against the target entity, or by evaluating a key
//! path on the source object. Resolution is done by a [`ConnectionResolver`].
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod resolver;

pub use resolver::{ConnectionResolver, EntityCacheConnectionResolver, Related};

use crate::error::{AssignmentPolicy, Error, Result};
use crate::object::{Entity, RelationshipDescriptor};
use crate::predicate::Predicate;
use crate::transformer::ValueTransformer;
use std::sync::Arc;

/// How a connection finds its related objects
#[derive(Debug, Clone)]
pub enum ConnectionKind {
    /// `(source attribute, destination attribute)` pairs, combined with AND
    ForeignKey(Vec<(String, String)>),
    /// Key path evaluated on the source object
    KeyPath(String),
}

/// Describes how one relationship is connected
#[derive(Debug, Clone)]
pub struct ConnectionDescription {
    relationship: String,
    descriptor: RelationshipDescriptor,
    kind: ConnectionKind,
    source_predicate: Option<Predicate>,
    destination_predicate: Option<Predicate>,
    includes_subentities: bool,
    assignment_policy: AssignmentPolicy,
    value_transformer: Option<Arc<dyn ValueTransformer>>,
}

impl ConnectionDescription {
    fn new(entity: &Entity, relationship: &str, kind: ConnectionKind) -> Result<Self> {
        let descriptor = entity
            .relationship(relationship)
            .cloned()
            .ok_or_else(|| Error::UnknownProperty {
                entity: entity.name().to_string(),
                key: relationship.to_string(),
            })?;
        Ok(Self {
            relationship: relationship.to_string(),
            descriptor,
            kind,
            source_predicate: None,
            destination_predicate: None,
            includes_subentities: true,
            assignment_policy: AssignmentPolicy::default(),
            value_transformer: None,
        })
    }

    /// Connect `relationship` by matching source attributes against
    /// destination attributes
    pub fn foreign_key<I, S, D>(entity: &Entity, relationship: &str, attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        let pairs: Vec<(String, String)> = attributes.into_iter().map(|(s, d)| (s.into(), d.into())).collect();
        if pairs.is_empty() {
            return Err(Error::Configuration {
                message: format!("foreign key connection of {}.{} needs attributes", entity.name(), relationship),
                source: None,
            });
        }
        for (source, _) in &pairs {
            let head = source.split('.').next().unwrap_or(source);
            if !entity.has_property(head) {
                return Err(Error::UnknownProperty {
                    entity: entity.name().to_string(),
                    key: source.clone(),
                });
            }
        }
        Self::new(entity, relationship, ConnectionKind::ForeignKey(pairs))
    }

    /// Connect `relationship` with the result of a key path on the source
    pub fn key_path(entity: &Entity, relationship: &str, key_path: impl Into<String>) -> Result<Self> {
        Self::new(entity, relationship, ConnectionKind::KeyPath(key_path.into()))
    }

    /// Gate evaluated on the source object before anything is looked up
    pub fn with_source_predicate(mut self, predicate: Predicate) -> Self {
        self.source_predicate = Some(predicate);
        self
    }

    /// Filter applied to candidate destination objects
    pub fn with_destination_predicate(mut self, predicate: Predicate) -> Self {
        self.destination_predicate = Some(predicate);
        self
    }

    pub fn with_includes_subentities(mut self, includes: bool) -> Self {
        self.includes_subentities = includes;
        self
    }

    pub fn with_assignment_policy(mut self, policy: AssignmentPolicy) -> Self {
        self.assignment_policy = policy;
        self
    }

    /// Transformer applied to the result of a key path connection
    pub fn with_value_transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.value_transformer = Some(transformer);
        self
    }

    pub fn relationship(&self) -> &str {
        &self.relationship
    }

    pub fn descriptor(&self) -> &RelationshipDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> &ConnectionKind {
        &self.kind
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ConnectionKind::ForeignKey(_))
    }

    pub fn is_to_many(&self) -> bool {
        self.descriptor.cardinality.is_to_many()
    }

    /// Destination attributes of a foreign key connection, in order
    pub fn destination_attributes(&self) -> Vec<String> {
        match &self.kind {
            ConnectionKind::ForeignKey(pairs) => pairs.iter().map(|(_, d)| d.clone()).collect(),
            ConnectionKind::KeyPath(_) => Vec::new(),
        }
    }

    pub fn source_predicate(&self) -> Option<&Predicate> {
        self.source_predicate.as_ref()
    }

    pub fn destination_predicate(&self) -> Option<&Predicate> {
        self.destination_predicate.as_ref()
    }

    pub fn includes_subentities(&self) -> bool {
        self.includes_subentities
    }

    pub fn assignment_policy(&self) -> AssignmentPolicy {
        self.assignment_policy
    }

    pub fn value_transformer(&self) -> Option<&Arc<dyn ValueTransformer>> {
        self.value_transformer.as_ref()
    }
}
