//! Error types for the Mapkit core library
//!
//! This module defines the error handling system for Mapkit, using thiserror
//! for ergonomic error definitions and anyhow for collaborator failures whose
//! concrete type the engine does not know.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

use crate::transformer::TransformError;

/// Main error type for Mapkit operations
#[derive(Error, Debug)]
pub enum Error {
    /// None of the configured key paths matched anything in the document
    #[error("No mappable content found for key paths: {}", display_key_paths(.key_paths))]
    MappingNotFound {
        key_paths: Vec<Option<String>>,
    },

    /// Every fragment that was found failed to map
    #[error("Mapping failed with {} error(s): {}", .errors.len(), display_errors(.errors))]
    MappingFailed {
        errors: Vec<Error>,
    },

    /// A value transformation failed and the options asked for it to be fatal
    #[error("Value transformation failed at {key_path}: {source}")]
    Transformation {
        key_path: String,
        #[source]
        source: TransformError,
    },

    /// Malformed key path
    #[error("Invalid key path '{path}': {message}")]
    InvalidKeyPath {
        path: String,
        message: String,
    },

    /// Entity not registered with the schema
    #[error("Unknown entity: {name}")]
    UnknownEntity {
        name: String,
    },

    /// Property not declared by an entity
    #[error("Unknown property '{key}' on entity {entity}")]
    UnknownProperty {
        entity: String,
        key: String,
    },

    /// A value did not match the declared type of the property it was written to
    #[error("Validation error: {entity}.{key} - {message}")]
    Validation {
        entity: String,
        key: String,
        message: String,
    },

    /// Assignment policy applied to a relationship that cannot honor it
    #[error("Assignment policy {policy} is not supported for relationship '{relationship}': {message}")]
    UnsupportedAssignmentPolicy {
        relationship: String,
        policy: AssignmentPolicy,
        message: String,
    },

    /// Lookup issued against a cache that has not been loaded
    #[error("Attribute cache for {entity} by {attributes:?} is not loaded")]
    CacheNotLoaded {
        entity: String,
        attributes: Vec<String>,
    },

    /// Lookup attribute set does not match the cache key attribute set
    #[error("Cache for {entity} is keyed by {expected:?}, lookup supplied {provided:?}")]
    CacheKeyMismatch {
        entity: String,
        expected: Vec<String>,
        provided: Vec<String>,
    },

    /// Identity token could not be resolved in a context
    #[error("Object {id} not found")]
    ObjectNotFound {
        id: crate::object::ObjectId,
    },

    /// Mapping data source failure
    #[error("Data source error: {message}")]
    DataSource {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Persistence store failure
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// How a newly mapped relationship value combines with the existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssignmentPolicy {
    /// Overwrite the reference only
    #[default]
    Set,
    /// Overwrite and delete the previous targets that are no longer referenced
    Replace,
    /// Merge into the existing collection (to-many only)
    Union,
}

impl fmt::Display for AssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentPolicy::Set => write!(f, "Set"),
            AssignmentPolicy::Replace => write!(f, "Replace"),
            AssignmentPolicy::Union => write!(f, "Union"),
        }
    }
}

impl Error {
    /// Whether this error reports that nothing mappable was found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::MappingNotFound { .. })
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Error::Internal {
            message: format!("{} lock poisoned", what),
            source: anyhow::anyhow!("a thread panicked while holding the {} lock", what),
        }
    }
}

fn display_key_paths(key_paths: &[Option<String>]) -> String {
    key_paths
        .iter()
        .map(|k| k.as_deref().unwrap_or("<root>").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}
