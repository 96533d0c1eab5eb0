//! Predicates over key-value sources
//!
//! Predicates gate and filter relationship connections and drive predicate
//! matchers in dynamic mappings. They evaluate against anything that can
//! answer a key path: destination objects and parsed documents alike.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use crate::object::{self, ObjectRef};
use crate::value::Value;
use regex::Regex;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// Anything a predicate can be evaluated against
pub trait KeyValueSource {
    fn value_for_key_path(&self, key_path: &str) -> Option<Value>;
}

impl KeyValueSource for ObjectRef {
    fn value_for_key_path(&self, key_path: &str) -> Option<Value> {
        object::value_for_key_path(self, key_path)
    }
}

impl KeyValueSource for Json {
    fn value_for_key_path(&self, key_path: &str) -> Option<Value> {
        crate::keypath::value_at(key_path, self).ok().flatten().map(Value::from)
    }
}

/// Closure signature for custom predicates
pub type PredicateFn = dyn Fn(&dyn KeyValueSource) -> bool + Send + Sync;

/// A boolean condition over key paths
#[derive(Clone)]
pub enum Predicate {
    /// Value at the key path is equivalent to the given value
    Equals { key_path: String, value: Value },
    /// Value at the key path is equivalent to one of the values
    In { key_path: String, values: Vec<Value> },
    /// Key path resolves to a non-null value
    Exists { key_path: String },
    /// String value at the key path matches the pattern
    Matches { key_path: String, pattern: Regex },
    /// Logical AND of predicates
    And(Vec<Predicate>),
    /// Logical OR of predicates
    Or(Vec<Predicate>),
    /// Logical NOT of a predicate
    Not(Box<Predicate>),
    /// Arbitrary test
    Custom { name: String, test: Arc<PredicateFn> },
}

impl Predicate {
    pub fn equals(key_path: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equals { key_path: key_path.into(), value: value.into() }
    }

    pub fn in_values(key_path: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In { key_path: key_path.into(), values }
    }

    pub fn exists(key_path: impl Into<String>) -> Self {
        Predicate::Exists { key_path: key_path.into() }
    }

    pub fn matches(key_path: impl Into<String>, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::Configuration {
            message: format!("invalid predicate pattern '{}': {}", pattern, e),
            source: None,
        })?;
        Ok(Predicate::Matches { key_path: key_path.into(), pattern })
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn custom<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&dyn KeyValueSource) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom { name: name.into(), test: Arc::new(test) }
    }

    /// Evaluate against a source
    pub fn evaluate(&self, source: &dyn KeyValueSource) -> bool {
        match self {
            Predicate::Equals { key_path, value } => source
                .value_for_key_path(key_path)
                .is_some_and(|v| v.is_equivalent(value)),
            Predicate::In { key_path, values } => source
                .value_for_key_path(key_path)
                .is_some_and(|v| values.iter().any(|candidate| candidate.is_equivalent(&v))),
            Predicate::Exists { key_path } => source
                .value_for_key_path(key_path)
                .is_some_and(|v| !v.is_null()),
            Predicate::Matches { key_path, pattern } => source
                .value_for_key_path(key_path)
                .and_then(|v| v.as_str().map(|s| pattern.is_match(s)))
                .unwrap_or(false),
            Predicate::And(predicates) => predicates.iter().all(|p| p.evaluate(source)),
            Predicate::Or(predicates) => predicates.iter().any(|p| p.evaluate(source)),
            Predicate::Not(predicate) => !predicate.evaluate(source),
            Predicate::Custom { test, .. } => test(source),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals { key_path, value } => write!(f, "{} == {:?}", key_path, value),
            Predicate::In { key_path, values } => write!(f, "{} IN {:?}", key_path, values),
            Predicate::Exists { key_path } => write!(f, "{} != nil", key_path),
            Predicate::Matches { key_path, pattern } => write!(f, "{} MATCHES '{}'", key_path, pattern),
            Predicate::And(predicates) => f.debug_tuple("And").field(predicates).finish(),
            Predicate::Or(predicates) => f.debug_tuple("Or").field(predicates).finish(),
            Predicate::Not(predicate) => f.debug_tuple("Not").field(predicate).finish(),
            Predicate::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}
