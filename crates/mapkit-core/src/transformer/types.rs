//! Core types for the value transformer registry
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::value::{Value, ValueKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during value transformations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The transformer cannot accept this input class
    #[error("Untransformable input: {transformer} cannot transform {input} to {output}")]
    UntransformableInput {
        transformer: String,
        input: ValueKind,
        output: ValueKind,
    },

    /// The transformer cannot produce this output class
    #[error("Unsupported output class: {transformer} cannot produce {output}")]
    UnsupportedOutputClass {
        transformer: String,
        output: ValueKind,
    },

    /// The transformer accepted the input but could not convert it
    #[error("Transformation failed in {transformer}: {message}")]
    TransformationFailed {
        transformer: String,
        message: String,
    },
}

/// Result type for transformer implementations
pub type TransformResult<T> = std::result::Result<T, TransformError>;

/// A pluggable coercion between value classes.
///
/// Transformers are pure: they never mutate their input and hold no state
/// that changes across calls.
pub trait ValueTransformer: Send + Sync + fmt::Debug {
    /// Human readable name used in errors and logs
    fn name(&self) -> &str;

    /// Capability probe: can this transformer turn `input` into `output`?
    ///
    /// Answering never performs the transformation.
    fn validates(&self, input: ValueKind, output: ValueKind) -> bool;

    /// Transform `input` into a value of class `output`
    fn transform(&self, input: &Value, output: ValueKind) -> TransformResult<Value>;
}

/// Signature of a transformation closure
pub type TransformFn = dyn Fn(&Value, ValueKind) -> TransformResult<Value> + Send + Sync;

/// Signature of a capability probe closure
pub type ValidateFn = dyn Fn(ValueKind, ValueKind) -> bool + Send + Sync;

/// Transformer built from a pair of closures
#[derive(Clone)]
pub struct BlockValueTransformer {
    name: String,
    validation: Arc<ValidateFn>,
    transformation: Arc<TransformFn>,
}

impl BlockValueTransformer {
    pub fn new<V, T>(name: impl Into<String>, validation: V, transformation: T) -> Self
    where
        V: Fn(ValueKind, ValueKind) -> bool + Send + Sync + 'static,
        T: Fn(&Value, ValueKind) -> TransformResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            validation: Arc::new(validation),
            transformation: Arc::new(transformation),
        }
    }

    /// Failure for this transformer with a message
    pub fn failure(&self, message: impl Into<String>) -> TransformError {
        TransformError::TransformationFailed {
            transformer: self.name.clone(),
            message: message.into(),
        }
    }
}

impl ValueTransformer for BlockValueTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn validates(&self, input: ValueKind, output: ValueKind) -> bool {
        (self.validation)(input, output)
    }

    fn transform(&self, input: &Value, output: ValueKind) -> TransformResult<Value> {
        if !self.validates(input.kind(), output) {
            return Err(TransformError::UntransformableInput {
                transformer: self.name.clone(),
                input: input.kind(),
                output,
            });
        }
        (self.transformation)(input, output)
    }
}

impl fmt::Debug for BlockValueTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockValueTransformer").field("name", &self.name).finish()
    }
}

impl From<TransformError> for crate::Error {
    fn from(err: TransformError) -> Self {
        crate::Error::Transformation {
            key_path: String::new(),
            source: err,
        }
    }
}
