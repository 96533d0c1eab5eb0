//! Ordered chain of value transformers
//!
//! The compound transformer asks each registered transformer in turn and
//! returns the first successful result. Registration prepends, so the most
//! recently added transformer is consulted first and can override the stock
//! behavior.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::built_in;
use super::types::{TransformError, TransformResult, ValueTransformer};
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// A chain of transformers tried in order until one succeeds
#[derive(Debug, Clone)]
pub struct CompoundValueTransformer {
    name: String,
    transformers: Vec<Arc<dyn ValueTransformer>>,
}

impl CompoundValueTransformer {
    /// Create an empty chain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transformers: Vec::new(),
        }
    }

    /// The stock registry.
    ///
    /// ISO 8601 parsing is registered after the looser date formats, so it
    /// is consulted before them.
    pub fn default_transformer() -> Self {
        let mut compound = Self::new("default");
        compound.add(built_in::object_to_collection());
        compound.add(built_in::keyed_archive());
        compound.add(built_in::string_value());
        compound.add(built_in::null_to_nil());
        compound.add(built_in::timestamp_to_date());
        compound.add(built_in::decimal_to_string());
        compound.add(built_in::decimal_to_number());
        compound.add(built_in::array_to_set());
        compound.add(built_in::array_to_ordered_set());
        compound.add(built_in::number_to_number());
        compound.add(built_in::number_to_string());
        compound.add(built_in::string_to_url());
        compound.add(built_in::date_formatter(built_in::default_date_formats()));
        compound.add(built_in::iso8601_timestamp());
        compound.add(built_in::identity());
        compound
    }

    /// Register a transformer ahead of every existing one
    pub fn add(&mut self, transformer: Arc<dyn ValueTransformer>) {
        self.transformers.insert(0, transformer);
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.add(transformer);
        self
    }

    /// Register a transformer at an explicit position in the chain
    pub fn insert(&mut self, transformer: Arc<dyn ValueTransformer>, index: usize) {
        let index = index.min(self.transformers.len());
        self.transformers.insert(index, transformer);
    }

    /// Remove every transformer with the given name, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.transformers.len();
        self.transformers.retain(|t| t.name() != name);
        before - self.transformers.len()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Transformers able to handle the given conversion, in consultation order
    pub fn transformers_for(&self, input: ValueKind, output: ValueKind) -> Vec<Arc<dyn ValueTransformer>> {
        self.transformers
            .iter()
            .filter(|t| t.validates(input, output))
            .cloned()
            .collect()
    }
}

impl Default for CompoundValueTransformer {
    fn default() -> Self {
        Self::default_transformer()
    }
}

impl ValueTransformer for CompoundValueTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn validates(&self, input: ValueKind, output: ValueKind) -> bool {
        self.transformers.iter().any(|t| t.validates(input, output))
    }

    fn transform(&self, input: &Value, output: ValueKind) -> TransformResult<Value> {
        let mut last_error = None;
        for transformer in &self.transformers {
            if !transformer.validates(input.kind(), output) {
                continue;
            }
            match transformer.transform(input, output) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    log::trace!("Transformer '{}' declined {} -> {}: {}", transformer.name(), input.kind(), output, err);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TransformError::UntransformableInput {
            transformer: self.name.clone(),
            input: input.kind(),
            output,
        }))
    }
}
