//! Value transformer registry for coercing property values between classes
//!
//! Attribute mapping hands every resolved source value to a transformer
//! before assignment so that, for example, an ISO 8601 string lands in a
//! date attribute and a numeric identifier lands in a string attribute.
//!
//! # Module Organization
//!
//! - [`types`] - the [`ValueTransformer`] trait and error definitions
//! - [`built_in`] - stock transformers (URLs, numbers, collections, dates, archives)
//! - [`compound`] - ordered chain of transformers, first success wins
//! - [`tests`] - test suite
//!
//! # Examples
//!
//! ```
//! use mapkit_core::transformer::{CompoundValueTransformer, ValueTransformer};
//! use mapkit_core::{Value, ValueKind};
//!
//! let registry = CompoundValueTransformer::default_transformer();
//! let url = registry.transform(&Value::from("https://example.com"), ValueKind::Url).unwrap();
//! assert_eq!(url.kind(), ValueKind::Url);
//! ```
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

// Core trait and error definitions
pub mod types;

// Stock transformers
pub mod built_in;

// Ordered transformer chain
pub mod compound;


pub use types::{BlockValueTransformer, TransformError, TransformResult, ValueTransformer};
pub use compound::CompoundValueTransformer;
