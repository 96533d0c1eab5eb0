//! Mapping execution
//!
//! [`MappingOperation`] maps one representation onto one object;
//! [`MapperOperation`] scans a document for key paths and drives one mapping
//! operation per fragment found.
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

pub mod info;
pub mod mapper_operation;
pub mod mapping_operation;
pub mod observer;
pub mod source;

pub use info::{MappingInfo, PropertyOutcome};
pub use mapper_operation::{MappedValue, MapperOperation, MappingResult, TargetObject};
pub use mapping_operation::MappingOperation;
pub use observer::{MapperObserver, MappingObserver};
pub use source::{CancellationToken, Metadata, SourceContext};
