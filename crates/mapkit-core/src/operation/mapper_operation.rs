//! Mapping a whole document through a table of key paths
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use super::mapping_operation::MappingOperation;
use super::observer::{MapperObserver, MappingObserver};
use super::source::{CancellationToken, Metadata};
use crate::config::MappingOptions;
use crate::data_source::{MappingDataSource, ObjectDataSource};
use crate::error::{Error, Result};
use crate::keypath;
use crate::mapping::Mapping;
use crate::object::ObjectRef;
use crate::queue::SerialQueue;
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::sync::Arc;

/// Caller-supplied destination for the mapped document
#[derive(Debug, Clone)]
pub enum TargetObject {
    One(ObjectRef),
    /// Paired by position with the elements of an array fragment
    Many(Vec<ObjectRef>),
}

/// Objects mapped from one key path
#[derive(Debug, Clone)]
pub enum MappedValue {
    One(ObjectRef),
    Many(Vec<ObjectRef>),
}

impl MappedValue {
    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            MappedValue::One(object) => vec![object.clone()],
            MappedValue::Many(objects) => objects.clone(),
        }
    }

    pub fn first(&self) -> Option<&ObjectRef> {
        match self {
            MappedValue::One(object) => Some(object),
            MappedValue::Many(objects) => objects.first(),
        }
    }
}

/// Mapped objects keyed by the key path they were found at; `None` is the
/// document root
#[derive(Debug, Clone, Default)]
pub struct MappingResult {
    values: IndexMap<Option<String>, MappedValue>,
}

impl MappingResult {
    pub fn get(&self, key_path: Option<&str>) -> Option<&MappedValue> {
        self.values
            .iter()
            .find(|(key, _)| key.as_deref() == key_path)
            .map(|(_, value)| value)
    }

    pub fn contains_key_path(&self, key_path: Option<&str>) -> bool {
        self.get(key_path).is_some()
    }

    /// First object of the first key path mapped
    pub fn first_object(&self) -> Option<ObjectRef> {
        self.values.values().find_map(|v| v.first().cloned())
    }

    /// Every mapped object, in key path then document order
    pub fn array(&self) -> Vec<ObjectRef> {
        self.values.values().flat_map(MappedValue::objects).collect()
    }

    pub fn dictionary(&self) -> &IndexMap<Option<String>, MappedValue> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Finds mappable fragments in a parsed document and maps each with a
/// [`MappingOperation`].
///
/// Fragment failures are collected in [`errors`](Self::errors) while the
/// remaining key paths are still processed.
pub struct MapperOperation {
    representation: Json,
    mappings: IndexMap<Option<String>, Mapping>,
    target: Option<TargetObject>,
    data_source: Arc<dyn MappingDataSource>,
    metadata: Option<Json>,
    options: Arc<MappingOptions>,
    cancellation: CancellationToken,
    callback_queue: Option<SerialQueue>,
    errors: Vec<Error>,
}

impl MapperOperation {
    pub fn new<K, M>(representation: Json, mappings: impl IntoIterator<Item = (K, M)>) -> Self
    where
        K: Into<Option<String>>,
        M: Into<Mapping>,
    {
        Self {
            representation,
            mappings: mappings.into_iter().map(|(k, m)| (k.into(), m.into())).collect(),
            target: None,
            data_source: Arc::new(ObjectDataSource::new()),
            metadata: None,
            options: Arc::new(MappingOptions::default()),
            cancellation: CancellationToken::new(),
            callback_queue: None,
            errors: Vec::new(),
        }
    }

    pub fn with_target_object(mut self, target: TargetObject) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_data_source(mut self, data_source: Arc<dyn MappingDataSource>) -> Self {
        self.data_source = data_source;
        self
    }

    /// Outermost metadata provider, visible through `@metadata` key paths
    pub fn with_metadata(mut self, metadata: Json) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_options(mut self, options: MappingOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Queue completions of [`enqueue`](Self::enqueue) are delivered on
    pub fn with_callback_queue(mut self, queue: SerialQueue) -> Self {
        self.callback_queue = Some(queue);
        self
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Errors of individual fragments from the last execution
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Map every key path found in the document.
    ///
    /// Fails with [`Error::MappingNotFound`] when no key path matched and
    /// with [`Error::MappingFailed`] when fragments were found but none of
    /// them mapped.
    pub fn execute(&mut self, observer: Option<&dyn MapperObserver>) -> Result<MappingResult> {
        let span = tracing::debug_span!("mapper_execute", key_paths = self.mappings.len());
        let _enter = span.enter();

        self.errors.clear();
        if let Some(observer) = observer {
            observer.did_start();
        }
        let metadata = match &self.metadata {
            Some(provider) => Metadata::new().with_provider(provider.clone()),
            None => Metadata::new(),
        };
        let mapping_observer = observer.and_then(|o| o.mapping_observer());

        let mut result = MappingResult::default();
        let mut found_any = false;
        for (key_path, mapping) in &self.mappings {
            if self.cancellation.is_cancelled() {
                break;
            }
            let found = match key_path {
                None => Some(self.representation.clone()),
                Some(path) => match keypath::value_at(path, &self.representation) {
                    Ok(found) => found,
                    Err(error) => {
                        self.errors.push(error);
                        continue;
                    }
                },
            };
            let Some(found) = found.filter(|f| !f.is_null()) else {
                log::debug!("Nothing found at key path {:?}", key_path);
                if let Some(observer) = observer {
                    observer.did_not_find_representation(key_path.as_deref());
                }
                continue;
            };
            found_any = true;
            if let Some(observer) = observer {
                observer.did_find_representation(key_path.as_deref(), &found);
            }

            let (mapped, errors) = self.map_fragment(&found, mapping, &metadata, mapping_observer);
            self.errors.extend(errors);
            if let Some(mapped) = mapped {
                result.values.insert(key_path.clone(), mapped);
            }
        }

        if self.cancellation.is_cancelled() {
            log::debug!("Mapper cancelled after {} key path(s)", result.len());
            if let Some(observer) = observer {
                observer.did_cancel();
            }
            return Ok(result);
        }

        let outcome = if !found_any {
            Err(Error::MappingNotFound {
                key_paths: self.mappings.keys().cloned().collect(),
            })
        } else if result.is_empty() && !self.errors.is_empty() {
            Err(Error::MappingFailed {
                errors: std::mem::take(&mut self.errors),
            })
        } else {
            Ok(result)
        };

        if let Some(observer) = observer {
            match &outcome {
                Ok(_) => observer.did_finish(),
                Err(error) => observer.did_fail(error),
            }
        }
        outcome
    }

    fn map_fragment(
        &self,
        found: &Json,
        mapping: &Mapping,
        metadata: &Metadata,
        observer: Option<&dyn MappingObserver>,
    ) -> (Option<MappedValue>, Vec<Error>) {
        let elements = match found {
            Json::Array(items) => Some(items.clone()),
            other => mapping.as_object().and_then(|m| m.collection_fragments(other)),
        };

        let Some(elements) = elements else {
            let destination = match &self.target {
                Some(TargetObject::One(object)) => Some(object.clone()),
                _ => None,
            };
            return match self.map_one(found, mapping, metadata, destination, observer) {
                Ok(object) => (object.map(MappedValue::One), Vec::new()),
                Err(error) => (None, vec![error]),
            };
        };

        let mut objects = Vec::with_capacity(elements.len());
        let mut errors = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                break;
            }
            let destination = match &self.target {
                Some(TargetObject::Many(targets)) => targets.get(index).cloned(),
                _ => None,
            };
            match self.map_one(element, mapping, metadata, destination, observer) {
                Ok(Some(object)) => objects.push(object),
                Ok(None) => {}
                Err(error) => errors.push(error),
            }
        }
        if objects.is_empty() && !errors.is_empty() {
            return (None, errors);
        }
        (Some(MappedValue::Many(objects)), errors)
    }

    fn map_one(
        &self,
        representation: &Json,
        mapping: &Mapping,
        metadata: &Metadata,
        destination: Option<ObjectRef>,
        observer: Option<&dyn MappingObserver>,
    ) -> Result<Option<ObjectRef>> {
        let mut operation = MappingOperation::new(representation, mapping.clone(), self.data_source.as_ref())
            .with_metadata(metadata.clone())
            .with_shared_options(self.options.clone())
            .with_cancellation_token(self.cancellation.clone());
        if let Some(destination) = destination {
            operation = operation.with_destination(destination);
        }
        if let Some(observer) = observer {
            operation = operation.with_observer(observer);
        }
        if let Err(error) = operation.perform_mapping() {
            log::debug!("Fragment failed to map: {}", error);
            return Err(error);
        }
        Ok(operation.destination_object().cloned())
    }

    /// Run on `queue`; `completion` receives the result and the fragment
    /// errors on the callback queue. Without an explicit one, a queue named
    /// by the options' `callback_queue_label` is used.
    pub fn enqueue<F>(mut self, queue: &SerialQueue, completion: F)
    where
        F: FnOnce(Result<MappingResult>, Vec<Error>) + Send + 'static,
    {
        if self.callback_queue.is_none() {
            match self.options.callback_queue() {
                Ok(callbacks) => self.callback_queue = Some(callbacks),
                Err(e) => log::warn!("Completing on the mapping queue: {}", e),
            }
        }
        queue.dispatch(move || {
            let result = self.execute(None);
            let errors = std::mem::take(&mut self.errors);
            match self.callback_queue.take() {
                Some(callbacks) => callbacks.dispatch(move || completion(result, errors)),
                None => completion(result, errors),
            }
        });
    }
}

impl std::fmt::Debug for MapperOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperOperation")
            .field("key_paths", &self.mappings.keys().collect::<Vec<_>>())
            .field("has_target", &self.target.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
