//! Per-object record of what a mapping pass did
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use indexmap::IndexMap;
use serde::Serialize;

/// What happened to one destination property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PropertyOutcome {
    Set,
    /// A value was found but equals the current one; nothing was written
    Unchanged,
    NotFound,
    Failed(String),
}

/// Outcomes for one mapped object and, recursively, its relationships
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingInfo {
    entity: String,
    is_new_object: bool,
    properties: IndexMap<String, PropertyOutcome>,
    relationships: IndexMap<String, Vec<MappingInfo>>,
    connections: Vec<String>,
}

impl MappingInfo {
    pub(crate) fn new(entity: impl Into<String>, is_new_object: bool) -> Self {
        Self {
            entity: entity.into(),
            is_new_object,
            properties: IndexMap::new(),
            relationships: IndexMap::new(),
            connections: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, key: &str, outcome: PropertyOutcome) {
        self.properties.insert(key.to_string(), outcome);
    }

    pub(crate) fn record_relationship(&mut self, key: &str, children: Vec<MappingInfo>) {
        self.relationships.insert(key.to_string(), children);
    }

    pub(crate) fn record_connection(&mut self, relationship: &str, outcome: PropertyOutcome) {
        self.connections.push(relationship.to_string());
        self.record(relationship, outcome);
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn is_new_object(&self) -> bool {
        self.is_new_object
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyOutcome> {
        &self.properties
    }

    pub fn outcome(&self, key: &str) -> Option<&PropertyOutcome> {
        self.properties.get(key)
    }

    /// Child infos of a mapped relationship, in representation order
    pub fn relationship(&self, key: &str) -> Option<&[MappingInfo]> {
        self.relationships.get(key).map(Vec::as_slice)
    }

    pub fn relationships(&self) -> &IndexMap<String, Vec<MappingInfo>> {
        &self.relationships
    }

    /// Relationships populated by connections
    pub fn connections(&self) -> &[String] {
        &self.connections
    }

    /// Whether any property of this object itself was written
    pub fn has_set_properties(&self) -> bool {
        self.properties.values().any(|o| *o == PropertyOutcome::Set)
    }

    /// Whether nothing was written here or in any nested object
    pub fn all_unchanged(&self) -> bool {
        self.properties
            .values()
            .all(|o| matches!(o, PropertyOutcome::Unchanged | PropertyOutcome::NotFound))
            && self.relationships.values().flatten().all(MappingInfo::all_unchanged)
    }

    /// Keys whose value was written
    pub fn set_keys(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, outcome)| **outcome == PropertyOutcome::Set)
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_unchanged_is_recursive() {
        let mut child = MappingInfo::new("Address", false);
        child.record("city", PropertyOutcome::Unchanged);
        let mut info = MappingInfo::new("User", false);
        info.record("name", PropertyOutcome::Unchanged);
        info.record("nickname", PropertyOutcome::NotFound);
        info.record_relationship("address", vec![child.clone()]);
        assert!(info.all_unchanged());

        child.record("street", PropertyOutcome::Set);
        info.record_relationship("address", vec![child]);
        assert!(!info.all_unchanged());
    }

    #[test]
    fn test_connections_are_recorded_as_properties() {
        let mut info = MappingInfo::new("Team", true);
        info.record_connection("members", PropertyOutcome::Set);
        assert_eq!(info.connections(), &["members".to_string()]);
        assert_eq!(info.set_keys(), vec!["members"]);
    }
}
