//! Mapping options
//!
//! Options are plain serde data: built in code, parsed from JSON, or read
//! from `MAPKIT_*` environment variables (a `.env` file is honored).
//!
//! Copyright (c) 2025 Mapkit Team
//! Licensed under the Apache-2.0 license

use crate::error::{Error, Result};
use crate::queue::{SerialQueue, DEFAULT_CALLBACK_QUEUE_LABEL};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`MappingOptions::from_env`]
pub const ENV_PREFIX: &str = "MAPKIT_";

/// Knobs shared by every operation of one mapping pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingOptions {
    /// Treat a failed value transformation as the operation's error instead
    /// of skipping the property
    pub abort_on_transformation_failure: bool,
    /// Skip writes whose value is equivalent to the current one
    pub skip_unchanged_values: bool,
    /// Deepest relationship nesting mapped before giving up
    pub max_relationship_depth: usize,
    /// Label of the queue completions are delivered on
    pub callback_queue_label: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            abort_on_transformation_failure: false,
            skip_unchanged_values: true,
            max_relationship_depth: 64,
            callback_queue_label: DEFAULT_CALLBACK_QUEUE_LABEL.to_string(),
        }
    }
}

impl MappingOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Configuration {
            message: format!("invalid mapping options: {}", e),
            source: Some(e.into()),
        })
    }

    /// Defaults overridden by `MAPKIT_ABORT_ON_TRANSFORMATION_FAILURE`,
    /// `MAPKIT_SKIP_UNCHANGED_VALUES`, `MAPKIT_MAX_RELATIONSHIP_DEPTH` and
    /// `MAPKIT_CALLBACK_QUEUE_LABEL`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        if let Some(value) = var("ABORT_ON_TRANSFORMATION_FAILURE") {
            options.abort_on_transformation_failure = parse_flag("ABORT_ON_TRANSFORMATION_FAILURE", &value)?;
        }
        if let Some(value) = var("SKIP_UNCHANGED_VALUES") {
            options.skip_unchanged_values = parse_flag("SKIP_UNCHANGED_VALUES", &value)?;
        }
        if let Some(value) = var("MAX_RELATIONSHIP_DEPTH") {
            options.max_relationship_depth = value.trim().parse().map_err(|e| Error::Configuration {
                message: format!("{}MAX_RELATIONSHIP_DEPTH must be a positive integer, got '{}'", ENV_PREFIX, value),
                source: Some(anyhow::Error::new(e)),
            })?;
        }
        if let Some(value) = var("CALLBACK_QUEUE_LABEL") {
            options.callback_queue_label = value;
        }
        log::debug!("Loaded mapping options from environment: {:?}", options);
        Ok(options)
    }

    pub fn with_abort_on_transformation_failure(mut self, enabled: bool) -> Self {
        self.abort_on_transformation_failure = enabled;
        self
    }

    pub fn with_skip_unchanged_values(mut self, enabled: bool) -> Self {
        self.skip_unchanged_values = enabled;
        self
    }

    pub fn with_max_relationship_depth(mut self, depth: usize) -> Self {
        self.max_relationship_depth = depth;
        self
    }

    pub fn with_callback_queue_label(mut self, label: impl Into<String>) -> Self {
        self.callback_queue_label = label.into();
        self
    }

    /// A new serial queue named by `callback_queue_label`
    pub fn callback_queue(&self) -> Result<SerialQueue> {
        SerialQueue::new(self.callback_queue_label.clone())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Configuration {
            message: format!("{}{} must be a boolean, got '{}'", ENV_PREFIX, name, value),
            source: None,
        }),
    }
}
