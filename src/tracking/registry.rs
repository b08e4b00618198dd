//! Model registry
//!
//! A registered model is a name plus an ordered list of versions, each
//! pointing at a model logged by some run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// One version of a registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,
    /// Version number, starting at 1
    pub version: u32,
    /// Run that logged the model
    pub run_id: String,
    /// Location of the logged model directory
    pub source: String,
    /// SHA-256 of the serialized model
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// A named, versioned model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub versions: Vec<ModelVersion>,
}

impl RegisteredModel {
    /// Create an empty registry entry
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        let now = Utc::now();
        Ok(Self {
            name,
            created_at: now,
            last_updated: now,
            versions: Vec::new(),
        })
    }

    /// Version number the next registration will get
    pub fn next_version(&self) -> u32 {
        self.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1
    }

    /// Append a new version
    pub fn add_version(
        &mut self,
        run_id: impl Into<String>,
        source: impl Into<String>,
        checksum: impl Into<String>,
    ) -> ModelVersion {
        let now = Utc::now();
        let version = ModelVersion {
            name: self.name.clone(),
            version: self.next_version(),
            run_id: run_id.into(),
            source: source.into(),
            checksum: checksum.into(),
            created_at: now,
        };
        self.versions.push(version.clone());
        self.last_updated = now;
        version
    }

    pub fn latest_version(&self) -> Option<&ModelVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    pub fn get_version(&self, version: u32) -> Option<&ModelVersion> {
        self.versions.iter().find(|v| v.version == version)
    }
}

/// Names become directory names in the store
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '));
    if !valid {
        return Err(TrainError::invalid_param(
            "registered_model_name",
            name,
            "must be non-empty and contain only letters, digits, spaces, '_', '-' or '.'",
        ));
    }
    Ok(())
}
