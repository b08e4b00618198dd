//! Logged model artifacts
//!
//! A logged model is a directory holding the serialized model and a metadata
//! file describing how it was produced.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::registry::ModelVersion;
use crate::error::{Result, TrainError};

/// Serialized model file name inside a logged model directory
pub const MODEL_FILE: &str = "model.json";
/// Metadata file name inside a logged model directory
pub const METADATA_FILE: &str = "metadata.json";

/// Description stored next to a logged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model family, e.g. "random_forest_classifier"
    pub model_type: String,
    /// Crate version that wrote the model
    pub writer_version: String,
    /// Run that logged the model
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Input column names
    pub feature_names: Vec<String>,
    /// Class names, indexed by label
    pub target_names: Vec<String>,
    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
    /// Evaluation metrics
    pub metrics: BTreeMap<String, f64>,
    /// SHA-256 of the model file, hex encoded
    pub checksum: Option<String>,
}

impl ModelMetadata {
    /// Create new metadata for a model family
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: None,
            created_at: Utc::now(),
            feature_names: Vec::new(),
            target_names: Vec::new(),
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
            checksum: None,
        }
    }

    /// Set feature names
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    /// Set class names
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_names = targets;
        self
    }

    /// Add hyperparameters
    pub fn with_hyperparameters(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.hyperparameters.extend(params);
        self
    }

    /// Add metric
    pub fn add_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// Result of logging a model
#[derive(Debug, Clone)]
pub struct LoggedModel {
    /// Location of the logged model directory
    pub model_uri: String,
    /// SHA-256 of the model file
    pub checksum: String,
    /// Registry version created for it, if registration was requested
    pub registered_version: Option<ModelVersion>,
}

/// Hex SHA-256 digest
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read a logged model directory back, verifying its checksum
pub fn load_model<M: DeserializeOwned>(dir: impl AsRef<Path>) -> Result<(M, ModelMetadata)> {
    let dir = dir.as_ref();
    let model_bytes = fs::read(dir.join(MODEL_FILE))?;
    let metadata: ModelMetadata = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;

    if let Some(expected) = &metadata.checksum {
        let actual = sha256_hex(&model_bytes);
        if &actual != expected {
            return Err(TrainError::TrackingError(format!(
                "checksum mismatch for {}: expected {}, got {}",
                dir.display(),
                expected,
                actual
            )));
        }
    }

    let model = serde_json::from_slice(&model_bytes)?;
    Ok((model, metadata))
}
