//! Job and tracking configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TrainError};

/// Default registry name for models produced by the training job
pub const DEFAULT_REGISTERED_MODEL: &str = "iris_random_forest";

/// Configuration for a training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Fraction of samples held out for evaluation
    pub test_size: f64,
    /// Seed for the split and the forest
    pub random_state: u64,
    /// Artifact sub-directory the model is logged under
    pub artifact_path: String,
    /// Registry entry the logged model is added to (None skips registration)
    pub registered_model_name: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            test_size: 0.2,
            random_state: 42,
            artifact_path: "model".to_string(),
            registered_model_name: Some(DEFAULT_REGISTERED_MODEL.to_string()),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Set maximum tree depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set held-out fraction
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Set random seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Set or clear the registered model name
    pub fn with_registered_model_name(mut self, name: Option<String>) -> Self {
        self.registered_model_name = name;
        self
    }

    /// Check parameter ranges before any work is done
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(TrainError::invalid_param("n_estimators", self.n_estimators, "must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(TrainError::invalid_param("max_depth", self.max_depth, "must be at least 1"));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TrainError::invalid_param(
                "test_size",
                self.test_size,
                "must be strictly between 0 and 1",
            ));
        }
        if self.artifact_path.trim().is_empty() {
            return Err(TrainError::invalid_param("artifact_path", "", "must not be empty"));
        }
        Ok(())
    }

    /// Job parameters as they are recorded on the run
    pub fn params(&self) -> Vec<(String, String)> {
        vec![
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("test_size".to_string(), self.test_size.to_string()),
            ("random_state".to_string(), self.random_state.to_string()),
        ]
    }
}

/// Where and under which experiment runs are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Root directory of the tracking store
    pub tracking_dir: PathBuf,
    /// Experiment that new runs belong to
    pub experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_dir: PathBuf::from("./mlruns"),
            experiment_name: "Default".to_string(),
        }
    }
}

impl TrackingConfig {
    pub const URI_VAR: &'static str = "TRACKING_URI";
    pub const EXPERIMENT_VAR: &'static str = "EXPERIMENT_NAME";

    /// Store rooted at `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tracking_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set experiment name
    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    /// Read `TRACKING_URI` and `EXPERIMENT_NAME` from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset or blank values keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(uri) = lookup(Self::URI_VAR).filter(|v| !v.trim().is_empty()) {
            config.tracking_dir = parse_tracking_uri(uri.trim())?;
        }
        if let Some(name) = lookup(Self::EXPERIMENT_VAR).filter(|v| !v.trim().is_empty()) {
            config.experiment_name = name.trim().to_string();
        }

        Ok(config)
    }
}

/// Accepts a plain path or a `file:` URI
fn parse_tracking_uri(uri: &str) -> Result<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(rest));
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Ok(PathBuf::from(rest));
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(TrainError::invalid_param(
            TrackingConfig::URI_VAR,
            uri,
            format!("unsupported scheme '{}', only file stores are supported", scheme),
        ));
    }
    Ok(PathBuf::from(uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.random_state, 42);
        assert_eq!(config.registered_model_name.as_deref(), Some("iris_random_forest"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_params_stringified() {
        let params = TrainingConfig::new().with_n_estimators(7).with_test_size(0.35).params();
        assert_eq!(
            params,
            vec![
                ("n_estimators".to_string(), "7".to_string()),
                ("max_depth".to_string(), "5".to_string()),
                ("test_size".to_string(), "0.35".to_string()),
                ("random_state".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TrainingConfig::new().with_n_estimators(0).validate().is_err());
        assert!(TrainingConfig::new().with_max_depth(0).validate().is_err());
        assert!(TrainingConfig::new().with_test_size(0.0).validate().is_err());
        assert!(TrainingConfig::new().with_test_size(1.0).validate().is_err());
    }

    #[test]
    fn test_tracking_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TRACKING_URI", "file:///tmp/store"),
            ("EXPERIMENT_NAME", " iris "),
        ]
        .into_iter()
        .collect();

        let config = TrackingConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.tracking_dir, PathBuf::from("/tmp/store"));
        assert_eq!(config.experiment_name, "iris");
    }

    #[test]
    fn test_tracking_defaults_when_unset() {
        let config = TrackingConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TrackingConfig::default());
    }

    #[test]
    fn test_remote_uri_rejected() {
        let result = TrackingConfig::from_lookup(|k| {
            (k == "TRACKING_URI").then(|| "http://localhost:5000".to_string())
        });
        assert!(matches!(result, Err(TrainError::InvalidParameter { .. })));
    }
}
