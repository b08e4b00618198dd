//! Iris training job
//!
//! Fits a random forest classifier on the built-in Iris dataset and records
//! parameters, metrics and the fitted model to a local experiment tracker.
//!
//! # Modules
//!
//! - [`datasets`] - Built-in datasets (Iris)
//! - [`training`] - Splitting, decision trees, random forests, metrics and the training engine
//! - [`tracking`] - Experiment tracking and model registry
//! - [`config`] - Job and tracking configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

pub mod config;
pub mod datasets;
pub mod training;
pub mod tracking;

// Services
pub mod cli;

pub use error::{Result, TrainError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TrainError};

    // Configuration
    pub use crate::config::{TrackingConfig, TrainingConfig};

    // Data
    pub use crate::datasets::{load_iris, Dataset};

    // Training
    pub use crate::training::{
        accuracy_score, train_test_split, ClassificationReport, RandomForestClassifier, TrainEngine,
        TrainingOutcome,
    };

    // Experiment tracking
    pub use crate::tracking::{ExperimentTracker, Run, RunStatus};
}
