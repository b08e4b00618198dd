//! Experiment Tracking Module
//!
//! Records runs, their parameters, metrics and artifacts in a local store laid
//! out like an MLflow file store, with a small model registry on top.
//!
//! # Example
//!
//! ```no_run
//! use iris_train::config::TrackingConfig;
//! use iris_train::tracking::{ExperimentTracker, RunStatus};
//!
//! # fn main() -> iris_train::Result<()> {
//! let tracker = ExperimentTracker::open(TrackingConfig::with_dir("./mlruns"))?;
//! let run_id = tracker.start_run(Some("baseline"))?;
//! tracker.log_param("n_estimators", 100)?;
//! tracker.log_metric("accuracy", 0.97, None)?;
//! tracker.end_run(RunStatus::Finished)?;
//! assert_eq!(tracker.get_run(&run_id)?.status, RunStatus::Finished);
//! # Ok(())
//! # }
//! ```

mod model;
mod registry;
mod storage;
mod tracker;

pub use model::{load_model, LoggedModel, ModelMetadata, MODEL_FILE, METADATA_FILE};
pub use registry::{ModelVersion, RegisteredModel};
pub use storage::{InMemoryStorage, LocalStorage, StorageBackend};
pub use tracker::{Experiment, ExperimentTracker, Metric, Run, RunStatus};
