//! Experiment Tracker Implementation
//!
//! Track experiments, runs, parameters, metrics and artifacts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{sha256_hex, LoggedModel, ModelMetadata, METADATA_FILE, MODEL_FILE};
use super::registry::{validate_name, RegisteredModel};
use super::storage::{locked, LocalStorage, StorageBackend};
use crate::config::TrackingConfig;
use crate::error::{Result, TrainError};

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name
    pub key: String,
    /// Metric value
    pub value: f64,
    /// Step/epoch number
    pub step: u64,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    /// Create a new metric
    pub fn new(key: impl Into<String>, value: f64, step: u64) -> Self {
        Self {
            key: key.into(),
            value,
            step,
            timestamp: Utc::now(),
        }
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is currently running
    Running,
    /// Run completed successfully
    Finished,
    /// Run failed
    Failed,
    /// Run was killed/stopped
    Killed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// A run within an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Run ID
    pub run_id: String,
    /// Run name
    pub run_name: String,
    /// Owning experiment
    pub experiment_id: String,
    /// Status
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    /// End time (None if still running)
    pub end_time: Option<DateTime<Utc>>,
    /// Parameters
    pub params: BTreeMap<String, String>,
    /// Latest metrics
    pub metrics: BTreeMap<String, f64>,
    /// Metrics history
    pub metrics_history: Vec<Metric>,
    /// Tags
    pub tags: BTreeMap<String, String>,
    /// Artifact paths, relative to the run's artifact root
    pub artifacts: Vec<String>,
}

impl Run {
    /// Create a new run
    pub fn new(experiment_id: impl Into<String>, run_name: Option<&str>) -> Self {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", &run_id[..8]));
        Self {
            run_id,
            run_name,
            experiment_id: experiment_id.into(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metrics_history: Vec::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Get run duration in seconds
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// An experiment groups related runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment ID
    pub experiment_id: String,
    /// Experiment name
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Tags
    pub tags: BTreeMap<String, String>,
}

impl Experiment {
    /// Create a new experiment
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            created_at: Utc::now(),
            tags: BTreeMap::new(),
        }
    }
}

/// Experiment tracker
///
/// Holds at most one active run. Every logging call is written through to
/// the storage backend immediately.
pub struct ExperimentTracker {
    storage: Box<dyn StorageBackend>,
    experiment: Experiment,
    active_run: RwLock<Option<Run>>,
}

impl ExperimentTracker {
    /// Open a local file store and select the configured experiment
    pub fn open(config: TrackingConfig) -> Result<Self> {
        let storage = LocalStorage::new(&config.tracking_dir)?;
        info!(dir = %config.tracking_dir.display(), "opened tracking store");
        Self::with_storage(Box::new(storage), &config.experiment_name)
    }

    /// Use an arbitrary backend, creating the experiment if it does not exist
    pub fn with_storage(storage: Box<dyn StorageBackend>, experiment_name: &str) -> Result<Self> {
        if !storage.is_available() {
            return Err(TrainError::TrackingError("tracking storage is not available".to_string()));
        }

        let experiment = locked(storage.as_ref(), || {
            let existing = storage.load_experiments()?;
            if let Some(exp) = existing.iter().find(|e| e.name == experiment_name) {
                return Ok(exp.clone());
            }

            let next_id = existing
                .iter()
                .filter_map(|e| e.experiment_id.parse::<u64>().ok())
                .max()
                .map_or(0, |id| id + 1);
            let exp = Experiment::new(next_id.to_string(), experiment_name);
            storage.save_experiment(&exp)?;
            info!(experiment_id = %exp.experiment_id, experiment = experiment_name, "created experiment");
            Ok(exp)
        })?;

        Ok(Self {
            storage,
            experiment,
            active_run: RwLock::new(None),
        })
    }

    /// The experiment new runs are recorded under
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Start a new run
    pub fn start_run(&self, run_name: Option<&str>) -> Result<String> {
        let mut active = self.active_run.write();
        if let Some(run) = active.as_ref() {
            return Err(TrainError::TrackingError(format!(
                "run '{}' is already active, end it before starting another",
                run.run_id
            )));
        }

        let run = Run::new(&self.experiment.experiment_id, run_name);
        self.storage.save_run(&run)?;
        info!(run_id = %run.run_id, run_name = %run.run_name, "started run");

        let run_id = run.run_id.clone();
        *active = Some(run);
        Ok(run_id)
    }

    /// Snapshot of the active run
    pub fn active_run(&self) -> Option<Run> {
        self.active_run.read().clone()
    }

    /// Apply `f` to a copy of the active run and keep it only once it is saved
    fn with_active_run<T>(&self, f: impl FnOnce(&mut Run) -> Result<T>) -> Result<T> {
        let mut active = self.active_run.write();
        let mut run = active
            .as_ref()
            .cloned()
            .ok_or_else(|| TrainError::TrackingError("no active run".to_string()))?;
        let out = f(&mut run)?;
        self.storage.save_run(&run)?;
        *active = Some(run);
        Ok(out)
    }

    /// Log a parameter. Parameters are write-once: logging the same key with
    /// a different value is an error.
    pub fn log_param(&self, key: impl Into<String>, value: impl ToString) -> Result<()> {
        let key = key.into();
        let value = value.to_string();
        self.with_active_run(|run| {
            match run.params.get(&key) {
                Some(existing) if *existing != value => {
                    return Err(TrainError::TrackingError(format!(
                        "param '{}' already logged as '{}', refusing to change it to '{}'",
                        key, existing, value
                    )));
                }
                Some(_) => {}
                None => {
                    debug!(%key, %value, "log param");
                    run.params.insert(key, value);
                }
            }
            Ok(())
        })
    }

    /// Log multiple parameters
    pub fn log_params(&self, params: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (key, value) in params {
            self.log_param(key, value)?;
        }
        Ok(())
    }

    /// Log a metric, keeping the latest value and the full history
    pub fn log_metric(&self, key: impl Into<String>, value: f64, step: Option<u64>) -> Result<()> {
        let key = key.into();
        let step = step.unwrap_or(0);
        self.with_active_run(|run| {
            debug!(%key, value, step, "log metric");
            run.metrics.insert(key.clone(), value);
            run.metrics_history.push(Metric::new(key, value, step));
            Ok(())
        })
    }

    /// Set a tag, overwriting any previous value
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        self.with_active_run(|run| {
            run.tags.insert(key, value);
            Ok(())
        })
    }

    /// Store a file under the active run's artifact root
    pub fn log_artifact(&self, rel_path: &str, bytes: &[u8]) -> Result<String> {
        self.with_active_run(|run| {
            let uri = self
                .storage
                .write_artifact(&run.experiment_id, &run.run_id, rel_path, bytes)?;
            if !run.artifacts.iter().any(|a| a == rel_path) {
                run.artifacts.push(rel_path.to_string());
            }
            debug!(%uri, "logged artifact");
            Ok(uri)
        })
    }

    /// Serialize `model` under `artifact_path` with its metadata, and add a
    /// registry version when `registered_model_name` is given
    pub fn log_model<M: Serialize>(
        &self,
        model: &M,
        mut metadata: ModelMetadata,
        artifact_path: &str,
        registered_model_name: Option<&str>,
    ) -> Result<LoggedModel> {
        if let Some(name) = registered_model_name {
            validate_name(name)?;
        }

        let (experiment_id, run_id) = {
            let active = self.active_run.read();
            let run = active
                .as_ref()
                .ok_or_else(|| TrainError::TrackingError("no active run".to_string()))?;
            (run.experiment_id.clone(), run.run_id.clone())
        };

        let artifact_path = artifact_path.trim_matches('/');
        let model_bytes = serde_json::to_vec(model)?;
        let checksum = sha256_hex(&model_bytes);

        metadata.run_id = Some(run_id.clone());
        metadata.checksum = Some(checksum.clone());
        let metadata_bytes = serde_json::to_vec_pretty(&metadata)?;

        self.log_artifact(&format!("{}/{}", artifact_path, MODEL_FILE), &model_bytes)?;
        self.log_artifact(&format!("{}/{}", artifact_path, METADATA_FILE), &metadata_bytes)?;

        let model_uri = format!(
            "{}/{}",
            self.storage.artifact_uri(&experiment_id, &run_id),
            artifact_path
        );
        info!(%model_uri, %checksum, "logged model");

        let registered_version = match registered_model_name {
            Some(name) => {
                let version = locked(self.storage.as_ref(), || {
                    let mut registered = match self.storage.load_registered_model(name)? {
                        Some(existing) => existing,
                        None => RegisteredModel::new(name)?,
                    };
                    let version = registered.add_version(&run_id, &model_uri, &checksum);
                    self.storage.save_registered_model(&registered)?;
                    Ok(version)
                })?;
                info!(model = name, version = version.version, "registered model version");
                Some(version)
            }
            None => None,
        };

        Ok(LoggedModel {
            model_uri,
            checksum,
            registered_version,
        })
    }

    /// End the active run with the given status
    pub fn end_run(&self, status: RunStatus) -> Result<Run> {
        let mut active = self.active_run.write();
        let mut run = active
            .as_ref()
            .cloned()
            .ok_or_else(|| TrainError::TrackingError("no active run".to_string()))?;

        run.status = if status.is_terminal() { status } else { RunStatus::Finished };
        run.end_time = Some(Utc::now());
        self.storage.save_run(&run)?;
        *active = None;

        info!(run_id = %run.run_id, status = ?run.status, duration_secs = run.duration_secs(), "ended run");
        Ok(run)
    }

    /// Load a run of this experiment
    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        if let Some(run) = self.active_run.read().as_ref().filter(|r| r.run_id == run_id) {
            return Ok(run.clone());
        }
        self.storage.load_run(&self.experiment.experiment_id, run_id)
    }

    /// All runs of this experiment, oldest first
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        self.storage.list_runs(&self.experiment.experiment_id)
    }

    /// Get the best run by a metric
    pub fn best_run(&self, metric_name: &str, maximize: bool) -> Result<Option<Run>> {
        let runs = self.list_runs()?;
        Ok(runs
            .into_iter()
            .filter(|r| r.metrics.contains_key(metric_name))
            .max_by(|a, b| {
                let val_a = a.metrics.get(metric_name).unwrap_or(&0.0);
                let val_b = b.metrics.get(metric_name).unwrap_or(&0.0);

                if maximize {
                    val_a.partial_cmp(val_b).unwrap_or(std::cmp::Ordering::Equal)
                } else {
                    val_b.partial_cmp(val_a).unwrap_or(std::cmp::Ordering::Equal)
                }
            }))
    }

    /// Look up a registered model
    pub fn get_registered_model(&self, name: &str) -> Result<Option<RegisteredModel>> {
        self.storage.load_registered_model(name)
    }
}
